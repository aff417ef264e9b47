use std::{collections::HashMap, sync::Arc};

use ordered_float::OrderedFloat;

use crate::{Modification, ModificationDefinition, Residue};

/// A source of canonical modifications
pub trait ModificationCatalog: Send + Sync {
    /// Find a modification by name, this should include the names as used by search engines
    fn lookup_by_name(&self, name: &str) -> Option<Modification>;

    /// Find a curated modification with the given mass (within the tolerance in Da) that can be
    /// placed on the given residue
    fn lookup_by_mass_and_residue(
        &self,
        mass: f64,
        residue: Residue,
        tolerance: f64,
    ) -> Option<Modification>;
}

/// An in memory catalog, by default filled with the modifications commonly used in searches
#[derive(Clone, Debug)]
pub struct StandardCatalog {
    modifications: Vec<Modification>,
    /// Lowercase name or alias to index into modifications
    names: HashMap<String, usize>,
}

impl Default for StandardCatalog {
    fn default() -> Self {
        use Residue::{AminoAcid as A, CTerm, NTerm};

        let mut catalog = Self::empty();
        catalog.add(
            ModificationDefinition::curated("Carbamidomethyl", 57.021464, [A('C')]),
            &["Carbamidomethyl (C)", "carbamidomethyl C"],
        );
        catalog.add(
            ModificationDefinition::curated("Carboxymethyl", 58.005479, [A('C')]),
            &["Carboxymethyl (C)", "carboxymethyl C"],
        );
        catalog.add(
            ModificationDefinition::curated("Oxidation", 15.994915, [A('M'), A('W')]),
            &["Oxidation (M)", "Oxidation (W)", "oxidation of M"],
        );
        catalog.add(
            ModificationDefinition::curated("Phospho", 79.966331, [A('S'), A('T'), A('Y')]),
            &[
                "Phospho (ST)",
                "Phospho (S)",
                "Phospho (T)",
                "Phospho (Y)",
                "Phospho (STY)",
                "phosphorylation of S",
                "phosphorylation of T",
                "phosphorylation of Y",
            ],
        );
        catalog.add(
            ModificationDefinition::curated("Acetyl", 42.010565, [NTerm, A('K')]),
            &[
                "Acetyl (N-term)",
                "Acetyl (Protein N-term)",
                "Acetyl (K)",
                "acetylation of protein n-term",
                "acetylation of K",
            ],
        );
        catalog.add(
            ModificationDefinition::curated("Deamidated", 0.984016, [A('N'), A('Q')]),
            &["Deamidated (NQ)", "Deamidation (NQ)", "deamidation of N and Q"],
        );
        catalog.add(
            ModificationDefinition::curated("Gln->pyro-Glu", -17.026549, [A('Q')]),
            &["Gln->pyro-Glu (N-term Q)", "pyro-glu from n-term q"],
        );
        catalog.add(
            ModificationDefinition::curated("Glu->pyro-Glu", -18.010565, [A('E')]),
            &["Glu->pyro-Glu (N-term E)", "pyro-glu from n-term e"],
        );
        catalog.add(
            ModificationDefinition::curated("Methyl", 14.01565, [A('K'), A('R'), CTerm]),
            &["Methyl (K)", "Methyl (R)", "Methyl (C-term)", "methylation of K"],
        );
        catalog.add(
            ModificationDefinition::curated("Dimethyl", 28.0313, [NTerm, A('K')]),
            &["Dimethyl (K)", "Dimethyl (N-term)"],
        );
        catalog.add(
            ModificationDefinition::curated("Amidated", -0.984016, [CTerm]),
            &["Amidated (C-term)", "Amidated (Protein C-term)"],
        );
        catalog.add(
            ModificationDefinition::curated("Propionamide", 71.037114, [A('C')]),
            &["Propionamide (C)", "propionamide C"],
        );
        catalog
    }
}

impl StandardCatalog {
    /// A catalog without any modifications
    pub fn empty() -> Self {
        Self {
            modifications: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Add a modification with the given aliases, the name and aliases are matched case insensitively.
    /// A name that is already in use keeps pointing to the earlier modification.
    pub fn add(&mut self, modification: ModificationDefinition, aliases: &[&str]) {
        let index = self.modifications.len();
        for name in std::iter::once(modification.name()).chain(aliases.iter().copied()) {
            self.names.entry(name.to_lowercase()).or_insert(index);
        }
        self.modifications.push(Arc::new(modification));
    }

    /// The number of modifications
    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    /// If there are no modifications
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }
}

impl ModificationCatalog for StandardCatalog {
    fn lookup_by_name(&self, name: &str) -> Option<Modification> {
        self.names
            .get(&name.trim().to_lowercase())
            .map(|index| self.modifications[*index].clone())
    }

    fn lookup_by_mass_and_residue(
        &self,
        mass: f64,
        residue: Residue,
        tolerance: f64,
    ) -> Option<Modification> {
        self.modifications
            .iter()
            .filter(|m| m.applies_to(residue) && (m.mass() - mass).abs() <= tolerance)
            .min_by(|a, b| (a.mass() - mass).abs().total_cmp(&(b.mass() - mass).abs()))
            .cloned()
    }
}

/// Resolves search engine modifications to canonical modifications. Resolving never fails,
/// anything not found in the catalog becomes an ad-hoc modification. Ad-hoc modifications are
/// created once per mass and residue, later requests share the same instance.
#[derive(Clone)]
pub struct ModificationResolver {
    catalog: Arc<dyn ModificationCatalog>,
    tolerance: f64,
    ad_hoc: HashMap<(OrderedFloat<f64>, Residue), Modification>,
}

impl std::fmt::Debug for ModificationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModificationResolver")
            .field("tolerance", &self.tolerance)
            .field("ad_hoc", &self.ad_hoc.len())
            .finish_non_exhaustive()
    }
}

impl ModificationResolver {
    /// Create a resolver on the given catalog, the tolerance (Da) is used for mass lookups
    pub fn new(catalog: Arc<dyn ModificationCatalog>, tolerance: f64) -> Self {
        Self {
            catalog,
            tolerance,
            ad_hoc: HashMap::new(),
        }
    }

    /// Resolve a modification by name first, then by mass and residue, and lastly create an
    /// ad-hoc modification.
    pub fn resolve(&mut self, name: Option<&str>, mass: f64, residue: Residue) -> Modification {
        name.and_then(|name| self.catalog.lookup_by_name(name))
            .unwrap_or_else(|| self.resolve_mass(mass, residue))
    }

    /// Resolve a modification by mass and residue, creating an ad-hoc modification if the catalog
    /// does not contain a fitting modification
    pub fn resolve_mass(&mut self, mass: f64, residue: Residue) -> Modification {
        if let Some(found) = self
            .catalog
            .lookup_by_mass_and_residue(mass, residue, self.tolerance)
        {
            return found;
        }
        self.ad_hoc
            .entry((OrderedFloat(mass), residue))
            .or_insert_with(|| {
                log::debug!("No catalog modification for {mass}@{residue}, using a mass modification");
                Arc::new(ModificationDefinition::ad_hoc(mass, [residue]))
            })
            .clone()
    }

    /// The number of ad-hoc modifications created so far
    pub fn ad_hoc_count(&self) -> usize {
        self.ad_hoc.len()
    }
}
