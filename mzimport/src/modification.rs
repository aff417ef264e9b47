use std::{collections::BTreeSet, fmt::Display, sync::Arc};

use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// A modification, wrapped in an [`Arc`] to share catalog entries between all matches.
pub type Modification = Arc<ModificationDefinition>;

/// The place a modification can be attached to
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Residue {
    /// The N-terminus
    NTerm,
    /// An amino acid, always an upper case letter
    AminoAcid(char),
    /// The C-terminus
    CTerm,
}

impl Residue {
    /// Parse a residue as written in search engine outputs, `[` and `N-term`/`N_term` are the
    /// N-terminus, `]` and `C-term`/`C_term` the C-terminus.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text {
            "[" => Some(Self::NTerm),
            "]" => Some(Self::CTerm),
            t if t.eq_ignore_ascii_case("n-term") || t.eq_ignore_ascii_case("n_term") => {
                Some(Self::NTerm)
            }
            t if t.eq_ignore_ascii_case("c-term") || t.eq_ignore_ascii_case("c_term") => {
                Some(Self::CTerm)
            }
            t => t
                .chars()
                .exactly_one()
                .ok()
                .filter(char::is_ascii_alphabetic)
                .map(|c| Self::AminoAcid(c.to_ascii_uppercase())),
        }
    }
}

impl Display for Residue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NTerm => write!(f, "N-term"),
            Self::AminoAcid(aa) => write!(f, "{aa}"),
            Self::CTerm => write!(f, "C-term"),
        }
    }
}

/// A canonical modification: a name, a monoisotopic delta mass, and the residues it applies to
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ModificationDefinition {
    name: String,
    mass: OrderedFloat<f64>,
    residues: BTreeSet<Residue>,
    curated: bool,
}

impl ModificationDefinition {
    /// A modification that is part of a curated catalog
    pub fn curated(
        name: impl Into<String>,
        mass: f64,
        residues: impl IntoIterator<Item = Residue>,
    ) -> Self {
        Self {
            name: name.into(),
            mass: OrderedFloat(mass),
            residues: residues.into_iter().collect(),
            curated: true,
        }
    }

    /// A modification that was inferred from a mass and residue, not found in a catalog
    pub fn ad_hoc(mass: f64, residues: impl IntoIterator<Item = Residue>) -> Self {
        let residues: BTreeSet<Residue> = residues.into_iter().collect();
        Self {
            name: format!("{mass}@{}", residues.iter().join("")),
            mass: OrderedFloat(mass),
            residues,
            curated: false,
        }
    }

    /// The name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The monoisotopic delta mass (Da)
    pub fn mass(&self) -> f64 {
        self.mass.0
    }

    /// The residues this modification applies to
    pub const fn residues(&self) -> &BTreeSet<Residue> {
        &self.residues
    }

    /// If this modification can be placed on the given residue
    pub fn applies_to(&self, residue: Residue) -> bool {
        self.residues.contains(&residue)
    }

    /// If this modification comes from a curated catalog, false for modifications inferred from a mass
    pub const fn is_curated(&self) -> bool {
        self.curated
    }
}

/// Where on a peptide a modification was placed
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum ModificationSite {
    /// The search engine does not report where the modification is placed
    #[default]
    Unresolved,
    /// The N-terminus
    NTerm,
    /// An amino acid, 0-based index into the sequence
    Index(usize),
    /// The C-terminus
    CTerm,
}

impl ModificationSite {
    /// The 1-based residue number, None for termini and unresolved sites
    pub const fn residue_number(self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(i + 1),
            Self::Unresolved | Self::NTerm | Self::CTerm => None,
        }
    }

    /// If this site is valid for a sequence of the given length
    pub const fn is_valid_for(self, length: usize) -> bool {
        match self {
            Self::Index(i) => i < length,
            Self::Unresolved | Self::NTerm | Self::CTerm => true,
        }
    }
}

/// A modification as found on a peptide
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ModificationMatch {
    /// The modification
    pub modification: Modification,
    /// If this is a variable modification, false for fixed modifications
    pub variable: bool,
    /// The site
    pub site: ModificationSite,
}

impl ModificationMatch {
    /// Create a new modification match
    pub const fn new(modification: Modification, variable: bool, site: ModificationSite) -> Self {
        Self {
            modification,
            variable,
            site,
        }
    }
}

/// Parse a modification in the `<mass>@<residue>` notation, for example `79.9663@S`.
/// Returns None if the text does not follow this notation.
pub fn parse_mass_at_residue(text: &str) -> Option<(f64, Residue)> {
    let (mass, residue) = text.trim().split_once('@')?;
    let mass = mass.trim().parse::<f64>().ok().filter(|m| m.is_finite())?;
    Some((mass, Residue::parse(residue)?))
}
