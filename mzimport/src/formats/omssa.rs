use std::{
    collections::{HashMap, HashSet},
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use roxmltree::Node;

use super::{child, children, descendant_text, parse_xml, read_source};
use crate::{
    CandidateHit, Charge, ImportError, ImportParameters, MassDelta, ModificationMatch,
    ModificationResolver, ModificationSite, Peptide, Protein, QueryHits, ReaderOptions, Residue,
    SearchEngine, SpectrumKey, SpectrumRegistry, SpectrumSummary,
    helper_functions::{file_name, foreign_file_name, parse_finite, read_to_string},
};

/// OMSSA writes masses as integers, scaled by this factor unless the response says otherwise
const DEFAULT_SCALE: f64 = 100.0;

/// A modification as known to OMSSA by its number
#[derive(Clone, Debug, PartialEq)]
struct OmssaModification {
    name: String,
    mass: f64,
    residue: Residue,
}

/// The modifications that OMSSA knows without them being declared in the search settings
fn built_in_modifications() -> HashMap<u32, OmssaModification> {
    use Residue::{AminoAcid as A, NTerm};
    [
        (0, "methylation of K", 14.01565, A('K')),
        (1, "oxidation of M", 15.994915, A('M')),
        (2, "carboxymethyl C", 58.005479, A('C')),
        (3, "carbamidomethyl C", 57.021464, A('C')),
        (4, "deamidation of N and Q", 0.984016, A('N')),
        (5, "propionamide C", 71.037114, A('C')),
        (6, "phosphorylation of S", 79.966331, A('S')),
        (7, "phosphorylation of T", 79.966331, A('T')),
        (8, "phosphorylation of Y", 79.966331, A('Y')),
        (10, "acetylation of protein n-term", 42.010565, NTerm),
    ]
    .into_iter()
    .map(|(id, name, mass, residue)| {
        (
            id,
            OmssaModification {
                name: name.to_string(),
                mass,
                residue,
            },
        )
    })
    .collect()
}

#[derive(Clone, Debug)]
struct RawHitSet {
    title: Option<String>,
    number: Option<String>,
    hits: Vec<RawHit>,
}

#[derive(Clone, Debug)]
struct RawHit {
    evalue: Option<String>,
    charge: Option<String>,
    sequence: Option<String>,
    mass: Option<String>,
    theoretical_mass: Option<String>,
    proteins: Vec<String>,
    modifications: Vec<Option<String>>,
}

/// A reader for OMSSA XML result (`.omx`) files.
///
/// The document is parsed when opening, the hit sets are converted while iterating.
pub struct OmssaReader {
    path: PathBuf,
    file: String,
    spectrum_file: String,
    parameters: ImportParameters,
    registry: Option<Arc<dyn SpectrumRegistry>>,
    resolver: ModificationResolver,
    modifications: HashMap<u32, OmssaModification>,
    fixed: HashSet<u32>,
    scale: f64,
    hit_sets: std::iter::Enumerate<std::vec::IntoIter<RawHitSet>>,
    done: bool,
}

impl std::fmt::Debug for OmssaReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmssaReader")
            .field("path", &self.path)
            .field("spectrum_file", &self.spectrum_file)
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

impl OmssaReader {
    /// Open an OMSSA omx file, gzipped files are decompressed automatically.
    /// # Errors
    /// If the file could not be read or is not a valid omx file.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = read_to_string(path)?;
        Self::parse(path, &text, options)
    }

    /// Read an OMSSA omx file from any reader, the path is only used for error messages and as
    /// identification file name.
    /// # Errors
    /// If the data could not be read or is not a valid omx file.
    pub fn from_reader(
        reader: impl Read,
        path: impl AsRef<Path>,
        options: &ReaderOptions,
    ) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = read_source(reader, path)?;
        Self::parse(path, &text, options)
    }

    fn parse(path: &Path, text: &str, options: &ReaderOptions) -> Result<Self, ImportError> {
        let document = parse_xml(path, text, "MSSearch")?;
        let root = document.root_element();

        let mut modifications = built_in_modifications();
        let mut fixed = HashSet::new();
        if let Some(settings) = root
            .descendants()
            .find(|n| n.has_tag_name("MSSearchSettings"))
        {
            for specification in settings
                .descendants()
                .filter(|n| n.has_tag_name("MSModSpec"))
            {
                let (id, modification) = parse_user_modification(specification)
                    .map_err(|m| ImportError::malformed(path, None, m))?;
                modifications.insert(id, modification);
            }
            if let Some(list) = child(settings, "MSSearchSettings_fixed") {
                for id in children(list, "MSMod") {
                    fixed.insert(parse_id(id).map_err(|m| ImportError::malformed(path, None, m))?);
                }
            }
        }

        let scale = match descendant_text(root, "MSResponse_scale") {
            Some(scale) => scale.parse::<f64>().ok().filter(|s| *s > 0.0).ok_or_else(|| {
                ImportError::malformed(path, None, format!("Invalid mass scale '{scale}'"))
            })?,
            None => DEFAULT_SCALE,
        };

        let hit_sets: Vec<RawHitSet> = root
            .descendants()
            .filter(|n| n.has_tag_name("MSHitSet"))
            .map(|set| RawHitSet {
                title: descendant_text(set, "MSHitSet_ids_E"),
                number: child(set, "MSHitSet_number")
                    .and_then(|n| n.text())
                    .map(|t| t.trim().to_string()),
                hits: set
                    .descendants()
                    .filter(|n| n.has_tag_name("MSHits"))
                    .map(raw_hit)
                    .collect(),
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            file: file_name(path),
            spectrum_file: descendant_text(root, "MSInFile_infile")
                .map_or_else(|| file_name(path), |f| foreign_file_name(&f).to_string()),
            parameters: options.parameters.clone(),
            registry: options.registry.clone(),
            resolver: ModificationResolver::new(
                options.catalog.clone(),
                options.parameters.modification_tolerance,
            ),
            modifications,
            fixed,
            scale,
            hit_sets: hit_sets.into_iter().enumerate(),
            done: false,
        })
    }

    /// The name of the spectrum file that was searched
    pub fn spectrum_file(&self) -> &str {
        &self.spectrum_file
    }

    fn read_hit_set(&mut self, index: usize, set: RawHitSet) -> Result<QueryHits, ImportError> {
        let title = set
            .title
            .or(set.number)
            .ok_or_else(|| self.malformed(index, "The hit set has no title or number"))?;
        let spectrum = SpectrumKey::new(self.spectrum_file.clone(), title);

        let mut measured = None;
        let mut target = Vec::with_capacity(set.hits.len());
        for hit in set.hits {
            let hit = self.read_hit(index, hit)?;
            measured.get_or_insert(hit.measured_mass);
            target.push(hit);
        }

        let mut flagged_decoy = false;
        if let Some(registry) = &self.registry {
            flagged_decoy = registry.is_flagged_decoy(&spectrum);
            registry.insert_if_absent(
                spectrum.clone(),
                SpectrumSummary {
                    query: index,
                    precursor_mass: measured,
                    retention_time: None,
                    decoy: false,
                },
            );
        }

        Ok(QueryHits {
            index,
            spectrum,
            engine: SearchEngine::Omssa,
            file: self.file.clone(),
            retention_time: None,
            target,
            decoy: None,
            flagged_decoy,
        })
    }

    fn read_hit(&mut self, index: usize, hit: RawHit) -> Result<CandidateHit, ImportError> {
        let required = |value: Option<String>, name: &str| {
            value.ok_or_else(|| self.malformed(index, format!("The hit has no {name}")))
        };
        let number = |value: String, name: &str| {
            parse_finite(&value).ok_or_else(|| {
                self.malformed(
                    index,
                    format!("The hit {name} '{value}' is not a finite number"),
                )
            })
        };
        let expectation = number(required(hit.evalue, "e-value")?, "e-value")?;
        let charge = required(hit.charge, "charge")?
            .parse::<Charge>()
            .map_err(|m| self.malformed(index, m))?;
        let sequence = required(hit.sequence, "peptide sequence")?;
        let measured = number(required(hit.mass, "mass")?, "mass")? / self.scale;
        let theoretical =
            number(required(hit.theoretical_mass, "theoretical mass")?, "theoretical mass")?
                / self.scale;

        let mut modifications = Vec::with_capacity(hit.modifications.len());
        for id in hit.modifications {
            let id = id
                .and_then(|id| id.parse::<u32>().ok())
                .ok_or_else(|| self.malformed(index, "Invalid modification number"))?;
            let known = self.modifications.get(&id).ok_or_else(|| {
                self.malformed(index, format!("Unknown OMSSA modification number {id}"))
            })?;
            modifications.push(ModificationMatch::new(
                self.resolver
                    .resolve(Some(&known.name), known.mass, known.residue),
                !self.fixed.contains(&id),
                ModificationSite::Unresolved,
            ));
        }

        let proteins = hit
            .proteins
            .iter()
            .map(|header| Protein::from_header(header, &self.parameters.decoy, false));

        Ok(CandidateHit {
            peptide: Peptide::new(sequence, theoretical, proteins, modifications)
                .map_err(|m| self.malformed(index, m))?,
            expectation,
            score: None,
            charge,
            measured_mass: measured,
            delta: MassDelta::new(measured, theoretical),
        })
    }

    fn malformed(&self, index: usize, message: impl Into<String>) -> ImportError {
        ImportError::malformed(&self.path, Some(index), message)
    }
}

impl Iterator for OmssaReader {
    type Item = Result<QueryHits, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let (position, set) = self.hit_sets.next()?;
        let result = self.read_hit_set(position + 1, set);
        self.done = result.is_err();
        Some(result)
    }
}

fn raw_hit(hit: Node<'_, '_>) -> RawHit {
    let text = |name: &str| {
        child(hit, name)
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
    };
    RawHit {
        evalue: text("MSHits_evalue"),
        charge: text("MSHits_charge"),
        sequence: text("MSHits_pepstring"),
        mass: text("MSHits_mass"),
        theoretical_mass: text("MSHits_theomass"),
        proteins: hit
            .descendants()
            .filter(|n| n.has_tag_name("MSPepHit"))
            .filter_map(|p| {
                descendant_text(p, "MSPepHit_defline")
                    .filter(|d| !d.is_empty())
                    .or_else(|| descendant_text(p, "MSPepHit_accession"))
            })
            .collect(),
        modifications: hit
            .descendants()
            .filter(|n| n.has_tag_name("MSModHit"))
            .map(|m| descendant_text(m, "MSMod"))
            .collect(),
    }
}

/// The number of an `MSMod` element, the number is the text, the value attribute is a name
fn parse_id(node: Node<'_, '_>) -> Result<u32, String> {
    let text = node.text().unwrap_or_default().trim();
    text.parse::<u32>()
        .map_err(|_| format!("Invalid OMSSA modification number '{text}'"))
}

/// Parse a user modification (`MSModSpec`) from the search settings
fn parse_user_modification(node: Node<'_, '_>) -> Result<(u32, OmssaModification), String> {
    let id = node
        .descendants()
        .find(|n| n.has_tag_name("MSMod"))
        .ok_or("A user modification has no modification number")
        .and_then(|n| parse_id(n).map_err(|_| "A user modification has an invalid number"))?;
    let mass_text = descendant_text(node, "MSModSpec_monomass")
        .ok_or_else(|| format!("The user modification {id} has no mass"))?;
    let mass = mass_text
        .parse::<f64>()
        .map_err(|_| format!("The user modification {id} has an invalid mass '{mass_text}'"))?;
    let name = descendant_text(node, "MSModSpec_name").unwrap_or_else(|| format!("usermod {id}"));
    // The modification type values are named modaa, modn, modnaa, modc, modcaa, modnp, ...
    let kind = node
        .descendants()
        .find(|n| n.has_tag_name("MSModType"))
        .and_then(|n| n.attribute("value"))
        .unwrap_or("modaa");
    let residue = if kind.ends_with("aa") {
        descendant_text(node, "MSModSpec_residues_E").and_then(|r| Residue::parse(&r))
    } else if kind.starts_with("modc") {
        Some(Residue::CTerm)
    } else if kind.starts_with("modn") {
        Some(Residue::NTerm)
    } else {
        None
    }
    .ok_or_else(|| format!("The user modification {id} has no residue"))?;
    Ok((
        id,
        OmssaModification {
            name,
            mass,
            residue,
        },
    ))
}
