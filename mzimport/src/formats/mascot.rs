use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use regex::Regex;

use crate::{
    CandidateHit, Charge, ImportError, ImportParameters, MassDelta, ModificationMatch,
    ModificationResolver, ModificationSite, Peptide, Protein, QueryHits, ReaderOptions, Residue,
    SearchEngine, SpectrumKey, SpectrumRegistry, SpectrumSummary,
    helper_functions::{
        explain_number_error, file_name, foreign_file_name, parse_finite, percent_decode,
        read_to_string, split_outside_quotes,
    },
};

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^Content-Type:\s*application/x-Mascot;\s*name="?([^"\s]+)"?"#)
        .expect("Invalid section header regex")
});
static PROTEIN_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^"([^"]*)"(?::-?\d+)*$"#).expect("Invalid protein entry regex")
});

/// The only MIME version Mascot has ever written
const SUPPORTED_MIME_VERSION: &str = "1.0";

type Section = HashMap<String, String>;

/// A reader for Mascot result (`.dat`) files.
///
/// A dat file is a MIME multipart document with one `key=value` section per concern. All
/// sections are indexed when opening the file, the queries are converted one by one while
/// iterating. Spectrum peak lists are never kept.
pub struct MascotReader {
    path: PathBuf,
    file: String,
    spectrum_file: String,
    parameters: ImportParameters,
    registry: Option<Arc<dyn SpectrumRegistry>>,
    resolver: ModificationResolver,
    variable_modifications: HashMap<u32, (String, f64)>,
    fixed_modifications: Vec<(String, f64, Vec<Residue>)>,
    protein_descriptions: Section,
    summary: Section,
    peptides: Section,
    decoy_peptides: Option<Section>,
    sections: HashMap<String, Section>,
    number_of_queries: usize,
    next_query: usize,
}

impl std::fmt::Debug for MascotReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MascotReader")
            .field("path", &self.path)
            .field("spectrum_file", &self.spectrum_file)
            .field("number_of_queries", &self.number_of_queries)
            .field("next_query", &self.next_query)
            .finish_non_exhaustive()
    }
}

impl MascotReader {
    /// Open a Mascot dat file, gzipped files are decompressed automatically.
    /// # Errors
    /// If the file could not be read, is not a valid dat file, or is of an unsupported version.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = read_to_string(path)?;
        Self::parse(path, &text, options)
    }

    /// Read a Mascot dat file from any reader, the path is only used for error messages and
    /// as identification file name.
    /// # Errors
    /// If the data could not be read, is not a valid dat file, or is of an unsupported version.
    pub fn from_reader(
        reader: impl Read,
        path: impl AsRef<Path>,
        options: &ReaderOptions,
    ) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = super::read_source(reader, path)?;
        Self::parse(path, &text, options)
    }

    fn parse(path: &Path, text: &str, options: &ReaderOptions) -> Result<Self, ImportError> {
        let malformed = |message: &str| ImportError::malformed(path, None, message);

        let version = text
            .lines()
            .take_while(|line| !line.trim().is_empty())
            .find_map(|line| line.strip_prefix("MIME-Version:"))
            .map(|v| v.split_whitespace().next().unwrap_or_default().to_string())
            .ok_or_else(|| malformed("The MIME-Version header is missing, this is not a Mascot dat file"))?;
        if version != SUPPORTED_MIME_VERSION {
            return Err(ImportError::UnsupportedVersion {
                path: path.to_path_buf(),
                format: "Mascot MIME",
                version,
            });
        }
        let boundary = text
            .lines()
            .take_while(|line| !line.trim().is_empty())
            .find_map(|line| line.split_once("boundary="))
            .map(|(_, b)| b.trim().trim_matches('"').to_string())
            .filter(|b| !b.is_empty())
            .ok_or_else(|| malformed("The MIME boundary is not defined"))?;
        let mut sections = split_sections(text, &boundary).map_err(|m| malformed(&m))?;

        let parameters = sections
            .remove("parameters")
            .ok_or_else(|| malformed("The parameters section is missing"))?;
        let header = sections
            .remove("header")
            .ok_or_else(|| malformed("The header section is missing"))?;
        let summary = sections
            .remove("summary")
            .ok_or_else(|| malformed("The summary section is missing"))?;
        let masses = sections.remove("masses").unwrap_or_default();

        let number_of_queries = header
            .get("queries")
            .ok_or_else(|| malformed("The number of queries is missing from the header section"))?
            .trim()
            .parse::<usize>()
            .map_err(|err| {
                malformed(&format!(
                    "The number of queries {}",
                    explain_number_error(&err)
                ))
            })?;

        let (variable_modifications, fixed_modifications) =
            parse_masses(&masses).map_err(|m| malformed(&m))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: file_name(path),
            spectrum_file: parameters
                .get("FILE")
                .map(|f| foreign_file_name(f.trim()).to_string())
                .unwrap_or_default(),
            parameters: options.parameters.clone(),
            registry: options.registry.clone(),
            resolver: ModificationResolver::new(
                options.catalog.clone(),
                options.parameters.modification_tolerance,
            ),
            variable_modifications,
            fixed_modifications,
            protein_descriptions: sections.remove("proteins").unwrap_or_default(),
            summary,
            peptides: sections.remove("peptides").unwrap_or_default(),
            decoy_peptides: sections.remove("decoy_peptides"),
            sections,
            number_of_queries,
            next_query: 1,
        })
    }

    /// The name of the spectrum file that was searched
    pub fn spectrum_file(&self) -> &str {
        &self.spectrum_file
    }

    /// The number of queries in this file
    pub const fn number_of_queries(&self) -> usize {
        self.number_of_queries
    }

    fn read_query(&mut self, index: usize) -> Result<QueryHits, ImportError> {
        let query = self.sections.remove(&format!("query{index}"));
        let get = |key: &str| query.as_ref().and_then(|q| q.get(key));

        let charge_text = get("charge")
            .cloned()
            .or_else(|| {
                self.summary
                    .get(&format!("qexp{index}"))
                    .and_then(|e| e.split_once(',').map(|(_, c)| c.to_string()))
            })
            .ok_or_else(|| self.malformed(index, "The query charge is not defined"))?;
        // Mascot writes multiple charges as '2+ and 3+', the first is used
        let charge = charge_text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .parse::<Charge>()
            .map_err(|m| self.malformed(index, m))?;
        let title = get("title").map_or_else(|| format!("query {index}"), |t| percent_decode(t));
        let retention_time = get("rtinseconds")
            .and_then(|rt| rt.split(['-', ',']).next())
            .and_then(|rt| rt.trim().parse::<f64>().ok());
        let qmatch = self
            .summary
            .get(&format!("qmatch{index}"))
            .and_then(|q| q.trim().parse::<f64>().ok())
            .unwrap_or(1.0)
            .max(1.0);

        let spectrum = SpectrumKey::new(self.spectrum_file.clone(), title);
        let mut flagged_decoy = false;
        if let Some(registry) = &self.registry {
            flagged_decoy = registry.is_flagged_decoy(&spectrum);
            registry.insert_if_absent(
                spectrum.clone(),
                SpectrumSummary {
                    query: index,
                    precursor_mass: self
                        .summary
                        .get(&format!("qmass{index}"))
                        .and_then(|m| m.trim().parse::<f64>().ok()),
                    retention_time,
                    decoy: false,
                },
            );
        }

        let target = self.read_hits(index, charge, qmatch, false)?;
        let decoy = if self.decoy_peptides.is_some() {
            Some(self.read_hits(index, charge, qmatch, true)?)
        } else {
            None
        };

        Ok(QueryHits {
            index,
            spectrum,
            engine: SearchEngine::Mascot,
            file: self.file.clone(),
            retention_time,
            target,
            decoy,
            flagged_decoy,
        })
    }

    fn read_hits(
        &mut self,
        index: usize,
        charge: Charge,
        qmatch: f64,
        decoy_section: bool,
    ) -> Result<Vec<CandidateHit>, ImportError> {
        let mut hits = Vec::new();
        for rank in 1.. {
            let section = if decoy_section {
                self.decoy_peptides.as_ref()
            } else {
                Some(&self.peptides)
            };
            let Some(line) = section.and_then(|s| s.get(&format!("q{index}_p{rank}"))).cloned()
            else {
                break;
            };
            if line.trim() == "-1" {
                break;
            }
            hits.push(self.parse_hit(index, &line, charge, qmatch, decoy_section)?);
        }
        Ok(hits)
    }

    fn parse_hit(
        &mut self,
        index: usize,
        line: &str,
        charge: Charge,
        qmatch: f64,
        decoy_section: bool,
    ) -> Result<CandidateHit, ImportError> {
        let (hit, proteins) = line
            .split_once(';')
            .ok_or_else(|| self.malformed(index, "The peptide line has no protein list"))?;
        let fields: Vec<&str> = hit.split(',').collect();
        if fields.len() < 8 {
            return Err(self.malformed(
                index,
                format!(
                    "The peptide line has {} fields while at least 8 are required",
                    fields.len()
                ),
            ));
        }
        let number = |i: usize, name: &str| {
            parse_finite(fields[i]).ok_or_else(|| {
                self.malformed(
                    index,
                    format!("The peptide {name} '{}' is not a finite number", fields[i]),
                )
            })
        };
        let theoretical = number(1, "mass")?;
        let delta = number(2, "delta mass")?;
        let ions_score = number(7, "ions score")?;
        let sequence = fields[4].trim();
        let modifications = self.parse_modifications(index, sequence, fields[6].trim())?;

        let mut parsed_proteins = Vec::new();
        for range in split_outside_quotes(proteins, b',') {
            let entry = proteins[range].trim();
            if entry.is_empty() {
                continue;
            }
            let accession = PROTEIN_ENTRY
                .captures(entry)
                .and_then(|c| c.get(1))
                .ok_or_else(|| {
                    self.malformed(index, format!("Invalid protein entry '{entry}'"))
                })?
                .as_str();
            let protein = Protein::from_header(accession, &self.parameters.decoy, decoy_section);
            let description = self
                .protein_descriptions
                .get(&format!("\"{accession}\""))
                .and_then(|d| d.split_once(','))
                .map(|(_, d)| d.trim().trim_matches('"').to_string());
            parsed_proteins.push(match description {
                Some(description) if protein.description().is_none() => Protein::new(
                    protein.accession(),
                    Some(description),
                    protein.is_decoy(),
                ),
                _ => protein,
            });
        }

        let measured_mass = theoretical + delta;
        Ok(CandidateHit {
            peptide: Peptide::new(sequence, theoretical, parsed_proteins, modifications)
                .map_err(|m| self.malformed(index, m))?,
            expectation: qmatch * 10.0_f64.powf(-ions_score / 10.0),
            score: Some(ions_score),
            charge,
            measured_mass,
            delta: MassDelta::with_isotope_correction(
                measured_mass,
                theoretical,
                self.parameters.isotope_threshold,
            ),
        })
    }

    /// Mascot writes the variable modifications as one digit per position, where position 0 is
    /// the N-terminus, 1..=len the residues, and len+1 the C-terminus. Fixed modifications are
    /// placed on every matching residue.
    fn parse_modifications(
        &mut self,
        index: usize,
        sequence: &str,
        positions: &str,
    ) -> Result<Vec<ModificationMatch>, ImportError> {
        let residues: Vec<char> = sequence.chars().collect();
        let length = residues.len();
        let mut found = Vec::new();

        if !positions.is_empty() {
            if positions.chars().count() != length + 2 {
                return Err(self.malformed(
                    index,
                    format!(
                        "The modification string '{positions}' does not fit the peptide '{sequence}'"
                    ),
                ));
            }
            for (position, c) in positions.chars().enumerate() {
                let id = c.to_digit(36).ok_or_else(|| {
                    self.malformed(index, format!("Invalid modification position '{c}'"))
                })?;
                if id == 0 {
                    continue;
                }
                let (name, mass) = self.variable_modifications.get(&id).cloned().ok_or_else(|| {
                    self.malformed(
                        index,
                        format!("The variable modification {id} is not defined in the masses section"),
                    )
                })?;
                let (site, residue) = match position {
                    0 => (ModificationSite::NTerm, Residue::NTerm),
                    p if p == length + 1 => (ModificationSite::CTerm, Residue::CTerm),
                    p => (ModificationSite::Index(p - 1), Residue::AminoAcid(residues[p - 1])),
                };
                found.push(ModificationMatch::new(
                    self.resolver.resolve(Some(&name), mass, residue),
                    true,
                    site,
                ));
            }
        }

        for (name, mass, targets) in &self.fixed_modifications {
            for target in targets {
                match target {
                    Residue::NTerm => found.push(ModificationMatch::new(
                        self.resolver.resolve(Some(name), *mass, *target),
                        false,
                        ModificationSite::NTerm,
                    )),
                    Residue::CTerm => found.push(ModificationMatch::new(
                        self.resolver.resolve(Some(name), *mass, *target),
                        false,
                        ModificationSite::CTerm,
                    )),
                    Residue::AminoAcid(aa) => {
                        for (i, _) in residues.iter().enumerate().filter(|(_, r)| *r == aa) {
                            found.push(ModificationMatch::new(
                                self.resolver.resolve(Some(name), *mass, *target),
                                false,
                                ModificationSite::Index(i),
                            ));
                        }
                    }
                }
            }
        }
        Ok(found)
    }

    fn malformed(&self, index: usize, message: impl Into<String>) -> ImportError {
        ImportError::malformed(&self.path, Some(index), message)
    }
}

impl Iterator for MascotReader {
    type Item = Result<QueryHits, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_query > self.number_of_queries {
            return None;
        }
        let index = self.next_query;
        let result = self.read_query(index);
        // Stop after the first error, the file is not usable
        self.next_query = if result.is_ok() {
            index + 1
        } else {
            usize::MAX
        };
        Some(result)
    }
}

/// Split the MIME document in its named sections of `key=value` lines
fn split_sections(text: &str, boundary: &str) -> Result<HashMap<String, Section>, String> {
    let start = format!("--{boundary}");
    let mut sections = HashMap::new();
    let mut current: Option<(String, Section)> = None;
    let mut expect_header = false;

    for (line_index, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(&start) {
            if let Some((name, section)) = current.take() {
                sections.insert(name, section);
            }
            if line[start.len()..].starts_with("--") {
                break;
            }
            expect_header = true;
        } else if expect_header {
            if line.trim().is_empty() {
                continue;
            }
            let name = SECTION_HEADER
                .captures(line)
                .and_then(|c| c.get(1))
                .ok_or_else(|| {
                    format!(
                        "Line {} should be a section header but is '{line}'",
                        line_index + 1
                    )
                })?;
            current = Some((name.as_str().to_string(), Section::new()));
            expect_header = false;
        } else if let Some((_, section)) = &mut current
            && let Some((key, value)) = line.split_once('=')
        {
            section.insert(key.trim().to_string(), value.to_string());
        }
    }
    if let Some((name, section)) = current {
        sections.insert(name, section);
    }
    if sections.is_empty() {
        Err("No MIME sections found".to_string())
    } else {
        Ok(sections)
    }
}

type ModificationTables = (HashMap<u32, (String, f64)>, Vec<(String, f64, Vec<Residue>)>);

/// Get the variable (`deltaN=mass,name`) and fixed (`FixedModN=mass,name` with
/// `FixedModResiduesN=residues`) modifications from the masses section
fn parse_masses(masses: &Section) -> Result<ModificationTables, String> {
    let mass_and_name = |key: &str, value: &str| {
        let (mass, name) = value
            .split_once(',')
            .ok_or_else(|| format!("The modification '{key}' should be 'mass,name'"))?;
        let mass = mass
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("The modification '{key}' has an invalid mass '{mass}'"))?;
        Ok::<_, String>((name.trim().to_string(), mass))
    };

    let mut variable = HashMap::new();
    let mut fixed = Vec::new();
    for (key, value) in masses {
        if let Some(id) = key
            .strip_prefix("delta")
            .and_then(|id| id.parse::<u32>().ok())
        {
            variable.insert(id, mass_and_name(key, value)?);
        } else if let Some(id) = key
            .strip_prefix("FixedMod")
            .and_then(|id| id.parse::<u32>().ok())
        {
            let (name, mass) = mass_and_name(key, value)?;
            let residues = masses
                .get(&format!("FixedModResidues{id}"))
                .ok_or_else(|| format!("The residues for fixed modification {id} are missing"))?;
            let residues = match Residue::parse(residues) {
                Some(terminal @ (Residue::NTerm | Residue::CTerm)) => vec![terminal],
                _ => residues
                    .trim()
                    .chars()
                    .filter(char::is_ascii_alphabetic)
                    .map(|c| Residue::AminoAcid(c.to_ascii_uppercase()))
                    .collect(),
            };
            fixed.push((id, name, mass, residues));
        }
    }
    fixed.sort_by_key(|(id, ..)| *id);
    Ok((
        variable,
        fixed
            .into_iter()
            .map(|(_, name, mass, residues)| (name, mass, residues))
            .collect(),
    ))
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    const HEADER: &str = "MIME-Version: 1.0 (Generated by Mascot version 1.0)\nContent-Type: multipart/mixed; boundary=gc0p4Jq0M2Yt08jU534c0p\n\n";

    fn dat(peptides: &str, decoy_peptides: Option<&str>) -> String {
        let mut text = format!(
            "{HEADER}--gc0p4Jq0M2Yt08jU534c0p
Content-Type: application/x-Mascot; name=\"parameters\"

FILE=C:\\data\\run01.mgf
DECOY=1
--gc0p4Jq0M2Yt08jU534c0p
Content-Type: application/x-Mascot; name=\"masses\"

delta1=15.994915,Oxidation (M)
delta2=79.966331,Phospho (ST)
FixedMod1=57.021464,Carbamidomethyl (C)
FixedModResidues1=C
--gc0p4Jq0M2Yt08jU534c0p
Content-Type: application/x-Mascot; name=\"header\"

queries=1
--gc0p4Jq0M2Yt08jU534c0p
Content-Type: application/x-Mascot; name=\"summary\"

qexp1=501.2500,2+
qmass1=1000.4854
qmatch1=10
--gc0p4Jq0M2Yt08jU534c0p
Content-Type: application/x-Mascot; name=\"peptides\"

{peptides}
"
        );
        if let Some(decoy) = decoy_peptides {
            text.push_str(&format!(
                "--gc0p4Jq0M2Yt08jU534c0p
Content-Type: application/x-Mascot; name=\"decoy_peptides\"

{decoy}
"
            ));
        }
        text.push_str(
            "--gc0p4Jq0M2Yt08jU534c0p
Content-Type: application/x-Mascot; name=\"query1\"

title=Spectrum%201%20scan%3d12
charge=2+
rtinseconds=1200.5
--gc0p4Jq0M2Yt08jU534c0p--
",
        );
        text
    }

    fn read(text: &str) -> Result<Vec<QueryHits>, ImportError> {
        MascotReader::from_reader(text.as_bytes(), "F001.dat", &ReaderOptions::default())?
            .collect()
    }

    #[test]
    fn single_hit() {
        let hits = read(&dat(
            "q1_p1=0,1000.4854,0.0010,5,PEMSCK,10,00010000,40.00,0000000000000,0,0;\"sp|P12345|TEST_HUMAN\":0:1:6:1",
            None,
        ))
        .unwrap();
        assert_eq!(hits.len(), 1);
        let query = &hits[0];
        assert_eq!(query.spectrum, SpectrumKey::new("run01.mgf", "Spectrum 1 scan=12"));
        assert_eq!(query.target[0].charge.value(), 2);
        assert_eq!(query.retention_time, Some(1200.5));
        assert_eq!(query.file, "F001.dat");
        assert!(query.decoy.is_none());
        let hit = &query.target[0];
        assert_eq!(hit.peptide.sequence(), "PEMSCK");
        assert_eq!(hit.peptide.proteins()[0].accession(), "P12345");
        assert!(!hit.peptide.is_decoy());
        assert_eq!(hit.score, Some(40.0));
        assert!((hit.expectation - 10.0 * 1e-4).abs() < 1e-12);
        assert!(!hit.delta.isotope);
        // Oxidation on M (array index 3 = residue index 2) and the fixed carbamidomethyl on C
        let modifications = hit.peptide.modifications();
        assert_eq!(modifications.len(), 2);
        assert_eq!(modifications[0].modification.name(), "Oxidation");
        assert_eq!(modifications[0].site, ModificationSite::Index(2));
        assert!(modifications[0].variable);
        assert_eq!(modifications[1].modification.name(), "Carbamidomethyl");
        assert_eq!(modifications[1].site, ModificationSite::Index(4));
        assert!(!modifications[1].variable);
    }

    #[test]
    fn terminal_and_isotope() {
        let hits = read(&dat(
            "q1_p1=0,1000.0000,1.0006,5,PEPTK,10,1000000,40.00,0000000000000,0,0;\"P1\":0:1:5:1",
            None,
        ))
        .unwrap();
        let hit = &hits[0].target[0];
        assert_eq!(hit.peptide.modifications()[0].site, ModificationSite::NTerm);
        assert!(hit.delta.isotope);
        assert!((hit.delta.ppm - 0.6).abs() < 1e-6);
        assert!((hit.measured_mass - 1001.0006).abs() < 1e-9);
    }

    #[test]
    fn decoy_section() {
        let hits = read(&dat(
            "q1_p1=0,1000.0,0.001,5,PEPTK,10,0000000,40.00,0000000000000,0,0;\"P1\":0:1:5:1\nq1_p2=0,1000.0,0.001,5,PEPSK,10,0000000,30.00,0000000000000,0,0;\"P2\":0:1:5:1",
            Some("q1_p1=0,1000.0,0.001,5,KTPEP,10,0000000,35.00,0000000000000,0,0;\"P1\":0:1:5:1"),
        ))
        .unwrap();
        let query = &hits[0];
        assert_eq!(query.target.len(), 2);
        let decoy = query.decoy.as_ref().unwrap();
        assert_eq!(decoy.len(), 1);
        // The decoy section flags the protein even though the accession is not a decoy accession
        assert!(decoy[0].peptide.is_decoy());
    }

    #[test]
    fn no_hits() {
        let hits = read(&dat("q1_p1=-1", None)).unwrap();
        assert!(hits[0].target.is_empty());
    }

    #[test]
    fn errors() {
        assert!(matches!(
            read("MIME-Version: 2.0\nContent-Type: multipart/mixed; boundary=x\n\n"),
            Err(ImportError::UnsupportedVersion { .. })
        ));
        assert!(matches!(
            read("Just some text\n"),
            Err(ImportError::MalformedFile { record: None, .. })
        ));
        // Undefined variable modification 3
        let result = read(&dat(
            "q1_p1=0,1000.0,0.001,5,PEPTK,10,0030000,40.00,0000000000000,0,0;\"P1\":0:1:5:1",
            None,
        ));
        assert!(matches!(
            result,
            Err(ImportError::MalformedFile {
                record: Some(1),
                ..
            })
        ));
        // Modification string length does not fit the sequence
        let result = read(&dat(
            "q1_p1=0,1000.0,0.001,5,PEPTK,10,000,40.00,0000000000000,0,0;\"P1\":0:1:5:1",
            None,
        ));
        assert!(result.is_err());
        // A NaN ions score would otherwise give a NaN expectation
        let result = read(&dat(
            "q1_p1=0,1000.0,0.001,5,PEPTK,10,0000000,NaN,0000000000000,0,0;\"P1\":0:1:5:1",
            None,
        ));
        assert!(matches!(
            result,
            Err(ImportError::MalformedFile {
                record: Some(1),
                ..
            })
        ));
    }
}
