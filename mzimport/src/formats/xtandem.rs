use std::{
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use roxmltree::Node;

use super::{child, children, parse_xml, read_source};
use crate::{
    CandidateHit, Charge, ImportError, ImportParameters, MassDelta, ModificationMatch,
    ModificationResolver, ModificationSite, Peptide, Protein, QueryHits, ReaderOptions, Residue,
    SearchEngine, SpectrumKey, SpectrumRegistry, SpectrumSummary,
    helper_functions::{file_name, foreign_file_name, parse_finite, read_to_string},
    parse_mass_at_residue,
};

/// X!Tandem reports singly protonated (MH+) masses
const PROTON: f64 = 1.007_276_466_77;

#[derive(Clone, Debug)]
struct RawGroup {
    id: Option<String>,
    charge: Option<String>,
    retention_time: Option<String>,
    title: Option<String>,
    domains: Vec<RawDomain>,
}

#[derive(Clone, Debug)]
struct RawDomain {
    protein: String,
    sequence: Option<String>,
    expect: Option<String>,
    mh: Option<String>,
    delta: Option<String>,
    start: Option<usize>,
    end: Option<usize>,
    modifications: Vec<RawModification>,
}

#[derive(Clone, Debug)]
struct RawModification {
    residue: Option<String>,
    mass: Option<String>,
    at: Option<usize>,
}

/// A reader for X!Tandem XML result files.
///
/// Every `group` of type `model` is a query, all domains in all proteins of the group are the
/// candidates. Each domain is reported as its own candidate with the protein it was found in,
/// domains with the same sequence are merged when the winner is chosen.
pub struct XTandemReader {
    path: PathBuf,
    file: String,
    spectrum_file: String,
    parameters: ImportParameters,
    registry: Option<Arc<dyn SpectrumRegistry>>,
    resolver: ModificationResolver,
    fixed: Vec<(f64, Residue)>,
    groups: std::iter::Enumerate<std::vec::IntoIter<RawGroup>>,
    done: bool,
}

impl std::fmt::Debug for XTandemReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XTandemReader")
            .field("path", &self.path)
            .field("spectrum_file", &self.spectrum_file)
            .field("fixed", &self.fixed)
            .finish_non_exhaustive()
    }
}

impl XTandemReader {
    /// Open an X!Tandem xml file, gzipped files are decompressed automatically.
    /// # Errors
    /// If the file could not be read or is not a valid X!Tandem file.
    pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = read_to_string(path)?;
        Self::parse(path, &text, options)
    }

    /// Read an X!Tandem xml file from any reader, the path is only used for error messages and
    /// as identification file name.
    /// # Errors
    /// If the data could not be read or is not a valid X!Tandem file.
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
        let document = parse_xml(path, text, "bioml")?;
        let root = document.root_element();

        let input = children(root, "group")
            .find(|g| {
                g.attribute("type") == Some("parameters")
                    && g.attribute("label") == Some("input parameters")
            });
        let note = |label: &str| {
            input
                .and_then(|g| children(g, "note").find(|n| n.attribute("label") == Some(label)))
                .and_then(|n| n.text())
                .map(str::trim)
                .filter(|t| !t.is_empty())
        };

        let mut fixed = Vec::new();
        if let Some(list) = note("residue, modification mass") {
            for definition in list.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                fixed.push(parse_mass_at_residue(definition).ok_or_else(|| {
                    ImportError::malformed(
                        path,
                        None,
                        format!("Invalid fixed modification '{definition}'"),
                    )
                })?);
            }
        }
        let spectrum_file = note("spectrum, path")
            .map_or_else(|| file_name(path), |f| foreign_file_name(f).to_string());

        let groups: Vec<RawGroup> = children(root, "group")
            .filter(|g| g.attribute("type") == Some("model"))
            .map(raw_group)
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            file: file_name(path),
            spectrum_file,
            parameters: options.parameters.clone(),
            registry: options.registry.clone(),
            resolver: ModificationResolver::new(
                options.catalog.clone(),
                options.parameters.modification_tolerance,
            ),
            fixed,
            groups: groups.into_iter().enumerate(),
            done: false,
        })
    }

    /// The name of the spectrum file that was searched
    pub fn spectrum_file(&self) -> &str {
        &self.spectrum_file
    }

    fn read_group(&mut self, position: usize, group: RawGroup) -> Result<QueryHits, ImportError> {
        let index = group
            .id
            .as_deref()
            .and_then(|id| id.trim().parse::<usize>().ok())
            .unwrap_or(position);
        let title = group
            .title
            .or(group.id)
            .ok_or_else(|| self.malformed(index, "The group has no spectrum description or id"))?;
        let charge = group
            .charge
            .ok_or_else(|| self.malformed(index, "The group has no charge"))?
            .parse::<Charge>()
            .map_err(|m| self.malformed(index, m))?;
        let retention_time = group.retention_time.as_deref().and_then(parse_retention_time);
        let spectrum = SpectrumKey::new(self.spectrum_file.clone(), title);

        let mut target = Vec::with_capacity(group.domains.len());
        for domain in group.domains {
            target.push(self.read_domain(index, charge, domain)?);
        }

        let mut flagged_decoy = false;
        if let Some(registry) = &self.registry {
            flagged_decoy = registry.is_flagged_decoy(&spectrum);
            registry.insert_if_absent(
                spectrum.clone(),
                SpectrumSummary {
                    query: index,
                    precursor_mass: target.first().map(|h| h.measured_mass),
                    retention_time,
                    decoy: false,
                },
            );
        }

        Ok(QueryHits {
            index,
            spectrum,
            engine: SearchEngine::XTandem,
            file: self.file.clone(),
            retention_time,
            target,
            decoy: None,
            flagged_decoy,
        })
    }

    fn read_domain(
        &mut self,
        index: usize,
        charge: Charge,
        domain: RawDomain,
    ) -> Result<CandidateHit, ImportError> {
        let number = |value: Option<String>, name: &str| {
            let value =
                value.ok_or_else(|| self.malformed(index, format!("The domain has no {name}")))?;
            parse_finite(&value).ok_or_else(|| {
                self.malformed(
                    index,
                    format!("The domain {name} '{value}' is not a finite number"),
                )
            })
        };
        let expectation = number(domain.expect, "expect")?;
        let mh = number(domain.mh, "mh")?;
        let delta = number(domain.delta, "delta")?;
        let sequence = domain
            .sequence
            .ok_or_else(|| self.malformed(index, "The domain has no sequence"))?;

        let mut modifications = Vec::with_capacity(domain.modifications.len());
        for modification in domain.modifications {
            let residue = modification
                .residue
                .as_deref()
                .and_then(Residue::parse)
                .ok_or_else(|| self.malformed(index, "A modified residue has an invalid type"))?;
            let mass = modification
                .mass
                .as_deref()
                .and_then(parse_finite)
                .ok_or_else(|| self.malformed(index, "A modified residue has an invalid mass"))?;
            let tolerance = self.parameters.modification_tolerance;
            // Terminal fixed modifications are reported on the first or last residue
            let at_start = modification.at.is_some() && modification.at == domain.start;
            let at_end = modification.at.is_some() && modification.at == domain.end;
            let fixed = self.fixed.iter().any(|(fixed_mass, fixed_residue)| {
                (fixed_mass - mass).abs() <= tolerance
                    && match fixed_residue {
                        Residue::NTerm => at_start,
                        Residue::CTerm => at_end,
                        other => *other == residue,
                    }
            });
            modifications.push(ModificationMatch::new(
                self.resolver.resolve_mass(mass, residue),
                !fixed,
                ModificationSite::Unresolved,
            ));
        }

        let theoretical = mh - PROTON;
        let measured = theoretical + delta;
        let protein = Protein::from_header(&domain.protein, &self.parameters.decoy, false);
        Ok(CandidateHit {
            peptide: Peptide::new(sequence, theoretical, [protein], modifications)
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

impl Iterator for XTandemReader {
    type Item = Result<QueryHits, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let (position, group) = self.groups.next()?;
        let result = self.read_group(position + 1, group);
        self.done = result.is_err();
        Some(result)
    }
}

fn raw_group(group: Node<'_, '_>) -> RawGroup {
    let title = children(group, "group")
        .filter(|g| g.attribute("type") == Some("support"))
        .flat_map(|g| children(g, "note"))
        .find(|n| n.attribute("label") == Some("Description"))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .or_else(|| group.attribute("label").map(|l| l.trim().to_string()));
    let mut domains = Vec::new();
    for protein in children(group, "protein") {
        let header = child(protein, "note")
            .filter(|n| n.attribute("label") == Some("description"))
            .and_then(|n| n.text())
            .or_else(|| protein.attribute("label"))
            .unwrap_or_default()
            .trim()
            .to_string();
        for domain in protein.descendants().filter(|n| n.has_tag_name("domain")) {
            domains.push(RawDomain {
                protein: header.clone(),
                sequence: domain.attribute("seq").map(ToString::to_string),
                expect: domain.attribute("expect").map(ToString::to_string),
                mh: domain.attribute("mh").map(ToString::to_string),
                delta: domain.attribute("delta").map(ToString::to_string),
                start: position(domain, "start"),
                end: position(domain, "end"),
                modifications: children(domain, "aa")
                    .map(|aa| RawModification {
                        residue: aa.attribute("type").map(ToString::to_string),
                        mass: aa.attribute("modified").map(ToString::to_string),
                        at: position(aa, "at"),
                    })
                    .collect(),
            });
        }
    }
    RawGroup {
        id: group.attribute("id").map(ToString::to_string),
        charge: group.attribute("z").map(ToString::to_string),
        retention_time: group.attribute("rt").map(ToString::to_string),
        title,
        domains,
    }
}

fn position(node: Node<'_, '_>, attribute: &str) -> Option<usize> {
    node.attribute(attribute)
        .and_then(|p| p.trim().parse::<usize>().ok())
}

/// X!Tandem writes the retention time in seconds, either plain or as `PT12.5S`
fn parse_retention_time(text: &str) -> Option<f64> {
    let text = text.trim();
    text.strip_prefix("PT")
        .and_then(|t| t.strip_suffix('S'))
        .unwrap_or(text)
        .parse::<f64>()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0"?>
<bioml xmlns:GAML="http://www.bioml.com/gaml/" label="models from 'run03.mgf'">
  <group id="7" mh="1000.5" z="2" rt="PT600.5S" expect="1.0e-05" label="scan=7" type="model">
    <protein expect="-50.0" id="7.1" uid="1" label="sp|P12345|TEST_HUMAN">
      <note label="description">sp|P12345|TEST_HUMAN Test protein</note>
      <peptide start="1" end="100">
        <domain id="7.1.1" start="10" end="15" expect="1.0e-05" mh="1000.5" delta="0.001" seq="PEMSCK">
          <aa type="M" at="12" modified="15.99491" />
          <aa type="C" at="14" modified="57.02146" />
        </domain>
      </peptide>
    </protein>
    <protein expect="-50.0" id="7.2" uid="2" label="REV_P99999">
      <note label="description">REV_P99999</note>
      <peptide start="1" end="100">
        <domain id="7.2.1" start="20" end="25" expect="1.0e-05" mh="1000.5" delta="0.001" seq="PEMSCK">
          <aa type="M" at="22" modified="15.99491" />
          <aa type="C" at="24" modified="57.02146" />
        </domain>
      </peptide>
    </protein>
    <group label="fragment ion mass spectrum" type="support">
      <note label="Description">Spectrum 7 scan=7</note>
    </group>
  </group>
  <group id="9" mh="800.4" z="3" expect="0.1" label="scan=9" type="model">
    <protein expect="-1.0" id="9.1" uid="3" label="REV_P11111">
      <peptide start="1" end="50">
        <domain id="9.1.1" start="1" end="6" expect="0.1" mh="800.4" delta="1.003" seq="KTPEPR" />
      </peptide>
    </protein>
  </group>
  <group label="input parameters" type="parameters">
    <note type="input" label="spectrum, path">C:\data\run03.mgf</note>
    <note type="input" label="residue, modification mass">57.021464@C</note>
    <note type="input" label="residue, potential modification mass">15.994915@M</note>
  </group>
</bioml>"#;

    fn read(text: &str) -> Result<Vec<QueryHits>, ImportError> {
        XTandemReader::from_reader(text.as_bytes(), "run03.t.xml", &ReaderOptions::default())?
            .collect()
    }

    #[test]
    fn groups() {
        let queries = read(XML).unwrap();
        assert_eq!(queries.len(), 2);
        let first = &queries[0];
        assert_eq!(first.index, 7);
        assert_eq!(first.spectrum, SpectrumKey::new("run03.mgf", "Spectrum 7 scan=7"));
        assert_eq!(first.retention_time, Some(600.5));
        assert_eq!(first.target.len(), 2);
        let hit = &first.target[0];
        assert_eq!(hit.charge.value(), 2);
        // Neutral masses, X!Tandem writes MH+
        assert!((hit.measured_mass - (1000.501 - PROTON)).abs() < 1e-9);
        assert!((hit.peptide.mass() - (1000.5 - PROTON)).abs() < 1e-9);
        assert!((hit.delta.ppm - 1e3 / (1000.5 - PROTON)).abs() < 1e-6);
        assert_eq!(hit.peptide.proteins()[0].accession(), "P12345");
        assert!(!hit.peptide.is_decoy());
        assert!(first.target[1].peptide.is_decoy());

        let modifications = hit.peptide.modifications();
        assert_eq!(modifications[0].modification.name(), "Oxidation");
        assert!(modifications[0].variable);
        assert_eq!(modifications[1].modification.name(), "Carbamidomethyl");
        assert!(!modifications[1].variable);
        assert_eq!(modifications[1].site, ModificationSite::Unresolved);

        // Without a support group the group label is the title
        assert_eq!(queries[1].spectrum.title, "scan=9");
        assert_eq!(queries[1].retention_time, None);
        assert!(queries[1].target[0].peptide.is_decoy());
    }

    #[test]
    fn terminal_fixed_modifications() {
        let text = XML
            .replace("57.021464@C</note>", "57.021464@C, 42.010565@[</note>")
            .replace(
                r#"<aa type="M" at="12" modified="15.99491" />"#,
                r#"<aa type="P" at="10" modified="42.01057" /><aa type="K" at="13" modified="42.01057" />"#,
            );
        let queries = read(&text).unwrap();
        let modifications = queries[0].target[0].peptide.modifications();
        assert_eq!(modifications.len(), 3);
        // On the first residue of the domain the N-terminal fixed modification applies
        assert!(!modifications[0].variable);
        // An internal residue with the same mass is a variable modification
        assert!(modifications[1].variable);
        assert!(!modifications[2].variable);
    }

    #[test]
    fn non_finite_numbers() {
        let result = read(&XML.replace(
            r#"expect="1.0e-05" mh="1000.5""#,
            r#"expect="NaN" mh="1000.5""#,
        ));
        assert!(matches!(
            result,
            Err(ImportError::MalformedFile {
                record: Some(7),
                ..
            })
        ));
        assert!(read(&XML.replace(r#"delta="1.003""#, r#"delta="inf""#)).is_err());
    }

    #[test]
    fn retention_times() {
        assert_eq!(parse_retention_time("PT12.5S"), Some(12.5));
        assert_eq!(parse_retention_time("12.5"), Some(12.5));
        assert_eq!(parse_retention_time("twelve"), None);
    }

    #[test]
    fn malformed() {
        let result = read(&XML.replace("z=\"2\"", "z=\"0\""));
        assert!(matches!(
            result,
            Err(ImportError::MalformedFile {
                record: Some(7),
                ..
            })
        ));
        assert!(matches!(
            read("<MSSearch/>"),
            Err(ImportError::MalformedFile { record: None, .. })
        ));
    }
}
