use serde::{Deserialize, Serialize};

use crate::DecoyRules;

/// A protein that a peptide was matched to
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Protein {
    accession: String,
    description: Option<String>,
    decoy: bool,
}

impl Protein {
    /// Create a protein with an already extracted accession
    pub fn new(accession: impl Into<String>, description: Option<String>, decoy: bool) -> Self {
        Self {
            accession: accession.into(),
            description: description.filter(|d| !d.is_empty()),
            decoy,
        }
    }

    /// Create a protein from a database header (`db|ACCESSION|description` or `ACCESSION description`).
    ///
    /// The protein is a decoy if the accession follows one of the decoy conventions or if the
    /// reader flagged it explicitly (for example because it was found in a separate decoy section).
    pub fn from_header(header: &str, rules: &DecoyRules, flagged_decoy: bool) -> Self {
        let (accession, description) = split_header(header);
        Self::new(
            accession,
            description.map(ToString::to_string),
            flagged_decoy || rules.is_decoy(accession),
        )
    }

    /// The accession
    pub fn accession(&self) -> &str {
        &self.accession
    }

    /// The free text description, if known
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// If this is a decoy protein
    pub const fn is_decoy(&self) -> bool {
        self.decoy
    }

    /// Mark this protein as decoy, returns true if this changed the status
    pub(crate) const fn flag_decoy(&mut self) -> bool {
        let changed = !self.decoy;
        self.decoy = true;
        changed
    }
}

/// Get the accession out of a protein header.
///
/// With pipes the text between the first and second pipe is taken (`sp|P12345|DESC_HUMAN` gives
/// `P12345`), otherwise the text up to the first whitespace.
pub fn extract_accession(header: &str) -> &str {
    split_header(header).0
}

/// Split a header in the accession and the description (if any)
fn split_header(header: &str) -> (&str, Option<&str>) {
    let header = header.trim();
    if let Some(first) = header.find('|') {
        let rest = &header[first + 1..];
        match rest.find('|') {
            Some(second) => {
                let description = rest[second + 1..].trim();
                (
                    rest[..second].trim(),
                    (!description.is_empty()).then_some(description),
                )
            }
            None => (rest.trim(), None),
        }
    } else if let Some((accession, description)) = header.split_once(char::is_whitespace) {
        let description = description.trim();
        (accession, (!description.is_empty()).then_some(description))
    } else {
        (header, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessions() {
        assert_eq!(extract_accession("sp|P12345|DESC_HUMAN"), "P12345");
        assert_eq!(extract_accession("P12345"), "P12345");
        assert_eq!(extract_accession("REV_P12345"), "REV_P12345");
        assert_eq!(extract_accession("gi|1234"), "1234");
        assert_eq!(extract_accession("P12345 Some protein"), "P12345");
        assert_eq!(
            split_header("sp|P12345|DESC_HUMAN Description of it"),
            ("P12345", Some("DESC_HUMAN Description of it"))
        );
    }

    #[test]
    fn decoys() {
        let rules = DecoyRules::default();
        assert!(Protein::from_header("REV_P12345", &rules, false).is_decoy());
        assert!(!Protein::from_header("P12345", &rules, false).is_decoy());
        assert!(!Protein::from_header("sp|P12345|DESC_HUMAN", &rules, false).is_decoy());
        assert!(Protein::from_header("sp|P12345_REVERSED|DESC", &rules, false).is_decoy());
        // Explicit flag is combined by OR with the heuristic
        assert!(Protein::from_header("P12345", &rules, true).is_decoy());
    }
}
