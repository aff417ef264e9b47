use serde::{Deserialize, Serialize};
use thin_vec::ThinVec;

use crate::{ModificationMatch, Protein};

/// A peptide with its modifications and the proteins it could originate from
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "PeptideData")]
pub struct Peptide {
    sequence: String,
    mass: f64,
    proteins: Vec<Protein>,
    modifications: ThinVec<ModificationMatch>,
}

#[derive(Deserialize)]
struct PeptideData {
    sequence: String,
    mass: f64,
    proteins: Vec<Protein>,
    modifications: ThinVec<ModificationMatch>,
}

impl TryFrom<PeptideData> for Peptide {
    type Error = String;

    fn try_from(value: PeptideData) -> Result<Self, Self::Error> {
        Self::new(
            value.sequence,
            value.mass,
            value.proteins,
            value.modifications,
        )
    }
}

impl Peptide {
    /// Create a new peptide.
    /// # Errors
    /// If the sequence is empty, contains anything but amino acid letters, or if any modification
    /// site lies outside the sequence.
    pub fn new(
        sequence: impl Into<String>,
        mass: f64,
        proteins: impl IntoIterator<Item = Protein>,
        modifications: impl IntoIterator<Item = ModificationMatch>,
    ) -> Result<Self, String> {
        let sequence = sequence.into();
        if sequence.is_empty() {
            return Err("The peptide sequence is empty".to_string());
        }
        if let Some(c) = sequence.chars().find(|c| !c.is_ascii_uppercase()) {
            return Err(format!(
                "The peptide sequence '{sequence}' contains the invalid amino acid '{c}'"
            ));
        }
        let modifications: ThinVec<ModificationMatch> = modifications.into_iter().collect();
        if let Some(m) = modifications
            .iter()
            .find(|m| !m.site.is_valid_for(sequence.len()))
        {
            return Err(format!(
                "The modification '{}' is placed at {:?} outside of peptide '{sequence}'",
                m.modification.name(),
                m.site
            ));
        }
        let mut peptide = Self {
            sequence,
            mass,
            proteins: Vec::new(),
            modifications,
        };
        peptide.add_proteins(proteins);
        Ok(peptide)
    }

    /// The amino acid sequence
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// The theoretical neutral mass
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// The proteins this peptide can originate from, unique by accession
    pub fn proteins(&self) -> &[Protein] {
        &self.proteins
    }

    /// The modifications
    pub fn modifications(&self) -> &[ModificationMatch] {
        &self.modifications
    }

    /// Add proteins, any protein with an accession that is already present is skipped
    pub fn add_proteins(&mut self, proteins: impl IntoIterator<Item = Protein>) {
        for protein in proteins {
            if !self
                .proteins
                .iter()
                .any(|p| p.accession() == protein.accession())
            {
                self.proteins.push(protein);
            }
        }
    }

    /// Flag all proteins as decoy, returns the number of proteins that changed status
    pub(crate) fn flag_decoy(&mut self) -> usize {
        self.proteins
            .iter_mut()
            .map(Protein::flag_decoy)
            .filter(|changed| *changed)
            .count()
    }

    /// A peptide is decoy only if it has proteins and all of them are decoy
    pub fn is_decoy(&self) -> bool {
        !self.proteins.is_empty() && self.proteins.iter().all(Protein::is_decoy)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{ModificationDefinition, ModificationSite, Residue};

    fn protein(accession: &str, decoy: bool) -> Protein {
        Protein::new(accession, None, decoy)
    }

    #[test]
    fn validation() {
        assert!(Peptide::new("", 0.0, [], []).is_err());
        assert!(Peptide::new("PEPtIDE", 0.0, [], []).is_err());
        let oxidation = Arc::new(ModificationDefinition::curated(
            "Oxidation",
            15.994915,
            [Residue::AminoAcid('M')],
        ));
        assert!(
            Peptide::new(
                "PEPMK",
                0.0,
                [],
                [ModificationMatch::new(
                    oxidation.clone(),
                    true,
                    ModificationSite::Index(5)
                )]
            )
            .is_err()
        );
        assert!(
            Peptide::new(
                "PEPMK",
                0.0,
                [],
                [ModificationMatch::new(
                    oxidation,
                    true,
                    ModificationSite::Index(3)
                )]
            )
            .is_ok()
        );
    }

    #[test]
    fn unique_proteins() {
        let mut peptide = Peptide::new(
            "PEPTIDEK",
            927.45,
            [protein("P1", false), protein("P2", false), protein("P1", false)],
            [],
        )
        .unwrap();
        assert_eq!(peptide.proteins().len(), 2);
        peptide.add_proteins([protein("P2", true), protein("P3", false)]);
        assert_eq!(
            peptide
                .proteins()
                .iter()
                .map(Protein::accession)
                .collect::<Vec<_>>(),
            vec!["P1", "P2", "P3"]
        );
    }

    #[test]
    fn deserialize_validates() {
        let peptide = Peptide::new("PEPTIDEK", 927.45, [protein("P1", false)], []).unwrap();
        let json = serde_json::to_string(&peptide).unwrap();
        assert_eq!(serde_json::from_str::<Peptide>(&json).unwrap(), peptide);
        assert!(
            serde_json::from_str::<Peptide>(
                r#"{"sequence": "", "mass": 0.0, "proteins": [], "modifications": []}"#
            )
            .is_err()
        );
        assert!(
            serde_json::from_str::<Peptide>(
                r#"{"sequence": "pep", "mass": 0.0, "proteins": [], "modifications": []}"#
            )
            .is_err()
        );
    }

    #[test]
    fn unanimous_decoy() {
        let mixed = Peptide::new(
            "PEPTIDEK",
            0.0,
            [protein("REV_P1", true), protein("P2", false)],
            [],
        )
        .unwrap();
        assert!(!mixed.is_decoy());
        let mut decoy = Peptide::new("PEPTIDEK", 0.0, [protein("REV_P1", true)], []).unwrap();
        assert!(decoy.is_decoy());
        assert!(!Peptide::new("PEPTIDEK", 0.0, [], []).unwrap().is_decoy());
        assert_eq!(decoy.flag_decoy(), 0);
    }
}
