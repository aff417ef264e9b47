use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{ImportError, ModificationCatalog, SpectrumRegistry, StandardCatalog};

/// The tunable parameters for importing identification files
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ImportParameters {
    /// Precursor delta masses (Da) with a magnitude above this are treated as a missed isotope
    pub isotope_threshold: f64,
    /// The accession conventions that mark a protein as decoy
    pub decoy: DecoyRules,
    /// The tolerance (Da) used when finding catalog modifications by mass
    pub modification_tolerance: f64,
    /// Parse multiple files in parallel (only used with the `rayon` feature)
    pub parallel: bool,
}

impl Default for ImportParameters {
    fn default() -> Self {
        Self {
            isotope_threshold: 0.5,
            decoy: DecoyRules::default(),
            modification_tolerance: 0.005,
            parallel: true,
        }
    }
}

impl ImportParameters {
    /// Read the parameters from a JSON file, missing keys take their default value
    /// # Errors
    /// If the file could not be read or is not valid JSON for these parameters.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text)
            .map_err(|err| ImportError::malformed(path, None, format!("Invalid parameters: {err}")))
    }
}

/// The accession string conventions used to detect decoy proteins
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct DecoyRules {
    /// Accession prefixes, default `REV_`
    pub prefixes: Vec<String>,
    /// Accession suffixes, default `_REV` and `_REVERSED`
    pub suffixes: Vec<String>,
    /// Substrings anywhere in the accession, default `DECOY_`
    pub substrings: Vec<String>,
}

impl Default for DecoyRules {
    fn default() -> Self {
        Self {
            prefixes: vec!["REV_".to_string()],
            suffixes: vec!["_REV".to_string(), "_REVERSED".to_string()],
            substrings: vec!["DECOY_".to_string()],
        }
    }
}

impl DecoyRules {
    /// Check if this accession looks like it belongs to a decoy protein
    pub fn is_decoy(&self, accession: &str) -> bool {
        self.prefixes.iter().any(|p| accession.starts_with(p.as_str()))
            || self.suffixes.iter().any(|s| accession.ends_with(s.as_str()))
            || self.substrings.iter().any(|s| accession.contains(s.as_str()))
    }
}

/// Everything a reader needs besides the file itself. The collaborators are injected so multiple
/// catalogs or registries can be used side by side.
#[derive(Clone)]
pub struct ReaderOptions {
    /// The parameters
    pub parameters: ImportParameters,
    /// The modification catalog used to resolve engine modifications
    pub catalog: Arc<dyn ModificationCatalog>,
    /// If set the readers record a summary of every spectrum they encounter here
    pub registry: Option<Arc<dyn SpectrumRegistry>>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            parameters: ImportParameters::default(),
            catalog: Arc::new(StandardCatalog::default()),
            registry: None,
        }
    }
}

impl std::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("parameters", &self.parameters)
            .field("registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

impl ReaderOptions {
    /// Use the given parameters
    #[must_use]
    pub fn with_parameters(self, parameters: ImportParameters) -> Self {
        Self { parameters, ..self }
    }

    /// Use the given modification catalog
    #[must_use]
    pub fn with_catalog(self, catalog: Arc<dyn ModificationCatalog>) -> Self {
        Self { catalog, ..self }
    }

    /// Record spectrum summaries in the given registry
    #[must_use]
    pub fn with_registry(self, registry: Arc<dyn SpectrumRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoy_accessions() {
        let rules = DecoyRules::default();
        assert!(rules.is_decoy("REV_P12345"));
        assert!(rules.is_decoy("P12345_REV"));
        assert!(rules.is_decoy("P12345_REVERSED"));
        assert!(rules.is_decoy("DECOY_P12345"));
        assert!(!rules.is_decoy("P12345"));
        assert!(!rules.is_decoy("PREV_12345"));
    }

    #[test]
    fn partial_json() {
        let parameters: ImportParameters =
            serde_json::from_str(r#"{"isotope_threshold": 0.8, "decoy": {"prefixes": ["XXX_"]}}"#)
                .unwrap();
        assert!((parameters.isotope_threshold - 0.8).abs() < f64::EPSILON);
        assert!(parameters.decoy.is_decoy("XXX_P1"));
        assert!(!parameters.decoy.is_decoy("REV_P1"));
        assert!(parameters.decoy.is_decoy("P1_REV"));
        assert!(parameters.parallel);
    }
}
