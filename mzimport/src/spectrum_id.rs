use serde::{Deserialize, Serialize};

/// The identifier of a spectrum, stable across search engines: the name of the spectrum file
/// (without directories) combined with the spectrum title. Results from multiple identification
/// files for the same spectrum file share keys.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SpectrumKey {
    /// The spectrum file name, for example `run01.mgf`
    pub file: String,
    /// The spectrum title as written in the spectrum file
    pub title: String,
}

impl SpectrumKey {
    /// Create a new key
    pub fn new(file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            title: title.into().trim().to_string(),
        }
    }
}

impl std::fmt::Display for SpectrumKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.title)
    }
}

/// The minimal information kept about a spectrum, peak lists are never retained
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SpectrumSummary {
    /// The 1-based query index in the identification file that first reported this spectrum
    pub query: usize,
    /// The measured precursor neutral mass, if known
    pub precursor_mass: Option<f64>,
    /// The retention time in seconds, if known
    pub retention_time: Option<f64>,
    /// Explicit decoy flag, set by callers that know the spectrum only yields decoy matches
    pub decoy: bool,
}
