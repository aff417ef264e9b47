use serde::{Deserialize, Serialize};

use crate::{Peptide, Precursor, SpectrumKey};

/// The search engines that results can be read from
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[non_exhaustive]
pub enum SearchEngine {
    /// Mascot (Matrix Science)
    Mascot,
    /// OMSSA (NCBI)
    Omssa,
    /// X!Tandem (GPM)
    XTandem,
}

impl SearchEngine {
    /// The name of the search engine
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mascot => "Mascot",
            Self::Omssa => "OMSSA",
            Self::XTandem => "X!Tandem",
        }
    }
}

impl std::fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The difference between the measured and theoretical precursor mass
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MassDelta {
    /// The absolute error in ppm
    pub ppm: f64,
    /// If the measured mass was taken to be the first isotope (C13) instead of the monoisotopic peak
    pub isotope: bool,
}

impl MassDelta {
    /// The absolute ppm error between a measured and theoretical mass
    pub fn new(measured: f64, theoretical: f64) -> Self {
        Self {
            ppm: ppm(measured, theoretical),
            isotope: false,
        }
    }

    /// The absolute ppm error, but if the measured mass is more than the threshold (Da) away from
    /// the theoretical mass it is assumed that the first isotope was picked and the error is
    /// calculated against `measured - 1`.
    pub fn with_isotope_correction(measured: f64, theoretical: f64, threshold: f64) -> Self {
        if (measured - theoretical).abs() > threshold {
            Self {
                ppm: ppm(measured - 1.0, theoretical),
                isotope: true,
            }
        } else {
            Self::new(measured, theoretical)
        }
    }
}

fn ppm(measured: f64, theoretical: f64) -> f64 {
    1e6 * (measured - theoretical).abs() / theoretical
}

/// A peptide as assumed by a search engine to be the origin of a spectrum
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PeptideAssumption {
    /// The peptide
    pub peptide: Peptide,
    /// The search engine that made this assumption
    pub engine: SearchEngine,
    /// The rank, 1 is the best assumption of the search engine
    pub rank: usize,
    /// The precursor mass error
    pub delta: MassDelta,
    /// The expectation value, lower is better
    pub expectation: f64,
    /// The primary engine score if the engine reports one, higher is better (Mascot ions score)
    pub score: Option<f64>,
    /// The identification file this assumption was read from
    pub file: String,
}

impl PeptideAssumption {
    /// If this assumption is a decoy hit
    pub fn is_decoy(&self) -> bool {
        self.peptide.is_decoy()
    }
}

/// The resolved match for a spectrum, there is at most one of these per spectrum key in a result set
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SpectrumMatch {
    key: SpectrumKey,
    precursor: Precursor,
    best: PeptideAssumption,
    secondary: Vec<PeptideAssumption>,
}

impl SpectrumMatch {
    /// Create a match with only a best assumption
    pub const fn new(key: SpectrumKey, precursor: Precursor, best: PeptideAssumption) -> Self {
        Self {
            key,
            precursor,
            best,
            secondary: Vec::new(),
        }
    }

    /// The spectrum
    pub const fn key(&self) -> &SpectrumKey {
        &self.key
    }

    /// The precursor
    pub const fn precursor(&self) -> &Precursor {
        &self.precursor
    }

    /// The winning assumption
    pub const fn best(&self) -> &PeptideAssumption {
        &self.best
    }

    /// Secondary assumptions, these are not read by any of the current readers
    pub fn secondary(&self) -> &[PeptideAssumption] {
        &self.secondary
    }

    /// If the winning assumption is a decoy hit
    pub fn is_decoy(&self) -> bool {
        self.best.is_decoy()
    }
}
