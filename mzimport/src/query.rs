use crate::{Charge, MassDelta, Peptide, SearchEngine, SpectrumKey};

/// All candidate hits a search engine reported for one query (spectrum), as read from an
/// identification file before any winner is chosen.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryHits {
    /// The 1-based index of the query in the identification file
    pub index: usize,
    /// The spectrum
    pub spectrum: SpectrumKey,
    /// The search engine
    pub engine: SearchEngine,
    /// The identification file name
    pub file: String,
    /// The retention time in seconds, if known
    pub retention_time: Option<f64>,
    /// The target hits, in the order reported by the search engine
    pub target: Vec<CandidateHit>,
    /// The hits from a separate decoy search, if the engine reports these separately
    pub decoy: Option<Vec<CandidateHit>>,
    /// Set if this spectrum was explicitly flagged as decoy (for example in a spectrum registry)
    pub flagged_decoy: bool,
}

/// A single candidate peptide for a query
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateHit {
    /// The peptide
    pub peptide: Peptide,
    /// The expectation value, lower is better
    pub expectation: f64,
    /// The primary engine score if any, higher is better
    pub score: Option<f64>,
    /// The precursor charge assumed for this hit
    pub charge: Charge,
    /// The measured precursor neutral mass
    pub measured_mass: f64,
    /// The precursor mass error
    pub delta: MassDelta,
}
