use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::{
    CandidateHit, DecoyRules, ImportError, PeptideAssumption, Precursor, QueryHits, SpectrumKey,
    SpectrumMatch,
};

/// What happened to a single query
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum QueryOutcome {
    /// A match was created for this spectrum
    Accepted(SpectrumKey),
    /// Multiple different sequences share the best expectation value, no match was created
    Ambiguous,
    /// The search engine reported no hits for this query
    NoHits,
}

/// What happened to a single file
#[derive(Debug)]
#[non_exhaustive]
pub enum FileOutcome {
    /// The file was read completely and its matches were merged
    Imported {
        /// The number of queries in the file
        queries: usize,
        /// The number of matches created from this file
        accepted: usize,
    },
    /// The file is not a supported identification file
    Unsupported,
    /// The file could not be read, none of its matches were kept
    Failed(ImportError),
    /// The import was cancelled before this file was started
    Cancelled,
}

impl FileOutcome {
    /// If the matches from this file were merged
    pub const fn is_imported(&self) -> bool {
        matches!(self, Self::Imported { .. })
    }
}

/// The outcome for one file in a batch
#[derive(Debug)]
pub struct FileReport {
    /// The file
    pub path: PathBuf,
    /// What happened to it
    pub outcome: FileOutcome,
}

/// Counts of everything that happened while aggregating
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Queries that resulted in a match, including matches later replaced by another file
    pub accepted: usize,
    /// Queries dropped because of a tie between different sequences
    pub ambiguous: usize,
    /// Queries without any hits
    pub no_hits: usize,
    /// Accepted queries where a decoy flag disagreed with the decoy accession conventions
    pub decoy_disagreements: usize,
    /// The outcome per file, in the order the files were added
    pub files: Vec<FileReport>,
}

impl ImportReport {
    /// The files that could not be read
    pub fn failed(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed(_)))
    }
}

/// Collects the queries from any number of identification files into one set of matches, with at
/// most one match per spectrum. When multiple files report the same spectrum the file added last
/// wins.
#[derive(Debug, Default)]
pub struct Aggregator {
    rules: DecoyRules,
    matches: IndexMap<SpectrumKey, SpectrumMatch>,
    report: ImportReport,
}

impl Aggregator {
    /// Create an empty aggregator, the decoy rules are used to detect decoy flag disagreements
    pub fn new(rules: DecoyRules) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Resolve the winner for a single query and store the match immediately
    pub fn add_query(&mut self, hits: QueryHits) -> QueryOutcome {
        let mut staged = StagedFile::default();
        let outcome = staged.add(hits, &self.rules);
        self.commit_counts(&staged);
        for found in staged.matches {
            self.matches.insert(found.key().clone(), found);
        }
        outcome
    }

    /// Read all queries from a file, the matches are only merged if the whole file could be read.
    /// The outcome is recorded in the report.
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        queries: impl IntoIterator<Item = Result<QueryHits, ImportError>>,
    ) -> &FileOutcome {
        let path = path.as_ref();
        let outcome = match stage_file(queries, &self.rules) {
            Ok(staged) => self.commit(path, staged),
            Err(error) => {
                log::warn!("Skipped '{}': {error}", path.display());
                FileOutcome::Failed(error)
            }
        };
        self.record(path, outcome)
    }

    /// Merge a staged file, returning the outcome to record
    pub(crate) fn commit(&mut self, path: &Path, staged: StagedFile) -> FileOutcome {
        self.commit_counts(&staged);
        let outcome = FileOutcome::Imported {
            queries: staged.queries,
            accepted: staged.matches.len(),
        };
        log::info!(
            "Imported {} matches from {} queries in '{}'",
            staged.matches.len(),
            staged.queries,
            path.display()
        );
        for found in staged.matches {
            self.matches.insert(found.key().clone(), found);
        }
        outcome
    }

    /// Record the outcome for a file
    pub(crate) fn record(&mut self, path: &Path, outcome: FileOutcome) -> &FileOutcome {
        self.report.files.push(FileReport {
            path: path.to_path_buf(),
            outcome,
        });
        &self.report.files[self.report.files.len() - 1].outcome
    }

    fn commit_counts(&mut self, staged: &StagedFile) {
        self.report.accepted += staged.matches.len();
        self.report.ambiguous += staged.ambiguous;
        self.report.no_hits += staged.no_hits;
        self.report.decoy_disagreements += staged.decoy_disagreements;
    }

    /// The decoy rules in use
    pub const fn rules(&self) -> &DecoyRules {
        &self.rules
    }

    /// The matches so far, in order of first appearance of the spectrum
    pub fn matches(&self) -> impl ExactSizeIterator<Item = &SpectrumMatch> {
        self.matches.values()
    }

    /// Get the match for a spectrum
    pub fn get(&self, key: &SpectrumKey) -> Option<&SpectrumMatch> {
        self.matches.get(key)
    }

    /// The number of spectra with a match
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// If there are no matches
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The report so far
    pub const fn report(&self) -> &ImportReport {
        &self.report
    }

    /// Take out the matches and the report
    pub fn finish(self) -> (IndexMap<SpectrumKey, SpectrumMatch>, ImportReport) {
        (self.matches, self.report)
    }
}

/// The resolved queries of one file that is not merged yet
#[derive(Debug, Default)]
pub(crate) struct StagedFile {
    queries: usize,
    matches: Vec<SpectrumMatch>,
    ambiguous: usize,
    no_hits: usize,
    decoy_disagreements: usize,
}

impl StagedFile {
    fn add(&mut self, hits: QueryHits, rules: &DecoyRules) -> QueryOutcome {
        self.queries += 1;
        match resolve_query(hits, rules) {
            Resolution::Accepted {
                found,
                disagreement,
            } => {
                let key = found.key().clone();
                self.decoy_disagreements += usize::from(disagreement);
                self.matches.push(found);
                QueryOutcome::Accepted(key)
            }
            Resolution::Ambiguous => {
                self.ambiguous += 1;
                QueryOutcome::Ambiguous
            }
            Resolution::NoHits => {
                self.no_hits += 1;
                QueryOutcome::NoHits
            }
        }
    }
}

/// Resolve all queries of a file, stops at the first error
pub(crate) fn stage_file(
    queries: impl IntoIterator<Item = Result<QueryHits, ImportError>>,
    rules: &DecoyRules,
) -> Result<StagedFile, ImportError> {
    let mut staged = StagedFile::default();
    for hits in queries {
        staged.add(hits?, rules);
    }
    Ok(staged)
}

enum Resolution {
    Accepted {
        found: SpectrumMatch,
        disagreement: bool,
    },
    Ambiguous,
    NoHits,
}

/// The primary score of a hit, higher is better. Hits without an engine score use the
/// expectation value.
fn primary_score(hit: &CandidateHit) -> f64 {
    hit.score.unwrap_or(-hit.expectation)
}

fn best_score(hits: &[CandidateHit]) -> Option<f64> {
    hits.iter().map(primary_score).max_by(f64::total_cmp)
}

/// Pick the target or decoy hits, the target hits are only used when the best decoy hit scores
/// strictly lower than the best target hit
fn choose_side(
    target: Vec<CandidateHit>,
    decoy: Option<Vec<CandidateHit>>,
) -> (Vec<CandidateHit>, bool) {
    match decoy {
        Some(decoy) if !decoy.is_empty() => match (best_score(&target), best_score(&decoy)) {
            (Some(t), Some(d)) if d < t => (target, false),
            _ => (decoy, true),
        },
        _ => (target, false),
    }
}

fn resolve_query(hits: QueryHits, rules: &DecoyRules) -> Resolution {
    let (mut candidates, decoy_side) = choose_side(hits.target, hits.decoy);
    // Stable, so the first listed candidate stays in front on ties
    candidates.sort_by(|a, b| a.expectation.total_cmp(&b.expectation));
    if let [winner, runner_up, ..] = candidates.as_slice()
        && runner_up.expectation.to_bits() == winner.expectation.to_bits()
        && runner_up.peptide.sequence() != winner.peptide.sequence()
    {
        log::debug!(
            "Dropped ambiguous query {} ({}) from {}",
            hits.index,
            hits.spectrum,
            hits.file
        );
        return Resolution::Ambiguous;
    }

    let mut candidates = candidates.into_iter();
    let Some(winner) = candidates.next() else {
        return Resolution::NoHits;
    };
    let extra_proteins: Vec<_> = candidates
        .filter(|c| c.peptide.sequence() == winner.peptide.sequence())
        .flat_map(|c| c.peptide.proteins().to_vec())
        .collect();
    let mut peptide = winner.peptide;
    peptide.add_proteins(extra_proteins);

    let mut disagreement = false;
    if decoy_side || hits.flagged_decoy {
        let changed = peptide.flag_decoy();
        let target_looking = peptide
            .proteins()
            .iter()
            .filter(|p| !rules.is_decoy(p.accession()))
            .count();
        if target_looking > 0 {
            disagreement = true;
            log::warn!(
                "Spectrum {} from {} is flagged as decoy but {target_looking} of its proteins do not have a decoy accession ({changed} proteins changed status)",
                hits.spectrum,
                hits.file,
            );
        }
    }

    let precursor = Precursor::new(hits.retention_time, winner.measured_mass, winner.charge);
    let assumption = PeptideAssumption {
        peptide,
        engine: hits.engine,
        rank: 1,
        delta: winner.delta,
        expectation: winner.expectation,
        score: winner.score,
        file: hits.file,
    };
    Resolution::Accepted {
        found: SpectrumMatch::new(hits.spectrum, precursor, assumption),
        disagreement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Charge, MassDelta, Peptide, Protein, SearchEngine};

    fn hit(sequence: &str, accession: &str, expectation: f64, score: Option<f64>) -> CandidateHit {
        CandidateHit {
            peptide: Peptide::new(
                sequence,
                1000.0,
                [Protein::new(accession, None, accession.starts_with("REV_"))],
                [],
            )
            .unwrap(),
            expectation,
            score,
            charge: Charge::positive(2).unwrap(),
            measured_mass: 1000.001,
            delta: MassDelta::new(1000.001, 1000.0),
        }
    }

    fn query(title: &str, target: Vec<CandidateHit>, decoy: Option<Vec<CandidateHit>>) -> QueryHits {
        QueryHits {
            index: 1,
            spectrum: SpectrumKey::new("run.mgf", title),
            engine: SearchEngine::Mascot,
            file: "F1.dat".to_string(),
            retention_time: Some(10.0),
            target,
            decoy,
            flagged_decoy: false,
        }
    }

    #[test]
    fn single_candidate() {
        let mut aggregator = Aggregator::default();
        let outcome = aggregator.add_query(query("1", vec![hit("PEPTIDE", "P1", 0.01, None)], None));
        assert_eq!(outcome, QueryOutcome::Accepted(SpectrumKey::new("run.mgf", "1")));
        let found = aggregator.matches().next().unwrap();
        assert_eq!(found.best().peptide.sequence(), "PEPTIDE");
        assert_eq!(found.best().rank, 1);
        assert_eq!(found.precursor().charge.value(), 2);
        assert!(found.secondary().is_empty());
    }

    #[test]
    fn lowest_expectation() {
        let mut aggregator = Aggregator::default();
        aggregator.add_query(query(
            "1",
            vec![
                hit("PEPTIDE", "P1", 0.1, None),
                hit("PEPTIDES", "P2", 0.001, None),
                hit("PEPTIDER", "P3", 0.01, None),
            ],
            None,
        ));
        assert_eq!(
            aggregator.matches().next().unwrap().best().peptide.sequence(),
            "PEPTIDES"
        );
    }

    #[test]
    fn ties() {
        let mut aggregator = Aggregator::default();
        // Same sequence, the proteins are merged
        let outcome = aggregator.add_query(query(
            "1",
            vec![
                hit("PEPTIDE", "P1", 0.01, None),
                hit("PEPTIDE", "P2", 0.01, None),
                hit("PEPTIDE", "P1", 0.01, None),
            ],
            None,
        ));
        assert!(matches!(outcome, QueryOutcome::Accepted(_)));
        let found = aggregator.matches().next().unwrap();
        let accessions: Vec<_> = found
            .best()
            .peptide
            .proteins()
            .iter()
            .map(Protein::accession)
            .collect();
        assert_eq!(accessions, ["P1", "P2"]);

        // Different sequences, the query is dropped
        let outcome = aggregator.add_query(query(
            "2",
            vec![
                hit("PEPTIDE", "P1", 0.01, None),
                hit("PEPTLDE", "P2", 0.01, None),
            ],
            None,
        ));
        assert_eq!(outcome, QueryOutcome::Ambiguous);
        assert_eq!(aggregator.len(), 1);
        assert_eq!(aggregator.report().ambiguous, 1);

        let outcome = aggregator.add_query(query("3", Vec::new(), None));
        assert_eq!(outcome, QueryOutcome::NoHits);
        assert_eq!(aggregator.report().no_hits, 1);
    }

    #[test]
    fn only_top_two_are_compared() {
        let mut aggregator = Aggregator::default();
        // The runner-up has the same sequence, a tied third candidate does not matter
        let outcome = aggregator.add_query(query(
            "1",
            vec![
                hit("PEPSTK", "P1", 0.01, None),
                hit("PEPSTK", "P2", 0.01, None),
                hit("PEPTSK", "P3", 0.01, None),
            ],
            None,
        ));
        assert_eq!(outcome, QueryOutcome::Accepted(SpectrumKey::new("run.mgf", "1")));
        let found = aggregator.matches().next().unwrap();
        assert_eq!(found.best().peptide.sequence(), "PEPSTK");
        assert_eq!(found.best().peptide.proteins().len(), 2);

        // The listing order does not matter, the best two expectation values are compared
        let outcome = aggregator.add_query(query(
            "2",
            vec![
                hit("PEPTSK", "P3", 0.1, None),
                hit("PEPSTK", "P1", 0.01, None),
                hit("PEPTTK", "P2", 0.01, None),
            ],
            None,
        ));
        assert_eq!(outcome, QueryOutcome::Ambiguous);
    }

    #[test]
    fn decoy_side() {
        let mut aggregator = Aggregator::default();
        // Decoy scores lower, target wins
        aggregator.add_query(query(
            "1",
            vec![hit("PEPTIDE", "P1", 0.01, Some(40.0))],
            Some(vec![hit("EDITPEP", "P2", 0.1, Some(30.0))]),
        ));
        // Equal scores, decoy wins
        aggregator.add_query(query(
            "2",
            vec![hit("PEPTIDE", "P1", 0.01, Some(40.0))],
            Some(vec![hit("EDITPEP", "REV_P1", 0.01, Some(40.0))]),
        ));
        // The decoy side wins for a protein that does not look like a decoy
        aggregator.add_query(query(
            "3",
            vec![hit("PEPTIDE", "P1", 0.01, Some(20.0))],
            Some(vec![hit("EDITPEP", "P3", 0.001, Some(50.0))]),
        ));
        let matches: Vec<_> = aggregator.matches().collect();
        assert!(!matches[0].is_decoy());
        assert!(matches[1].is_decoy());
        assert_eq!(matches[1].best().peptide.sequence(), "EDITPEP");
        assert!(matches[2].is_decoy());
        assert_eq!(aggregator.report().decoy_disagreements, 1);
    }

    #[test]
    fn flagged_decoy() {
        let mut aggregator = Aggregator::default();
        let mut hits = query("1", vec![hit("PEPTIDE", "REV_P1", 0.01, None)], None);
        hits.flagged_decoy = true;
        aggregator.add_query(hits);
        assert!(aggregator.matches().next().unwrap().is_decoy());
        assert_eq!(aggregator.report().decoy_disagreements, 0);
    }

    #[test]
    fn files() {
        let mut aggregator = Aggregator::default();
        let first = vec![
            Ok(query("1", vec![hit("PEPTIDE", "P1", 0.01, None)], None)),
            Ok(query("2", vec![hit("PEPTIDES", "P1", 0.01, None)], None)),
        ];
        assert!(aggregator.add_file("a.dat", first).is_imported());

        let mut second = query("1", vec![hit("PEPTIDER", "P2", 0.5, None)], None);
        second.file = "F2.dat".to_string();
        assert!(aggregator.add_file("b.dat", vec![Ok(second)]).is_imported());

        // A failing file does not leave any of its matches behind
        let broken = vec![
            Ok(query("3", vec![hit("PEPTIDEK", "P1", 0.01, None)], None)),
            Err(ImportError::malformed("c.dat", Some(2), "broken")),
        ];
        assert!(matches!(
            aggregator.add_file("c.dat", broken),
            FileOutcome::Failed(_)
        ));

        assert_eq!(aggregator.len(), 2);
        let replaced = aggregator.get(&SpectrumKey::new("run.mgf", "1")).unwrap();
        assert_eq!(replaced.best().peptide.sequence(), "PEPTIDER");
        assert_eq!(replaced.best().file, "F2.dat");
        assert!(aggregator.get(&SpectrumKey::new("run.mgf", "3")).is_none());
        assert_eq!(aggregator.report().failed().count(), 1);
        assert_eq!(aggregator.report().files.len(), 3);
    }
}
