use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use indexmap::IndexMap;

use crate::{
    Aggregator, FileOutcome, ImportError, ImportReport, ReaderOptions, SpectrumKey,
    SpectrumMatch,
    aggregate::{StagedFile, stage_file},
    select_reader,
};

/// The result of importing a batch of identification files
#[derive(Debug)]
pub struct BatchImport {
    /// The matches, at most one per spectrum
    pub matches: IndexMap<SpectrumKey, SpectrumMatch>,
    /// What happened while importing
    pub report: ImportReport,
}

enum Parsed {
    Staged(StagedFile),
    Unsupported,
    Failed(ImportError),
    Cancelled,
}

/// Import all given files. Unsupported and unreadable files are skipped and recorded in the
/// report, all other files are merged in the given order so that the last file that reports a
/// spectrum determines its match.
///
/// The cancel flag is checked before every file, files that have not started when it is set
/// are recorded as cancelled. Files are parsed in parallel if enabled in the parameters and the
/// `rayon` feature is on.
pub fn import_files(
    paths: &[impl AsRef<Path> + Sync],
    options: &ReaderOptions,
    cancel: Option<&AtomicBool>,
) -> BatchImport {
    let parse = |path: &Path| -> Parsed {
        if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Parsed::Cancelled;
        }
        let Some(kind) = select_reader(path) else {
            return Parsed::Unsupported;
        };
        match kind
            .open(path, options)
            .and_then(|reader| stage_file(reader, &options.parameters.decoy))
        {
            Ok(staged) => Parsed::Staged(staged),
            Err(error) => Parsed::Failed(error),
        }
    };

    #[cfg(feature = "rayon")]
    let parsed: Vec<(PathBuf, Parsed)> = if options.parameters.parallel {
        paths
            .par_iter()
            .map(|p| (p.as_ref().to_path_buf(), parse(p.as_ref())))
            .collect()
    } else {
        paths
            .iter()
            .map(|p| (p.as_ref().to_path_buf(), parse(p.as_ref())))
            .collect()
    };
    #[cfg(not(feature = "rayon"))]
    let parsed: Vec<(PathBuf, Parsed)> = paths
        .iter()
        .map(|p| (p.as_ref().to_path_buf(), parse(p.as_ref())))
        .collect();

    let mut aggregator = Aggregator::new(options.parameters.decoy.clone());
    for (path, parsed) in parsed {
        let outcome = match parsed {
            Parsed::Staged(staged) => aggregator.commit(&path, staged),
            Parsed::Unsupported => {
                log::warn!("Skipped unsupported file '{}'", path.display());
                FileOutcome::Unsupported
            }
            Parsed::Failed(error) => {
                log::warn!("Skipped '{}': {error}", path.display());
                FileOutcome::Failed(error)
            }
            Parsed::Cancelled => FileOutcome::Cancelled,
        };
        aggregator.record(&path, outcome);
    }
    let (matches, report) = aggregator.finish();
    BatchImport { matches, report }
}
