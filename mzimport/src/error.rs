use std::path::PathBuf;

use thiserror::Error;

/// The ways importing an identification file can fail. Every error is scoped to a single file,
/// the caller is expected to skip that file and continue with the rest of the batch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ImportError {
    /// The file extension or content is not recognised as any supported result format
    #[error("Unsupported identification file format: '{}'", .path.display())]
    UnsupportedFormat {
        /// The offending file
        path: PathBuf,
    },
    /// The structure of the file is corrupt
    #[error("Malformed identification file '{}'{}: {message}", .path.display(), record_suffix(.record))]
    MalformedFile {
        /// The offending file
        path: PathBuf,
        /// The query or record index where the problem was detected, if known
        record: Option<usize>,
        /// Human readable explanation
        message: String,
    },
    /// The file declares a format version that is not handled
    #[error("Unsupported {format} version '{version}' in '{}'", .path.display())]
    UnsupportedVersion {
        /// The offending file
        path: PathBuf,
        /// The name of the format
        format: &'static str,
        /// The declared version
        version: String,
    },
    /// The file could not be read
    #[error("Could not read '{}': {source}", .path.display())]
    Io {
        /// The offending file
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ImportError {
    /// Create a malformed file error
    pub(crate) fn malformed(
        path: impl Into<PathBuf>,
        record: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedFile {
            path: path.into(),
            record,
            message: message.into(),
        }
    }

    /// The file this error is about
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::UnsupportedFormat { path }
            | Self::MalformedFile { path, .. }
            | Self::UnsupportedVersion { path, .. }
            | Self::Io { path, .. } => path,
        }
    }

    /// The query or record index, only set for malformed files where the location is known
    pub const fn record(&self) -> Option<usize> {
        match self {
            Self::MalformedFile { record, .. } => *record,
            _ => None,
        }
    }
}

fn record_suffix(record: &Option<usize>) -> String {
    record.map_or_else(String::new, |r| format!(" (record {r})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let error = ImportError::malformed("run.dat", Some(12), "Invalid peptide line");
        assert_eq!(
            error.to_string(),
            "Malformed identification file 'run.dat' (record 12): Invalid peptide line"
        );
        assert_eq!(error.record(), Some(12));
        assert_eq!(error.path(), std::path::Path::new("run.dat"));
        let error = ImportError::UnsupportedVersion {
            path: "run.dat".into(),
            format: "Mascot",
            version: "2.0".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Unsupported Mascot version '2.0' in 'run.dat'"
        );
        assert_eq!(error.record(), None);
    }
}
