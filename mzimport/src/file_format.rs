use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    ImportError, MascotReader, OmssaReader, QueryHits, ReaderOptions, SearchEngine,
    XTandemReader,
    helper_functions::{actual_extension, file_name},
};

/// The identification file formats that can be read
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ReaderKind {
    /// Mascot `.dat`
    Mascot,
    /// OMSSA `.omx`
    Omssa,
    /// X!Tandem `.xml`
    XTandem,
}

impl ReaderKind {
    /// The search engine that writes this format
    pub const fn search_engine(self) -> SearchEngine {
        match self {
            Self::Mascot => SearchEngine::Mascot,
            Self::Omssa => SearchEngine::Omssa,
            Self::XTandem => SearchEngine::XTandem,
        }
    }

    /// Open a file with the reader for this format
    /// # Errors
    /// If the file could not be opened by this reader.
    pub fn open(
        self,
        path: impl AsRef<Path>,
        options: &ReaderOptions,
    ) -> Result<IdentificationReader, ImportError> {
        Ok(match self {
            Self::Mascot => IdentificationReader::Mascot(MascotReader::open(path, options)?),
            Self::Omssa => IdentificationReader::Omssa(OmssaReader::open(path, options)?),
            Self::XTandem => IdentificationReader::XTandem(XTandemReader::open(path, options)?),
        })
    }
}

/// Files that share an extension with result files but contain search settings
const SETTINGS_FILES: &[&str] = &["mods.xml", "usermods.xml"];

/// Select the reader for a file based on its extension, looking through a trailing `.gz`.
/// Returns None if the file is not a supported identification file.
pub fn select_reader(path: impl AsRef<Path>) -> Option<ReaderKind> {
    let path = path.as_ref();
    let name = file_name(path).to_lowercase();
    if SETTINGS_FILES.contains(&name.as_str()) {
        return None;
    }
    match actual_extension(path).as_deref() {
        Some("dat") => Some(ReaderKind::Mascot),
        Some("omx") => Some(ReaderKind::Omssa),
        Some("xml") => Some(ReaderKind::XTandem),
        _ => None,
    }
}

/// Open the selected path and automatically determine the file type. It will decompress gzipped
/// files automatically.
///
/// # Errors
/// It errors if the file type is not supported or if opening the file errors.
pub fn open_identification_file(
    path: impl AsRef<Path>,
    options: &ReaderOptions,
) -> Result<IdentificationReader, ImportError> {
    let path = path.as_ref();
    select_reader(path)
        .ok_or_else(|| ImportError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?
        .open(path, options)
}

/// A reader for any of the supported formats, iterating over all queries in the file
#[derive(Debug)]
pub enum IdentificationReader {
    /// A Mascot reader
    Mascot(MascotReader),
    /// An OMSSA reader
    Omssa(OmssaReader),
    /// An X!Tandem reader
    XTandem(XTandemReader),
}

impl IdentificationReader {
    /// The format of the file being read
    pub const fn kind(&self) -> ReaderKind {
        match self {
            Self::Mascot(_) => ReaderKind::Mascot,
            Self::Omssa(_) => ReaderKind::Omssa,
            Self::XTandem(_) => ReaderKind::XTandem,
        }
    }

    /// The name of the spectrum file that was searched
    pub fn spectrum_file(&self) -> &str {
        match self {
            Self::Mascot(r) => r.spectrum_file(),
            Self::Omssa(r) => r.spectrum_file(),
            Self::XTandem(r) => r.spectrum_file(),
        }
    }
}

impl Iterator for IdentificationReader {
    type Item = Result<QueryHits, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Mascot(r) => r.next(),
            Self::Omssa(r) => r.next(),
            Self::XTandem(r) => r.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select() {
        assert_eq!(select_reader("F001234.dat"), Some(ReaderKind::Mascot));
        assert_eq!(select_reader("F001234.DAT.gz"), Some(ReaderKind::Mascot));
        assert_eq!(select_reader("/data/search.omx"), Some(ReaderKind::Omssa));
        assert_eq!(select_reader("run.t.xml"), Some(ReaderKind::XTandem));
        assert_eq!(select_reader("run.t.xml.gz"), Some(ReaderKind::XTandem));
        assert_eq!(select_reader("mods.xml"), None);
        assert_eq!(select_reader("/omssa/usermods.xml"), None);
        assert_eq!(select_reader("Mods.XML"), None);
        assert_eq!(select_reader("run.mgf"), None);
        assert_eq!(select_reader("no_extension"), None);
        assert_eq!(
            ReaderKind::Omssa.search_engine(),
            SearchEngine::Omssa
        );
    }

    #[test]
    fn unsupported() {
        let result = open_identification_file("spectra.mgf", &ReaderOptions::default());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat { .. })));
        let result = open_identification_file("does/not/exist.dat", &ReaderOptions::default());
        assert!(matches!(result, Err(ImportError::Io { .. })));
    }
}
