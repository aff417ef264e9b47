#![doc = include_str!("../README.md")]

mod aggregate;
mod batch;
mod catalog;
mod error;
mod file_format;
mod formats;
mod helper_functions;
mod modification;
mod parameters;
mod peptide;
mod precursor;
mod protein;
mod psm;
mod query;
mod registry;
mod spectrum_id;

pub use aggregate::*;
pub use batch::*;
pub use catalog::*;
pub use error::*;
pub use file_format::*;
pub use formats::*;
pub use modification::*;
pub use parameters::*;
pub use peptide::*;
pub use precursor::*;
pub use protein::*;
pub use psm::*;
pub use query::*;
pub use registry::*;
pub use spectrum_id::*;

/// A subset of the types and traits that are envisioned to be used the most, importing this is a good starting point for working with the crate
pub mod prelude {
    pub use crate::{
        Aggregator, BatchImport, ImportError, ImportParameters, ReaderOptions, SpectrumKey,
        SpectrumMatch, import_files, open_identification_file, select_reader,
    };
}
