//! Database-like access to fixed-width record files.
//!
//! A fixed-width file consists of equal-length records, each composed of
//! named byte ranges. The file is memory-mapped and never parsed up front:
//! records are addressed by line number in O(1), fields are zero-copy byte
//! slices, and conversions into strings, integers or dates happen on demand.
//! Views (ranges, index subsets, boolean masks), predicate filters, sorting
//! and secondary indices all layer on top without copying the data.

use encoding_rs::Encoding;
use thiserror::Error;

#[cfg(test)]
mod tests;

pub mod fieldspecs;
pub mod file;
pub mod index;
pub mod kernel;
pub mod line;
pub mod multi_file;
pub mod operator;
pub mod view;

pub use fieldspecs::{FieldDef, FileSchema, FwfFieldSpec, FwfFileFieldSpecs};
pub use file::FwfFile;
pub use index::{
    FieldRef, FwfColumnIndexBuilder, FwfIndexBuilder, FwfIndexDict, FwfUniqueIndexDict,
    IndexSink, IndexStore, ListStore, PackedPostingStore, UniqueStore,
};
pub use kernel::{index_multi_file, FwfScan};
pub use line::FwfLine;
pub use multi_file::FwfMultiFile;
pub use operator::op;
pub use view::{FwfRegion, FwfSubset, FwfViewLike, LinePredicate};

pub(crate) fn get_encoding(label: &str) -> FwfResult<&'static Encoding> {
    match Encoding::for_label(label.as_bytes()) {
        Some(e) => Ok(e),
        None => Err(FwfError::Schema(format!("unknown encoding label '{}'", label))),
    }
}

/// All errors reported by this crate.
#[derive(Debug, Error)]
pub enum FwfError {
    /// Malformed or conflicting field specification, or a lookup of a field
    /// the schema does not contain.
    #[error("invalid field specification: {0}")]
    Schema(String),
    /// The file carries no recognizable newline, or a comment line never ends.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),
    /// A line number or slice endpoint outside the view.
    #[error("index {index} out of range for view of length {len}")]
    OutOfBounds { index: isize, len: usize },
    /// Access through a handle whose backing data has been released.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// A field value could not be converted into a number or date.
    #[error("cannot parse '{value}' at line {lineno}")]
    Parse { lineno: usize, value: String },
    /// A bounded container ran out of preallocated slots.
    #[error("capacity exhausted after {0} entries")]
    Capacity(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FwfResult<T> = Result<T, FwfError>;
