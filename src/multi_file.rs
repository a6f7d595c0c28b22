//! Treat several fixed-width files as one contiguous view.
//!
//! Operational exports typically arrive as one file per day, while a run
//! must process the whole period. Adding the files to a multi-file makes
//! them addressable as a single table, without concatenating them on disk.

use std::fmt;
use std::path::Path;

use encoding_rs::Encoding;

use crate::fieldspecs::{FileSchema, FwfFileFieldSpecs};
use crate::file::FwfFile;
use crate::view::FwfViewLike;
use crate::{FwfError, FwfResult};

/// An ordered sequence of child files with cumulative line addressing.
///
/// The logical index `j` lives in the child `k` with the smallest `k` whose
/// cumulative length exceeds `j`. Translation is linear in the number of
/// children, which stays small in practice (one file per day, a month or
/// two of history).
#[derive(Default)]
pub struct FwfMultiFile {
    files: Vec<FwfFile>,
    fields: FwfFileFieldSpecs,
    line_count: usize,
}

impl FwfMultiFile {
    pub fn new() -> FwfMultiFile {
        FwfMultiFile::default()
    }

    /// Append a file. The first file added provides the field specs.
    pub fn add(&mut self, file: FwfFile) {
        if self.files.is_empty() {
            self.fields = file.fields().clone();
        }
        self.line_count += file.line_count();
        self.files.push(file);
    }

    /// Open a file against `schema` and append it.
    pub fn open<P: AsRef<Path>>(&mut self, schema: &FileSchema, path: P) -> FwfResult<()> {
        let file = FwfFile::open(schema, path)?;
        self.add(file);
        Ok(())
    }

    /// Wrap an in-memory buffer against `schema` and append it.
    pub fn add_bytes(&mut self, schema: &FileSchema, data: Vec<u8>) -> FwfResult<()> {
        let file = FwfFile::from_bytes(schema, data)?;
        self.add(file);
        Ok(())
    }

    pub fn files(&self) -> &[FwfFile] {
        &self.files
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Translate a logical index into `(child position, index within it)`.
    pub fn translate(&self, index: usize) -> FwfResult<(usize, usize)> {
        let mut base = 0;
        for (child, file) in self.files.iter().enumerate() {
            let len = file.line_count();
            if index < base + len {
                return Ok((child, index - base));
            }
            base += len;
        }
        Err(FwfError::OutOfBounds {
            index: index as isize,
            len: self.line_count,
        })
    }

    /// Close all children, last added first.
    pub fn close(&mut self) {
        for file in self.files.iter_mut().rev() {
            file.close();
        }
    }
}

impl fmt::Debug for FwfMultiFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FwfMultiFile")
            .field("files", &self.files.len())
            .field("line_count", &self.line_count)
            .finish()
    }
}

impl FwfViewLike for FwfMultiFile {
    fn count(&self) -> usize {
        self.line_count
    }

    fn fields(&self) -> &FwfFileFieldSpecs {
        &self.fields
    }

    fn parent(&self) -> Option<&dyn FwfViewLike> {
        None
    }

    fn parent_index(&self, index: usize) -> usize {
        index
    }

    fn raw_line_at(&self, index: usize) -> FwfResult<&[u8]> {
        let (child, local) = self.translate(index)?;
        self.files[child].raw_line_at(local)
    }

    fn as_view(&self) -> &dyn FwfViewLike {
        self
    }

    fn encoding(&self) -> &'static Encoding {
        match self.files.first() {
            Some(file) => file.encoding(),
            None => encoding_rs::UTF_8,
        }
    }
}
