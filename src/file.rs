//! The file substrate: memory-mapped (or in-memory) fixed-width data with
//! O(1) record addressing.

use std::fmt;
use std::fs;
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use log::debug;
use memmap2::Mmap;

use crate::fieldspecs::{FileSchema, FwfFileFieldSpecs};
use crate::view::{fold_index, FwfViewLike};
use crate::{get_encoding, FwfError, FwfResult};

/// How far into the file to look for the first newline.
const NEWLINE_SCAN_CAP: usize = 10 * 1024;

const DEFAULT_NEWLINE_BYTES: [u8; 4] = [0, 1, 10, 13];
const DEFAULT_COMMENT_CHAR: u8 = b'#';
const DEFAULT_COMMENT_SCAN_CAP: usize = 2048;

enum Storage {
    Mapped(Mmap),
    Memory(Vec<u8>),
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Mapped(mmap) => &mmap[..],
            Storage::Memory(data) => &data[..],
        }
    }
}

/// A fixed-width record file.
///
/// Opening derives the file geometry once: the newline width (1 or 2 bytes,
/// whichever is observed first), the position of the first record after any
/// leading comment lines, the full record width and the line count. After
/// that, every record is a plain offset computation into the mapping.
///
/// The mapping is owned here; every derived view borrows it. `close()`
/// releases the mapping early -- any later access through this handle fails
/// with [`FwfError::InvalidState`], and the borrow checker prevents closing
/// while a derived view is live.
pub struct FwfFile {
    fields: FwfFileFieldSpecs,
    encoding: &'static Encoding,
    newline_bytes: Vec<u8>,
    comment_char: u8,
    comment_scan_cap: usize,
    storage: Option<Storage>,
    path: Option<PathBuf>,
    newline_width: usize,
    fwidth: usize,
    fsize: usize,
    start_pos: usize,
    line_count: usize,
}

impl FwfFile {
    /// Open and memory-map a file read-only.
    pub fn open<P: AsRef<Path>>(schema: &FileSchema, path: P) -> FwfResult<FwfFile> {
        let file = fs::File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        FwfFile::init(
            schema,
            Storage::Mapped(mmap),
            Some(path.as_ref().to_path_buf()),
        )
    }

    /// Use a buffer already in memory. Nice for testing.
    pub fn from_bytes(schema: &FileSchema, data: Vec<u8>) -> FwfResult<FwfFile> {
        FwfFile::init(schema, Storage::Memory(data), None)
    }

    fn init(schema: &FileSchema, storage: Storage, path: Option<PathBuf>) -> FwfResult<FwfFile> {
        let fields = FwfFileFieldSpecs::new(&schema.fields)?;
        let encoding = match &schema.encoding {
            Some(label) => get_encoding(label)?,
            None => encoding_rs::UTF_8,
        };
        let newline_bytes = schema
            .newline
            .clone()
            .unwrap_or_else(|| DEFAULT_NEWLINE_BYTES.to_vec());
        let comment_char = schema.comments.map(|c| c as u8).unwrap_or(DEFAULT_COMMENT_CHAR);
        let comment_scan_cap = schema.comment_scan_cap.unwrap_or(DEFAULT_COMMENT_SCAN_CAP);

        let data = storage.bytes();
        let newline_width = detect_newline_width(data, &newline_bytes, fields.reclen())?;
        let fwidth = fields.reclen() + newline_width;
        let fsize = padded_file_size(data, &newline_bytes, newline_width);
        let start_pos = skip_comment_lines(
            data,
            comment_char,
            &newline_bytes,
            newline_width,
            comment_scan_cap,
        )?;
        let line_count = if data.is_empty() || fields.reclen() == 0 {
            0
        } else {
            fsize.saturating_sub(start_pos) / fwidth
        };

        debug!(
            "opened fwf data ({} bytes): newline_width={}, fwidth={}, start_pos={}, line_count={}",
            data.len(),
            newline_width,
            fwidth,
            start_pos,
            line_count
        );

        Ok(FwfFile {
            fields,
            encoding,
            newline_bytes,
            comment_char,
            comment_scan_cap,
            storage: Some(storage),
            path,
            newline_width,
            fwidth,
            fsize,
            start_pos,
            line_count,
        })
    }

    /// Release the mapping. Idempotent; later data access through this
    /// handle fails with [`FwfError::InvalidState`].
    pub fn close(&mut self) {
        if self.storage.take().is_some() {
            debug!("closed fwf file {:?}", self.path);
        }
    }

    pub fn is_open(&self) -> bool {
        self.storage.is_some()
    }

    /// The full mapped (or in-memory) byte region.
    pub fn data(&self) -> FwfResult<&[u8]> {
        match &self.storage {
            Some(storage) => Ok(storage.bytes()),
            None => Err(FwfError::InvalidState("file is closed")),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Record width including the newline.
    pub fn fwidth(&self) -> usize {
        self.fwidth
    }

    /// File size, padded by one newline width when the final record has no
    /// trailing newline.
    pub fn fsize(&self) -> usize {
        self.fsize
    }

    /// First byte after the leading comment lines.
    pub fn start_pos(&self) -> usize {
        self.start_pos
    }

    pub fn newline_width(&self) -> usize {
        self.newline_width
    }

    pub fn comment_char(&self) -> u8 {
        self.comment_char
    }

    pub fn comment_scan_cap(&self) -> usize {
        self.comment_scan_cap
    }

    /// Byte offset of the first byte of the line with the given index.
    /// Negative indexes are end-relative.
    pub fn pos_from_index(&self, index: isize) -> FwfResult<usize> {
        let index = fold_index(index, self.line_count)?;
        Ok(self.start_pos + index * self.fwidth)
    }

    /// Iterate all records as raw byte slices, without any per-record
    /// allocation. The final record may be short of its newline.
    pub fn iter_bytes(&self) -> FwfResult<ByteRecords<'_>> {
        let data = self.data()?;
        Ok(ByteRecords {
            data,
            pos: self.start_pos,
            remaining: self.line_count,
            fwidth: self.fwidth,
        })
    }

    /// Iterate only the bytes of one field across all records: a strided
    /// walk over the mapping, no record handle in between. This is the fast
    /// path used for uniqueness and index construction.
    pub fn iter_field_bytes(&self, field: &str) -> FwfResult<FieldColumn<'_>> {
        let spec = self.fields.field(field)?;
        let data = self.data()?;
        Ok(FieldColumn {
            data,
            pos: self.start_pos + spec.start(),
            flen: spec.len(),
            remaining: self.line_count,
            fwidth: self.fwidth,
        })
    }

    fn is_newline(&self, byte: u8) -> bool {
        self.newline_bytes.contains(&byte)
    }
}

impl fmt::Debug for FwfFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FwfFile")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("fwidth", &self.fwidth)
            .field("start_pos", &self.start_pos)
            .field("line_count", &self.line_count)
            .finish()
    }
}

impl FwfViewLike for FwfFile {
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
        if index >= self.line_count {
            return Err(FwfError::OutOfBounds {
                index: index as isize,
                len: self.line_count,
            });
        }
        let data = self.data()?;
        let pos = self.start_pos + index * self.fwidth;
        Ok(&data[pos..(pos + self.fwidth).min(data.len())])
    }

    fn as_view(&self) -> &dyn FwfViewLike {
        self
    }

    fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

/// Number of newline bytes per record terminator: whichever width is first
/// observed within the leading 10 KiB. A buffer no longer than one record
/// degenerates to 1.
fn detect_newline_width(data: &[u8], newline_bytes: &[u8], reclen: usize) -> FwfResult<usize> {
    let maxlen = data.len().min(NEWLINE_SCAN_CAP);
    let mut pos = 0;
    while pos < maxlen {
        if newline_bytes.contains(&data[pos]) {
            pos += 1;
            if pos < data.len() {
                return Ok(if newline_bytes.contains(&data[pos]) { 2 } else { 1 });
            }
            return Ok(1);
        }
        pos += 1;
    }

    if pos == data.len() || data.len() <= reclen {
        // The whole buffer holds a single unterminated line (or only
        // comment bytes, or one record wider than the scan window).
        Ok(1)
    } else {
        Err(FwfError::InvalidFormat(format!(
            "no newline found within the first {} bytes",
            NEWLINE_SCAN_CAP
        )))
    }
}

/// File size, padded when the last record has no trailing newline.
fn padded_file_size(data: &[u8], newline_bytes: &[u8], newline_width: usize) -> usize {
    match data.last() {
        Some(last) if newline_bytes.contains(last) => data.len(),
        _ => data.len() + newline_width,
    }
}

/// Position of the first byte that does not belong to a leading comment
/// line. Each comment line's newline must occur within `scan_cap` bytes.
fn skip_comment_lines(
    data: &[u8],
    comment_char: u8,
    newline_bytes: &[u8],
    newline_width: usize,
    scan_cap: usize,
) -> FwfResult<usize> {
    let mut pos = 0;
    while pos < data.len() && data[pos] == comment_char {
        let limit = (pos + scan_cap).min(data.len());
        let mut cursor = pos;
        while cursor < limit && !newline_bytes.contains(&data[cursor]) {
            cursor += 1;
        }
        if cursor < limit {
            pos = cursor + newline_width;
        } else if cursor == data.len() {
            // Comment-only input without a final newline.
            return Ok(cursor);
        } else {
            return Err(FwfError::InvalidFormat(format!(
                "comment line at byte {} exceeds {} bytes",
                pos, scan_cap
            )));
        }
    }
    Ok(pos.min(data.len()))
}

/// Iterator over whole raw records of a file.
pub struct ByteRecords<'a> {
    data: &'a [u8],
    pos: usize,
    remaining: usize,
    fwidth: usize,
}

impl<'a> Iterator for ByteRecords<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let stop = (self.pos + self.fwidth).min(self.data.len());
        let line = &self.data[self.pos.min(self.data.len())..stop];
        self.pos += self.fwidth;
        self.remaining -= 1;
        Some(line)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> ExactSizeIterator for ByteRecords<'a> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<'a> FusedIterator for ByteRecords<'a> {}

/// Iterator over the bytes of a single field across all records.
pub struct FieldColumn<'a> {
    data: &'a [u8],
    pos: usize,
    flen: usize,
    remaining: usize,
    fwidth: usize,
}

impl<'a> Iterator for FieldColumn<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let start = self.pos.min(self.data.len());
        let stop = (self.pos + self.flen).min(self.data.len());
        let value = &self.data[start..stop];
        self.pos += self.fwidth;
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> ExactSizeIterator for FieldColumn<'a> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<'a> FusedIterator for FieldColumn<'a> {}
