//! The scan kernel: one tight loop over the mapped bytes that filters
//! records and either collects line numbers or feeds an index container.
//!
//! Everything here works on raw offsets into a single file's mapping; no
//! line handles, no per-record allocation. Filters are byte-range bound
//! checks on a field: the bound may be shorter than the field, in which
//! case only that prefix is compared.

use std::fmt;

use log::info;

use crate::file::FwfFile;
use crate::index::{int_key, FieldRef, IndexSink};
use crate::multi_file::FwfMultiFile;
use crate::view::{FwfSubset, FwfViewLike};
use crate::{FwfError, FwfResult};


/// Log a scan once it indexed at least this many records.
const LARGE_SCAN: usize = 1_000_000;

struct ScanFilter {
    start: usize,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
    inclusive_upper: bool,
}

/// A configurable scan over one file.
///
/// Chain any number of field-range filters, optionally a progress callback,
/// then run one of the terminal operations: collect matching line numbers,
/// or extract a key per matching record and feed it into an index sink.
pub struct FwfScan<'a> {
    file: &'a FwfFile,
    filters: Vec<ScanFilter>,
    progress: Option<Box<dyn FnMut(usize) -> bool + 'a>>,
}

impl<'a> FwfScan<'a> {
    pub fn new(file: &'a FwfFile) -> FwfScan<'a> {
        FwfScan {
            file,
            filters: Vec::new(),
            progress: None,
        }
    }

    /// Keep records whose field bytes are `>= lower` and `< upper`. Either
    /// bound may be absent; bounds shorter than the field compare as a
    /// prefix.
    pub fn filter_range(
        self,
        field: &str,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> FwfResult<FwfScan<'a>> {
        self.push_filter(field, lower, upper, false)
    }

    /// Same as [`FwfScan::filter_range`], with `<= upper`.
    pub fn filter_range_inclusive(
        self,
        field: &str,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> FwfResult<FwfScan<'a>> {
        self.push_filter(field, lower, upper, true)
    }

    fn push_filter(
        mut self,
        field: &str,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        inclusive_upper: bool,
    ) -> FwfResult<FwfScan<'a>> {
        let spec = self.file.fields().field(field)?;
        for bound in lower.iter().chain(upper.iter()) {
            if bound.len() > spec.len() {
                return Err(FwfError::Schema(format!(
                    "range bound of {} bytes exceeds field '{}' ({} bytes)",
                    bound.len(),
                    field,
                    spec.len()
                )));
            }
        }
        self.filters.push(ScanFilter {
            start: spec.start(),
            lower: lower.map(<[u8]>::to_vec),
            upper: upper.map(<[u8]>::to_vec),
            inclusive_upper,
        });
        Ok(self)
    }

    /// Install a callback invoked once per record with the running count;
    /// returning false stops the scan.
    pub fn on_progress(mut self, callback: impl FnMut(usize) -> bool + 'a) -> FwfScan<'a> {
        self.progress = Some(Box::new(callback));
        self
    }

    fn matches(filters: &[ScanFilter], record: &[u8]) -> bool {
        for filter in filters {
            if let Some(lower) = &filter.lower {
                if &record[filter.start..filter.start + lower.len()] < lower.as_slice() {
                    return false;
                }
            }
            if let Some(upper) = &filter.upper {
                let value = &record[filter.start..filter.start + upper.len()];
                if filter.inclusive_upper {
                    if value > upper.as_slice() {
                        return false;
                    }
                } else if value >= upper.as_slice() {
                    return false;
                }
            }
        }
        true
    }

    fn scan<F>(&mut self, mut emit: F) -> FwfResult<()>
    where
        F: FnMut(usize, &'a [u8]) -> FwfResult<()>,
    {
        let data: &'a [u8] = self.file.data()?;
        let start_pos = self.file.start_pos();
        let fwidth = self.file.fwidth();
        let count = self.file.line_count();

        for index in 0..count {
            let pos = start_pos + index * fwidth;
            let record = &data[pos..(pos + fwidth).min(data.len())];
            if Self::matches(&self.filters, record) {
                emit(index, record)?;
            }
            if let Some(callback) = self.progress.as_mut() {
                if !callback(index + 1) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Line numbers of all matching records.
    pub fn collect_lines(mut self) -> FwfResult<Vec<usize>> {
        let mut lines = Vec::new();
        self.scan(|index, _| {
            lines.push(index);
            Ok(())
        })?;
        Ok(lines)
    }

    /// Matching records as a subset view of the file.
    pub fn into_subset(self) -> FwfResult<FwfSubset<'a>> {
        let file = self.file;
        let lines = self.collect_lines()?;
        Ok(FwfSubset::new(file, lines))
    }

    /// Extract a key per matching record and insert `(key, lineno + offset)`
    /// into the sink. The offset makes line numbers globally unique when
    /// several files feed one container.
    pub fn index_with<S, F>(
        mut self,
        field: FieldRef,
        offset: usize,
        sink: &mut S,
        make_key: F,
    ) -> FwfResult<()>
    where
        S: IndexSink,
        F: Fn(&[u8], usize) -> FwfResult<S::Key>,
    {
        let spec = field.resolve(self.file.fields())?;
        let name = spec.name().to_string();
        let (fstart, fstop) = (spec.start(), spec.stop());

        let mut indexed = 0;
        self.scan(|index, record| {
            let value = &record[fstart..fstop.min(record.len())];
            sink.insert(make_key(value, index)?, index + offset)?;
            indexed += 1;
            Ok(())
        })?;

        if indexed >= LARGE_SCAN {
            info!("indexed {} records on field '{}'", indexed, name);
        }
        Ok(())
    }

    /// Index with the raw field bytes as key.
    pub fn index_into<S>(self, field: FieldRef, offset: usize, sink: &mut S) -> FwfResult<()>
    where
        S: IndexSink<Key = Vec<u8>>,
    {
        self.index_with(field, offset, sink, |bytes, _| Ok(bytes.to_vec()))
    }

    /// Index with the field parsed as a decimal integer. A record whose
    /// field does not parse fails the whole scan, naming the line.
    pub fn index_int_into<S>(self, field: FieldRef, offset: usize, sink: &mut S) -> FwfResult<()>
    where
        S: IndexSink<Key = i64>,
    {
        self.index_with(field, offset, sink, int_key)
    }

    /// The whole field column of the matching records, one borrowed slice
    /// per record.
    pub fn field_column(mut self, field: FieldRef) -> FwfResult<Vec<&'a [u8]>> {
        let spec = field.resolve(self.file.fields())?;
        let (fstart, fstop) = (spec.start(), spec.stop());

        let mut column = Vec::with_capacity(self.file.line_count());
        self.scan(|_, record| {
            column.push(&record[fstart..fstop.min(record.len())]);
            Ok(())
        })?;
        Ok(column)
    }
}

impl<'a> fmt::Debug for FwfScan<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FwfScan")
            .field("file", &self.file)
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// Build one index across all children of a multi-file. Each child is
/// scanned with the kernel and its line numbers are offset by the
/// cumulative length of the children before it.
pub fn index_multi_file<S>(multi: &FwfMultiFile, field: FieldRef, sink: &mut S) -> FwfResult<()>
where
    S: IndexSink<Key = Vec<u8>>,
{
    let mut offset = 0;
    for file in multi.files() {
        FwfScan::new(file).index_into(field, offset, sink)?;
        offset += file.line_count();
    }
    Ok(())
}
