//! The view algebra: a uniform capability set over files, regions and
//! subsets, each resolving line numbers through a chain of parents.

use std::cmp::Ordering;
use std::iter::FusedIterator;

use encoding_rs::Encoding;
use rustc_hash::FxHashSet;

use crate::fieldspecs::{FwfFieldSpec, FwfFileFieldSpecs};
use crate::line::FwfLine;
use crate::{FwfError, FwfResult};

/// A predicate over one line, as produced by [`crate::operator::op`] or
/// written by hand. Errors raised inside (e.g. a failed numeric conversion)
/// propagate unchanged to the caller of the filter.
pub type LinePredicate = Box<dyn Fn(&FwfLine) -> FwfResult<bool>>;

/// Fold an end-relative index and check it addresses a line.
pub(crate) fn fold_index(index: isize, len: usize) -> FwfResult<usize> {
    let folded = if index < 0 { index + len as isize } else { index };
    if folded >= 0 && (folded as usize) < len {
        Ok(folded as usize)
    } else {
        Err(FwfError::OutOfBounds { index, len })
    }
}

/// Fold a slice endpoint; unlike a line index it may equal `len`, and
/// `None` picks the given default.
pub(crate) fn fold_endpoint(index: Option<isize>, default: usize, len: usize) -> FwfResult<usize> {
    let index = match index {
        None => return Ok(default),
        Some(index) => index,
    };
    let folded = if index < 0 { index + len as isize } else { index };
    if folded >= 0 && (folded as usize) <= len {
        Ok(folded as usize)
    } else {
        Err(FwfError::OutOfBounds { index, len })
    }
}

fn same_view(a: &dyn FwfViewLike, b: &dyn FwfViewLike) -> bool {
    std::ptr::eq(
        a as *const dyn FwfViewLike as *const u8,
        b as *const dyn FwfViewLike as *const u8,
    )
}

/// The shared capability set of every view.
///
/// Roots ([`crate::FwfFile`], [`crate::FwfMultiFile`]) own the bytes and
/// have no parent; [`FwfRegion`] and [`FwfSubset`] hold a parent reference
/// and their own address translation. All public indexing validates once at
/// the boundary; `parent_index` is pure translation.
pub trait FwfViewLike {
    /// Number of records in this view.
    fn count(&self) -> usize;

    fn fields(&self) -> &FwfFileFieldSpecs;

    fn parent(&self) -> Option<&dyn FwfViewLike>;

    /// Translate a view-local index into the parent's coordinates, without
    /// validation.
    fn parent_index(&self, index: usize) -> usize;

    /// The raw bytes of one record, validated against this view's length.
    fn raw_line_at(&self, index: usize) -> FwfResult<&[u8]>;

    fn as_view(&self) -> &dyn FwfViewLike;

    /// The encoding used for string conversions; resolved at the root.
    fn encoding(&self) -> &'static Encoding {
        match self.parent() {
            Some(parent) => parent.encoding(),
            None => encoding_rs::UTF_8,
        }
    }

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The line with the given index; negative indexes are end-relative.
    fn line_at(&self, index: isize) -> FwfResult<FwfLine<'_>> {
        let index = fold_index(index, self.count())?;
        let data = self.raw_line_at(index)?;
        Ok(FwfLine::new(self.as_view(), index, data))
    }

    /// A region over the already-validated `[start, stop)` window.
    fn region(&self, start: usize, stop: usize) -> FwfRegion<'_> {
        FwfRegion::new(self.as_view(), start, stop)
    }

    /// A subset over already-validated view-local line numbers.
    fn subset(&self, lines: Vec<usize>) -> FwfSubset<'_> {
        FwfSubset::new(self.as_view(), lines)
    }

    /// A region over `[start, stop)`. `None` endpoints default to the full
    /// view, negative endpoints are end-relative.
    fn slice(&self, start: Option<isize>, stop: Option<isize>) -> FwfResult<FwfRegion<'_>> {
        let len = self.count();
        let start = fold_endpoint(start, 0, len)?;
        let stop = fold_endpoint(stop, len, len)?;
        if start > stop {
            return Err(FwfError::OutOfBounds {
                index: start as isize,
                len: stop,
            });
        }
        Ok(self.region(start, stop))
    }

    /// A subset of the given lines; negative indexes are end-relative.
    fn select(&self, indices: &[isize]) -> FwfResult<FwfSubset<'_>> {
        let len = self.count();
        let lines = indices
            .iter()
            .map(|&index| fold_index(index, len))
            .collect::<FwfResult<Vec<_>>>()?;
        Ok(self.subset(lines))
    }

    /// A subset of the positions where `mask` is true. A mask shorter than
    /// the view implies false for the remaining lines; extra entries are
    /// ignored.
    fn mask(&self, mask: &[bool]) -> FwfSubset<'_> {
        let lines = mask
            .iter()
            .take(self.count())
            .enumerate()
            .filter_map(|(index, &keep)| if keep { Some(index) } else { None })
            .collect();
        self.subset(lines)
    }

    /// Iterate the lines of this view in ascending index order.
    fn iter(&self) -> Lines<'_> {
        Lines {
            view: self.as_view(),
            index: 0,
        }
    }

    /// Iterate the raw record bytes of this view.
    fn iter_lines(&self) -> RawLines<'_> {
        RawLines {
            view: self.as_view(),
            index: 0,
        }
    }

    /// Iterate the bytes of a single field across this view.
    fn iter_field(&self, field: &str) -> FwfResult<FieldValues<'_>> {
        let spec = self.fields().field(field)?;
        let (start, stop) = (spec.start(), spec.stop());
        Ok(FieldValues {
            view: self.as_view(),
            index: 0,
            start,
            stop,
        })
    }

    /// Walk the parent path and return the most outer view (or `stop`, when
    /// given and on the path) together with the translated line number.
    /// Pure translation: the index is not validated.
    fn rooted(&self, index: usize, stop: Option<&dyn FwfViewLike>) -> (&dyn FwfViewLike, usize) {
        let mut view = self.as_view();
        let mut index = index;
        loop {
            if let Some(stop) = stop {
                if same_view(view, stop) {
                    return (view, index);
                }
            }
            match view.parent() {
                Some(parent) => {
                    index = view.parent_index(index);
                    view = parent;
                }
                None => return (view, index),
            }
        }
    }

    /// Keep the lines matching the predicates, combined with AND (default)
    /// or OR. Evaluation short-circuits.
    fn filter(&self, preds: Vec<LinePredicate>, is_or: bool) -> FwfResult<FwfSubset<'_>> {
        self.filter_by_line(&|line: &FwfLine| {
            if is_or {
                for pred in &preds {
                    if pred(line)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            } else {
                for pred in &preds {
                    if !pred(line)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        })
    }

    /// Remove the lines matching the predicates.
    fn exclude(&self, preds: Vec<LinePredicate>, is_or: bool) -> FwfResult<FwfSubset<'_>> {
        self.filter_by_line(&|line: &FwfLine| {
            let matched = if is_or {
                let mut any = false;
                for pred in &preds {
                    if pred(line)? {
                        any = true;
                        break;
                    }
                }
                any
            } else {
                let mut all = true;
                for pred in &preds {
                    if !pred(line)? {
                        all = false;
                        break;
                    }
                }
                all
            };
            Ok(!matched)
        })
    }

    /// Keep the lines for which `func` returns true.
    fn filter_by_line(
        &self,
        func: &dyn Fn(&FwfLine) -> FwfResult<bool>,
    ) -> FwfResult<FwfSubset<'_>> {
        let mut lines = Vec::new();
        for entry in self.iter() {
            let line = entry?;
            if func(&line)? {
                lines.push(line.lineno());
            }
        }
        Ok(self.subset(lines))
    }

    /// Keep the lines whose field bytes satisfy `func`.
    fn filter_by_field(
        &self,
        field: &str,
        func: &dyn Fn(&[u8]) -> bool,
    ) -> FwfResult<FwfSubset<'_>> {
        let mut lines = Vec::new();
        for (index, value) in self.iter_field(field)?.enumerate() {
            if func(value?) {
                lines.push(index);
            }
        }
        Ok(self.subset(lines))
    }

    /// Keep the lines whose field bytes equal `value`.
    fn filter_by_field_value(&self, field: &str, value: &[u8]) -> FwfResult<FwfSubset<'_>> {
        self.filter_by_field(field, &|bytes| bytes == value)
    }

    /// A subset whose lines are ordered by the given field names, comparing
    /// the raw bytes lexicographically. Prepending `'-'` to a name sorts
    /// that key descending. The sort is stable, so ties fall through to
    /// later keys and finally to the original order.
    fn order_by(&self, keys: &[&str]) -> FwfResult<FwfSubset<'_>> {
        if keys.is_empty() {
            return Ok(self.subset((0..self.count()).collect()));
        }

        let sort_keys = keys
            .iter()
            .map(|key| SortKey::parse(self.fields(), key))
            .collect::<FwfResult<Vec<_>>>()?;

        let mut lines = Vec::with_capacity(self.count());
        for entry in self.iter_lines() {
            lines.push(entry?);
        }

        let mut order: Vec<usize> = (0..lines.len()).collect();
        order.sort_by(|&a, &b| {
            for key in &sort_keys {
                let cmp = key.slice(lines[a]).cmp(key.slice(lines[b]));
                if cmp != Ordering::Equal {
                    return if key.descending { cmp.reverse() } else { cmp };
                }
            }
            Ordering::Equal
        });

        Ok(self.subset(order))
    }

    /// The distinct value tuples of the given fields across this view.
    fn unique(&self, fields: &[&str]) -> FwfResult<FxHashSet<Vec<Vec<u8>>>> {
        let specs = fields
            .iter()
            .map(|name| self.fields().field(name))
            .collect::<FwfResult<Vec<&FwfFieldSpec>>>()?;

        let mut distinct = FxHashSet::default();
        for entry in self.iter_lines() {
            let line = entry?;
            distinct.insert(
                specs
                    .iter()
                    .map(|spec| spec.slice_of(line).to_vec())
                    .collect(),
            );
        }
        Ok(distinct)
    }
}

struct SortKey {
    start: usize,
    stop: usize,
    descending: bool,
}

impl SortKey {
    fn parse(fields: &FwfFileFieldSpecs, key: &str) -> FwfResult<SortKey> {
        let (name, descending) = match key.strip_prefix('-') {
            Some(name) => (name, true),
            None => (key, false),
        };
        let spec = fields.field(name)?;
        Ok(SortKey {
            start: spec.start(),
            stop: spec.stop(),
            descending,
        })
    }

    fn slice<'a>(&self, line: &'a [u8]) -> &'a [u8] {
        &line[self.start.min(line.len())..self.stop.min(line.len())]
    }
}

/// A contiguous half-open `[start, stop)` window on a parent view.
pub struct FwfRegion<'a> {
    parent: &'a dyn FwfViewLike,
    start: usize,
    stop: usize,
}

impl<'a> FwfRegion<'a> {
    pub fn new(parent: &'a dyn FwfViewLike, start: usize, stop: usize) -> FwfRegion<'a> {
        FwfRegion {
            parent,
            start,
            stop,
        }
    }

    /// First line in parent coordinates.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last line, in parent coordinates.
    pub fn stop(&self) -> usize {
        self.stop
    }
}

impl<'a> FwfViewLike for FwfRegion<'a> {
    fn count(&self) -> usize {
        self.stop - self.start
    }

    fn fields(&self) -> &FwfFileFieldSpecs {
        self.parent.fields()
    }

    fn parent(&self) -> Option<&dyn FwfViewLike> {
        Some(self.parent)
    }

    fn parent_index(&self, index: usize) -> usize {
        self.start + index
    }

    fn raw_line_at(&self, index: usize) -> FwfResult<&[u8]> {
        if index >= self.count() {
            return Err(FwfError::OutOfBounds {
                index: index as isize,
                len: self.count(),
            });
        }
        self.parent.raw_line_at(self.start + index)
    }

    fn as_view(&self) -> &dyn FwfViewLike {
        self
    }

    // Slicing a region composes onto its parent: the window is translated
    // into parent coordinates instead of nesting another hop.
    fn region(&self, start: usize, stop: usize) -> FwfRegion<'_> {
        FwfRegion::new(self.parent, self.start + start, self.start + stop)
    }

    fn subset(&self, lines: Vec<usize>) -> FwfSubset<'_> {
        let lines = lines.into_iter().map(|index| self.start + index).collect();
        FwfSubset::new(self.parent, lines)
    }
}

/// A view over an arbitrary ordered list of parent-space line numbers.
pub struct FwfSubset<'a> {
    parent: &'a dyn FwfViewLike,
    lines: Vec<usize>,
}

impl<'a> FwfSubset<'a> {
    pub fn new(parent: &'a dyn FwfViewLike, lines: Vec<usize>) -> FwfSubset<'a> {
        FwfSubset { parent, lines }
    }

    /// The parent-space line numbers, in view order.
    pub fn lines(&self) -> &[usize] {
        &self.lines
    }
}

impl<'a> FwfViewLike for FwfSubset<'a> {
    fn count(&self) -> usize {
        self.lines.len()
    }

    fn fields(&self) -> &FwfFileFieldSpecs {
        self.parent.fields()
    }

    fn parent(&self) -> Option<&dyn FwfViewLike> {
        Some(self.parent)
    }

    fn parent_index(&self, index: usize) -> usize {
        self.lines[index]
    }

    fn raw_line_at(&self, index: usize) -> FwfResult<&[u8]> {
        if index >= self.lines.len() {
            return Err(FwfError::OutOfBounds {
                index: index as isize,
                len: self.lines.len(),
            });
        }
        self.parent.raw_line_at(self.lines[index])
    }

    fn as_view(&self) -> &dyn FwfViewLike {
        self
    }

    // Selecting from a subset flattens through its own index list.
    fn subset(&self, lines: Vec<usize>) -> FwfSubset<'_> {
        let lines = lines.into_iter().map(|index| self.lines[index]).collect();
        FwfSubset::new(self.parent, lines)
    }
}

/// Iterator over the [`FwfLine`]s of a view.
pub struct Lines<'a> {
    view: &'a dyn FwfViewLike,
    index: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = FwfResult<FwfLine<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.view.count() {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some(
            self.view
                .raw_line_at(index)
                .map(|data| FwfLine::new(self.view, index, data)),
        )
    }

    /// Lines are addressed directly, so skipping does not touch the
    /// records in between.
    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        let target = self.index.checked_add(n)?;
        if target >= self.view.count() {
            self.index = self.view.count();
            return None;
        }
        self.index = target + 1;
        Some(
            self.view
                .raw_line_at(target)
                .map(|data| FwfLine::new(self.view, target, data)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.count() - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for Lines<'a> {}

impl<'a> FusedIterator for Lines<'a> {}

/// Iterator over the raw record bytes of a view.
pub struct RawLines<'a> {
    view: &'a dyn FwfViewLike,
    index: usize,
}

impl<'a> Iterator for RawLines<'a> {
    type Item = FwfResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.view.count() {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some(self.view.raw_line_at(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.count() - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for RawLines<'a> {}

impl<'a> FusedIterator for RawLines<'a> {}

/// Iterator over the bytes of one field across a view.
pub struct FieldValues<'a> {
    view: &'a dyn FwfViewLike,
    index: usize,
    start: usize,
    stop: usize,
}

impl<'a> Iterator for FieldValues<'a> {
    type Item = FwfResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.view.count() {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some(self.view.raw_line_at(index).map(|line| {
            &line[self.start.min(line.len())..self.stop.min(line.len())]
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.count() - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for FieldValues<'a> {}

impl<'a> FusedIterator for FieldValues<'a> {}
