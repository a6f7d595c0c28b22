//! A borrowed record handle with per-field accessors and conversions.

use std::borrow::Cow;
use std::fmt;

use chrono::NaiveDate;
use encoding_rs::Encoding;

use crate::fieldspecs::FwfFieldSpec;
use crate::view::FwfViewLike;
use crate::{FwfError, FwfResult};

/// One record of a view: the owning view, the line number relative to that
/// view, and the raw bytes including the trailing newline.
///
/// Field access borrows from the underlying mapping; converting into a
/// string, integer or date is explicit and happens per field, on demand.
#[derive(Clone, Copy)]
pub struct FwfLine<'a> {
    view: &'a dyn FwfViewLike,
    lineno: usize,
    data: &'a [u8],
}

impl<'a> FwfLine<'a> {
    pub fn new(view: &'a dyn FwfViewLike, lineno: usize, data: &'a [u8]) -> FwfLine<'a> {
        FwfLine { view, lineno, data }
    }

    /// Line number in the context of the owning view.
    pub fn lineno(&self) -> usize {
        self.lineno
    }

    pub fn view(&self) -> &'a dyn FwfViewLike {
        self.view
    }

    /// The raw record bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The raw bytes of the named field.
    pub fn get(&self, field: &str) -> FwfResult<&'a [u8]> {
        let spec = self.view.fields().field(field)?;
        Ok(spec.slice_of(self.data))
    }

    /// Same, but from a spec already at hand.
    pub fn get_spec(&self, spec: &FwfFieldSpec) -> &'a [u8] {
        spec.slice_of(self.data)
    }

    /// Decode the field with the view's encoding.
    pub fn str(&self, field: &str) -> FwfResult<Cow<'a, str>> {
        self.str_with(field, self.view.encoding())
    }

    /// Decode the field with an explicit encoding.
    pub fn str_with(&self, field: &str, encoding: &'static Encoding) -> FwfResult<Cow<'a, str>> {
        let bytes = self.get(field)?;
        let (decoded, _) = encoding.decode_without_bom_handling(bytes);
        Ok(decoded)
    }

    /// Parse the field as a decimal integer, ignoring surrounding blanks.
    pub fn int(&self, field: &str) -> FwfResult<i64> {
        let bytes = self.get(field)?;
        parse_int(bytes).ok_or_else(|| self.parse_error(bytes))
    }

    /// Parse the field as a date, `%Y%m%d`.
    pub fn date(&self, field: &str) -> FwfResult<NaiveDate> {
        self.date_with(field, "%Y%m%d")
    }

    /// Parse the field as a date with the given chrono format.
    pub fn date_with(&self, field: &str, fmt: &str) -> FwfResult<NaiveDate> {
        let bytes = self.get(field)?;
        let text = self.str_with(field, encoding_rs::UTF_8)?;
        NaiveDate::parse_from_str(text.trim(), fmt).map_err(|_| self.parse_error(bytes))
    }

    /// Re-home this line on the most outer view (or on `stop`, when given
    /// and on the parent path): same bytes, line number in root coordinates.
    pub fn rooted(&self, stop: Option<&'a dyn FwfViewLike>) -> FwfLine<'a> {
        let (view, lineno) = self.view.rooted(self.lineno, stop);
        FwfLine {
            view,
            lineno,
            data: self.data,
        }
    }

    /// All `(name, bytes)` pairs in schema order.
    pub fn items(&self) -> impl Iterator<Item = (&'a str, &'a [u8])> {
        let data = self.data;
        self.view
            .fields()
            .iter()
            .map(move |spec| (spec.name(), spec.slice_of(data)))
    }

    /// The bytes of the named fields, in the order given.
    pub fn to_vec(&self, fields: &[&str]) -> FwfResult<Vec<&'a [u8]>> {
        fields.iter().map(|name| self.get(name)).collect()
    }

    fn parse_error(&self, bytes: &[u8]) -> FwfError {
        FwfError::Parse {
            lineno: self.lineno,
            value: String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl<'a> fmt::Debug for FwfLine<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "FwfLine(lineno={}, data={:?})",
            self.lineno,
            String::from_utf8_lossy(self.data)
        )
    }
}

/// Decimal integer parse over raw ASCII, tolerant of the blank padding that
/// fixed-width fields carry.
pub(crate) fn parse_int(bytes: &[u8]) -> Option<i64> {
    let trimmed = trim_blanks(bytes);
    let (negative, digits) = match trimmed.first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if digits.is_empty() {
        return None;
    }

    let mut value: i64 = 0;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add(i64::from(byte - b'0'))?;
    }
    Some(if negative { -value } else { value })
}

pub(crate) fn trim_blanks(mut bytes: &[u8]) -> &[u8] {
    while let Some((first, rest)) = bytes.split_first() {
        if first.is_ascii_whitespace() || *first == 0 {
            bytes = rest;
        } else {
            break;
        }
    }
    while let Some((last, rest)) = bytes.split_last() {
        if last.is_ascii_whitespace() || *last == 0 {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}
