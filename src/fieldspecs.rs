//! Field specifications: which byte range of a record belongs to which name.

use std::ops::{Index, Range};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{FwfError, FwfResult};

/// Definition of a single field, as supplied by the caller.
///
/// The byte range can be given in any one of four shapes: `{len}`,
/// `{start, len}`, `{stop, len}` or `{start, stop}`; alternatively a
/// `{slice}` pair. Supplying a conflicting combination is an error. When only
/// `len` is given, the field starts at the current record length.
///
/// Any further attributes (`dtype`, `regex`, `default`, ...) are preserved
/// opaquely and can be read back from the resulting [`FwfFieldSpec`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub len: Option<usize>,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub stop: Option<usize>,
    #[serde(default)]
    pub slice: Option<(usize, usize)>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl FieldDef {
    /// A field of `len` bytes, starting wherever the previous field stopped.
    pub fn with_len(name: &str, len: usize) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            len: Some(len),
            ..FieldDef::default()
        }
    }

    /// A field covering the half-open byte range `[start, stop)`.
    pub fn with_span(name: &str, start: usize, stop: usize) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            start: Some(start),
            stop: Some(stop),
            ..FieldDef::default()
        }
    }

    /// Same as [`FieldDef::with_span`], but in the `slice` shape.
    pub fn with_slice(name: &str, slice: (usize, usize)) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            slice: Some(slice),
            ..FieldDef::default()
        }
    }

    /// Attach an opaque user attribute.
    pub fn attr(mut self, key: &str, value: Value) -> FieldDef {
        self.attrs.insert(key.to_string(), value);
        self
    }
}

/// Top-level schema input: the field list plus optional file attributes.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileSchema {
    pub fields: Vec<FieldDef>,
    /// Encoding label used when decoding fields into strings. Default UTF-8.
    #[serde(default)]
    pub encoding: Option<String>,
    /// Bytes recognized as record terminators. Default `{0, 1, 10, 13}`.
    #[serde(default)]
    pub newline: Option<Vec<u8>>,
    /// Leading character marking a comment line before the first record.
    /// Default `'#'`.
    #[serde(default)]
    pub comments: Option<char>,
    /// How far to look for the end of a single comment line before giving
    /// up. Default 2048 bytes.
    #[serde(default)]
    pub comment_scan_cap: Option<usize>,
}

impl FileSchema {
    pub fn new(fields: Vec<FieldDef>) -> FileSchema {
        FileSchema {
            fields,
            ..FileSchema::default()
        }
    }

    pub fn with_encoding(mut self, label: &str) -> FileSchema {
        self.encoding = Some(label.to_string());
        self
    }

    pub fn with_newline(mut self, bytes: Vec<u8>) -> FileSchema {
        self.newline = Some(bytes);
        self
    }

    pub fn with_comments(mut self, comment_char: char) -> FileSchema {
        self.comments = Some(comment_char);
        self
    }

    pub fn with_comment_scan_cap(mut self, cap: usize) -> FileSchema {
        self.comment_scan_cap = Some(cap);
        self
    }
}

/// A named byte range within a record.
#[derive(Clone, Debug)]
pub struct FwfFieldSpec {
    name: String,
    start: usize,
    stop: usize,
    attrs: Map<String, Value>,
}

impl FwfFieldSpec {
    /// Resolve a [`FieldDef`] against `startpos`, the record length
    /// accumulated so far, which is used when only `len` is given.
    pub fn new(startpos: usize, def: &FieldDef) -> FwfResult<FwfFieldSpec> {
        if def.name.is_empty() {
            return Err(FwfError::Schema("field name must not be empty".to_string()));
        }

        let mut field = FwfFieldSpec {
            name: def.name.clone(),
            start: 0,
            stop: 0,
            attrs: def.attrs.clone(),
        };
        field.set_pos(startpos, def)?;
        Ok(field)
    }

    /// Re-compute start and stop from a definition. Exactly one valid shape
    /// combination must be present.
    pub fn set_pos(&mut self, startpos: usize, def: &FieldDef) -> FwfResult<()> {
        let (start, stop) = match (def.slice, def.len, def.start, def.stop) {
            (Some(_), Some(_), _, _) | (Some(_), _, Some(_), _) | (Some(_), _, _, Some(_)) => {
                return Err(self.conflict("'slice' excludes 'start', 'stop' and 'len'"));
            }
            (Some((start, stop)), None, None, None) => (start, stop),
            (None, Some(_), Some(_), Some(_)) => {
                return Err(self.conflict("'start' and 'len' exclude 'stop'"));
            }
            (None, Some(len), Some(start), None) => (start, start + len),
            (None, Some(len), None, Some(stop)) => {
                if stop < len {
                    return Err(FwfError::Schema(format!(
                        "field '{}': 'stop' ({}) is shorter than 'len' ({})",
                        self.name, stop, len
                    )));
                }
                (stop - len, stop)
            }
            (None, None, Some(start), Some(stop)) => (start, stop),
            (None, Some(len), None, None) => (startpos, startpos + len),
            (None, None, _, _) => {
                return Err(FwfError::Schema(format!(
                    "field '{}' requires one of 'len', 'slice', 'start'/'stop' combinations",
                    self.name
                )));
            }
        };

        if stop < start {
            return Err(FwfError::Schema(format!(
                "field '{}': stop ({}) must not precede start ({})",
                self.name, stop, start
            )));
        }
        let len = stop - start;
        if len == 0 || len >= 1000 {
            return Err(FwfError::Schema(format!(
                "field '{}': length must be in 1..1000, got {}",
                self.name, len
            )));
        }

        self.start = start;
        self.stop = stop;
        Ok(())
    }

    fn conflict(&self, detail: &str) -> FwfError {
        FwfError::Schema(format!("field '{}': {}", self.name, detail))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inclusive first byte of the field within a record.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Exclusive last byte of the field within a record.
    pub fn stop(&self) -> usize {
        self.stop
    }

    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.stop
    }

    /// Opaque user attribute attached to the definition, if any.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// The field's bytes within a single record. The record may be short of
    /// its trailing newline; field bytes themselves are always present.
    pub fn slice_of<'a>(&self, record: &'a [u8]) -> &'a [u8] {
        &record[self.start.min(record.len())..self.stop.min(record.len())]
    }
}

/// The ordered collection of all field specs of a file, with the cached
/// record length (the maximum stop over all fields -- specs may contain gaps
/// or overlaps, so it is not the sum).
#[derive(Clone, Debug, Default)]
pub struct FwfFileFieldSpecs {
    fields: IndexMap<String, FwfFieldSpec>,
    reclen: usize,
}

impl FwfFileFieldSpecs {
    pub fn new(defs: &[FieldDef]) -> FwfResult<FwfFileFieldSpecs> {
        let mut fields = IndexMap::new();
        let mut startpos = 0;
        for def in defs {
            if fields.contains_key(&def.name) {
                return Err(FwfError::Schema(format!(
                    "field names must be unique: '{}'",
                    def.name
                )));
            }
            let field = FwfFieldSpec::new(startpos, def)?;
            startpos = (startpos + field.len()).max(field.stop());
            fields.insert(def.name.clone(), field);
        }

        let reclen = Self::record_length(&fields);
        Ok(FwfFileFieldSpecs { fields, reclen })
    }

    fn record_length(fields: &IndexMap<String, FwfFieldSpec>) -> usize {
        fields.values().map(|f| f.stop()).max().unwrap_or(0)
    }

    /// Record length in bytes, excluding the newline.
    pub fn reclen(&self) -> usize {
        self.reclen
    }

    pub fn get(&self, name: &str) -> Option<&FwfFieldSpec> {
        self.fields.get(name)
    }

    pub fn field(&self, name: &str) -> FwfResult<&FwfFieldSpec> {
        self.get(name)
            .ok_or_else(|| FwfError::Schema(format!("no such field: '{}'", name)))
    }

    /// Field at the given schema position.
    pub fn at(&self, index: usize) -> Option<&FwfFieldSpec> {
        self.fields.get_index(index).map(|(_, field)| field)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FwfFieldSpec> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Append a field; a `len`-only definition starts at the current record
    /// length.
    pub fn add_field(&mut self, def: &FieldDef) -> FwfResult<()> {
        if self.fields.contains_key(&def.name) {
            return Err(FwfError::Schema(format!(
                "field names must be unique: '{}'",
                def.name
            )));
        }
        let field = FwfFieldSpec::new(self.reclen, def)?;
        self.fields.insert(def.name.clone(), field);
        self.reclen = Self::record_length(&self.fields);
        Ok(())
    }

    /// Re-position an existing field from a fresh definition.
    pub fn update_field(&mut self, name: &str, def: &FieldDef) -> FwfResult<()> {
        let field = self
            .fields
            .get_mut(name)
            .ok_or_else(|| FwfError::Schema(format!("no such field: '{}'", name)))?;
        field.set_pos(0, def)?;
        self.reclen = Self::record_length(&self.fields);
        Ok(())
    }

    /// A copy restricted to (and re-ordered by) the given field names,
    /// e.g. for projection at the view layer.
    pub fn clone_select(&self, names: &[&str]) -> FwfResult<FwfFileFieldSpecs> {
        let mut fields = IndexMap::new();
        for name in names {
            let field = self.field(name)?;
            fields.insert(name.to_string(), field.clone());
        }
        let reclen = Self::record_length(&fields);
        Ok(FwfFileFieldSpecs { fields, reclen })
    }
}

impl Index<&str> for FwfFileFieldSpecs {
    type Output = FwfFieldSpec;

    fn index(&self, name: &str) -> &FwfFieldSpec {
        match self.get(name) {
            Some(field) => field,
            None => panic!("no such field: '{}'", name),
        }
    }
}

impl<'a> IntoIterator for &'a FwfFileFieldSpecs {
    type Item = &'a FwfFieldSpec;
    type IntoIter = indexmap::map::Values<'a, String, FwfFieldSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.values()
    }
}
