//! Secondary indices: mappings from field values to line numbers.
//!
//! Containers come in two flavors behind one insertion protocol: non-unique
//! (a key maps to every line that carried it, in encounter order) and unique
//! (the last line wins, which is the right call for append-only change
//! logs). Builders populate a caller-supplied container, so the same build
//! loop serves a plain hash map, the unique map and the packed posting
//! store alike.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::hash::Hash;

use log::info;
use rustc_hash::FxHashMap;

use crate::fieldspecs::{FwfFieldSpec, FwfFileFieldSpecs};
use crate::file::FwfFile;
use crate::line::{parse_int, FwfLine};
use crate::view::{FwfSubset, FwfViewLike};
use crate::{FwfError, FwfResult};

pub mod packed;


pub use packed::PackedPostingStore;

/// Log a build once it covered at least this many records.
const LARGE_BUILD: usize = 1_000_000;

/// A field, selected by name or by schema position.
#[derive(Clone, Copy, Debug)]
pub enum FieldRef<'a> {
    Name(&'a str),
    Pos(usize),
}

impl<'a> FieldRef<'a> {
    pub(crate) fn resolve<'s>(&self, fields: &'s FwfFileFieldSpecs) -> FwfResult<&'s FwfFieldSpec> {
        match self {
            FieldRef::Name(name) => fields.field(name),
            FieldRef::Pos(position) => fields.at(*position).ok_or_else(|| {
                FwfError::Schema(format!("no field at position {}", position))
            }),
        }
    }
}

impl<'a> From<&'a str> for FieldRef<'a> {
    fn from(name: &'a str) -> FieldRef<'a> {
        FieldRef::Name(name)
    }
}

impl From<usize> for FieldRef<'static> {
    fn from(position: usize) -> FieldRef<'static> {
        FieldRef::Pos(position)
    }
}

/// The unified assignment interface of every index container: multi-valued
/// containers append on key collision, unique containers replace. Builders
/// rely on this so both kinds can be populated by the same loop.
pub trait IndexSink {
    type Key;

    fn insert(&mut self, key: Self::Key, lineno: usize) -> FwfResult<()>;
}

/// The read side of an index container. Postings are `u32` line numbers in
/// encounter order.
pub trait IndexStore: IndexSink {
    fn contains(&self, key: &Self::Key) -> bool;

    /// The postings for a key. Borrowed where the container permits,
    /// materialized otherwise.
    fn get(&self, key: &Self::Key) -> Option<Cow<'_, [u32]>>;

    /// Number of distinct keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &Self::Key> + '_>;
}

/// Multi-valued container: key to list of line numbers.
#[derive(Debug)]
pub struct ListStore<K> {
    map: FxHashMap<K, Vec<u32>>,
}

impl<K> Default for ListStore<K> {
    fn default() -> ListStore<K> {
        ListStore {
            map: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash> ListStore<K> {
    pub fn new() -> ListStore<K> {
        ListStore::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &[u32])> {
        self.map.iter().map(|(key, lines)| (key, lines.as_slice()))
    }
}

impl<K: Eq + Hash> IndexSink for ListStore<K> {
    type Key = K;

    fn insert(&mut self, key: K, lineno: usize) -> FwfResult<()> {
        let lineno = checked_lineno(lineno)?;
        self.map.entry(key).or_default().push(lineno);
        Ok(())
    }
}

impl<K: Eq + Hash> IndexStore for ListStore<K> {
    fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<Cow<'_, [u32]>> {
        self.map.get(key).map(|lines| Cow::Borrowed(lines.as_slice()))
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_> {
        Box::new(self.map.keys())
    }
}

/// Unique container: key to single line number, last write wins.
#[derive(Debug)]
pub struct UniqueStore<K> {
    map: FxHashMap<K, u32>,
}

impl<K> Default for UniqueStore<K> {
    fn default() -> UniqueStore<K> {
        UniqueStore {
            map: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash> UniqueStore<K> {
    pub fn new() -> UniqueStore<K> {
        UniqueStore::default()
    }

    /// The line number recorded for a key.
    pub fn lineno(&self, key: &K) -> Option<usize> {
        self.map.get(key).map(|&lineno| lineno as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, usize)> {
        self.map.iter().map(|(key, &lineno)| (key, lineno as usize))
    }
}

impl<K: Eq + Hash> IndexSink for UniqueStore<K> {
    type Key = K;

    fn insert(&mut self, key: K, lineno: usize) -> FwfResult<()> {
        let lineno = checked_lineno(lineno)?;
        self.map.insert(key, lineno);
        Ok(())
    }
}

impl<K: Eq + Hash> IndexStore for UniqueStore<K> {
    fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<Cow<'_, [u32]>> {
        self.map.get(key).map(|&lineno| Cow::Owned(vec![lineno]))
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_> {
        Box::new(self.map.keys())
    }
}

pub(crate) fn checked_lineno(lineno: usize) -> FwfResult<u32> {
    u32::try_from(lineno).map_err(|_| FwfError::Capacity(lineno))
}

pub(crate) fn int_key(bytes: &[u8], lineno: usize) -> FwfResult<i64> {
    parse_int(bytes).ok_or_else(|| FwfError::Parse {
        lineno,
        value: String::from_utf8_lossy(bytes).into_owned(),
    })
}

/// A multi-valued index bound to the view it was built over: lookups return
/// the matching lines as a [`FwfSubset`].
pub struct FwfIndexDict<'a, S> {
    view: &'a dyn FwfViewLike,
    store: S,
}

impl<'a, K: Eq + Hash> FwfIndexDict<'a, ListStore<K>> {
    pub fn new(view: &'a dyn FwfViewLike) -> FwfIndexDict<'a, ListStore<K>> {
        FwfIndexDict::with_store(view, ListStore::new())
    }
}

impl<'a, S: IndexStore> FwfIndexDict<'a, S> {
    /// Bind a caller-supplied container, e.g. a
    /// [`PackedPostingStore`] for files beyond a few million lines.
    pub fn with_store(view: &'a dyn FwfViewLike, store: S) -> FwfIndexDict<'a, S> {
        FwfIndexDict { view, store }
    }

    pub fn view(&self) -> &'a dyn FwfViewLike {
        self.view
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains(&self, key: &S::Key) -> bool {
        self.store.contains(key)
    }

    pub fn insert(&mut self, key: S::Key, lineno: usize) -> FwfResult<()> {
        self.store.insert(key, lineno)
    }

    /// All lines recorded for the key, as a subset of the bound view.
    pub fn get(&self, key: &S::Key) -> Option<FwfSubset<'a>> {
        self.store.get(key).map(|postings| {
            let lines = postings.iter().map(|&lineno| lineno as usize).collect();
            FwfSubset::new(self.view, lines)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S::Key, FwfSubset<'a>)> + '_ {
        let view = self.view;
        self.store.keys().filter_map(move |key| {
            self.store.get(key).map(|postings| {
                let lines = postings.iter().map(|&lineno| lineno as usize).collect();
                (key, FwfSubset::new(view, lines))
            })
        })
    }
}

/// A unique index bound to the view it was built over: lookups return the
/// single matching line.
pub struct FwfUniqueIndexDict<'a, K> {
    view: &'a dyn FwfViewLike,
    store: UniqueStore<K>,
}

impl<'a, K: Eq + Hash> FwfUniqueIndexDict<'a, K> {
    pub fn new(view: &'a dyn FwfViewLike) -> FwfUniqueIndexDict<'a, K> {
        FwfUniqueIndexDict {
            view,
            store: UniqueStore::new(),
        }
    }

    pub fn store(&self) -> &UniqueStore<K> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut UniqueStore<K> {
        &mut self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.store.contains(key)
    }

    pub fn insert(&mut self, key: K, lineno: usize) -> FwfResult<()> {
        self.store.insert(key, lineno)
    }

    /// The line last recorded for the key.
    pub fn get(&self, key: &K) -> FwfResult<Option<FwfLine<'a>>> {
        match self.store.lineno(key) {
            None => Ok(None),
            Some(lineno) => self.view.line_at(lineno as isize).map(Some),
        }
    }
}

/// Index construction with a plain per-record loop over any view.
pub struct FwfIndexBuilder<'v> {
    view: &'v dyn FwfViewLike,
    progress: Option<Box<dyn FnMut(usize) -> bool + 'v>>,
}

impl<'v> FwfIndexBuilder<'v> {
    pub fn new(view: &'v dyn FwfViewLike) -> FwfIndexBuilder<'v> {
        FwfIndexBuilder {
            view,
            progress: None,
        }
    }

    /// Install a callback invoked once per record with the running count;
    /// returning false stops the build.
    pub fn on_progress(mut self, callback: impl FnMut(usize) -> bool + 'v) -> FwfIndexBuilder<'v> {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Populate `sink` with `make_key(field bytes, lineno)` for every line
    /// of the view.
    pub fn build<S, F>(&mut self, field: FieldRef, sink: &mut S, make_key: F) -> FwfResult<()>
    where
        S: IndexSink,
        F: Fn(&[u8], usize) -> FwfResult<S::Key>,
    {
        let view = self.view;
        let spec = field.resolve(view.fields())?;
        let name = spec.name().to_string();

        let mut built = 0;
        for (lineno, value) in view.iter_field(&name)?.enumerate() {
            sink.insert(make_key(value?, lineno)?, lineno)?;
            built = lineno + 1;
            if let Some(callback) = self.progress.as_mut() {
                if !callback(built) {
                    break;
                }
            }
        }

        if built >= LARGE_BUILD {
            info!("indexed {} records on field '{}'", built, name);
        }
        Ok(())
    }

    pub fn build_bytes<S>(&mut self, field: FieldRef, sink: &mut S) -> FwfResult<()>
    where
        S: IndexSink<Key = Vec<u8>>,
    {
        self.build(field, sink, |bytes, _| Ok(bytes.to_vec()))
    }

    pub fn build_int<S>(&mut self, field: FieldRef, sink: &mut S) -> FwfResult<()>
    where
        S: IndexSink<Key = i64>,
    {
        self.build(field, sink, |bytes, lineno| int_key(bytes, lineno))
    }
}

/// Index construction that materializes the whole field column first and
/// folds it into the container afterwards. Same output as
/// [`FwfIndexBuilder`], different memory profile.
pub struct FwfColumnIndexBuilder<'v> {
    file: &'v FwfFile,
    progress: Option<Box<dyn FnMut(usize) -> bool + 'v>>,
}

impl<'v> FwfColumnIndexBuilder<'v> {
    pub fn new(file: &'v FwfFile) -> FwfColumnIndexBuilder<'v> {
        FwfColumnIndexBuilder {
            file,
            progress: None,
        }
    }

    pub fn on_progress(
        mut self,
        callback: impl FnMut(usize) -> bool + 'v,
    ) -> FwfColumnIndexBuilder<'v> {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn build<S, F>(&mut self, field: FieldRef, sink: &mut S, make_key: F) -> FwfResult<()>
    where
        S: IndexSink,
        F: Fn(&[u8], usize) -> FwfResult<S::Key>,
    {
        let spec = field.resolve(self.file.fields())?;
        let name = spec.name().to_string();

        let column: Vec<&[u8]> = self.file.iter_field_bytes(&name)?.collect();
        let mut built = 0;
        for (lineno, value) in column.into_iter().enumerate() {
            sink.insert(make_key(value, lineno)?, lineno)?;
            built = lineno + 1;
            if let Some(callback) = self.progress.as_mut() {
                if !callback(built) {
                    break;
                }
            }
        }

        if built >= LARGE_BUILD {
            info!("indexed {} records on field '{}'", built, name);
        }
        Ok(())
    }

    pub fn build_bytes<S>(&mut self, field: FieldRef, sink: &mut S) -> FwfResult<()>
    where
        S: IndexSink<Key = Vec<u8>>,
    {
        self.build(field, sink, |bytes, _| Ok(bytes.to_vec()))
    }

    pub fn build_int<S>(&mut self, field: FieldRef, sink: &mut S) -> FwfResult<()>
    where
        S: IndexSink<Key = i64>,
    {
        self.build(field, sink, |bytes, lineno| int_key(bytes, lineno))
    }
}
