//! A memory-optimized container for non-unique indices.
//!
//! A key-to-list hash map with tens of millions of postings spends most of
//! its memory on the per-key list allocations. This container keeps all
//! posting lists in two shared integer arenas instead: `lineno` holds the
//! values and `next` chains each key's entries as a linked list (slot 0 is
//! the end-of-list sentinel). A third arena, `end`, remembers each list's
//! tail so appends stay O(1) while the index is being built.
//!
//! Once construction is done, [`PackedPostingStore::finalize`] compacts
//! every list into a contiguous `(run length, lineno...)` group inside a
//! single `data` array and releases the three construction arenas. After
//! that, lookups are zero-copy subslices and the container is read-only.
//!
//! Prefer this backing over [`super::ListStore`] when the line count
//! exceeds a few million.

use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use rustc_hash::FxHashMap;

use super::{checked_lineno, IndexSink, IndexStore};
use crate::{FwfError, FwfResult};

pub struct PackedPostingStore<K> {
    index: FxHashMap<K, u32>,
    next: Vec<u32>,
    end: Vec<u32>,
    lineno: Vec<u32>,
    data: Vec<u32>,
    last: usize,
    maxsize: usize,
    finalized: bool,
}

impl<K: Eq + Hash> PackedPostingStore<K> {
    /// `maxsize` bounds the overall number of postings (lines), not the
    /// number of keys.
    pub fn new(maxsize: usize) -> PackedPostingStore<K> {
        PackedPostingStore {
            index: FxHashMap::default(),
            next: vec![0; maxsize + 1],
            end: vec![0; maxsize + 1],
            lineno: vec![0; maxsize + 1],
            data: Vec::new(),
            last: 0,
            maxsize,
            finalized: false,
        }
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    /// Number of postings appended so far.
    pub fn posting_count(&self) -> usize {
        self.last
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn append(&mut self, key: K, lineno: u32) -> FwfResult<()> {
        if self.finalized {
            return Err(FwfError::InvalidState(
                "packed posting store is finalized",
            ));
        }
        if self.last >= self.maxsize {
            return Err(FwfError::Capacity(self.maxsize));
        }

        self.last += 1;
        let slot = self.last as u32;
        self.lineno[self.last] = lineno;

        match self.index.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                self.end[self.last] = slot;
            }
            Entry::Occupied(head) => {
                let head = *head.get() as usize;
                let tail = self.end[head] as usize;
                self.next[tail] = slot;
                self.end[head] = slot;
            }
        }
        Ok(())
    }

    /// Compact all posting lists into contiguous runs and release the
    /// construction arenas. Lookups before and after return the same
    /// sequences; appending afterwards is an error. Idempotent.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }

        let mut data = vec![0u32; self.last + self.index.len() + 1];
        let mut cursor = 1; // slot 0 stays reserved
        for head in self.index.values_mut() {
            let run_start = cursor;
            cursor += 1;
            let mut node = *head as usize;
            let mut run_length = 0u32;
            while node != 0 {
                data[cursor] = self.lineno[node];
                cursor += 1;
                run_length += 1;
                node = self.next[node] as usize;
            }
            data[run_start] = run_length;
            *head = run_start as u32;
        }

        self.data = data;
        self.next = Vec::new();
        self.end = Vec::new();
        self.lineno = Vec::new();
        self.finalized = true;
    }

    /// True when no key carries more than one posting. A unique index does
    /// not benefit from this container; use a plain map for those.
    pub fn is_unique(&self) -> bool {
        if self.finalized {
            self.index.values().all(|&head| self.data[head as usize] == 1)
        } else {
            self.next[1..=self.last].iter().all(|&slot| slot == 0)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, Cow<'_, [u32]>)> {
        self.index
            .keys()
            .filter_map(move |key| self.get(key).map(|postings| (key, postings)))
    }

    pub fn get(&self, key: &K) -> Option<Cow<'_, [u32]>> {
        let head = *self.index.get(key)? as usize;
        if self.finalized {
            let run_length = self.data[head] as usize;
            Some(Cow::Borrowed(&self.data[head + 1..head + 1 + run_length]))
        } else {
            let mut postings = Vec::new();
            let mut node = head;
            while node != 0 {
                postings.push(self.lineno[node]);
                node = self.next[node] as usize;
            }
            Some(Cow::Owned(postings))
        }
    }
}

impl<K: Eq + Hash> IndexSink for PackedPostingStore<K> {
    type Key = K;

    fn insert(&mut self, key: K, lineno: usize) -> FwfResult<()> {
        let lineno = checked_lineno(lineno)?;
        self.append(key, lineno)
    }
}

impl<K: Eq + Hash> IndexStore for PackedPostingStore<K> {
    fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<Cow<'_, [u32]>> {
        PackedPostingStore::get(self, key)
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn keys(&self) -> Box<dyn Iterator<Item = &K> + '_> {
        Box::new(self.index.keys())
    }
}
