//! Module `store` implements [RelationStore], the quintuple relation
//! store at the heart of a database. Every stored row is a quintuple
//! `(key_a, val_a, key_b, val_b, src)`, indexed from both sides: by
//! `(key_a, val_a)` and by `(key_b, val_b)`.
//!
//! Keys and sources are interned (`crate::intern::Interner`) so an
//! [Entry] carries small integer ids rather than owned strings. Entries
//! live in a slab (`Vec<Option<Entry>>` plus a free list) so deletion
//! reclaims its slot without shifting every other [EntryId].

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::intern::{Id, Interner};
use crate::spinlock::RWSpinlock;
use crate::value::Value;

/// Slab index identifying a stored [Entry]. Stable for as long as the
/// entry is not deleted; a deleted id may be reused by a later `add`.
pub type EntryId = u32;

/// A single stored quintuple. `key_a`/`key_b` and `src` are interned ids
/// resolved against the store's key and source interners respectively.
#[derive(Debug, Clone)]
pub struct Entry {
    key_a: Id,
    val_a: Value,
    key_b: Id,
    val_b: Value,
    src: Id,
}

impl Entry {
    pub fn key_a(&self) -> Id {
        self.key_a
    }

    pub fn val_a(&self) -> &Value {
        &self.val_a
    }

    pub fn key_b(&self) -> Id {
        self.key_b
    }

    pub fn val_b(&self) -> &Value {
        &self.val_b
    }

    pub fn src(&self) -> Id {
        self.src
    }

    /// The value and key on the side opposite `key_id`: PARENT navigation
    /// follows an edge to the value stored on the other side of the same
    /// entry. Returns `None` if `key_id` is neither side of this entry.
    pub fn other_side(&self, key_id: Id) -> Option<(Id, &Value)> {
        if key_id == self.key_a {
            Some((self.key_b, &self.val_b))
        } else if key_id == self.key_b {
            Some((self.key_a, &self.val_a))
        } else {
            None
        }
    }
}

/// The quintuple relation store. Not thread-safe on its own; callers
/// serialize access through [RWSpinlock] so a single writer transaction
/// excludes all other writers, while readers never block writers nor
/// each other.
pub struct RelationStore {
    keys: Interner,
    sources: Interner,
    entries: Vec<Option<Entry>>,
    free: Vec<EntryId>,
    // one Index per interned key id, covering every entry that has that
    // key on either side.
    indices: HashMap<Id, Index>,
    // idempotency / existence check for add and del, keyed on interned
    // ids so repeated string allocation is avoided on the hot path.
    lookup: HashMap<(Id, Value, Id, Value, Id), EntryId>,
    latch: RWSpinlock,
}

impl RelationStore {
    pub fn new() -> RelationStore {
        RelationStore {
            keys: Interner::new(),
            sources: Interner::new(),
            entries: Vec::new(),
            free: Vec::new(),
            indices: HashMap::new(),
            lookup: HashMap::new(),
            latch: RWSpinlock::new(),
        }
    }

    /// Rebuild a store from previously interned key/source tables, used
    /// when restoring a snapshot.
    pub fn from_interners(keys: Interner, sources: Interner) -> RelationStore {
        RelationStore {
            keys,
            sources,
            entries: Vec::new(),
            free: Vec::new(),
            indices: HashMap::new(),
            lookup: HashMap::new(),
            latch: RWSpinlock::new(),
        }
    }

    pub fn keys(&self) -> &Interner {
        &self.keys
    }

    pub fn sources(&self) -> &Interner {
        &self.sources
    }

    pub fn keys_mut(&mut self) -> &mut Interner {
        &mut self.keys
    }

    pub fn sources_mut(&mut self) -> &mut Interner {
        &mut self.sources
    }

    /// Insert `(key_a, val_a, key_b, val_b, src)`. Idempotent: adding an
    /// identical quintuple twice leaves the store unchanged and returns
    /// `false` the second time. `key_a == key_b` is not special-cased;
    /// the same index simply receives two independent registrations
    /// (see `DESIGN.md`).
    pub fn add(&mut self, key_a: &str, val_a: Value, key_b: &str, val_b: Value, src: &str) -> bool {
        let _w = self.latch.acquire_write(true);
        let ka = self.keys.intern(key_a);
        let kb = self.keys.intern(key_b);
        let s = self.sources.intern(src);

        let lookup_key = (ka, val_a.clone(), kb, val_b.clone(), s);
        if self.lookup.contains_key(&lookup_key) {
            return false;
        }

        let id = self.alloc_slot(Entry {
            key_a: ka,
            val_a: val_a.clone(),
            key_b: kb,
            val_b: val_b.clone(),
            src: s,
        });

        self.indices.entry(ka).or_insert_with(Index::new).insert(val_a, id);
        self.indices.entry(kb).or_insert_with(Index::new).insert(val_b, id);
        self.lookup.insert(lookup_key, id);
        true
    }

    /// Whether `(key_a, val_a, key_b, val_b, src)` is currently stored,
    /// without removing it. Returns `false`, rather than an error, for a
    /// name that was never interned (nothing matching it could ever have
    /// been added).
    pub fn contains(&self, key_a: &str, val_a: &Value, key_b: &str, val_b: &Value, src: &str) -> bool {
        let ka = match self.keys.lookup(key_a) {
            Some(id) => id,
            None => return false,
        };
        let kb = match self.keys.lookup(key_b) {
            Some(id) => id,
            None => return false,
        };
        let s = match self.sources.lookup(src) {
            Some(id) => id,
            None => return false,
        };
        let lookup_key = (ka, val_a.clone(), kb, val_b.clone(), s);
        self.lookup.contains_key(&lookup_key)
    }

    /// Remove `(key_a, val_a, key_b, val_b, src)`. Fails with
    /// [Error::UnknownKey]/[Error::UnknownSource] if any of the four
    /// names were never interned (nothing matching could ever have been
    /// added), and returns `Ok(false)` if no matching entry exists.
    pub fn del(&mut self, key_a: &str, val_a: &Value, key_b: &str, val_b: &Value, src: &str) -> Result<bool> {
        let _w = self.latch.acquire_write(true);
        let ka = self.keys.resolve(key_a)?;
        let kb = self.keys.resolve(key_b)?;
        let s = self
            .sources
            .lookup(src)
            .ok_or_else(|| Error::UnknownSource(src.to_string()))?;

        let lookup_key = (ka, val_a.clone(), kb, val_b.clone(), s);
        let id = match self.lookup.remove(&lookup_key) {
            Some(id) => id,
            None => return Ok(false),
        };

        if let Some(idx) = self.indices.get_mut(&ka) {
            idx.remove(val_a, id);
        }
        if let Some(idx) = self.indices.get_mut(&kb) {
            idx.remove(val_b, id);
        }
        self.free_slot(id);
        Ok(true)
    }

    /// Every entry that has `key_id` on either side, deduplicated.
    pub fn fetch_entries_for_key(&self, key_id: Id) -> Vec<EntryId> {
        match self.indices.get(&key_id) {
            Some(idx) => idx.all_entries(),
            None => Vec::new(),
        }
    }

    pub fn index_for_key(&self, key_id: Id) -> Option<&Index> {
        self.indices.get(&key_id)
    }

    /// Resolve `target_key`'s value(s) relative to an identity
    /// `(pivot_key, pivot_val)`: every entry that has `pivot_val` on the
    /// side anchored to `pivot_key` and `target_key` on its other side
    /// contributes that other side's `(src, value)` pair.
    ///
    /// This is the traversal the condition/fetch-spec layer uses to read
    /// an attribute of the row a driver entry identifies: filters on
    /// non-driver keys and result-column collection both look up the
    /// candidate's value set for a key this way.
    pub fn values_for_pivot(&self, pivot_key: Id, pivot_val: &Value, target_key: Id) -> Vec<(Id, &Value)> {
        let idx = match self.indices.get(&pivot_key) {
            Some(idx) => idx,
            None => return Vec::new(),
        };
        let ids = match idx.get(pivot_val) {
            Some(ids) => ids,
            None => return Vec::new(),
        };
        let mut out = Vec::new();
        for &id in ids {
            if let Some(entry) = self.get_entry(id) {
                if let Some((other_key, other_val)) = entry.other_side(pivot_key) {
                    if other_key == target_key {
                        out.push((entry.src(), other_val));
                    }
                }
            }
        }
        out
    }

    pub fn get_entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id as usize).and_then(|e| e.as_ref())
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Iterate every live entry id, in slab order. Used by snapshot
    /// serialization.
    pub fn iter_ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|_| i as EntryId))
    }

    fn alloc_slot(&mut self, entry: Entry) -> EntryId {
        if let Some(id) = self.free.pop() {
            self.entries[id as usize] = Some(entry);
            id
        } else {
            let id = self.entries.len() as EntryId;
            self.entries.push(Some(entry));
            id
        }
    }

    fn free_slot(&mut self, id: EntryId) {
        self.entries[id as usize] = None;
        self.free.push(id);
    }
}

impl Default for RelationStore {
    fn default() -> RelationStore {
        RelationStore::new()
    }
}

// A fresh RWSpinlock, never the source's lock state: a clone is always
// used to build a scratch overlay (see crate::query), never shared with
// the original's concurrent readers/writers.
impl Clone for RelationStore {
    fn clone(&self) -> RelationStore {
        RelationStore {
            keys: self.keys.clone(),
            sources: self.sources.clone(),
            entries: self.entries.clone(),
            free: self.free.clone(),
            indices: self.indices.clone(),
            lookup: self.lookup.clone(),
            latch: RWSpinlock::new(),
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
