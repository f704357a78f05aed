//! Module `index` implements [Index], the per-key multimap from
//! [Value] to the set of entries sharing that value on the side that
//! key is anchored to.
//!
//! The map itself is always kept in `BINARY` (byte-wise) order, since
//! that is the native [Value] ordering. Traversal in BINARY order is
//! therefore the native order; CASELESS and COLLATE traversal is
//! produced on demand by re-sorting a snapshot of the map's entries
//! under the requested comparison mode — entries themselves carry the
//! cached caseless/collated forms (see `crate::value::Value`), so
//! repeated scans do not re-normalize.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::store::EntryId;
use crate::value::{CmpMode, Value};

#[derive(Debug, Default, Clone)]
pub struct Index {
    map: BTreeMap<Value, BTreeSet<EntryId>>,
}

impl Index {
    pub fn new() -> Index {
        Index::default()
    }

    /// Register that `id` has `value` on the side this index is
    /// anchored to. Idempotent: registering the same (value, id) pair
    /// twice is a no-op.
    pub fn insert(&mut self, value: Value, id: EntryId) {
        self.map.entry(value).or_insert_with(BTreeSet::new).insert(id);
    }

    /// Remove the registration of `id` under `value`. Returns whether a
    /// registration existed to remove.
    pub fn remove(&mut self, value: &Value, id: EntryId) -> bool {
        let removed = match self.map.get_mut(value) {
            Some(set) => set.remove(&id),
            None => false,
        };
        if removed {
            if let Some(set) = self.map.get(value) {
                if set.is_empty() {
                    self.map.remove(value);
                }
            }
        }
        removed
    }

    /// All entries registered under `value`, exact binary match.
    pub fn get(&self, value: &Value) -> Option<&BTreeSet<EntryId>> {
        self.map.get(value)
    }

    /// Union of every entry registered anywhere in this index, used by
    /// `RelationStore::fetch_entries_for_key`.
    pub fn all_entries(&self) -> Vec<EntryId> {
        let mut out: Vec<EntryId> = self.map.values().flat_map(|set| set.iter().copied()).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn value_count(&self) -> usize {
        self.map.len()
    }

    /// A binary-order range scan, the native `BTreeMap` traversal. Used
    /// by the planner for monotonic filters under `CmpMode::Binary`.
    pub fn range_binary(
        &self,
        lo: Bound<Value>,
        hi: Bound<Value>,
    ) -> impl Iterator<Item = (&Value, &BTreeSet<EntryId>)> {
        self.map.range((lo, hi))
    }

    /// A full scan ordered under `mode`, used both for non-monotonic
    /// filters (always, since they cannot use a range restriction) and
    /// for monotonic filters when `mode != Binary` (the BTreeMap's
    /// native order does not match the requested comparison mode, so no
    /// sub-range can be carved out without a linear pass first).
    pub fn scan_ordered(&self, mode: CmpMode) -> Vec<(&Value, &BTreeSet<EntryId>)> {
        let mut entries: Vec<(&Value, &BTreeSet<EntryId>)> = self.map.iter().collect();
        if mode != CmpMode::Binary {
            entries.sort_by(|(a, _), (b, _)| a.compare(b, mode));
        }
        entries
    }

    /// Total distinct entries across all values (not just values); may
    /// be larger than `value_count` since a value can be shared by many
    /// entries.
    pub fn entry_count(&self) -> usize {
        self.map.values().map(|set| set.len()).sum()
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
