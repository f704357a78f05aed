//! Module `fetchspec` implements [FetchSpec]: an ordered list of
//! columns, each naming a key, an optional source preference,
//! and flags describing which side of a matched entry the column reads
//! from relative to the row's pivot.
//!
//! Grounded on `s4_fetchspec_t` (`s4_fetchspec_create`/`_add`/`_get_key`/
//! `_get_sourcepref`/`_get_flags`/`_update_key`): a flat, ordered vector
//! of columns rather than a tree, unlike [crate::condition::Condition].

use crate::error::Result;
use crate::intern::Id;
use crate::sourcepref::SourcePref;
use crate::store::RelationStore;

/// `S4_FETCH_DATA` / `S4_FETCH_PARENT`. `Data` (the default) resolves a
/// column relative to the candidate row's pivot side; `Parent` resolves
/// it relative to the driver's anchor side instead, following the edge
/// back the other way — the same DATA/PARENT split documented in
/// `crate::condition`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchFlags {
    Data,
    Parent,
}

impl Default for FetchFlags {
    fn default() -> FetchFlags {
        FetchFlags::Data
    }
}

/// One column of a [FetchSpec].
pub struct FetchColumn {
    key: String,
    pref: SourcePref,
    flags: FetchFlags,
}

impl FetchColumn {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn sourcepref(&self) -> &SourcePref {
        &self.pref
    }

    pub fn flags(&self) -> FetchFlags {
        self.flags
    }
}

/// An ordered list of columns to project for each row surviving a
/// condition tree. Built up builder-style and shared read-only across
/// transactions the way [crate::condition::Condition] is.
#[derive(Default)]
pub struct FetchSpec {
    columns: Vec<FetchColumn>,
}

impl FetchSpec {
    pub fn new() -> FetchSpec {
        FetchSpec { columns: Vec::new() }
    }

    /// `s4_fetchspec_add`: append a column, builder-style.
    pub fn add(mut self, key: &str, pref: SourcePref, flags: FetchFlags) -> FetchSpec {
        self.columns.push(FetchColumn {
            key: key.to_string(),
            pref,
            flags,
        });
        self
    }

    pub fn size(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[FetchColumn] {
        &self.columns
    }

    /// `s4_fetchspec_update_key`: resolve every column's key string
    /// against `store`'s key interner up front, so the query evaluator
    /// does not repeat the lookup per row. Fails with
    /// [crate::error::Error::UnknownKey] for the first never-interned
    /// key.
    pub fn bind(&self, store: &RelationStore) -> Result<Vec<(Id, &FetchColumn)>> {
        self.columns
            .iter()
            .map(|col| store.keys().resolve(&col.key).map(|id| (id, col)))
            .collect()
    }
}

#[cfg(test)]
#[path = "fetchspec_test.rs"]
mod fetchspec_test;
