//! Module `intern` implements the bidirectional string<->id tables used
//! for both interned keys and interned sources. Key interning is a
//! bidirectional map between key strings and small integer ids; new keys
//! allocate fresh ids monotonically. Source interning is identical.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Small integer id handed out by an [Interner]. Stable for the lifetime
/// of an open database; may change across opens unless pre-registered
/// via `known_keys`.
pub type Id = u32;

#[derive(Debug, Default, Clone)]
pub struct Interner {
    by_id: Vec<String>,
    by_name: HashMap<String, Id>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    /// Intern `name`, allocating a fresh id if it has not been seen
    /// before. Idempotent for a name already interned.
    pub fn intern(&mut self, name: &str) -> Id {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = self.by_id.len() as Id;
        self.by_id.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Resolve `name` to its id without creating one.
    pub fn lookup(&self, name: &str) -> Option<Id> {
        self.by_name.get(name).copied()
    }

    /// Resolve `name`, failing with the supplied error constructor if it
    /// has never been interned. Used by condition/fetch-spec binding,
    /// which resolves every key up front before evaluation starts.
    pub fn resolve(&self, name: &str) -> Result<Id> {
        self.lookup(name)
            .ok_or_else(|| Error::UnknownKey(name.to_string()))
    }

    pub fn name(&self, id: Id) -> Option<&str> {
        self.by_id.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &str)> {
        self.by_id.iter().enumerate().map(|(i, s)| (i as Id, s.as_str()))
    }

    /// Restore an interner from an ordered list of names read from a
    /// snapshot file's interned key table (count, then length-prefixed
    /// strings). Ids are assigned in list order.
    pub fn from_names(names: Vec<String>) -> Interner {
        let mut interner = Interner::new();
        for name in names {
            interner.intern(&name);
        }
        interner
    }
}

#[cfg(test)]
#[path = "intern_test.rs"]
mod intern_test;
