//! Module `value` implements [Value], the typed value carried on either
//! side of a stored [crate::store::Entry].
//!
//! A value is either a UTF-8 string or a 32-bit signed integer (`s4_val_t`
//! in the original interface has exactly these two variants). Strings carry
//! two lazily-computed, cached normalizations used for comparison:
//! caseless (folded) and collated (locale-ish sort key).
//!
//! The cache uses `Mutex` rather than `RefCell`: values are stored inside
//! a [crate::store::RelationStore] shared across threads behind a
//! `RwLock`, so the cache itself has to be `Sync`.

use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
    sync::Mutex,
};

use crate::error::{Error, Result};

/// How two values should be compared. Mirrors `s4_cmp_mode_t`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CmpMode {
    /// Byte-wise comparison.
    Binary,
    /// Compare casefolded forms of strings.
    Caseless,
    /// Compare collated (locale-aware) sort keys.
    Collate,
}

#[derive(Debug)]
struct StringForms {
    caseless: Mutex<Option<String>>,
    collated: Mutex<Option<String>>,
}

impl Clone for StringForms {
    fn clone(&self) -> StringForms {
        StringForms {
            caseless: Mutex::new(self.caseless.lock().unwrap().clone()),
            collated: Mutex::new(self.collated.lock().unwrap().clone()),
        }
    }
}

impl StringForms {
    fn new() -> StringForms {
        StringForms {
            caseless: Mutex::new(None),
            collated: Mutex::new(None),
        }
    }
}

/// A typed, comparable value. Cheap to clone (strings are reference
/// counted internally via `Rc`-free `String` clone at construction time
/// only; the store deep-copies on insert per the relation-store contract).
#[derive(Debug, Clone)]
pub struct Value {
    inner: Inner,
}

#[derive(Debug, Clone)]
enum Inner {
    Str { s: String, forms: StringForms },
    Int(i32),
}

impl Value {
    /// Construct a string value.
    pub fn new_string<S: Into<String>>(s: S) -> Value {
        Value {
            inner: Inner::Str {
                s: s.into(),
                forms: StringForms::new(),
            },
        }
    }

    /// Construct an integer value.
    pub fn new_int(i: i32) -> Value {
        Value {
            inner: Inner::Int(i),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.inner, Inner::Str { .. })
    }

    pub fn is_int(&self) -> bool {
        matches!(self.inner, Inner::Int(_))
    }

    /// Extract the raw string. Fails with [Error::WrongType] if this is
    /// an integer value.
    pub fn as_str(&self) -> Result<&str> {
        match &self.inner {
            Inner::Str { s, .. } => Ok(s.as_str()),
            Inner::Int(_) => Err(Error::WrongType),
        }
    }

    /// Extract the raw integer. Fails with [Error::WrongType] if this is
    /// a string value.
    pub fn as_int(&self) -> Result<i32> {
        match &self.inner {
            Inner::Int(i) => Ok(*i),
            Inner::Str { .. } => Err(Error::WrongType),
        }
    }

    /// Extract the casefolded form of a string value, computing and
    /// caching it on first access. Fails with [Error::WrongType] for
    /// integer values.
    pub fn as_caseless(&self) -> Result<String> {
        match &self.inner {
            Inner::Str { s, forms } => {
                let mut cache = forms.caseless.lock().unwrap();
                if cache.is_none() {
                    *cache = Some(s.to_lowercase());
                }
                Ok(cache.clone().unwrap())
            }
            Inner::Int(_) => Err(Error::WrongType),
        }
    }

    /// Extract the collated sort key of a string value, computing and
    /// caching it on first access. Fails with [Error::WrongType] for
    /// integer values.
    ///
    /// See `crate::util::collate_key` for the collation algorithm this
    /// crate uses in place of a full locale collator.
    pub fn as_collated(&self) -> Result<String> {
        match &self.inner {
            Inner::Str { s, forms } => {
                let mut cache = forms.collated.lock().unwrap();
                if cache.is_none() {
                    *cache = Some(crate::util::collate_key(s));
                }
                Ok(cache.clone().unwrap())
            }
            Inner::Int(_) => Err(Error::WrongType),
        }
    }

    /// Compare two values under the given mode. Type-exact equality:
    /// an int and a string are never equal. Cross-type ordering places
    /// integers before strings (see `DESIGN.md` for the Open Question
    /// this resolves).
    pub fn compare(&self, other: &Value, mode: CmpMode) -> Ordering {
        match (&self.inner, &other.inner) {
            (Inner::Int(a), Inner::Int(b)) => a.cmp(b),
            (Inner::Int(_), Inner::Str { .. }) => Ordering::Less,
            (Inner::Str { .. }, Inner::Int(_)) => Ordering::Greater,
            (Inner::Str { .. }, Inner::Str { .. }) => match mode {
                CmpMode::Binary => self.as_str().unwrap().as_bytes().cmp(other.as_str().unwrap().as_bytes()),
                CmpMode::Caseless => self.as_caseless().unwrap().cmp(&other.as_caseless().unwrap()),
                CmpMode::Collate => self.as_collated().unwrap().cmp(&other.as_collated().unwrap()),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (&self.inner, &other.inner) {
            (Inner::Int(a), Inner::Int(b)) => a == b,
            (Inner::Str { s: a, .. }, Inner::Str { s: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

// Required to store Values in ordered index structures (BTreeMap key);
// this is BINARY-mode ordering, the index's native traversal order.
// CASELESS/COLLATE traversal orders are produced separately by the Index
// (see crate::index), not by this impl.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Value) -> Ordering {
        self.compare(other, CmpMode::Binary)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.inner {
            Inner::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            Inner::Str { s, .. } => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod value_test;
