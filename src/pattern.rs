//! Module `pattern` wraps the delegated glob-matcher collaborator
//! (`s4_pattern_t` in the original interface) behind a small, crate-local
//! type so callers never see the underlying crate directly.

use glob::Pattern as GlobPattern;

use crate::error::{Error, Result};
use crate::value::Value;

/// A compiled glob pattern, used both by [crate::sourcepref::SourcePref]
/// (matching source names) and by `MATCH` filters (matching string
/// values).
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    compiled: GlobPattern,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Pattern> {
        let compiled = GlobPattern::new(pattern)
            .map_err(|err| Error::Incons(format!("invalid glob pattern {:?}: {}", pattern, err)))?;
        Ok(Pattern {
            raw: pattern.to_string(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches_str(&self, s: &str) -> bool {
        self.compiled.matches(s)
    }

    /// Match a `MATCH` filter's reference pattern against a stored value.
    /// Non-string values never match (`s4_val_t` glob matching is
    /// string-only in the original).
    pub fn matches_value(&self, value: &Value) -> bool {
        match value.as_str() {
            Ok(s) => self.matches_str(s),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "pattern_test.rs"]
mod pattern_test;
