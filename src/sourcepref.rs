//! Module `sourcepref` implements [SourcePref], an ordered list of glob
//! patterns that ranks concrete source names by priority.
//!
//! A list of compiled patterns is checked in order, with a per-instance
//! memo so a repeatedly-queried source name is not re-matched against
//! every pattern every time (`s4_sourcepref_get_priority`).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::pattern::Pattern;

/// Sentinel priority for a source that matches none of the patterns:
/// the "worst" possible priority.
pub const WORST_PRIORITY: usize = usize::MAX;

/// An ordered list of glob patterns prioritizing which source's value
/// wins per query column.
pub struct SourcePref {
    patterns: Vec<Pattern>,
    // memo never shrinks; bounded by the number of distinct source
    // strings ever queried against this instance, acceptable for
    // medialib-scale source counts.
    memo: Mutex<HashMap<String, usize>>,
}

impl SourcePref {
    /// Compile `patterns` in priority order (index 0 = highest priority).
    pub fn create(patterns: &[&str]) -> Result<SourcePref> {
        crate::error::track((|| {
            let compiled = patterns
                .iter()
                .map(|p| Pattern::new(p))
                .collect::<Result<Vec<_>>>()?;
            Ok(SourcePref {
                patterns: compiled,
                memo: Mutex::new(HashMap::new()),
            })
        })())
    }

    /// An empty source preference: every source gets [WORST_PRIORITY],
    /// so no source wins over another (all survive, in entry order).
    pub fn none() -> SourcePref {
        SourcePref {
            patterns: Vec::new(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Priority of `src`: the index of the first matching pattern, or
    /// [WORST_PRIORITY] if none match. Cached after first computation.
    pub fn priority(&self, src: &str) -> usize {
        {
            let memo = self.memo.lock().unwrap();
            if let Some(p) = memo.get(src) {
                return *p;
            }
        }
        let priority = self.compute_priority(src);
        let mut memo = self.memo.lock().unwrap();
        memo.insert(src.to_string(), priority);
        priority
    }

    fn compute_priority(&self, src: &str) -> usize {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if pattern.matches_str(src) {
                return i;
            }
        }
        WORST_PRIORITY
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
#[path = "sourcepref_test.rs"]
mod sourcepref_test;
