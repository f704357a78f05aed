//! Module `condition` implements the condition tree: two node kinds,
//! [Filter] (leaf) and [Combiner] (internal), combined into a tree
//! shared read-only across transactions via `Arc`.
//!
//! Evaluation (`Condition::evaluate`) picks a *driver* filter — the one
//! whose key has the smallest index and whose predicate is monotonic —
//! scans that key's index for candidates, and for each surviving entry
//! evaluates the rest of the tree by resolving every other filter's key
//! relative to the candidate's own identity (`RelationStore::values_for_pivot`).
//!
//! `DATA` vs `PARENT`: a candidate entry matches the driver on one of
//! its two sides (the "anchor") and carries the other side as the
//! row's own identity (the "pivot" — e.g. a track's `url`). `DATA`
//! (the default) resolves a key relative to the pivot: this row's own
//! attributes. `PARENT` resolves it relative to the anchor instead,
//! following the edge back the other way. See `DESIGN.md` for why this
//! resolution was chosen over reading values directly off the raw
//! entry: fetching an attribute that never touches the driver's own
//! two key slots requires it.

use std::ops::Bound as RangeBound;
use std::sync::Arc;

use crate::error::Result;
use crate::intern::Id;
use crate::pattern::Pattern;
use crate::sourcepref::SourcePref;
use crate::store::{EntryId, RelationStore};
use crate::value::{CmpMode, Value};

/// `s4_filter_type_t`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterType {
    Equal,
    NotEqual,
    Greater,
    Smaller,
    GreaterEq,
    SmallerEq,
    Match,
    Exists,
    Token,
    Custom,
}

impl FilterType {
    /// Monotonic predicates can be served by an index range scan under
    /// `CmpMode::Binary`.
    pub fn is_monotonic(self) -> bool {
        matches!(
            self,
            FilterType::Equal
                | FilterType::Greater
                | FilterType::Smaller
                | FilterType::GreaterEq
                | FilterType::SmallerEq
        )
    }
}

/// `s4_combine_type_t`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CombinerType {
    And,
    Or,
    Not,
    Custom,
}

/// `S4_COND_PARENT`: evaluate relative to the driver entry's anchor side
/// rather than its pivot side (see module docs).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FilterFlags {
    pub parent: bool,
}

/// `s4_cond_new_custom_filter`'s function pointer, modeled as a trait
/// object rather than a raw callback.
pub trait FilterFn: Send + Sync {
    fn matches(&self, value: &Value) -> bool;
}

/// `s4_cond_new_custom_combiner`'s function pointer, modeled the same way.
pub trait CombineFn: Send + Sync {
    fn evaluate(&self, children: &[bool]) -> bool;
}

/// A leaf condition: compare one key's value(s) against a reference.
pub struct Filter {
    key: String,
    ftype: FilterType,
    reference: Option<Value>,
    pattern: Option<Pattern>,
    pref: SourcePref,
    mode: CmpMode,
    flags: FilterFlags,
    custom: Option<Arc<dyn FilterFn>>,
}

impl Filter {
    fn new(key: &str, ftype: FilterType, reference: Option<Value>, mode: CmpMode, pref: SourcePref) -> Filter {
        Filter {
            key: key.to_string(),
            ftype,
            reference,
            pattern: None,
            pref,
            mode,
            flags: FilterFlags::default(),
            custom: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn filter_type(&self) -> FilterType {
        self.ftype
    }

    pub fn flags(&self) -> FilterFlags {
        self.flags
    }

    pub fn cmp_mode(&self) -> CmpMode {
        self.mode
    }

    pub fn sourcepref(&self) -> &SourcePref {
        &self.pref
    }

    pub fn is_monotonic(&self) -> bool {
        self.ftype.is_monotonic()
    }
}

/// An internal condition: combine one or more child conditions.
pub struct Combiner {
    ctype: CombinerType,
    operands: Vec<ConditionRef>,
    custom: Option<Arc<dyn CombineFn>>,
}

impl Combiner {
    pub fn combiner_type(&self) -> CombinerType {
        self.ctype
    }

    pub fn operands(&self) -> &[ConditionRef] {
        &self.operands
    }
}

/// A node in the condition tree. Built up builder-style and shared
/// read-only across transactions via `Arc` reference counting.
pub enum Condition {
    Filter(Filter),
    Combiner(Combiner),
}

pub type ConditionRef = Arc<Condition>;

impl Condition {
    pub fn equal(key: &str, reference: Value, mode: CmpMode, pref: SourcePref) -> ConditionRef {
        Arc::new(Condition::Filter(Filter::new(key, FilterType::Equal, Some(reference), mode, pref)))
    }

    pub fn not_equal(key: &str, reference: Value, mode: CmpMode, pref: SourcePref) -> ConditionRef {
        Arc::new(Condition::Filter(Filter::new(key, FilterType::NotEqual, Some(reference), mode, pref)))
    }

    pub fn greater(key: &str, reference: Value, mode: CmpMode, pref: SourcePref) -> ConditionRef {
        Arc::new(Condition::Filter(Filter::new(key, FilterType::Greater, Some(reference), mode, pref)))
    }

    pub fn smaller(key: &str, reference: Value, mode: CmpMode, pref: SourcePref) -> ConditionRef {
        Arc::new(Condition::Filter(Filter::new(key, FilterType::Smaller, Some(reference), mode, pref)))
    }

    pub fn greater_eq(key: &str, reference: Value, mode: CmpMode, pref: SourcePref) -> ConditionRef {
        Arc::new(Condition::Filter(Filter::new(key, FilterType::GreaterEq, Some(reference), mode, pref)))
    }

    pub fn smaller_eq(key: &str, reference: Value, mode: CmpMode, pref: SourcePref) -> ConditionRef {
        Arc::new(Condition::Filter(Filter::new(key, FilterType::SmallerEq, Some(reference), mode, pref)))
    }

    pub fn exists(key: &str, pref: SourcePref) -> ConditionRef {
        Arc::new(Condition::Filter(Filter::new(key, FilterType::Exists, None, CmpMode::Binary, pref)))
    }

    pub fn token(key: &str, needle: Value, mode: CmpMode, pref: SourcePref) -> ConditionRef {
        Arc::new(Condition::Filter(Filter::new(key, FilterType::Token, Some(needle), mode, pref)))
    }

    pub fn matches(key: &str, pattern: &str, pref: SourcePref) -> Result<ConditionRef> {
        crate::error::track((|| {
            let compiled = Pattern::new(pattern)?;
            let mut f = Filter::new(key, FilterType::Match, None, CmpMode::Binary, pref);
            f.pattern = Some(compiled);
            Ok(Arc::new(Condition::Filter(f)))
        })())
    }

    pub fn custom_filter(key: &str, pref: SourcePref, func: Arc<dyn FilterFn>) -> ConditionRef {
        let mut f = Filter::new(key, FilterType::Custom, None, CmpMode::Binary, pref);
        f.custom = Some(func);
        Arc::new(Condition::Filter(f))
    }

    /// Set the `PARENT` flag on a filter leaf (builder-style; no-op,
    /// returning the node unchanged, if called on a combiner or on a
    /// node already shared by another reference).
    pub fn with_parent(self: ConditionRef, parent: bool) -> ConditionRef {
        match Arc::try_unwrap(self) {
            Ok(Condition::Filter(mut f)) => {
                f.flags.parent = parent;
                Arc::new(Condition::Filter(f))
            }
            Ok(other) => Arc::new(other),
            Err(shared) => shared,
        }
    }

    pub fn and(operands: Vec<ConditionRef>) -> ConditionRef {
        Arc::new(Condition::Combiner(Combiner {
            ctype: CombinerType::And,
            operands,
            custom: None,
        }))
    }

    pub fn or(operands: Vec<ConditionRef>) -> ConditionRef {
        Arc::new(Condition::Combiner(Combiner {
            ctype: CombinerType::Or,
            operands,
            custom: None,
        }))
    }

    pub fn not(operand: ConditionRef) -> ConditionRef {
        Arc::new(Condition::Combiner(Combiner {
            ctype: CombinerType::Not,
            operands: vec![operand],
            custom: None,
        }))
    }

    pub fn custom_combiner(operands: Vec<ConditionRef>, func: Arc<dyn CombineFn>) -> ConditionRef {
        Arc::new(Condition::Combiner(Combiner {
            ctype: CombinerType::Custom,
            operands,
            custom: Some(func),
        }))
    }

    pub fn is_filter(&self) -> bool {
        matches!(self, Condition::Filter(_))
    }

    pub fn is_combiner(&self) -> bool {
        matches!(self, Condition::Combiner(_))
    }

    /// `s4_cond_update_key`: resolve every filter's key string against
    /// `store`'s key interner. Fails with [crate::error::Error::UnknownKey]
    /// for the first key the store has never interned.
    pub fn bind<'c>(self: &'c ConditionRef, store: &RelationStore) -> Result<BoundNode<'c>> {
        match self.as_ref() {
            Condition::Filter(f) => {
                let key_id = store.keys().resolve(&f.key)?;
                Ok(BoundNode::Filter { filter: f, key_id })
            }
            Condition::Combiner(c) => {
                let children = c
                    .operands
                    .iter()
                    .map(|op| op.bind(store))
                    .collect::<Result<Vec<_>>>()?;
                Ok(BoundNode::Combiner { combiner: c, children })
            }
        }
    }

    /// Evaluate the tree against `store`, producing one [Row] per
    /// surviving candidate entry.
    pub fn evaluate(self: &ConditionRef, store: &RelationStore) -> Result<Vec<Row>> {
        let bound = self.bind(store)?;
        let driver = match pick_driver(&bound, store) {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };

        let mut rows = Vec::new();
        for (anchor_val, entry_id) in driver_candidates(store, driver.filter, driver.key_id) {
            let entry = match store.get_entry(entry_id) {
                Some(e) => e,
                None => continue,
            };
            let (pivot_key, pivot_val) = match entry.other_side(driver.key_id) {
                Some((k, v)) => (k, v.clone()),
                None => continue,
            };
            let row = Row {
                driver_key: driver.key_id,
                anchor_val,
                pivot_key,
                pivot_val,
                entry: entry_id,
            };
            if eval_node(&bound, store, &row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

/// One candidate row produced by condition evaluation: the entity the
/// driver filter matched (`driver_key`/`anchor_val`, the entry's own
/// matched side) and the entity it names (`pivot_key`/`pivot_val`, the
/// entry's other side), plus the originating entry id.
#[derive(Clone, Debug)]
pub struct Row {
    pub driver_key: Id,
    pub anchor_val: Value,
    pub pivot_key: Id,
    pub pivot_val: Value,
    pub entry: EntryId,
}

/// A condition tree with every key resolved to an interned id, valid
/// only against the `RelationStore` it was bound to.
pub enum BoundNode<'c> {
    Filter { filter: &'c Filter, key_id: Id },
    Combiner { combiner: &'c Combiner, children: Vec<BoundNode<'c>> },
}

struct Driver<'c> {
    filter: &'c Filter,
    key_id: Id,
}

fn collect_leaves<'a, 'c>(bound: &'a BoundNode<'c>, out: &mut Vec<(&'a Filter, Id)>) {
    match bound {
        BoundNode::Filter { filter, key_id } => out.push((filter, *key_id)),
        BoundNode::Combiner { children, .. } => {
            for child in children {
                collect_leaves(child, out);
            }
        }
    }
}

/// Pick the filter leaf to drive the index scan: prefer a monotonic one,
/// break ties (and choose among non-monotonic ones if that's all there
/// is) by smallest index cardinality.
fn pick_driver<'a, 'c>(bound: &'a BoundNode<'c>, store: &RelationStore) -> Option<Driver<'a>> {
    let mut leaves = Vec::new();
    collect_leaves(bound, &mut leaves);

    let size_of = |key_id: Id| store.index_for_key(key_id).map(|idx| idx.value_count()).unwrap_or(0);

    leaves
        .into_iter()
        .min_by_key(|(filter, key_id)| (!filter.is_monotonic(), size_of(*key_id)))
        .map(|(filter, key_id)| Driver { filter, key_id })
}

/// `(anchor value, entry id)` pairs satisfying the driver's own
/// predicate, scanning its key's index.
fn driver_candidates(store: &RelationStore, filter: &Filter, key_id: Id) -> Vec<(Value, EntryId)> {
    let idx = match store.index_for_key(key_id) {
        Some(idx) => idx,
        None => return Vec::new(),
    };

    let mut out = Vec::new();
    if filter.ftype.is_monotonic() && filter.mode == CmpMode::Binary {
        let reference = filter.reference.clone().expect("monotonic filter always carries a reference");
        let (lo, hi) = range_bounds(filter.ftype, reference);
        for (value, ids) in idx.range_binary(lo, hi) {
            for &id in ids {
                out.push((value.clone(), id));
            }
        }
        return out;
    }

    for (value, ids) in idx.scan_ordered(filter.mode) {
        if matches_leaf(filter, value) {
            for &id in ids {
                out.push((value.clone(), id));
            }
        }
    }
    out
}

fn range_bounds(ftype: FilterType, reference: Value) -> (RangeBound<Value>, RangeBound<Value>) {
    match ftype {
        FilterType::Equal => (RangeBound::Included(reference.clone()), RangeBound::Included(reference)),
        FilterType::Greater => (RangeBound::Excluded(reference), RangeBound::Unbounded),
        FilterType::GreaterEq => (RangeBound::Included(reference), RangeBound::Unbounded),
        FilterType::Smaller => (RangeBound::Unbounded, RangeBound::Excluded(reference)),
        FilterType::SmallerEq => (RangeBound::Unbounded, RangeBound::Included(reference)),
        _ => unreachable!("range_bounds only called for monotonic filter types"),
    }
}

/// Does `value` itself satisfy `filter`'s predicate (ignoring source
/// preference — used both for a non-binary-mode driver scan and, via
/// `eval_node`, for non-driver filters after pref restriction).
fn matches_leaf(filter: &Filter, value: &Value) -> bool {
    match filter.ftype {
        FilterType::Equal => cmp_ok(value, filter, |o| o.is_eq()),
        FilterType::NotEqual => cmp_ok(value, filter, |o| !o.is_eq()),
        FilterType::Greater => cmp_ok(value, filter, |o| o.is_gt()),
        FilterType::Smaller => cmp_ok(value, filter, |o| o.is_lt()),
        FilterType::GreaterEq => cmp_ok(value, filter, |o| !o.is_lt()),
        FilterType::SmallerEq => cmp_ok(value, filter, |o| !o.is_gt()),
        FilterType::Match => filter
            .pattern
            .as_ref()
            .map(|p| p.matches_value(value))
            .unwrap_or(false),
        FilterType::Token => token_contains(value, filter),
        FilterType::Exists => true,
        FilterType::Custom => filter.custom.as_ref().map(|f| f.matches(value)).unwrap_or(false),
    }
}

fn cmp_ok(value: &Value, filter: &Filter, pred: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    match &filter.reference {
        Some(reference) => pred(value.compare(reference, filter.mode)),
        None => false,
    }
}

/// TOKEN: whitespace-tokenized string-contains.
fn token_contains(value: &Value, filter: &Filter) -> bool {
    let (haystack, needle) = match (value.as_str(), filter.reference.as_ref().and_then(|r| r.as_str().ok())) {
        (Ok(h), Some(n)) => (h, n),
        _ => return false,
    };
    haystack
        .split_whitespace()
        .any(|tok| Value::new_string(tok).compare(&Value::new_string(needle), filter.mode) == std::cmp::Ordering::Equal)
}

/// Recursively evaluate `bound` against `row`. AND short-circuits on the
/// first `false`, OR on the first `true`, NOT inverts its single
/// operand, CUSTOM calls its combining function on every child's result
/// (no short-circuit, since custom logic may want all of them).
fn eval_node(bound: &BoundNode, store: &RelationStore, row: &Row) -> bool {
    match bound {
        BoundNode::Filter { filter, key_id } => eval_filter(filter, *key_id, store, row),
        BoundNode::Combiner { combiner, children } => match combiner.combiner_type() {
            CombinerType::And => children.iter().all(|c| eval_node(c, store, row)),
            CombinerType::Or => children.iter().any(|c| eval_node(c, store, row)),
            CombinerType::Not => !eval_node(&children[0], store, row),
            CombinerType::Custom => {
                let results: Vec<bool> = children.iter().map(|c| eval_node(c, store, row)).collect();
                combiner
                    .custom
                    .as_ref()
                    .map(|f| f.evaluate(&results))
                    .unwrap_or(false)
            }
        },
    }
}

fn eval_filter(filter: &Filter, key_id: Id, store: &RelationStore, row: &Row) -> bool {
    let (anchor_key, anchor_val) = (row.driver_key, &row.anchor_val);
    let candidates = if filter.flags.parent {
        store.values_for_pivot(anchor_key, anchor_val, key_id)
    } else {
        store.values_for_pivot(row.pivot_key, &row.pivot_val, key_id)
    };

    let survivors = restrict_to_best_source(store, &filter.pref, candidates);
    if survivors.is_empty() {
        return false;
    }

    match filter.ftype {
        FilterType::Exists => true,
        FilterType::Custom => survivors
            .iter()
            .any(|v| filter.custom.as_ref().map(|f| f.matches(v)).unwrap_or(false)),
        _ => survivors.iter().any(|v| matches_leaf(filter, v)),
    }
}

/// Keep only the values supplied by the source(s) with the numerically
/// lowest (best) priority under `pref`: only values from the
/// highest-priority source that supplies the key participate.
fn restrict_to_best_source<'a>(store: &'a RelationStore, pref: &SourcePref, candidates: Vec<(Id, &'a Value)>) -> Vec<&'a Value> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let best = candidates
        .iter()
        .map(|(src, _)| {
            let name = store.sources().name(*src).unwrap_or("");
            pref.priority(name)
        })
        .min()
        .unwrap();
    candidates
        .into_iter()
        .filter(|(src, _)| {
            let name = store.sources().name(*src).unwrap_or("");
            pref.priority(name) == best
        })
        .map(|(_, v)| v)
        .collect()
}

#[cfg(test)]
#[path = "condition_test.rs"]
mod condition_test;
