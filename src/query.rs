//! Module `query` assembles a [crate::condition::Condition] and a
//! [crate::fetchspec::FetchSpec] into a [ResultSet] (`s4_query`).
//!
//! This is the one place the condition evaluator's candidate [Row]s and
//! the fetch spec's column projection meet: for every row the condition
//! tree produced, each column collects the pivot's (or, under
//! `FetchFlags::Parent`, the anchor's) values for its key, restricted to
//! the highest-priority source under that column's own source
//! preference: only values whose source has the highest (numerically
//! lowest) priority under the column's source preference survive; ties
//! within one source all appear.

use crate::condition::ConditionRef;
use crate::error::Result;
use crate::fetchspec::{FetchColumn, FetchFlags, FetchSpec};
use crate::intern::Id;
use crate::resultset::{ResultCell, ResultRow, ResultSet, ResultValue};
use crate::store::RelationStore;
use crate::value::Value;

/// Evaluate `condition` against `store`, then project `fetchspec`'s
/// columns for every surviving row, returning a de-duplicated
/// [ResultSet]: rows identical across all columns are de-duplicated
/// before return.
pub fn run(store: &RelationStore, fetchspec: &FetchSpec, condition: &ConditionRef) -> Result<ResultSet> {
    let rows = condition.evaluate(store)?;
    let bound_columns = fetchspec.bind(store)?;

    let mut result_rows = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut cells = Vec::with_capacity(bound_columns.len());
        for (key_id, column) in &bound_columns {
            cells.push(project_column(store, *key_id, column, row));
        }
        result_rows.push(ResultRow::new(cells));
    }
    Ok(ResultSet::from_rows(fetchspec.size(), result_rows))
}

fn project_column(store: &RelationStore, key_id: Id, column: &FetchColumn, row: &crate::condition::Row) -> ResultCell {
    let (pivot_key, pivot_val) = match column.flags() {
        FetchFlags::Parent => (row.driver_key, &row.anchor_val),
        FetchFlags::Data => (row.pivot_key, &row.pivot_val),
    };
    let candidates = store.values_for_pivot(pivot_key, pivot_val, key_id);
    if candidates.is_empty() {
        return ResultCell::empty();
    }

    let priority_of = |src: Id| -> usize {
        let name = store.sources().name(src).unwrap_or("");
        column.sourcepref().priority(name)
    };
    let best = candidates.iter().map(|(src, _)| priority_of(*src)).min().unwrap();

    let values: Vec<ResultValue> = candidates
        .into_iter()
        .filter(|(src, _)| priority_of(*src) == best)
        .map(|(src, value): (Id, &Value)| {
            let src_name = store.sources().name(src).unwrap_or("").to_string();
            ResultValue::new(column.key(), src_name, value.clone())
        })
        .collect();
    ResultCell::from_values(values)
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
