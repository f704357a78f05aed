//! Module `order` implements [Order], a sequence of [OrderEntry] used to
//! sort or shuffle a [crate::resultset::ResultSet].
//!
//! Grounded on `s4_order_add_column`/`s4_order_add_random`/
//! `s4_order_entry_add_choice`: a column entry is built, then zero or
//! more "choice" columns are attached to it; at sort time the entry
//! evaluates every choice column and keeps the smallest cell value
//! before comparing. `s4_resultset_sort` does a stable sort (ties
//! beyond the last entry keep their relative order), which is exactly
//! `[T]::sort_by`'s contract, so no custom sort is needed.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::resultset::ResultRow;
use crate::value::CmpMode;

/// `s4_order_direction_t`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

enum Entry {
    Column {
        mode: CmpMode,
        direction: OrderDirection,
        columns: Vec<usize>,
    },
    Random {
        seed: u64,
    },
}

/// A sequence of ordering entries, applied in order: the first entry
/// that distinguishes two rows decides their relative order; ties fall
/// through to the next entry, and rows tied past the last entry keep
/// their original relative order (stable sort).
#[derive(Default)]
pub struct Order {
    entries: Vec<Entry>,
}

/// Handle to an entry just added via [Order::add_column], used to
/// attach candidate columns with [Order::add_choice].
#[derive(Clone, Copy, Debug)]
pub struct EntryHandle(usize);

impl Order {
    pub fn new() -> Order {
        Order::default()
    }

    /// A single-entry order equivalent to `s4_resultset_shuffle`: one
    /// random entry with a fresh seed.
    pub fn random(seed: u64) -> Order {
        let mut order = Order::new();
        order.add_random(seed);
        order
    }

    /// `s4_order_add_column`: append a column-comparison entry with no
    /// candidate columns yet attached. Use [Order::add_choice] to add
    /// at least one before sorting — an entry with no choices never
    /// distinguishes any two rows.
    pub fn add_column(&mut self, mode: CmpMode, direction: OrderDirection) -> EntryHandle {
        self.entries.push(Entry::Column {
            mode,
            direction,
            columns: Vec::new(),
        });
        EntryHandle(self.entries.len() - 1)
    }

    /// `s4_order_entry_add_choice`: attach a candidate result-set column
    /// index to a column entry.
    pub fn add_choice(&mut self, entry: EntryHandle, column: usize) {
        if let Entry::Column { columns, .. } = &mut self.entries[entry.0] {
            columns.push(column);
        }
    }

    /// `s4_order_add_random`.
    pub fn add_random(&mut self, seed: u64) -> EntryHandle {
        self.entries.push(Entry::Random { seed });
        EntryHandle(self.entries.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn sort(&self, rows: &mut [ResultRow]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }

    fn compare(&self, a: &ResultRow, b: &ResultRow) -> Ordering {
        for entry in &self.entries {
            let ord = match entry {
                Entry::Column { mode, direction, columns } => compare_columns(a, b, *mode, columns, *direction),
                Entry::Random { seed } => random_key(*seed, a).cmp(&random_key(*seed, b)),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Compare `a` and `b` on a column entry: each row's comparison value is
/// the smallest cell value (under `mode`) among `columns`' cells; a row
/// missing a value on every candidate column sorts after one that has
/// any (empty-cell ordering is otherwise unspecified; see `DESIGN.md`).
fn compare_columns(a: &ResultRow, b: &ResultRow, mode: CmpMode, columns: &[usize], direction: OrderDirection) -> Ordering {
    let best = |row: &ResultRow| -> Option<&crate::value::Value> {
        columns
            .iter()
            .filter_map(|&col| row.cell(col))
            .filter_map(|cell| cell.smallest(mode))
            .min_by(|x, y| x.compare(y, mode))
    };
    // Present-beats-absent holds regardless of direction: only a
    // decided (both-present) comparison is subject to inversion.
    match (best(a), best(b)) {
        (Some(x), Some(y)) => {
            let ord = x.compare(y, mode);
            match direction {
                OrderDirection::Ascending => ord,
                OrderDirection::Descending => ord.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A stable pseudo-random key for `row` under `seed`: deterministic for
/// a given (seed, row content) pair, so resorting with the same seed
/// reproduces the same order. Sorting twice with the same order yields
/// identical row sequences.
fn random_key(seed: u64, row: &ResultRow) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    row.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
#[path = "order_test.rs"]
mod order_test;
