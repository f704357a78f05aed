use super::*;
use crate::value::CmpMode;

fn cell(values: &[(&str, &str, Value)]) -> ResultCell {
    ResultCell::from_values(
        values
            .iter()
            .map(|(k, s, v)| ResultValue::new(*k, *s, v.clone()))
            .collect(),
    )
}

#[test]
fn test_from_rows_dedups_identical_rows() {
    let row = ResultRow::new(vec![cell(&[("artist", "id3", Value::new_string("X"))])]);
    let rows = vec![row.clone(), row.clone(), row];
    let set = ResultSet::from_rows(1, rows);
    assert_eq!(set.row_count(), 1);
}

#[test]
fn test_distinct_rows_survive() {
    let a = ResultRow::new(vec![cell(&[("artist", "id3", Value::new_string("X"))])]);
    let b = ResultRow::new(vec![cell(&[("artist", "id3", Value::new_string("Y"))])]);
    let set = ResultSet::from_rows(1, vec![a, b]);
    assert_eq!(set.row_count(), 2);
}

#[test]
fn test_cell_smallest_picks_min_under_mode() {
    let c = cell(&[
        ("artist", "id3", Value::new_string("gamma")),
        ("artist", "user", Value::new_string("alpha")),
    ]);
    assert_eq!(c.smallest(CmpMode::Binary).unwrap().as_str().unwrap(), "alpha");
}

#[test]
fn test_empty_cell_has_no_smallest() {
    let c = ResultCell::empty();
    assert!(c.smallest(CmpMode::Binary).is_none());
    assert!(c.is_empty());
}
