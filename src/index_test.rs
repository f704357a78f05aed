use std::ops::Bound;

use super::*;

#[test]
fn test_insert_and_get() {
    let mut idx = Index::new();
    idx.insert(Value::new_string("X"), 1);
    idx.insert(Value::new_string("X"), 2);
    let got = idx.get(&Value::new_string("X")).unwrap();
    assert_eq!(got.len(), 2);
    assert!(got.contains(&1));
    assert!(got.contains(&2));
}

#[test]
fn test_remove_drops_empty_bucket() {
    let mut idx = Index::new();
    idx.insert(Value::new_string("X"), 1);
    assert!(idx.remove(&Value::new_string("X"), 1));
    assert!(idx.get(&Value::new_string("X")).is_none());
    assert!(idx.is_empty());
}

#[test]
fn test_remove_missing_is_false() {
    let mut idx = Index::new();
    idx.insert(Value::new_string("X"), 1);
    assert!(!idx.remove(&Value::new_string("X"), 42));
}

#[test]
fn test_all_entries_dedup() {
    let mut idx = Index::new();
    idx.insert(Value::new_string("a"), 1);
    idx.insert(Value::new_string("b"), 1);
    idx.insert(Value::new_string("b"), 2);
    let all = idx.all_entries();
    assert_eq!(all, vec![1, 2]);
}

#[test]
fn test_range_binary() {
    let mut idx = Index::new();
    idx.insert(Value::new_int(5), 1);
    idx.insert(Value::new_int(10), 2);
    idx.insert(Value::new_int(15), 3);
    let hits: Vec<EntryId> = idx
        .range_binary(Bound::Excluded(Value::new_int(5)), Bound::Unbounded)
        .flat_map(|(_, set)| set.iter().copied())
        .collect();
    assert_eq!(hits, vec![2, 3]);
}

#[test]
fn test_scan_ordered_collate() {
    let mut idx = Index::new();
    idx.insert(Value::new_string("béta"), 1);
    idx.insert(Value::new_string("alpha"), 2);
    idx.insert(Value::new_string("gamma"), 3);
    let order: Vec<EntryId> = idx
        .scan_ordered(CmpMode::Collate)
        .into_iter()
        .flat_map(|(_, set)| set.iter().copied())
        .collect();
    assert_eq!(order, vec![2, 1, 3]);
}

#[test]
fn test_scan_ordered_binary_matches_native() {
    let mut idx = Index::new();
    idx.insert(Value::new_string("béta"), 1);
    idx.insert(Value::new_string("alpha"), 2);
    idx.insert(Value::new_string("gamma"), 3);
    let order: Vec<EntryId> = idx
        .scan_ordered(CmpMode::Binary)
        .into_iter()
        .flat_map(|(_, set)| set.iter().copied())
        .collect();
    // byte order: "alpha" < "gamma" < "béta" (0xC3 > 'g')
    assert_eq!(order, vec![2, 3, 1]);
}
