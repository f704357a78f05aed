use super::*;
use crate::sourcepref::SourcePref;
use crate::store::RelationStore;
use crate::value::Value;

#[test]
fn test_add_builds_ordered_columns() {
    let spec = FetchSpec::new()
        .add("artist", SourcePref::none(), FetchFlags::Data)
        .add("tracknr", SourcePref::none(), FetchFlags::Parent);
    assert_eq!(spec.size(), 2);
    assert_eq!(spec.columns()[0].key(), "artist");
    assert_eq!(spec.columns()[0].flags(), FetchFlags::Data);
    assert_eq!(spec.columns()[1].flags(), FetchFlags::Parent);
}

#[test]
fn test_bind_resolves_known_keys() {
    let mut store = RelationStore::new();
    store.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3");

    let spec = FetchSpec::new().add("artist", SourcePref::none(), FetchFlags::Data);
    let bound = spec.bind(&store).unwrap();
    assert_eq!(bound.len(), 1);
    assert_eq!(store.keys().name(bound[0].0), Some("artist"));
}

#[test]
fn test_bind_fails_for_unknown_key() {
    let store = RelationStore::new();
    let spec = FetchSpec::new().add("nosuchkey", SourcePref::none(), FetchFlags::Data);
    assert!(spec.bind(&store).is_err());
}
