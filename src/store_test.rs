use super::*;
use crate::value::Value;

#[test]
fn test_add_is_idempotent() {
    let mut store = RelationStore::new();
    assert!(store.add("artist", Value::new_string("Muse"), "song", Value::new_string("Starlight"), "id3v2"));
    assert!(!store.add("artist", Value::new_string("Muse"), "song", Value::new_string("Starlight"), "id3v2"));
    assert_eq!(store.entry_count(), 1);
}

#[test]
fn test_add_del_roundtrip() {
    let mut store = RelationStore::new();
    store.add("artist", Value::new_string("Muse"), "song", Value::new_string("Starlight"), "id3v2");
    let removed = store
        .del("artist", &Value::new_string("Muse"), "song", &Value::new_string("Starlight"), "id3v2")
        .unwrap();
    assert!(removed);
    assert!(store.is_empty());
}

#[test]
fn test_del_unknown_key_errors() {
    let mut store = RelationStore::new();
    let err = store
        .del("nosuch", &Value::new_string("x"), "alsonone", &Value::new_string("y"), "id3v2")
        .unwrap_err();
    assert!(matches!(err, Error::UnknownKey(_)));
}

#[test]
fn test_del_unknown_source_errors() {
    let mut store = RelationStore::new();
    store.add("artist", Value::new_string("Muse"), "song", Value::new_string("Starlight"), "id3v2");
    let err = store
        .del("artist", &Value::new_string("Muse"), "song", &Value::new_string("Starlight"), "nosuchsrc")
        .unwrap_err();
    assert!(matches!(err, Error::UnknownSource(_)));
}

#[test]
fn test_del_missing_entry_is_false() {
    let mut store = RelationStore::new();
    store.add("artist", Value::new_string("Muse"), "song", Value::new_string("Starlight"), "id3v2");
    let removed = store
        .del("artist", &Value::new_string("Muse"), "song", &Value::new_string("Other"), "id3v2")
        .unwrap();
    assert!(!removed);
    assert_eq!(store.entry_count(), 1);
}

#[test]
fn test_fetch_entries_for_key_both_sides() {
    let mut store = RelationStore::new();
    store.add("artist", Value::new_string("Muse"), "song", Value::new_string("Starlight"), "id3v2");
    store.add("song", Value::new_string("Starlight"), "year", Value::new_int(2006), "id3v2");

    let artist_id = store.keys().lookup("artist").unwrap();
    let song_id = store.keys().lookup("song").unwrap();

    assert_eq!(store.fetch_entries_for_key(artist_id).len(), 1);
    // "song" appears on the val_b side of the first entry and the
    // key_a side of the second: both count.
    assert_eq!(store.fetch_entries_for_key(song_id).len(), 2);
}

#[test]
fn test_key_a_equals_key_b_creates_two_registrations() {
    let mut store = RelationStore::new();
    store.add("tag", Value::new_string("rock"), "tag", Value::new_string("indie"), "user");
    let tag_id = store.keys().lookup("tag").unwrap();
    let idx = store.index_for_key(tag_id).unwrap();
    assert!(idx.get(&Value::new_string("rock")).is_some());
    assert!(idx.get(&Value::new_string("indie")).is_some());
}

#[test]
fn test_slab_slot_reuse_after_delete() {
    let mut store = RelationStore::new();
    store.add("a", Value::new_string("1"), "b", Value::new_string("2"), "s");
    store
        .del("a", &Value::new_string("1"), "b", &Value::new_string("2"), "s")
        .unwrap();
    store.add("a", Value::new_string("3"), "b", Value::new_string("4"), "s");
    // the slab should have reclaimed the freed slot rather than growing.
    assert_eq!(store.entries.len(), 1);
}

#[test]
fn test_other_side_navigation() {
    let mut store = RelationStore::new();
    store.add("artist", Value::new_string("Muse"), "song", Value::new_string("Starlight"), "id3v2");
    let artist_id = store.keys().lookup("artist").unwrap();
    let id = store.fetch_entries_for_key(artist_id)[0];
    let entry = store.get_entry(id).unwrap();
    let (other_key, other_val) = entry.other_side(artist_id).unwrap();
    assert_eq!(store.keys().name(other_key), Some("song"));
    assert_eq!(other_val.as_str().unwrap(), "Starlight");
}
