use std::sync::atomic::{AtomicU64, Ordering};

use super::*;
use crate::value::Value;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_db_path() -> PathBuf {
    let _ = env_logger::try_init();
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("s4-database-test-{}-{}.s4db", std::process::id(), n))
}

fn cleanup(db: &Database) {
    if let Some(path) = &db.path {
        let _ = fs::remove_file(path);
    }
    if let Some(path) = &db.log_path {
        let _ = fs::remove_file(path);
    }
}

#[test]
fn test_open_new_creates_fresh_database() {
    let path = temp_db_path();
    let db = OpenOptions::new().flags(OpenFlags::NEW).open(&path).unwrap();
    assert!(!db.is_memory());
    cleanup(&db);
}

#[test]
fn test_open_new_fails_if_exists() {
    let path = temp_db_path();
    let db = OpenOptions::new().flags(OpenFlags::NEW).open(&path).unwrap();
    db.sync().unwrap();
    let second = OpenOptions::new().flags(OpenFlags::NEW).open(&path);
    assert!(matches!(second, Err(Error::Exists(_))));
    cleanup(&db);
}

#[test]
fn test_open_exists_fails_if_missing() {
    let path = temp_db_path();
    let result = OpenOptions::new().flags(OpenFlags::EXISTS).open(&path);
    assert!(matches!(result, Err(Error::NoEnt(_))));
}

#[test]
fn test_memory_database_has_no_path() {
    let db = OpenOptions::new().flags(OpenFlags::MEMORY).open("ignored").unwrap();
    assert!(db.is_memory());
    assert!(db.path.is_none());
    assert!(db.log_path.is_none());
    assert!(db.mgr.log().path().is_none());
    assert!(!std::path::Path::new("ignored").exists());
    assert!(db.sync().is_ok());
}

#[test]
fn test_sync_then_reopen_preserves_data_and_uuid() {
    let path = temp_db_path();
    let db = OpenOptions::new().flags(OpenFlags::NEW).open(&path).unwrap();
    {
        let mut txn = db.begin(TxnFlags::NONE);
        txn.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3").unwrap();
        txn.commit().unwrap();
    }
    db.sync().unwrap();
    let uuid = db.uuid();
    // Remove only the log file, not the snapshot `sync()` just wrote:
    // the reopen below must read back what `sync()` wrote to `path`.
    let log_path = log_path_for(&path, &DatabaseConfig::default());
    let _ = fs::remove_file(&log_path);
    drop(db);

    let reopened = OpenOptions::new().flags(OpenFlags::EXISTS).open(&path).unwrap();
    assert_eq!(reopened.uuid(), uuid);
    {
        let txn = reopened.begin(TxnFlags::READ_ONLY);
        let store = txn.snapshot();
        assert_eq!(store.entry_count(), 1);
    }
    cleanup(&reopened);
}

#[test]
fn test_reopen_without_sync_replays_log() {
    let path = temp_db_path();
    let db = OpenOptions::new().flags(OpenFlags::NEW).open(&path).unwrap();
    {
        let mut txn = db.begin(TxnFlags::NONE);
        txn.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3").unwrap();
        txn.commit().unwrap();
    }
    drop(db);

    let reopened = OpenOptions::new().flags(OpenFlags::EXISTS).open(&path).unwrap();
    {
        let txn = reopened.begin(TxnFlags::READ_ONLY);
        let store = txn.snapshot();
        assert_eq!(store.entry_count(), 1);
    }
    cleanup(&reopened);
}

#[test]
fn test_known_keys_are_preinterned() {
    let path = temp_db_path();
    let db = OpenOptions::new()
        .flags(OpenFlags::NEW)
        .known_keys(&["artist", "album"])
        .open(&path)
        .unwrap();
    {
        let txn = db.begin(TxnFlags::READ_ONLY);
        let store = txn.snapshot();
        assert!(store.keys().lookup("artist").is_some());
        assert!(store.keys().lookup("album").is_some());
    }
    cleanup(&db);
}

#[test]
fn test_config_load_missing_file_errors() {
    let path = temp_db_path();
    let result = DatabaseConfig::load(&path);
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_config_load_parses_toml() {
    let path = temp_db_path();
    fs::write(&path, "log_suffix = \".journal\"\ntruncate_log_on_sync = false\n").unwrap();
    let config = DatabaseConfig::load(&path).unwrap();
    assert_eq!(config.log_suffix, ".journal");
    assert!(!config.truncate_log_on_sync);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_open_flags_combine() {
    let flags = OpenFlags::NEW | OpenFlags::MEMORY;
    assert!(flags.contains(OpenFlags::NEW));
    assert!(flags.contains(OpenFlags::MEMORY));
    assert!(!flags.contains(OpenFlags::EXISTS));
}
