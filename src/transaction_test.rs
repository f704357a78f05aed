use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Barrier;
use std::thread;

use super::*;
use crate::log::Log;
use crate::store::RelationStore;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_log_path(name: &str) -> std::path::PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("s4-txn-test-{}-{}-{}", std::process::id(), n, name))
}

fn fresh_manager(name: &str) -> TransactionManager {
    let _ = env_logger::try_init();
    let path = temp_log_path(name);
    let _ = std::fs::remove_file(&path);
    let (log, ops) = Log::open(&path).unwrap();
    let mgr = TransactionManager::new(RelationStore::new(), log);
    mgr.apply_replayed(ops);
    mgr
}

#[test]
fn test_commit_applies_to_store() {
    let mgr = fresh_manager("commit");
    let mut txn = mgr.begin(TxnFlags::NONE);
    txn.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3").unwrap();
    txn.commit().unwrap();

    let store = mgr.read_store();
    assert_eq!(store.entry_count(), 1);
}

#[test]
fn test_read_only_add_fails() {
    let mgr = fresh_manager("readonly");
    let mut txn = mgr.begin(TxnFlags::READ_ONLY);
    let err = txn.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3").unwrap_err();
    assert!(matches!(err, Error::ReadOnly));
}

#[test]
fn test_abort_discards_writes() {
    let mgr = fresh_manager("abort");
    let mut txn = mgr.begin(TxnFlags::NONE);
    txn.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3").unwrap();
    txn.abort();
    assert!(mgr.read_store().is_empty());
}

#[test]
fn test_drop_without_commit_aborts() {
    let mgr = fresh_manager("drop");
    {
        let mut txn = mgr.begin(TxnFlags::NONE);
        txn.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3").unwrap();
    }
    assert!(mgr.read_store().is_empty());
}

#[test]
fn test_idempotent_commit_from_two_transactions() {
    let mgr = fresh_manager("idempotent");
    let mut t1 = mgr.begin(TxnFlags::NONE);
    t1.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3").unwrap();
    t1.commit().unwrap();

    let mut t2 = mgr.begin(TxnFlags::NONE);
    t2.add("url", Value::new_string("a"), "artist", Value::new_string("X"), "id3").unwrap();
    t2.commit().unwrap();

    assert_eq!(mgr.read_store().entry_count(), 1);
}

#[test]
fn test_deadlock_cycle_aborts_exactly_one() {
    let mgr = fresh_manager("deadlock");
    let barrier = Barrier::new(2);

    thread::scope(|scope| {
        let mgr_ref = &mgr;
        let barrier_ref = &barrier;

        let h1 = scope.spawn(move || {
            let mut txn = mgr_ref.begin(TxnFlags::NONE);
            txn.add("a", Value::new_int(1), "x", Value::new_int(1), "s").unwrap();
            barrier_ref.wait();
            let res = txn.add("b", Value::new_int(2), "y", Value::new_int(2), "s");
            match res {
                Ok(()) => txn.commit(),
                Err(e) => Err(e),
            }
        });

        let h2 = scope.spawn(move || {
            let mut txn = mgr_ref.begin(TxnFlags::NONE);
            txn.add("b", Value::new_int(2), "y", Value::new_int(2), "s").unwrap();
            barrier_ref.wait();
            let res = txn.add("a", Value::new_int(1), "x", Value::new_int(1), "s");
            match res {
                Ok(()) => txn.commit(),
                Err(e) => Err(e),
            }
        });

        let r1 = h1.join().unwrap();
        let r2 = h2.join().unwrap();

        let failures = [&r1, &r2].iter().filter(|r| matches!(r, Err(Error::Deadlock))).count();
        let successes = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(failures, 1);
        assert_eq!(successes, 1);
    });
}
