//! Module `transaction` implements the transaction manager:
//! begin/commit/abort, buffered writes, per-key write intents with
//! waits-for deadlock detection, and the redo log hookup.
//!
//! Uses the `Arc<RwLock<_>>`-guarded shared-state idiom for the manager
//! itself, and [crate::spinlock::RWSpinlock] for the store's own
//! multi-reader/single-writer discipline underneath the manager's lock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::condition::{Condition, ConditionRef};
use crate::error::{Error, Result};
use crate::fetchspec::FetchSpec;
use crate::log::{Log, LogGroup, ReplayOp};
use crate::resultset::ResultSet;
use crate::store::RelationStore;
use crate::value::Value;

/// Transaction id, monotonically assigned by [TransactionManager::begin].
pub type TxnId = u64;

/// Combinable flags passed to [TransactionManager::begin], mirroring the
/// bit-flag style of `s4_open_flags` (`S4_NEW = 1 << 0`, etc.).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxnFlags(u32);

impl TxnFlags {
    pub const NONE: TxnFlags = TxnFlags(0);
    pub const READ_ONLY: TxnFlags = TxnFlags(1 << 0);

    pub fn contains(self, other: TxnFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TxnFlags {
    type Output = TxnFlags;

    fn bitor(self, rhs: TxnFlags) -> TxnFlags {
        TxnFlags(self.0 | rhs.0)
    }
}

/// A buffered `add` or `del`, applied to the store only on commit.
pub(crate) enum PendingOp {
    Add {
        key_a: String,
        val_a: Value,
        key_b: String,
        val_b: Value,
        src: String,
    },
    Del {
        key_a: String,
        val_a: Value,
        key_b: String,
        val_b: Value,
        src: String,
    },
}

struct TxnHandle {
    aborted: Arc<AtomicBool>,
}

/// Per-key write-intent table plus the waits-for graph used to detect
/// deadlock cycles.
#[derive(Default)]
struct IntentTable {
    held: HashMap<String, TxnId>,
    waits_for: HashMap<TxnId, HashSet<TxnId>>,
}

/// Owns the shared relation store, the redo log, and all bookkeeping
/// needed to serialize transactions against each other.
pub struct TransactionManager {
    store: RwLock<RelationStore>,
    log: Log,
    next_txn_id: AtomicU64,
    active: Mutex<HashMap<TxnId, TxnHandle>>,
    intents: Mutex<IntentTable>,
    intents_released: Condvar,
}

impl TransactionManager {
    pub(crate) fn new(store: RelationStore, log: Log) -> TransactionManager {
        TransactionManager {
            store: RwLock::new(store),
            log,
            next_txn_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
            intents: Mutex::new(IntentTable::default()),
            intents_released: Condvar::new(),
        }
    }

    /// Re-apply operations recovered from log replay, before any
    /// transaction has been begun against this store.
    pub(crate) fn apply_replayed(&self, ops: Vec<ReplayOp>) {
        let mut store = self.store.write().unwrap();
        for op in ops {
            match op {
                ReplayOp::Insert { key_a, val_a, key_b, val_b, src } => {
                    store.add(&key_a, val_a, &key_b, val_b, &src);
                }
                ReplayOp::Remove { key_a, val_a, key_b, val_b, src } => {
                    let _ = store.del(&key_a, &val_a, &key_b, &val_b, &src);
                }
            }
        }
    }

    pub(crate) fn log(&self) -> &Log {
        &self.log
    }

    /// A read snapshot of the committed store. Concurrent readers never
    /// block each other or a concurrent writer's readers; only a writer
    /// excludes everyone.
    pub(crate) fn read_store(&self) -> RwLockReadGuard<'_, RelationStore> {
        self.store.read().unwrap()
    }

    pub(crate) fn write_store(&self) -> RwLockWriteGuard<'_, RelationStore> {
        self.store.write().unwrap()
    }

    pub fn begin(&self, flags: TxnFlags) -> Transaction<'_> {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let aborted = Arc::new(AtomicBool::new(false));
        self.active.lock().unwrap().insert(id, TxnHandle { aborted: Arc::clone(&aborted) });
        Transaction {
            id,
            flags,
            mgr: self,
            pending: Vec::new(),
            read_set: Mutex::new(HashSet::new()),
            write_set: HashSet::new(),
            held_intents: HashSet::new(),
            aborted,
            state: TxnState::Active,
        }
    }

    /// Acquire a write intent on `resource` for `txn`, blocking the
    /// calling thread while it is held by another active transaction:
    /// `add`/`del` may block on per-key write-intent acquisition. Before
    /// blocking, a waits-for edge is recorded and
    /// checked for cycles; on a cycle the youngest member is aborted —
    /// if that is `txn` itself this returns `Err(Deadlock)` without
    /// blocking, otherwise the other party's intents are released
    /// immediately and this call proceeds without waiting.
    fn acquire_intent(&self, txn: TxnId, resource: &str) -> Result<()> {
        let mut table = self.intents.lock().unwrap();
        loop {
            if self.is_aborted(txn) {
                table.waits_for.remove(&txn);
                return Err(Error::Deadlock);
            }
            match table.held.get(resource).copied() {
                None => {
                    table.held.insert(resource.to_string(), txn);
                    table.waits_for.remove(&txn);
                    return Ok(());
                }
                Some(holder) if holder == txn => {
                    table.waits_for.remove(&txn);
                    return Ok(());
                }
                Some(holder) => {
                    let mut waiting_on = HashSet::new();
                    waiting_on.insert(holder);
                    table.waits_for.insert(txn, waiting_on);
                    match find_cycle(&table.waits_for, txn) {
                        Some(members) => {
                            let victim = *members.iter().max().unwrap();
                            table.waits_for.remove(&txn);
                            if victim == txn {
                                return Err(Error::Deadlock);
                            }
                            // the other party loses: mark it aborted and
                            // release its held intents so `txn` can take
                            // the resource without waiting.
                            self.mark_aborted(victim);
                            table.held.retain(|_, holder_id| *holder_id != victim);
                            table.waits_for.remove(&victim);
                            table.held.insert(resource.to_string(), txn);
                            self.intents_released.notify_all();
                            return Ok(());
                        }
                        None => {
                            // no cycle (yet): block until some holder
                            // releases a resource, then re-check.
                            table = self.intents_released.wait(table).unwrap();
                        }
                    }
                }
            }
        }
    }

    fn mark_aborted(&self, txn: TxnId) {
        if let Some(handle) = self.active.lock().unwrap().get(&txn) {
            handle.aborted.store(true, Ordering::SeqCst);
        }
    }

    fn is_aborted(&self, txn: TxnId) -> bool {
        match self.active.lock().unwrap().get(&txn) {
            Some(handle) => handle.aborted.load(Ordering::SeqCst),
            None => false,
        }
    }

    fn release_intents(&self, txn: TxnId, resources: &HashSet<String>) {
        let mut table = self.intents.lock().unwrap();
        for resource in resources {
            if table.held.get(resource).copied() == Some(txn) {
                table.held.remove(resource);
            }
        }
        table.waits_for.remove(&txn);
        drop(table);
        self.intents_released.notify_all();
    }

    fn deregister(&self, txn: TxnId) {
        self.active.lock().unwrap().remove(&txn);
    }
}

/// Walk every filter leaf in `condition`, calling `visit` with its key
/// string, so a query can record the keys it reads (see
/// `Transaction::note_read`).
fn collect_condition_keys(condition: &ConditionRef, visit: &mut impl FnMut(&str)) {
    match condition.as_ref() {
        Condition::Filter(filter) => visit(filter.key()),
        Condition::Combiner(combiner) => {
            for operand in combiner.operands() {
                collect_condition_keys(operand, visit);
            }
        }
    }
}

/// Depth-first search for a cycle in `waits_for` starting (and ending)
/// at `start`. Returns the set of transaction ids on the cycle, if any.
fn find_cycle(waits_for: &HashMap<TxnId, HashSet<TxnId>>, start: TxnId) -> Option<HashSet<TxnId>> {
    let mut stack = vec![start];
    let mut visited = HashSet::new();
    let mut path = Vec::new();
    while let Some(node) = stack.pop() {
        if node == start && !path.is_empty() {
            path.push(node);
            return Some(path.into_iter().collect());
        }
        if !visited.insert(node) {
            continue;
        }
        path.push(node);
        if let Some(next) = waits_for.get(&node) {
            for &n in next {
                if n == start {
                    path.push(start);
                    return Some(path.into_iter().collect());
                }
                stack.push(n);
            }
        }
    }
    None
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// A single active transaction. No nested transactions.
pub struct Transaction<'db> {
    id: TxnId,
    flags: TxnFlags,
    mgr: &'db TransactionManager,
    pending: Vec<PendingOp>,
    read_set: Mutex<HashSet<String>>,
    write_set: HashSet<String>,
    held_intents: HashSet<String>,
    aborted: Arc<AtomicBool>,
    state: TxnState,
}

impl<'db> Transaction<'db> {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.flags.contains(TxnFlags::READ_ONLY)
    }

    fn check_active(&self) -> Result<()> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(Error::Deadlock);
        }
        match self.state {
            TxnState::Active => Ok(()),
            _ => Err(Error::Execute("transaction is no longer active".into())),
        }
    }

    /// On a losing deadlock acquisition, release whatever this
    /// transaction already holds and mark it terminal, so the
    /// transactions waiting on those resources can proceed — a
    /// transaction that loses a deadlock is fully aborted, not just
    /// refused the one resource it was asking for.
    fn acquire_or_abort(&mut self, resource: &str) -> Result<()> {
        match self.mgr.acquire_intent(self.id, resource) {
            Ok(()) => {
                self.held_intents.insert(resource.to_string());
                Ok(())
            }
            Err(err) => {
                self.state = TxnState::Aborted;
                self.pending.clear();
                self.mgr.release_intents(self.id, &self.held_intents);
                self.mgr.deregister(self.id);
                Err(err)
            }
        }
    }

    /// Buffer an insertion. Fails with [Error::ReadOnly] on a read-only
    /// transaction.
    pub fn add(&mut self, key_a: &str, val_a: Value, key_b: &str, val_b: Value, src: &str) -> Result<()> {
        crate::error::track(self.add_inner(key_a, val_a, key_b, val_b, src))
    }

    fn add_inner(&mut self, key_a: &str, val_a: Value, key_b: &str, val_b: Value, src: &str) -> Result<()> {
        self.check_active()?;
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        self.acquire_or_abort(key_a)?;
        self.acquire_or_abort(key_b)?;
        self.write_set.insert(key_a.to_string());
        self.write_set.insert(key_b.to_string());
        self.pending.push(PendingOp::Add {
            key_a: key_a.to_string(),
            val_a,
            key_b: key_b.to_string(),
            val_b,
            src: src.to_string(),
        });
        Ok(())
    }

    /// Buffer a deletion. Fails with [Error::ReadOnly] on a read-only
    /// transaction.
    pub fn del(&mut self, key_a: &str, val_a: Value, key_b: &str, val_b: Value, src: &str) -> Result<()> {
        crate::error::track(self.del_inner(key_a, val_a, key_b, val_b, src))
    }

    fn del_inner(&mut self, key_a: &str, val_a: Value, key_b: &str, val_b: Value, src: &str) -> Result<()> {
        self.check_active()?;
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        self.acquire_or_abort(key_a)?;
        self.acquire_or_abort(key_b)?;
        self.write_set.insert(key_a.to_string());
        self.write_set.insert(key_b.to_string());
        self.pending.push(PendingOp::Del {
            key_a: key_a.to_string(),
            val_a,
            key_b: key_b.to_string(),
            val_b,
            src: src.to_string(),
        });
        Ok(())
    }

    /// Record that this transaction read `key`, for introspection; the
    /// concurrency model is snapshot isolation, so the read-set does not
    /// itself participate in deadlock detection (see `DESIGN.md`). Takes
    /// `&self`, not `&mut self` — `query` only borrows the transaction
    /// immutably, so the set itself needs interior mutability.
    pub(crate) fn note_read(&self, key: &str) {
        self.read_set.lock().unwrap().insert(key.to_string());
    }

    pub(crate) fn pending(&self) -> &[PendingOp] {
        &self.pending
    }

    pub(crate) fn snapshot(&self) -> RwLockReadGuard<'_, RelationStore> {
        self.mgr.read_store()
    }

    /// Run `condition`/`fetchspec` against the logical snapshot visible
    /// to this transaction: the committed store as of its `begin`, with
    /// its own buffered `add`/`del`s applied as an overlay. The evaluator
    /// consults the store, then applies the transaction's pending
    /// deletes/inserts as an overlay. The overlay is built on a private
    /// clone (`RelationStore::clone`
    /// always resets its own latch — see that impl) so concurrent
    /// commits by other transactions never observe it and this
    /// transaction's own pending writes never leak into the shared
    /// store before `commit`.
    pub fn query(&self, fetchspec: &FetchSpec, condition: &ConditionRef) -> Result<ResultSet> {
        crate::error::track(self.query_inner(fetchspec, condition))
    }

    fn query_inner(&self, fetchspec: &FetchSpec, condition: &ConditionRef) -> Result<ResultSet> {
        self.check_active()?;
        collect_condition_keys(condition, &mut |key| self.note_read(key));
        for column in fetchspec.columns() {
            self.note_read(column.key());
        }
        let mut overlay = self.mgr.read_store().clone();
        for op in &self.pending {
            match op {
                PendingOp::Add { key_a, val_a, key_b, val_b, src } => {
                    overlay.add(key_a, val_a.clone(), key_b, val_b.clone(), src);
                }
                PendingOp::Del { key_a, val_a, key_b, val_b, src } => {
                    let _ = overlay.del(key_a, val_a, key_b, val_b, src);
                }
            }
        }
        crate::query::run(&overlay, fetchspec, condition)
    }

    /// Flush the log group with a trailing `COMMIT`, apply the buffered
    /// writes to the store, release intents, and transition to
    /// Committed. A read-only transaction has nothing to flush or apply.
    /// "`del` of an absent quintuple fails the operation": a buffered
    /// delete that no longer matches anything by commit time fails the
    /// whole commit with [Error::Execute] rather than silently
    /// succeeding (see `DESIGN.md`).
    pub fn commit(mut self) -> Result<()> {
        let result = self.commit_inner();
        crate::error::track(result)
    }

    fn commit_inner(&mut self) -> Result<()> {
        self.check_active()?;

        if !self.is_read_only() && !self.pending.is_empty() {
            // Checked before the log is touched: a rejected delete must
            // never reach the log, since a `COMMIT` marker there would
            // make replay re-apply it as if this commit had succeeded.
            // A read lock suffices — every key a buffered `del` names is
            // already held as a write intent by this transaction (see
            // `del_inner`), so no concurrent commit can change whether
            // it matches between this check and the apply below.
            {
                let store = self.mgr.read_store();
                for op in &self.pending {
                    if let PendingOp::Del { key_a, val_a, key_b, val_b, src } = op {
                        if !store.contains(key_a, val_a, key_b, val_b, src) {
                            return Err(Error::Execute(format!(
                                "del of absent quintuple ({}, {:?}, {}, {:?}, {})",
                                key_a, val_a, key_b, val_b, src
                            )));
                        }
                    }
                }
            }

            let mut group = self.mgr.log.begin_group();
            for op in &self.pending {
                match op {
                    PendingOp::Add { key_a, val_a, key_b, val_b, src } => {
                        group.log_pair_insert(key_a, val_a, key_b, val_b, src);
                    }
                    PendingOp::Del { key_a, val_a, key_b, val_b, src } => {
                        group.log_pair_remove(key_a, val_a, key_b, val_b, src);
                    }
                }
            }
            self.mgr.log.commit_group(group)?;

            let mut store = self.mgr.write_store();
            for op in self.pending.drain(..) {
                match op {
                    PendingOp::Add { key_a, val_a, key_b, val_b, src } => {
                        store.add(&key_a, val_a, &key_b, val_b, &src);
                    }
                    PendingOp::Del { key_a, val_a, key_b, val_b, src } => {
                        let _ = store.del(&key_a, &val_a, &key_b, &val_b, &src);
                    }
                }
            }
        }

        self.state = TxnState::Committed;
        self.mgr.release_intents(self.id, &self.held_intents);
        self.mgr.deregister(self.id);
        Ok(())
    }

    /// Discard the buffer and any intents.
    pub fn abort(mut self) {
        self.state = TxnState::Aborted;
        self.pending.clear();
        self.mgr.release_intents(self.id, &self.held_intents);
        self.mgr.deregister(self.id);
    }
}

impl<'db> Drop for Transaction<'db> {
    /// A transaction not explicitly committed/aborted before it goes out
    /// of scope is aborted: closing the database aborts any stragglers.
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            self.mgr.release_intents(self.id, &self.held_intents);
            self.mgr.deregister(self.id);
        }
    }
}

#[cfg(test)]
#[path = "transaction_test.rs"]
mod transaction_test;
