//! Module `log` implements the append-only binary redo log and its
//! replay-on-open recovery.
//!
//! Record stream: every record starts with a 4-byte big-endian type tag.
//!
//! - `STRING_INSERT`: id:u32, length:u32, bytes:length.
//! - `PAIR_INSERT`/`PAIR_REMOVE`: key_a_id:u32, val_a(tag:u32,payload:u64),
//!   key_b_id:u32, val_b(tag:u32,payload:u64), src_id:u32.
//! - `COMMIT`: no payload, marks the end of a transaction's record group.
//!
//! A transaction's records are accumulated in memory (a [LogGroup]) and
//! only reach the file, fsynced, when the owning transaction commits: on
//! commit, the log is flushed before the store is updated, and an
//! aborted transaction's in-memory log records are simply discarded.
//! This means an aborted transaction never touches the file at all.
//!
//! `STRING_INSERT` is not limited to value strings: key names, source
//! names and string values all share one interning table local to the
//! log, so a replayed record never depends on the relation store's own
//! (separately, snapshot-persisted) key/source interning having assigned
//! the same ids across a crash (see `DESIGN.md`).

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::{fs, mem};

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::util::open_file_w;
use crate::value::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
enum RecordType {
    StringInsert = 1,
    PairInsert = 2,
    PairRemove = 3,
    Commit = 4,
}

impl RecordType {
    fn from_u32(tag: u32) -> Option<RecordType> {
        match tag {
            1 => Some(RecordType::StringInsert),
            2 => Some(RecordType::PairInsert),
            3 => Some(RecordType::PairRemove),
            4 => Some(RecordType::Commit),
            _ => None,
        }
    }
}

const VALUE_TAG_INT: u32 = 0;
const VALUE_TAG_STR: u32 = 1;
// type tag (4) + ka(4) + val_a(4+8) + kb(4) + val_b(4+8) + src(4)
const PAIR_RECORD_LEN: usize = 4 + 4 + 12 + 4 + 12 + 4;

/// One `add` or `del` reconstructed from the log, ready to replay
/// against a fresh [crate::store::RelationStore].
#[derive(Debug)]
pub enum ReplayOp {
    Insert {
        key_a: String,
        val_a: Value,
        key_b: String,
        val_b: Value,
        src: String,
    },
    Remove {
        key_a: String,
        val_a: Value,
        key_b: String,
        val_b: Value,
        src: String,
    },
}

/// Everything recovered from a log replay: the committed operations, in
/// commit order, and the string table/next-id state needed so a freshly
/// opened [Log] continues allocating ids without colliding with what is
/// already durable on disk.
pub struct ReplayResult {
    pub ops: Vec<ReplayOp>,
    strings: HashMap<String, u32>,
    next_str_id: u32,
}

/// Where a [Log]'s bytes actually land: a real file under an exclusive
/// advisory lock, or nowhere at all for a `MEMORY`-flagged database,
/// which creates a purely in-memory database with no log or file.
/// `Sink::Memory` still runs every record through the same encode/commit
/// path, it just never reaches disk.
enum Sink {
    File(fs::File),
    Memory,
}

impl Sink {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Sink::File(f) => {
                f.write_all(buf)?;
                Ok(())
            }
            Sink::Memory => Ok(()),
        }
    }

    fn sync_data(&mut self) -> Result<()> {
        match self {
            Sink::File(f) => {
                f.sync_data()?;
                Ok(())
            }
            Sink::Memory => Ok(()),
        }
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        match self {
            Sink::File(f) => {
                f.set_len(len)?;
                Ok(())
            }
            Sink::Memory => Ok(()),
        }
    }
}

struct LogState {
    sink: Sink,
    strings: HashMap<String, u32>,
    next_str_id: u32,
}

/// The append-only redo log. Shared by every active transaction; groups
/// are built up independently in memory and handed to [Log::commit_group]
/// one at a time. The log file is owned by a dedicated writer mutex;
/// only commit flushes.
pub struct Log {
    state: Mutex<LogState>,
    path: Option<PathBuf>,
}

impl Log {
    /// Replay `path` if it exists (returning an empty result if it does
    /// not — a brand-new database has no log yet), then open it for
    /// appending under an exclusive file lock.
    pub fn open(path: &Path) -> Result<(Log, Vec<ReplayOp>)> {
        let replayed = if path.exists() {
            Self::replay(path)?
        } else {
            ReplayResult {
                ops: Vec::new(),
                strings: HashMap::new(),
                next_str_id: 0,
            }
        };

        let file = open_file_w(path, path.exists()).map_err(|e| Error::LogOpen(e.to_string()))?;
        file.try_lock_exclusive()
            .map_err(|e| Error::LogOpen(format!("log already locked by another process: {}", e)))?;

        let log = Log {
            state: Mutex::new(LogState {
                sink: Sink::File(file),
                strings: replayed.strings,
                next_str_id: replayed.next_str_id,
            }),
            path: Some(path.to_path_buf()),
        };
        Ok((log, replayed.ops))
    }

    /// A log backed by nothing: every group still runs through
    /// `begin_group`/`commit_group`, but nothing is ever written to disk
    /// and `truncate` is a no-op. Used by `MEMORY`-flagged databases.
    pub fn in_memory() -> Log {
        Log {
            state: Mutex::new(LogState {
                sink: Sink::Memory,
                strings: HashMap::new(),
                next_str_id: 0,
            }),
            path: None,
        }
    }

    /// Scan `path` front to back, replaying each `COMMIT`-terminated
    /// group. A group with no trailing `COMMIT` (the process crashed
    /// mid-transaction) is silently discarded. A record whose type tag
    /// is not one of the four known kinds is real corruption, not a
    /// crash-truncation, and fails the whole open with [Error::LogRedo].
    fn replay(path: &Path) -> Result<ReplayResult> {
        let mut file = fs::File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut strings: HashMap<u32, String> = HashMap::new();
        let mut pending: Vec<ReplayOp> = Vec::new();
        let mut applied: Vec<ReplayOp> = Vec::new();
        let mut pos = 0usize;

        loop {
            let tag = match read_u32(&bytes, pos) {
                Some(tag) => tag,
                None => break, // clean end of file at a record boundary
            };
            let record_type = match RecordType::from_u32(tag) {
                Some(rt) => rt,
                None => return Err(Error::LogRedo(format!("invalid record tag {}", tag))),
            };

            match record_type {
                RecordType::StringInsert => {
                    if bytes.len() < pos + 12 {
                        break; // truncated header: trailing incomplete group
                    }
                    let id = read_u32(&bytes, pos + 4).unwrap();
                    let len = read_u32(&bytes, pos + 8).unwrap() as usize;
                    if bytes.len() < pos + 12 + len {
                        break; // truncated payload
                    }
                    let s = match String::from_utf8(bytes[pos + 12..pos + 12 + len].to_vec()) {
                        Ok(s) => s,
                        Err(_) => return Err(Error::LogRedo("string insert record is not valid utf-8".into())),
                    };
                    strings.insert(id, s);
                    pos += 12 + len;
                }
                RecordType::PairInsert | RecordType::PairRemove => {
                    if bytes.len() < pos + PAIR_RECORD_LEN {
                        break; // truncated mid-record, never reached a commit
                    }
                    let ka_id = read_u32(&bytes, pos + 4).unwrap();
                    let (a_tag, a_payload) = read_value_raw(&bytes, pos + 8);
                    let kb_id = read_u32(&bytes, pos + 20).unwrap();
                    let (b_tag, b_payload) = read_value_raw(&bytes, pos + 24);
                    let src_id = read_u32(&bytes, pos + 36).unwrap();

                    let key_a = resolve_name(&strings, ka_id)?;
                    let key_b = resolve_name(&strings, kb_id)?;
                    let src = resolve_name(&strings, src_id)?;
                    let val_a = decode_value(&strings, a_tag, a_payload)?;
                    let val_b = decode_value(&strings, b_tag, b_payload)?;

                    let op = match record_type {
                        RecordType::PairInsert => ReplayOp::Insert {
                            key_a,
                            val_a,
                            key_b,
                            val_b,
                            src,
                        },
                        _ => ReplayOp::Remove {
                            key_a,
                            val_a,
                            key_b,
                            val_b,
                            src,
                        },
                    };
                    pending.push(op);
                    pos += PAIR_RECORD_LEN;
                }
                RecordType::Commit => {
                    applied.append(&mut pending);
                    pos += 4;
                }
            }
        }
        // any still-pending records belong to a group that never saw a
        // COMMIT marker; discard them.

        let next_str_id = strings.keys().copied().max().map(|m| m + 1).unwrap_or(0);
        let strings: HashMap<String, u32> = strings.into_iter().map(|(id, s)| (s, id)).collect();
        Ok(ReplayResult {
            ops: applied,
            strings,
            next_str_id,
        })
    }

    /// Start a new in-memory record group for a transaction.
    pub fn begin_group(&self) -> LogGroup<'_> {
        LogGroup {
            log: self,
            buf: Vec::new(),
            new_strings: Vec::new(),
            local_ids: HashMap::new(),
        }
    }

    /// Flush `group`'s accumulated records plus a trailing `COMMIT`
    /// record to the log file and fsync. New string bindings discovered
    /// while building the group become visible to later groups only now,
    /// atomically with the bytes actually reaching the file.
    pub fn commit_group(&self, group: LogGroup) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for (s, id) in group.new_strings {
            state.strings.entry(s).or_insert(id);
        }
        let mut buf = group.buf;
        buf.extend_from_slice(&(RecordType::Commit as u32).to_be_bytes());
        state.sink.write_all(&buf)?;
        state.sink.sync_data()?;
        Ok(())
    }

    /// Truncate the log to empty, used right after a snapshot sync makes
    /// its contents redundant: the log compacts opportunistically, so
    /// when the database file is synced, the store is written out as a
    /// fresh snapshot and the log truncated.
    pub fn truncate(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.sink.set_len(0)?;
        state.strings.clear();
        state.next_str_id = 0;
        Ok(())
    }

    /// The log's backing path, or `None` for an in-memory log.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        if let Ok(state) = self.state.lock() {
            if let Sink::File(f) = &state.sink {
                let _ = fs2::FileExt::unlock(f);
            }
        }
    }
}

/// A transaction's pending, not-yet-durable record group.
pub struct LogGroup<'a> {
    log: &'a Log,
    buf: Vec<u8>,
    new_strings: Vec<(String, u32)>,
    local_ids: HashMap<String, u32>,
}

impl<'a> LogGroup<'a> {
    pub fn log_pair_insert(&mut self, key_a: &str, val_a: &Value, key_b: &str, val_b: &Value, src: &str) {
        self.log_pair(RecordType::PairInsert, key_a, val_a, key_b, val_b, src);
    }

    pub fn log_pair_remove(&mut self, key_a: &str, val_a: &Value, key_b: &str, val_b: &Value, src: &str) {
        self.log_pair(RecordType::PairRemove, key_a, val_a, key_b, val_b, src);
    }

    /// Discard this group without writing anything. Aborted transactions'
    /// in-memory log records are simply dropped.
    pub fn discard(self) {
        mem::drop(self);
    }

    fn log_pair(&mut self, rt: RecordType, key_a: &str, val_a: &Value, key_b: &str, val_b: &Value, src: &str) {
        let ka = self.resolve_string(key_a);
        let kb = self.resolve_string(key_b);
        let s = self.resolve_string(src);
        self.buf.extend_from_slice(&(rt as u32).to_be_bytes());
        self.buf.extend_from_slice(&ka.to_be_bytes());
        self.encode_value(val_a);
        self.buf.extend_from_slice(&kb.to_be_bytes());
        self.encode_value(val_b);
        self.buf.extend_from_slice(&s.to_be_bytes());
    }

    fn encode_value(&mut self, v: &Value) {
        if v.is_int() {
            let i = v.as_int().unwrap();
            self.buf.extend_from_slice(&VALUE_TAG_INT.to_be_bytes());
            self.buf.extend_from_slice(&(i as i64).to_be_bytes());
        } else {
            let s = v.as_str().unwrap().to_string();
            let id = self.resolve_string(&s);
            self.buf.extend_from_slice(&VALUE_TAG_STR.to_be_bytes());
            self.buf.extend_from_slice(&(id as u64).to_be_bytes());
        }
    }

    /// Resolve `s` to a log-local string id, writing a `STRING_INSERT`
    /// record into this group's buffer the first time `s` is seen
    /// (whether globally, across committed groups, or within this one).
    fn resolve_string(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.local_ids.get(s) {
            return id;
        }
        {
            let state = self.log.state.lock().unwrap();
            if let Some(&id) = state.strings.get(s) {
                self.local_ids.insert(s.to_string(), id);
                return id;
            }
        }
        let id = {
            let mut state = self.log.state.lock().unwrap();
            let id = state.next_str_id;
            state.next_str_id += 1;
            id
        };
        self.buf.extend_from_slice(&(RecordType::StringInsert as u32).to_be_bytes());
        self.buf.extend_from_slice(&id.to_be_bytes());
        self.buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        self.local_ids.insert(s.to_string(), id);
        self.new_strings.push((s.to_string(), id));
        id
    }
}

fn read_u32(bytes: &[u8], pos: usize) -> Option<u32> {
    if bytes.len() < pos + 4 {
        return None;
    }
    Some(u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()))
}

fn read_value_raw(bytes: &[u8], pos: usize) -> (u32, u64) {
    let tag = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap());
    let payload = u64::from_be_bytes(bytes[pos + 4..pos + 12].try_into().unwrap());
    (tag, payload)
}

fn resolve_name(strings: &HashMap<u32, String>, id: u32) -> Result<String> {
    strings
        .get(&id)
        .cloned()
        .ok_or_else(|| Error::LogRedo(format!("record references unknown string id {}", id)))
}

fn decode_value(strings: &HashMap<u32, String>, tag: u32, payload: u64) -> Result<Value> {
    match tag {
        VALUE_TAG_INT => Ok(Value::new_int(payload as i64 as i32)),
        VALUE_TAG_STR => {
            let id = payload as u32;
            Ok(Value::new_string(resolve_name(strings, id)?))
        }
        _ => Err(Error::LogRedo(format!("invalid value tag {}", tag))),
    }
}

#[cfg(test)]
#[path = "log_test.rs"]
mod log_test;
