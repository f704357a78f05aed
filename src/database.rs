//! Module `database` implements [Database]: `open`/`sync`, the on-disk
//! snapshot file format, and the database-identity UUID.
//!
//! A [Database] owns a [TransactionManager] (the shared store + redo
//! log) plus the bits that only matter at the whole-database level: the
//! snapshot file path, the stable [Uuid] identity, and the
//! [DatabaseConfig] non-functional knobs.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::intern::Interner;
use crate::log::Log;
use crate::store::RelationStore;
use crate::transaction::{Transaction, TransactionManager, TxnFlags};
use crate::value::Value;

const MAGIC: &[u8; 4] = b"S4DB";
const VERSION: u32 = 1;

const VALUE_TAG_INT: u32 = 0;
const VALUE_TAG_STR: u32 = 1;

/// `s4_open_flag_t`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const NONE: OpenFlags = OpenFlags(0);
    pub const NEW: OpenFlags = OpenFlags(1 << 0);
    pub const EXISTS: OpenFlags = OpenFlags(1 << 1);
    pub const MEMORY: OpenFlags = OpenFlags(1 << 2);

    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

/// Non-functional knobs the original hard-codes as constants: the
/// log-file suffix, whether `sync` truncates the log after a successful
/// snapshot write, and the deadlock detector's cycle-check cadence
/// (informational here; the detector itself runs synchronously inside
/// `add`/`del`, see `crate::transaction`).
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub log_suffix: String,
    pub truncate_log_on_sync: bool,
    pub deadlock_check_interval_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> DatabaseConfig {
        DatabaseConfig {
            log_suffix: ".s4log".to_string(),
            truncate_log_on_sync: true,
            deadlock_check_interval_ms: 50,
        }
    }
}

impl DatabaseConfig {
    /// Load a config from a TOML file. Callers that want a missing file
    /// to silently fall back to [DatabaseConfig::default] should treat
    /// an `Io` error from a nonexistent path as "use the default" rather
    /// than propagating it.
    pub fn load(path: &Path) -> Result<DatabaseConfig> {
        crate::error::track((|| {
            let text = fs::read_to_string(path)?;
            toml::from_str(&text).map_err(|err| Error::Incons(format!("invalid database config: {}", err)))
        })())
    }
}

/// Builder for [Database::open]: `open(path, known_keys[], flags)`.
pub struct OpenOptions {
    flags: OpenFlags,
    known_keys: Vec<String>,
    config: DatabaseConfig,
}

impl OpenOptions {
    pub fn new() -> OpenOptions {
        OpenOptions {
            flags: OpenFlags::NONE,
            known_keys: Vec::new(),
            config: DatabaseConfig::default(),
        }
    }

    pub fn flags(mut self, flags: OpenFlags) -> OpenOptions {
        self.flags = flags;
        self
    }

    /// Pre-intern `keys` so their ids are stable across opens for
    /// well-known columns.
    pub fn known_keys(mut self, keys: &[&str]) -> OpenOptions {
        self.known_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn config(mut self, config: DatabaseConfig) -> OpenOptions {
        self.config = config;
        self
    }

    pub fn open(self, path: impl AsRef<Path>) -> Result<Database> {
        crate::error::track(Database::open_with(path.as_ref(), self.flags, &self.known_keys, self.config))
    }
}

impl Default for OpenOptions {
    fn default() -> OpenOptions {
        OpenOptions::new()
    }
}

/// An open S4 database: the shared transaction manager plus identity
/// and path bookkeeping. `MEMORY` databases carry no path and never
/// touch disk: flag set this way creates a purely in-memory database
/// with no log or file.
pub struct Database {
    mgr: TransactionManager,
    path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    in_memory: bool,
    uuid: Uuid,
    config: DatabaseConfig,
}

impl Database {
    fn open_with(path: &Path, flags: OpenFlags, known_keys: &[String], config: DatabaseConfig) -> Result<Database> {
        if flags.contains(OpenFlags::MEMORY) {
            let mut store = RelationStore::new();
            for key in known_keys {
                store.keys_mut().intern(key);
            }
            log::info!(target: "s4", "opened in-memory database");
            let log = Log::in_memory();
            let mgr = TransactionManager::new(store, log);
            return Ok(Database {
                mgr,
                path: None,
                log_path: None,
                in_memory: true,
                uuid: Uuid::new_v4(),
                config,
            });
        }

        let exists = path.exists();
        if flags.contains(OpenFlags::NEW) && exists {
            return Err(Error::Exists(path.display().to_string()));
        }
        if flags.contains(OpenFlags::EXISTS) && !exists {
            return Err(Error::NoEnt(path.display().to_string()));
        }

        let (mut store, uuid) = if exists {
            read_snapshot(path)?
        } else {
            (RelationStore::new(), Uuid::new_v4())
        };
        for key in known_keys {
            store.keys_mut().intern(key);
        }

        let log_path = log_path_for(path, &config);
        let (log, ops) = Log::open(&log_path)?;
        let mgr = TransactionManager::new(store, log);
        mgr.apply_replayed(ops);

        log::info!(target: "s4", "opened database at {}", path.display());
        Ok(Database {
            mgr,
            path: Some(path.to_path_buf()),
            log_path: Some(log_path),
            in_memory: false,
            uuid,
            config,
        })
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_memory(&self) -> bool {
        self.in_memory
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// `s4_begin`.
    pub fn begin(&self, flags: TxnFlags) -> Transaction<'_> {
        log::debug!(target: "s4", "begin transaction, read_only={}", flags.contains(TxnFlags::READ_ONLY));
        self.mgr.begin(flags)
    }

    /// Write a fresh snapshot of the current committed store and
    /// truncate the redo log: the log compacts opportunistically, so
    /// when the database file is synced, the store is written out as a
    /// fresh snapshot and the log truncated. No-op on an in-memory
    /// database. Also the documented recovery path for `Error::LogFull`:
    /// the caller calls `sync`, which frees log space, then retries the
    /// transaction from scratch.
    pub fn sync(&self) -> Result<()> {
        crate::error::track(self.sync_inner())
    }

    fn sync_inner(&self) -> Result<()> {
        if self.in_memory {
            return Ok(());
        }
        let path = self.path.as_ref().expect("non-memory database always has a path");
        let store = self.mgr.write_store();
        write_snapshot(path, &store, self.uuid)?;
        drop(store);
        if self.config.truncate_log_on_sync {
            self.mgr.log().truncate()?;
        }
        log::info!(target: "s4", "synced database at {}", path.display());
        Ok(())
    }
}

fn log_path_for(path: &Path, config: &DatabaseConfig) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(&config.log_suffix);
    PathBuf::from(name)
}

/// Write `store` as a fresh snapshot to `path`: build the whole file in
/// memory, then rename it into place, so a crash mid-write never leaves
/// a half-written snapshot behind. Extends the log's durability
/// contract to the snapshot file itself.
fn write_snapshot(path: &Path, store: &RelationStore, uuid: Uuid) -> Result<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_be_bytes());
    buf.extend_from_slice(uuid.as_bytes());

    write_string_table(&mut buf, store.keys());
    write_string_table(&mut buf, store.sources());

    // Value strings (artist names, urls, ...) are not keys or sources;
    // they get their own table, built fresh from whatever is live right
    // now, the same way `crate::log::LogGroup` interns any string it
    // has not seen yet.
    let mut value_strings: Vec<String> = Vec::new();
    let mut value_string_ids: HashMap<String, u32> = HashMap::new();
    let mut intern_value_string = |s: &str, strings: &mut Vec<String>, ids: &mut HashMap<String, u32>| -> u32 {
        if let Some(&id) = ids.get(s) {
            return id;
        }
        let id = strings.len() as u32;
        strings.push(s.to_string());
        ids.insert(s.to_string(), id);
        id
    };

    let mut entry_records = Vec::new();
    let ids: Vec<_> = store.iter_ids().collect();
    for id in ids {
        let entry = store.get_entry(id).expect("iter_ids only yields live entries");
        let mut rec = Vec::new();
        rec.extend_from_slice(&entry.key_a().to_be_bytes());
        encode_value(&mut rec, entry.val_a(), &mut value_strings, &mut value_string_ids, &mut intern_value_string);
        rec.extend_from_slice(&entry.key_b().to_be_bytes());
        encode_value(&mut rec, entry.val_b(), &mut value_strings, &mut value_string_ids, &mut intern_value_string);
        rec.extend_from_slice(&entry.src().to_be_bytes());
        entry_records.push(rec);
    }

    buf.extend_from_slice(&(value_strings.len() as u32).to_be_bytes());
    for s in &value_strings {
        buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    buf.extend_from_slice(&(entry_records.len() as u32).to_be_bytes());
    for rec in entry_records {
        buf.extend_from_slice(&rec);
    }

    let tmp_path = path.with_extension("s4tmp");
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn write_string_table(buf: &mut Vec<u8>, interner: &Interner) {
    buf.extend_from_slice(&(interner.len() as u32).to_be_bytes());
    for (_, name) in interner.iter() {
        buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
    }
}

fn encode_value(
    buf: &mut Vec<u8>,
    value: &Value,
    strings: &mut Vec<String>,
    ids: &mut HashMap<String, u32>,
    intern: &mut impl FnMut(&str, &mut Vec<String>, &mut HashMap<String, u32>) -> u32,
) {
    if value.is_int() {
        buf.extend_from_slice(&VALUE_TAG_INT.to_be_bytes());
        buf.extend_from_slice(&(value.as_int().unwrap() as i64).to_be_bytes());
    } else {
        let s = value.as_str().unwrap();
        let id = intern(s, strings, ids);
        buf.extend_from_slice(&VALUE_TAG_STR.to_be_bytes());
        buf.extend_from_slice(&(id as u64).to_be_bytes());
    }
}

/// Read a snapshot back into a fresh [RelationStore]. Fails with
/// [Error::Magic]/[Error::Version]/[Error::Incons] depending on what in
/// the header or body fails to check out.
fn read_snapshot(path: &Path) -> Result<(RelationStore, Uuid)> {
    let mut bytes = Vec::new();
    fs::File::open(path)?.read_to_end(&mut bytes)?;

    let mut pos = 0usize;
    if bytes.len() < 4 || &bytes[0..4] != MAGIC {
        return Err(Error::Magic);
    }
    pos += 4;

    let version = take_u32(&bytes, &mut pos)?;
    if version != VERSION {
        return Err(Error::Version(version));
    }

    if bytes.len() < pos + 16 {
        return Err(Error::Incons("snapshot truncated in uuid header".into()));
    }
    let uuid = Uuid::from_slice(&bytes[pos..pos + 16]).map_err(|e| Error::Incons(format!("bad uuid: {}", e)))?;
    pos += 16;

    let keys = Interner::from_names(read_string_table(&bytes, &mut pos)?);
    let sources = Interner::from_names(read_string_table(&bytes, &mut pos)?);
    let value_strings = read_string_table(&bytes, &mut pos)?;

    let mut store = RelationStore::from_interners(keys, sources);
    let entry_count = take_u32(&bytes, &mut pos)? as usize;
    for _ in 0..entry_count {
        let ka = take_u32(&bytes, &mut pos)?;
        let val_a = decode_value(&bytes, &mut pos, &value_strings)?;
        let kb = take_u32(&bytes, &mut pos)?;
        let val_b = decode_value(&bytes, &mut pos, &value_strings)?;
        let src = take_u32(&bytes, &mut pos)?;

        let key_a = store.keys().name(ka).ok_or_else(|| Error::Incons("entry references unknown key id".into()))?.to_string();
        let key_b = store.keys().name(kb).ok_or_else(|| Error::Incons("entry references unknown key id".into()))?.to_string();
        let src_name = store.sources().name(src).ok_or_else(|| Error::Incons("entry references unknown source id".into()))?.to_string();
        store.add(&key_a, val_a, &key_b, val_b, &src_name);
    }

    Ok((store, uuid))
}

fn read_string_table(bytes: &[u8], pos: &mut usize) -> Result<Vec<String>> {
    let count = take_u32(bytes, pos)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = take_u32(bytes, pos)? as usize;
        if bytes.len() < *pos + len {
            return Err(Error::Incons("snapshot truncated in string table".into()));
        }
        let s = String::from_utf8(bytes[*pos..*pos + len].to_vec())
            .map_err(|_| Error::Incons("snapshot string table is not valid utf-8".into()))?;
        *pos += len;
        out.push(s);
    }
    Ok(out)
}

fn decode_value(bytes: &[u8], pos: &mut usize, value_strings: &[String]) -> Result<Value> {
    let tag = take_u32(bytes, pos)?;
    if bytes.len() < *pos + 8 {
        return Err(Error::Incons("snapshot truncated in value payload".into()));
    }
    let payload = u64::from_be_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    match tag {
        VALUE_TAG_INT => Ok(Value::new_int(payload as i64 as i32)),
        VALUE_TAG_STR => {
            let s = value_strings
                .get(payload as usize)
                .ok_or_else(|| Error::Incons("entry references unknown value-string id".into()))?;
            Ok(Value::new_string(s.clone()))
        }
        _ => Err(Error::Incons(format!("invalid value tag {}", tag))),
    }
}

fn take_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    if bytes.len() < *pos + 4 {
        return Err(Error::Incons("snapshot truncated".into()));
    }
    let v = u32::from_be_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(v)
}

#[cfg(test)]
#[path = "database_test.rs"]
mod database_test;
