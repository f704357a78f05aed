//! S4 is an embedded media-metadata database: a store of quintuples
//! `(key_a, val_a, key_b, val_b, src)` describing facts about media
//! items (tracks, albums, artists, ...) that are attributed to the
//! source that contributed them and can disagree, with per-column
//! source preference resolving which fact wins.
//!
//! Facts are indexed symmetrically from both sides, so a lookup can
//! start from either end of a quintuple: given an artist name, find
//! every track; given a track, find its artist. A [condition] tree
//! drives queries by picking the cheapest indexable filter in the
//! tree, then walks outward to the rest of the row through
//! [store::RelationStore::values_for_pivot]. A [fetchspec] describes
//! which columns to project once a row is found, restricted per-column
//! to its best-preferred source; an [order] describes how to sort the
//! resulting [resultset].
//!
//! Writes go through a [transaction]: buffered `add`/`del`s, a
//! per-key write-intent table with waits-for deadlock detection, and a
//! [log] that is fsynced on commit and replayed on open. A
//! [database] ties a [store::RelationStore] and a [log::Log] together
//! under one [transaction::TransactionManager], owns the on-disk
//! snapshot format, and exposes the database-wide UUID identity.
//!
//! [condition]: crate::condition
//! [fetchspec]: crate::fetchspec
//! [order]: crate::order
//! [resultset]: crate::resultset
//! [transaction]: crate::transaction
//! [log]: crate::log
//! [database]: crate::database

mod condition;
mod database;
mod error;
mod fetchspec;
mod index;
mod intern;
mod log;
mod order;
mod pattern;
mod query;
mod resultset;
mod sourcepref;
mod spinlock;
mod store;
mod transaction;
mod util;
mod value;

pub use crate::condition::{CombineFn, Condition, ConditionRef, FilterFn};
pub use crate::database::{Database, DatabaseConfig, OpenFlags, OpenOptions};
pub use crate::error::{last_error, Error, ErrorCode, Result};
pub use crate::fetchspec::{FetchFlags, FetchSpec};
pub use crate::order::{EntryHandle, Order, OrderDirection};
pub use crate::pattern::Pattern;
pub use crate::resultset::{ResultCell, ResultRow, ResultSet, ResultValue};
pub use crate::sourcepref::SourcePref;
pub use crate::transaction::{Transaction, TxnFlags, TxnId};
pub use crate::value::{CmpMode, Value};
