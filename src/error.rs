//! Module `error` implements the error surface for [crate::Database] and
//! everything built on top of it.
//!
//! The original interface this crate generalizes (`s4_errno_t` in the C
//! header) is a flat enum of thirteen error codes. We keep that surface
//! reachable through [Error::code], but the concrete [Error] carries
//! whatever context Rust lets us carry for free (a wrapped [io::Error],
//! the name of an unknown key) instead of stuffing it into a global
//! "last error string" the way the C API does.

use std::{fmt, io, result};

/// Result alias used throughout this crate, mirroring `core::Result` in
/// spirit: a plain `Result<T, Error>`, no `thiserror`, no `anyhow`.
pub type Result<T> = result::Result<T, Error>;

/// The thirteen numeric error codes from `s4_errno_t`, for embedders that
/// want the original flat surface instead of matching on [Error] directly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    NoError,
    Exists,
    NoEnt,
    Open,
    Magic,
    Version,
    Incons,
    LogOpen,
    LogRedo,
    Deadlock,
    Execute,
    LogFull,
    ReadOnly,
}

#[derive(Debug)]
pub enum Error {
    /// `open` with `NEW` on a path that already exists.
    Exists(String),
    /// `open` with `EXISTS` on a path that does not exist.
    NoEnt(String),
    /// Could not open the database file.
    Open(String),
    /// Snapshot magic number did not match.
    Magic,
    /// Snapshot version is not supported by this build.
    Version(u32),
    /// Snapshot or log is structurally inconsistent.
    Incons(String),
    /// Could not open the log file.
    LogOpen(String),
    /// Log replay hit an invalid or truncated record inside a committed
    /// group.
    LogRedo(String),
    /// Transaction aborted after a deadlock cycle was detected.
    Deadlock,
    /// A buffered add/del could not be applied during commit.
    Execute(String),
    /// The log has no room left for this transaction's records.
    LogFull,
    /// `add`/`del` called against a read-only transaction.
    ReadOnly,
    /// Value accessor called against a value of the wrong variant.
    WrongType,
    /// A condition or fetch-spec column refers to a key the store has
    /// never interned and `update_key`/`bind` could not resolve.
    UnknownKey(String),
    /// A source name could not be resolved while binding a source
    /// preference.
    UnknownSource(String),
    /// Underlying I/O failure, wrapped rather than stringified.
    Io(io::Error),
}

impl Error {
    /// Map this error onto the flat `s4_errno_t` surface.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Exists(_) => ErrorCode::Exists,
            Error::NoEnt(_) => ErrorCode::NoEnt,
            Error::Open(_) => ErrorCode::Open,
            Error::Magic => ErrorCode::Magic,
            Error::Version(_) => ErrorCode::Version,
            Error::Incons(_) => ErrorCode::Incons,
            Error::LogOpen(_) => ErrorCode::LogOpen,
            Error::LogRedo(_) => ErrorCode::LogRedo,
            Error::Deadlock => ErrorCode::Deadlock,
            Error::Execute(_) => ErrorCode::Execute,
            Error::LogFull => ErrorCode::LogFull,
            Error::ReadOnly => ErrorCode::ReadOnly,
            // usage errors have no s4_errno_t counterpart; Execute is the
            // closest "this call failed" bucket.
            Error::WrongType | Error::UnknownKey(_) | Error::UnknownSource(_) => {
                ErrorCode::Execute
            }
            Error::Io(_) => ErrorCode::Open,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Exists(path) => write!(f, "database already exists: {}", path),
            Error::NoEnt(path) => write!(f, "database does not exist: {}", path),
            Error::Open(msg) => write!(f, "could not open database: {}", msg),
            Error::Magic => write!(f, "bad magic number, not an s4 database"),
            Error::Version(v) => write!(f, "unsupported snapshot version: {}", v),
            Error::Incons(msg) => write!(f, "inconsistent database: {}", msg),
            Error::LogOpen(msg) => write!(f, "could not open log file: {}", msg),
            Error::LogRedo(msg) => write!(f, "could not redo log: {}", msg),
            Error::Deadlock => write!(f, "transaction aborted: deadlock detected"),
            Error::Execute(msg) => write!(f, "transaction operation failed: {}", msg),
            Error::LogFull => write!(f, "log file has no room for this transaction"),
            Error::ReadOnly => write!(f, "add/del on a read-only transaction"),
            Error::WrongType => write!(f, "value accessor does not match stored type"),
            Error::UnknownKey(key) => write!(f, "unknown key: {}", key),
            Error::UnknownSource(src) => write!(f, "unknown source: {}", src),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

thread_local! {
    static LAST_ERROR: std::cell::RefCell<Option<String>> = std::cell::RefCell::new(None);
}

/// Record `err` as the thread-local "last error", the way `s4_errno`/
/// `s4_strerror` expose it in the C API. Call sites in the public API call
/// this on every `Err` return; success calls never touch it.
pub(crate) fn set_last_error(err: &Error) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(err.to_string()));
}

/// Read the last error recorded on this thread. Idempotent: reading does
/// not clear it. Consult this only after an API call has returned an
/// error; it is not reset on success.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}

/// Helper used by the public API entry points: run `f`, and if it fails,
/// mirror the error into the thread-local before propagating it.
pub(crate) fn track<T>(result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        set_last_error(err);
    }
    result
}
