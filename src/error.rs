//! Error types for ordkv
//!
//! A single unified error type carries the `kind` tags described by the
//! surface contract: no numeric codes, just a tag and a message.

use std::fmt;
use std::io;

/// Unified error type for ordkv operations.
#[derive(Debug)]
pub enum Error {
    /// Environment could not be opened.
    Open(String),
    /// Handle used after `close()`.
    Closed,
    /// Key exceeds the engine's key-size limit.
    KeyTooLarge,
    /// Value exceeds the engine's size limits.
    ValueTooLarge,
    /// Environment map size exceeded; enlarge and retry.
    MapFull,
    /// A second `startWriteTransaction` while one is already active.
    TransactionAlreadyOpen,
    /// `commitWriteTransaction`/`putNoConfirm` with no matching `startWriteTransaction`.
    NoTransaction,
    /// The write worker thread terminated unexpectedly.
    WorkerDead,
    /// Any other engine failure, wrapped with its message.
    Engine(String),
    /// I/O error opening or reading the environment's files.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Open(msg) => write!(f, "failed to open environment: {msg}"),
            Error::Closed => write!(f, "environment is closed"),
            Error::KeyTooLarge => write!(f, "key exceeds the engine's maximum key size"),
            Error::ValueTooLarge => write!(f, "value exceeds the engine's size limits"),
            Error::MapFull => write!(f, "map size exceeded; reopen with a larger map_size"),
            Error::TransactionAlreadyOpen => write!(f, "a write transaction is already open"),
            Error::NoTransaction => write!(f, "no write transaction is open"),
            Error::WorkerDead => write!(f, "write worker thread terminated unexpectedly"),
            Error::Engine(msg) => write!(f, "{msg}"),
            Error::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<heed::Error> for Error {
    fn from(e: heed::Error) -> Self {
        match e {
            heed::Error::Mdb(heed::MdbError::MapFull) => Error::MapFull,
            heed::Error::Mdb(heed::MdbError::BadValSize) => Error::KeyTooLarge,
            heed::Error::Io(io_err) => Error::Io(io_err),
            other => Error::Engine(other.to_string()),
        }
    }
}

/// Result type alias for ordkv operations.
pub type Result<T> = std::result::Result<T, Error>;
