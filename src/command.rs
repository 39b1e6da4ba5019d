//! The command set reified onto the Command Channel, and the completion
//! handles the Write Worker signals through.
//!
//! Mirrors the teacher's `GraniteMessage`/`GraniteWriteRequest` shape
//! (`engines::granite::wal`), but generalized from "one write-ahead-log
//! append" to the full write/read/transaction-control command set spec'd
//! for this engine, and with `tokio::sync::oneshot` responders in place of
//! `mpsc::SyncSender` so a completion can be `.await`ed directly by an
//! async host call instead of requiring a blocking `recv()`.

use tokio::sync::oneshot;

use crate::error::Result;

/// Resolves a pending async host call once the Write Worker has processed
/// the command it was attached to.
pub type Completion<T> = oneshot::Sender<Result<T>>;

/// Commands accepted on the Command Channel. Strict FIFO, single consumer
/// (the Write Worker).
pub enum Command {
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        reply: Completion<()>,
    },
    PutMany {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        reply: Completion<()>,
    },
    Delete {
        key: Vec<u8>,
        reply: Completion<()>,
    },
    GetAsync {
        key: Vec<u8>,
        reply: Completion<Option<Vec<u8>>>,
    },
    StartWrite {
        reply: Completion<()>,
    },
    CommitWrite {
        reply: Completion<()>,
    },
    AbortWrite {
        reply: Completion<()>,
    },
    /// Fire-and-forget put inside an explicit write transaction. Legal only
    /// between `StartWrite` and its matching `CommitWrite`/`AbortWrite`.
    /// Carries no completion handle — see `worker`'s latch-until-commit
    /// handling.
    PutNoConfirm { key: Vec<u8>, value: Vec<u8> },
    Shutdown {
        reply: Completion<()>,
    },
}

impl Command {
    /// Whether this command counts as a "write" for the implicit-batching
    /// policy (§4.3.1): a write with no open transaction begins one; a
    /// non-write command observed at the head of the queue closes one.
    pub(crate) fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Put { .. }
                | Command::PutMany { .. }
                | Command::Delete { .. }
                | Command::PutNoConfirm { .. }
        )
    }
}
