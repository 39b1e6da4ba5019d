//! The Database Facade: the host-visible surface. Synchronous operations
//! run inline against the Read Transaction Slot; asynchronous operations
//! enqueue a command and resolve when the Write Worker signals it.

use tokio::sync::oneshot;

use crate::command::Command;
use crate::config::EnvConfig;
use crate::engine::EngineHandle;
use crate::error::{Error, Result};
use crate::read_txn;

/// The host-visible database handle. Cheap to clone — internally an
/// `EngineHandle`, itself an `Arc`.
#[derive(Clone)]
pub struct Database {
    engine: EngineHandle,
}

impl Database {
    /// Opens the environment at `config.path`, spawning its Write Worker
    /// if this is the first handle for that path in this process.
    pub fn open(config: EnvConfig) -> Result<Self> {
        let engine = EngineHandle::open(&config)?;
        Ok(Database { engine })
    }

    /// Async read: enqueues `GetAsync` and resolves with the value or
    /// `None`.
    pub async fn get(&self, key: impl Into<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        let (reply, done) = oneshot::channel();
        self.engine.send(Command::GetAsync {
            key: key.into(),
            reply,
        })?;
        await_completion(done).await
    }

    /// Sync read via the Read Transaction Slot (§4.2).
    pub fn get_sync(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.engine.is_closed() {
            return Err(Error::Closed);
        }
        read_txn::with_read_txn(self.engine.env(), self.engine.db(), |rtxn, db| {
            Ok(db.get(rtxn, key)?.map(|v| v.to_vec()))
        })
    }

    /// One `GetAsync` per key, in order; resolves with an ordered vector
    /// of the same length.
    pub async fn get_many(&self, keys: Vec<Vec<u8>>) -> Result<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// Async write: resolves on commit of the enclosing (implicit or
    /// explicit) transaction.
    pub async fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.engine.send(Command::Put {
            key: key.into(),
            value: value.into(),
            reply,
        })?;
        await_completion(done).await
    }

    /// Vectored write; atomic within one transaction.
    pub async fn put_many(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.engine.send(Command::PutMany { entries, reply })?;
        await_completion(done).await
    }

    /// Fire-and-forget put, legal only inside an explicit write
    /// transaction (§4.3.2). Enqueues and returns immediately — it does
    /// not wait for a completion, because it doesn't produce one.
    pub fn put_no_confirm(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        self.engine.send(Command::PutNoConfirm {
            key: key.into(),
            value: value.into(),
        })
    }

    pub async fn delete(&self, key: impl Into<Vec<u8>>) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.engine.send(Command::Delete {
            key: key.into(),
            reply,
        })?;
        await_completion(done).await
    }

    /// Begins an explicit write transaction. Fails with
    /// `TransactionAlreadyOpen` if one is already active.
    pub async fn start_write_transaction(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.engine.send(Command::StartWrite { reply })?;
        await_completion(done).await
    }

    /// Alias kept for the `startTransaction` spelling used by some hosts.
    pub async fn start_transaction(&self) -> Result<()> {
        self.start_write_transaction().await
    }

    /// Commits the current explicit write transaction. Fails with
    /// `NoTransaction` if none is open.
    pub async fn commit_write_transaction(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.engine.send(Command::CommitWrite { reply })?;
        await_completion(done).await
    }

    pub async fn commit_transaction(&self) -> Result<()> {
        self.commit_write_transaction().await
    }

    /// Aborts the current explicit write transaction.
    pub async fn abort_write_transaction(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.engine.send(Command::AbortWrite { reply })?;
        await_completion(done).await
    }

    /// Starts (or reuses) this thread's cached read transaction.
    pub fn start_read_transaction(&self) -> Result<()> {
        if self.engine.is_closed() {
            return Err(Error::Closed);
        }
        read_txn::start_read(self.engine.env())
    }

    /// Ends this thread's read transaction, if any.
    pub fn commit_read_transaction(&self) {
        read_txn::end_read();
    }

    /// Renews this thread's cached read transaction to the latest
    /// committed snapshot. No-op if none is cached.
    pub fn reset_read_txn(&self) -> Result<()> {
        if self.engine.is_closed() {
            return Err(Error::Closed);
        }
        read_txn::reset_read(self.engine.env())
    }

    /// Drains the Write Worker, joins its thread, and closes the
    /// environment. Idempotent; calls after close fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        read_txn::end_read();
        self.engine.close()
    }
}

async fn await_completion<T>(done: oneshot::Receiver<Result<T>>) -> Result<T> {
    done.await.map_err(|_| Error::WorkerDead)?
}
