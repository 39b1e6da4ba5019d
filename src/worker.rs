//! The Write Worker: a dedicated OS thread that owns every write
//! transaction's lifetime.
//!
//! Grounded on `engines::granite::wal`'s group-commit worker thread — same
//! shape (a `std::thread::spawn`'d loop draining an `mpsc` channel, batching
//! work to amortize commit cost) generalized from "batch log records, fsync
//! periodically" to "batch engine writes, commit when the channel drains or
//! an explicit/foreign command forces the issue" per the auto-batching
//! policy this engine specifies.

use std::sync::mpsc;

use heed::types::Bytes;
use heed::{Database, Env, RwTxn};

use crate::command::Command;
use crate::error::{Error, Result};

/// Handle to a running Write Worker. Dropping this does not stop the
/// worker — send `Command::Shutdown` and join explicitly (see
/// `EngineHandle::close`).
pub struct WorkerHandle {
    pub sender: mpsc::Sender<Command>,
    pub join_handle: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns the Write Worker thread, which takes ownership of `env`/`db`
    /// for its entire lifetime.
    pub fn spawn(env: Env, db: Database<Bytes, Bytes>) -> Self {
        let (sender, receiver) = mpsc::channel::<Command>();
        let join_handle = std::thread::spawn(move || worker_loop(env, db, receiver));
        WorkerHandle {
            sender,
            join_handle: Some(join_handle),
        }
    }
}

/// Whether a write transaction is open, and if so, how it was opened.
/// `Implicit` transactions auto-commit per the batching policy below;
/// `Explicit` ones only end on a matching `CommitWrite`/`AbortWrite`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum TxnMode {
    Implicit,
    Explicit,
}

/// A write queued inside the current transaction, held back so it can be
/// fanned out (success or failure) when the transaction resolves.
struct Pending {
    reply: tokio::sync::oneshot::Sender<Result<()>>,
}

fn worker_loop(env: Env, db: Database<Bytes, Bytes>, receiver: mpsc::Receiver<Command>) {
    let mut txn: Option<RwTxn> = None;
    let mut mode: Option<TxnMode> = None;
    let mut pending: Vec<Pending> = Vec::new();
    // Set once a PutNoConfirm inside the current transaction fails; reported
    // to every pending completion when the transaction resolves (§4.3.2).
    let mut latched_error: Option<Error> = None;

    'outer: loop {
        let first = match receiver.recv() {
            Ok(cmd) => cmd,
            Err(_) => break 'outer,
        };

        let mut batch = vec![first];
        loop {
            match receiver.try_recv() {
                Ok(cmd) => batch.push(cmd),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }

        for cmd in batch {
            if matches!(cmd, Command::Shutdown { .. }) {
                abort_if_open(&mut txn, &mut mode, &mut pending, &mut latched_error, Error::Closed);
                let Command::Shutdown { reply } = cmd else {
                    unreachable!()
                };
                let _ = reply.send(Ok(()));
                log::info!("write worker shutting down");
                break 'outer;
            }

            if !cmd.is_write() && mode == Some(TxnMode::Implicit) {
                commit_current(&env, &mut txn, &mut mode, &mut pending, &mut latched_error);
            }

            dispatch(
                &env,
                &db,
                cmd,
                &mut txn,
                &mut mode,
                &mut pending,
                &mut latched_error,
            );
        }

        // "the channel is momentarily empty" — §4.3.1 rule 3.
        if mode == Some(TxnMode::Implicit) {
            commit_current(&env, &mut txn, &mut mode, &mut pending, &mut latched_error);
        }
    }

    // Drain anything still queued (e.g. sent concurrently with Shutdown)
    // with `Closed`, per invariant 5: closing drains or aborts all pending
    // commands before releasing engine resources.
    while let Ok(cmd) = receiver.try_recv() {
        fail_command(cmd, Error::Closed);
    }
}

fn dispatch(
    env: &Env,
    db: &Database<Bytes, Bytes>,
    cmd: Command,
    txn: &mut Option<RwTxn>,
    mode: &mut Option<TxnMode>,
    pending: &mut Vec<Pending>,
    latched_error: &mut Option<Error>,
) {
    match cmd {
        Command::GetAsync { key, reply } => {
            let result = (|| -> Result<Option<Vec<u8>>> {
                let rtxn = env.read_txn()?;
                Ok(db.get(&rtxn, &key)?.map(|v| v.to_vec()))
            })();
            let _ = reply.send(result);
        }

        Command::StartWrite { reply } => {
            if *mode == Some(TxnMode::Explicit) {
                let _ = reply.send(Err(Error::TransactionAlreadyOpen));
                return;
            }
            if let Err(e) = ensure_txn(env, txn, mode, TxnMode::Explicit) {
                let _ = reply.send(Err(e));
                return;
            }
            let _ = reply.send(Ok(()));
        }

        Command::CommitWrite { reply } => {
            if *mode != Some(TxnMode::Explicit) {
                let _ = reply.send(Err(Error::NoTransaction));
                return;
            }
            pending.push(Pending { reply });
            commit_current(env, txn, mode, pending, latched_error);
        }

        Command::AbortWrite { reply } => {
            if *mode != Some(TxnMode::Explicit) {
                let _ = reply.send(Err(Error::NoTransaction));
                return;
            }
            if let Some(t) = txn.take() {
                t.abort();
            }
            *mode = None;
            *latched_error = None;
            for p in pending.drain(..) {
                let _ = p.reply.send(Err(Error::NoTransaction));
            }
            let _ = reply.send(Ok(()));
        }

        Command::Put { key, value, reply } => {
            if let Err(e) = apply_put(env, db, txn, mode, &key, &value) {
                fail_transaction(txn, mode, pending, latched_error, e, Some(reply));
                return;
            }
            pending.push(Pending { reply });
        }

        Command::PutMany { entries, reply } => {
            let failure = (|| -> Result<()> {
                ensure_txn(env, txn, mode, TxnMode::Implicit)?;
                let t = txn.as_mut().expect("transaction just ensured");
                for (k, v) in &entries {
                    validate(k, v)?;
                    db.put(t, k, v)?;
                }
                Ok(())
            })();
            if let Err(e) = failure {
                fail_transaction(txn, mode, pending, latched_error, e, Some(reply));
                return;
            }
            pending.push(Pending { reply });
        }

        Command::Delete { key, reply } => {
            let failure = (|| -> Result<()> {
                ensure_txn(env, txn, mode, TxnMode::Implicit)?;
                let t = txn.as_mut().expect("transaction just ensured");
                db.delete(t, &key)?;
                Ok(())
            })();
            if let Err(e) = failure {
                fail_transaction(txn, mode, pending, latched_error, e, Some(reply));
                return;
            }
            pending.push(Pending { reply });
        }

        Command::PutNoConfirm { key, value } => {
            if *mode != Some(TxnMode::Explicit) {
                // No completion to report to; this is a caller bug, but we
                // can't surface it (no reply handle) beyond the log.
                log::warn!("putNoConfirm outside an explicit write transaction, ignoring");
                return;
            }
            if let Err(e) = apply_put(env, db, txn, mode, &key, &value) {
                if latched_error.is_none() {
                    *latched_error = Some(e);
                }
            }
        }

        Command::Shutdown { .. } => unreachable!("handled by caller"),
    }
}

fn apply_put(
    env: &Env,
    db: &Database<Bytes, Bytes>,
    txn: &mut Option<RwTxn>,
    mode: &mut Option<TxnMode>,
    key: &[u8],
    value: &[u8],
) -> Result<()> {
    validate(key, value)?;
    ensure_txn(env, txn, mode, TxnMode::Implicit)?;
    let t = txn.as_mut().expect("transaction just ensured");
    db.put(t, key, value)?;
    Ok(())
}

/// Self-imposed ceiling on a single value, well below anything LMDB itself
/// would refuse: LMDB has no distinct "value too large" error of its own
/// (oversized values just consume more overflow pages, failing only when
/// the map itself is full), so this is the only source of `ValueTooLarge`.
const MAX_VALUE_SIZE: usize = 32 * 1024 * 1024;

fn validate(key: &[u8], value: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::KeyTooLarge);
    }
    if key.len() > 511 {
        return Err(Error::KeyTooLarge);
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(Error::ValueTooLarge);
    }
    Ok(())
}

/// Begins a transaction if one isn't already open. An already-open
/// transaction (of either mode) is left untouched — callers that need a
/// specific mode check `mode` themselves first.
fn ensure_txn(
    env: &Env,
    txn: &mut Option<RwTxn>,
    mode: &mut Option<TxnMode>,
    wanted: TxnMode,
) -> Result<()> {
    if txn.is_some() {
        return Ok(());
    }
    let new_txn = env.write_txn()?;
    *txn = Some(new_txn);
    *mode = Some(wanted);
    Ok(())
}

fn commit_current(
    _env: &Env,
    txn: &mut Option<RwTxn>,
    mode: &mut Option<TxnMode>,
    pending: &mut Vec<Pending>,
    latched_error: &mut Option<Error>,
) {
    let Some(t) = txn.take() else {
        *mode = None;
        return;
    };

    if let Some(e) = latched_error.take() {
        t.abort();
        *mode = None;
        log::warn!("aborting transaction: latched putNoConfirm error");
        for p in pending.drain(..) {
            let _ = p.reply.send(Err(clone_error(&e)));
        }
        return;
    }

    match t.commit() {
        Ok(()) => {
            log::debug!("committed write transaction, {} commands acknowledged", pending.len());
            *mode = None;
            for p in pending.drain(..) {
                let _ = p.reply.send(Ok(()));
            }
        }
        Err(err) => {
            let e: Error = err.into();
            log::error!("write transaction commit failed: {e}");
            *mode = None;
            for p in pending.drain(..) {
                let _ = p.reply.send(Err(clone_error(&e)));
            }
        }
    }
}

/// `Error` is intentionally not `Clone` (it wraps `io::Error`); commit
/// failures need to be fanned out to every pending completion, so we
/// re-render it as a message-carrying variant for all but the first.
fn clone_error(e: &Error) -> Error {
    match e {
        Error::Open(m) => Error::Open(m.clone()),
        Error::Closed => Error::Closed,
        Error::KeyTooLarge => Error::KeyTooLarge,
        Error::ValueTooLarge => Error::ValueTooLarge,
        Error::MapFull => Error::MapFull,
        Error::TransactionAlreadyOpen => Error::TransactionAlreadyOpen,
        Error::NoTransaction => Error::NoTransaction,
        Error::WorkerDead => Error::WorkerDead,
        Error::Engine(m) => Error::Engine(m.clone()),
        Error::Io(e) => Error::Engine(e.to_string()),
    }
}

/// Aborts the failing command's transaction (if any) and fans the same
/// error to it and every command already batched alongside it, per
/// §4.3.3.
fn fail_transaction(
    txn: &mut Option<RwTxn>,
    mode: &mut Option<TxnMode>,
    pending: &mut Vec<Pending>,
    latched_error: &mut Option<Error>,
    err: Error,
    failing_reply: Option<tokio::sync::oneshot::Sender<Result<()>>>,
) {
    if let Some(t) = txn.take() {
        t.abort();
    }
    *mode = None;
    *latched_error = None;
    log::warn!("aborting transaction: {err}");
    for p in pending.drain(..) {
        let _ = p.reply.send(Err(clone_error(&err)));
    }
    if let Some(reply) = failing_reply {
        let _ = reply.send(Err(err));
    }
}

fn abort_if_open(
    txn: &mut Option<RwTxn>,
    mode: &mut Option<TxnMode>,
    pending: &mut Vec<Pending>,
    latched_error: &mut Option<Error>,
    err: Error,
) {
    if txn.is_none() {
        return;
    }
    if let Some(t) = txn.take() {
        t.abort();
    }
    *mode = None;
    *latched_error = None;
    for p in pending.drain(..) {
        let _ = p.reply.send(Err(clone_error(&err)));
    }
}

fn fail_command(cmd: Command, err: Error) {
    match cmd {
        Command::Put { reply, .. }
        | Command::PutMany { reply, .. }
        | Command::Delete { reply, .. }
        | Command::StartWrite { reply }
        | Command::CommitWrite { reply }
        | Command::AbortWrite { reply }
        | Command::Shutdown { reply } => {
            let _ = reply.send(Err(clone_error(&err)));
        }
        Command::GetAsync { reply, .. } => {
            let _ = reply.send(Err(clone_error(&err)));
        }
        Command::PutNoConfirm { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heed::EnvOpenOptions;

    fn open_env() -> (tempfile::TempDir, Env, Database<Bytes, Bytes>) {
        let dir = tempfile::TempDir::new().unwrap();
        let mut options = EnvOpenOptions::new();
        options.map_size(10 * 1024 * 1024);
        options.max_dbs(1);
        let env = unsafe { options.open(dir.path()) }.unwrap();
        let db = {
            let mut wtxn = env.write_txn().unwrap();
            let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None).unwrap();
            wtxn.commit().unwrap();
            db
        };
        (dir, env, db)
    }

    #[test]
    fn implicit_put_commits_on_empty_queue() {
        let (_dir, env, db) = open_env();
        let handle = WorkerHandle::spawn(env.clone(), db);

        let (reply, done) = tokio::sync::oneshot::channel();
        handle
            .sender
            .send(Command::Put {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
                reply,
            })
            .unwrap();
        done.blocking_recv().unwrap().unwrap();

        let rtxn = env.read_txn().unwrap();
        assert_eq!(db.get(&rtxn, b"k").unwrap(), Some(b"v".as_slice()));

        let (reply, done) = tokio::sync::oneshot::channel();
        handle.sender.send(Command::Shutdown { reply }).unwrap();
        done.blocking_recv().unwrap().unwrap();
    }

    #[test]
    fn explicit_transaction_defers_completion_until_commit() {
        let (_dir, env, db) = open_env();
        let handle = WorkerHandle::spawn(env.clone(), db);

        let (start_reply, start_done) = tokio::sync::oneshot::channel();
        handle
            .sender
            .send(Command::StartWrite { reply: start_reply })
            .unwrap();
        start_done.blocking_recv().unwrap().unwrap();

        let (put_reply, put_done) = tokio::sync::oneshot::channel();
        handle
            .sender
            .send(Command::Put {
                key: b"k".to_vec(),
                value: b"v".to_vec(),
                reply: put_reply,
            })
            .unwrap();

        // Not committed yet: a fresh read transaction must not see it.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let rtxn = env.read_txn().unwrap();
        assert_eq!(db.get(&rtxn, b"k").unwrap(), None);
        drop(rtxn);

        let (commit_reply, commit_done) = tokio::sync::oneshot::channel();
        handle
            .sender
            .send(Command::CommitWrite {
                reply: commit_reply,
            })
            .unwrap();
        commit_done.blocking_recv().unwrap().unwrap();
        put_done.blocking_recv().unwrap().unwrap();

        let rtxn = env.read_txn().unwrap();
        assert_eq!(db.get(&rtxn, b"k").unwrap(), Some(b"v".as_slice()));

        let (reply, done) = tokio::sync::oneshot::channel();
        handle.sender.send(Command::Shutdown { reply }).unwrap();
        done.blocking_recv().unwrap().unwrap();
    }

    #[test]
    fn oversized_key_aborts_without_poisoning_the_next_batch() {
        let (_dir, env, db) = open_env();
        let handle = WorkerHandle::spawn(env.clone(), db);

        let (reply, done) = tokio::sync::oneshot::channel();
        handle
            .sender
            .send(Command::Put {
                key: vec![b'x'; 512],
                value: b"v".to_vec(),
                reply,
            })
            .unwrap();
        assert!(matches!(
            done.blocking_recv().unwrap(),
            Err(Error::KeyTooLarge)
        ));

        let (reply, done) = tokio::sync::oneshot::channel();
        handle
            .sender
            .send(Command::Put {
                key: b"ok".to_vec(),
                value: b"v".to_vec(),
                reply,
            })
            .unwrap();
        done.blocking_recv().unwrap().unwrap();

        let (reply, done) = tokio::sync::oneshot::channel();
        handle.sender.send(Command::Shutdown { reply }).unwrap();
        done.blocking_recv().unwrap().unwrap();
    }
}
