//! The Engine Handle: owns the opened environment and its default
//! sub-database, deduplicated per canonical path per process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use once_cell::sync::Lazy;

use crate::command::Command;
use crate::config::EnvConfig;
use crate::error::{Error, Result};
use crate::worker::WorkerHandle;

/// Process-wide "one Environment per path" registry (spec §4.1). Keyed by
/// canonicalized path; holds weak references so a fully-dropped handle
/// doesn't keep the entry alive.
static REGISTRY: Lazy<Mutex<HashMap<PathBuf, Weak<Inner>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

struct Inner {
    env: Env,
    db: Database<Bytes, Bytes>,
    worker: Mutex<WorkerHandle>,
    closed: std::sync::atomic::AtomicBool,
    path: PathBuf,
    map_size: usize,
    async_writes: bool,
}

/// A reference-counted, cloneable handle to an open Environment. Cloning
/// is cheap (an `Arc` bump); the host thread and the Write Worker both
/// hold a strong reference, per the "no cyclic ownership" design note —
/// teardown goes through `close()`, not refcounting.
#[derive(Clone)]
pub struct EngineHandle(Arc<Inner>);

impl EngineHandle {
    /// Opens (or attaches to an already-open) Environment at `config.path`.
    pub fn open(config: &EnvConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.path)?;
        let canonical = config
            .path
            .canonicalize()
            .map_err(|e| Error::Open(e.to_string()))?;

        let mut registry = REGISTRY.lock().expect("registry mutex poisoned");
        if let Some(existing) = registry.get(&canonical).and_then(Weak::upgrade) {
            if existing.map_size != config.map_size || existing.async_writes != config.async_writes
            {
                return Err(Error::Open(format!(
                    "{:?} is already open with map_size={}, async_writes={} \
                     (requested map_size={}, async_writes={})",
                    canonical,
                    existing.map_size,
                    existing.async_writes,
                    config.map_size,
                    config.async_writes
                )));
            }
            return Ok(EngineHandle(existing));
        }

        let inner = Arc::new(open_fresh(&canonical, config)?);
        registry.insert(canonical, Arc::downgrade(&inner));
        Ok(EngineHandle(inner))
    }

    /// Sends a command to the Write Worker.
    pub fn send(&self, cmd: Command) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        self.0
            .worker
            .lock()
            .expect("worker mutex poisoned")
            .sender
            .send(cmd)
            .map_err(|_| Error::WorkerDead)
    }

    pub fn env(&self) -> &Env {
        &self.0.env
    }

    pub fn db(&self) -> &Database<Bytes, Bytes> {
        &self.0.db
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Idempotent. Drains the Write Worker and joins its thread, then
    /// removes this path from the registry. Safe to call from multiple
    /// clones; only the first call does any work.
    pub fn close(&self) -> Result<()> {
        use std::sync::atomic::Ordering;
        if self.0.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let (reply, _done) = tokio::sync::oneshot::channel();
        {
            let worker = self.0.worker.lock().expect("worker mutex poisoned");
            // Ignore send failure: a dead worker thread is equivalent to
            // one that has already drained and is exiting on its own.
            let _ = worker.sender.send(Command::Shutdown { reply });
        }

        // Joining the worker thread is itself the synchronization point:
        // the worker only returns from its loop after processing Shutdown.
        let join_handle = self
            .0
            .worker
            .lock()
            .expect("worker mutex poisoned")
            .join_handle
            .take();
        if let Some(handle) = join_handle {
            let _ = handle.join();
        }

        let mut registry = REGISTRY.lock().expect("registry mutex poisoned");
        registry.remove(&self.0.path);
        log::info!("environment at {:?} closed", self.0.path);
        Ok(())
    }
}

fn open_fresh(canonical: &Path, config: &EnvConfig) -> Result<Inner> {
    let mut options = EnvOpenOptions::new();
    options.map_size(config.map_size);
    options.max_dbs(1);
    if config.async_writes {
        unsafe {
            options.flags(heed::EnvFlags::NO_SYNC | heed::EnvFlags::NO_META_SYNC);
        }
    }

    // SAFETY: LMDB requires that an environment not be opened more than
    // once per process for a given path with incompatible flags; the
    // registry above enforces "opened exactly once" for the lifetime of
    // any handle, which is the precondition `heed` documents for this call.
    let env = unsafe { options.open(canonical) }.map_err(|e| Error::Open(e.to_string()))?;

    let db = {
        let mut wtxn = env.write_txn()?;
        let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None)?;
        wtxn.commit()?;
        db
    };

    let worker = WorkerHandle::spawn(env.clone(), db);
    log::info!("environment at {:?} opened", canonical);

    Ok(Inner {
        env,
        db,
        worker: Mutex::new(worker),
        closed: std::sync::atomic::AtomicBool::new(false),
        path: canonical.to_path_buf(),
        map_size: config.map_size,
        async_writes: config.async_writes,
    })
}
