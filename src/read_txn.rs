//! The Read Transaction Slot: a per-host-thread cached read transaction.
//!
//! A `heed::RoTxn<'env>` borrows the `Env` that created it, but the slot
//! needs to hold one across calls, from one `getSync` to the next, on a
//! thread that is not the Write Worker. We erase the borrow's lifetime to
//! `'static` and bundle a cloned `Env` alongside it so the borrow's target
//! stays alive — the same trick `heed` uses internally for its own
//! `'static` read transactions.

use std::cell::RefCell;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn};

use crate::error::Result;

/// A `RoTxn` whose lifetime has been erased to `'static`, kept alive by an
/// owned clone of the `Env` it borrows from.
///
/// # Safety
///
/// `env` is declared after `txn` so it drops second: the borrow `txn`
/// holds is never outlived by its referent. `Env` is an `Arc`-backed
/// handle, so cloning it does not move or invalidate the memory `txn`
/// actually points into — only the clone's liveness matters, not its
/// address.
struct OwnedReadTxn {
    txn: RoTxn<'static>,
    #[allow(dead_code)]
    env: Env,
}

impl OwnedReadTxn {
    fn new(env: &Env) -> Result<Self> {
        let owned_env = env.clone();
        let txn = owned_env.read_txn()?;
        // SAFETY: see struct-level comment — `owned_env` outlives `txn`
        // because it is stored alongside it and dropped after it.
        let txn: RoTxn<'static> = unsafe { std::mem::transmute::<RoTxn<'_>, RoTxn<'static>>(txn) };
        Ok(OwnedReadTxn {
            txn,
            env: owned_env,
        })
    }
}

thread_local! {
    static SLOT: RefCell<Option<OwnedReadTxn>> = const { RefCell::new(None) };
}

/// `start_read`: idempotent within a thread — reuses an existing slot
/// entry if present.
pub fn start_read(env: &Env) -> Result<()> {
    SLOT.with(|slot| -> Result<()> {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(OwnedReadTxn::new(env)?);
        }
        Ok(())
    })
}

/// `end_read`: discards the stored read transaction, if any. A no-op if
/// none exists.
pub fn end_read() {
    SLOT.with(|slot| {
        slot.borrow_mut().take();
    });
}

/// `reset_read`: renews the slot entry to observe the latest committed
/// snapshot. A no-op if no slot entry exists (per §4.2).
pub fn reset_read(env: &Env) -> Result<()> {
    SLOT.with(|slot| -> Result<()> {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            *slot = Some(OwnedReadTxn::new(env)?);
        }
        Ok(())
    })
}

/// `with_read_txn`: if a slot entry exists, runs `f` against it. Otherwise
/// opens a short-lived read transaction for the duration of the call and
/// discards it.
pub fn with_read_txn<F, R>(env: &Env, db: &Database<Bytes, Bytes>, f: F) -> Result<R>
where
    F: FnOnce(&RoTxn<'_>, &Database<Bytes, Bytes>) -> Result<R>,
{
    let cached = SLOT.with(|slot| {
        let slot = slot.borrow();
        slot.is_some()
    });

    if cached {
        SLOT.with(|slot| {
            let slot = slot.borrow();
            let owned = slot.as_ref().expect("checked is_some above");
            f(&owned.txn, db)
        })
    } else {
        let rtxn = env.read_txn()?;
        f(&rtxn, db)
    }
}
