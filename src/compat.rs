//! A compatibility shim satisfying a pre-existing bundler cache's API:
//! `get(key)`, `put(key, value)`, `resetReadTxn()`. The cache's `name`,
//! `encoding`, and `compression` options are accepted and stored for API
//! compatibility but never consulted — compression is an engine-level or
//! future concern, per the open question this carries forward unresolved.

use crate::config::EnvConfig;
use crate::error::Result;
use crate::facade::Database;

/// Options accepted by [`CacheStore::open`] for API compatibility with the
/// bundler's existing cache. Only `name` has any bearing on behavior here
/// (it's unused — this core has no multi-database API — but stored so a
/// caller can round-trip it).
#[derive(Clone, Debug, Default)]
pub struct CacheOptions {
    pub name: Option<String>,
    pub encoding: Option<String>,
    pub compression: Option<String>,
}

/// The wrapper the bundler's cache expects: `get`, `put`, `resetReadTxn`.
pub struct CacheStore {
    db: Database,
    options: CacheOptions,
}

impl CacheStore {
    pub fn open(dir: impl Into<std::path::PathBuf>, options: CacheOptions) -> Result<Self> {
        let db = Database::open(EnvConfig::new(dir))?;
        Ok(CacheStore { db, options })
    }

    /// Synchronous get, as the bundler's cache API expects.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get_sync(key)
    }

    /// Asynchronous put; accepts anything convertible to a byte buffer so
    /// a caller passing a `String` is transparently wrapped.
    pub async fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        self.db.put(key, value).await
    }

    pub fn reset_read_txn(&self) -> Result<()> {
        self.db.reset_read_txn()
    }

    /// The options this store was opened with. `encoding`/`compression`
    /// are exposed only so a caller can inspect what it asked for; this
    /// core does not act on them.
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }
}
