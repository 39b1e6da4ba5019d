//! Environment configuration.

use std::path::PathBuf;

/// Configuration accepted by [`crate::engine::EngineHandle::open`].
///
/// Immutable once the environment is open — reopening the same path with a
/// conflicting `map_size` or `async_writes` fails with `Error::Open` rather
/// than silently attaching to the live environment under the new settings.
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// Directory the environment lives in. Created if it doesn't exist.
    pub path: PathBuf,
    /// Maximum on-disk size in bytes.
    pub map_size: usize,
    /// If true, the engine may defer fsync of committed transactions.
    pub async_writes: bool,
}

/// 50 GiB, matching common LMDB-wrapper defaults.
const DEFAULT_MAP_SIZE: usize = 50 * 1024 * 1024 * 1024;

impl EnvConfig {
    /// A config with the given path and default map size / durability mode.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map_size: DEFAULT_MAP_SIZE,
            async_writes: false,
        }
    }
}
