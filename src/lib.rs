//! ordkv: the transaction and worker coordination layer sitting between a
//! host-visible database handle and a memory-mapped B+tree engine.
//!
//! The host sees an ergonomic, non-blocking `Database` facade. Underneath,
//! a dedicated Write Worker thread owns every write transaction so the
//! engine's single-writer, thread-affine rules never leak past this
//! crate's surface. See [`facade::Database`] for the entry point and
//! [`compat::CacheStore`] for the bundler-cache-compatible wrapper.

pub mod command;
pub mod compat;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod read_txn;
pub mod worker;

pub use compat::{CacheOptions, CacheStore};
pub use config::EnvConfig;
pub use error::{Error, Result};
pub use facade::Database;
