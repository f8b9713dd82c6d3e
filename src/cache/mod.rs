//! Persistent cache partitions for offline support.
//!
//! This module provides the storage side of the offline controller:
//! - Named partitions of request key -> response snapshot
//! - SQLite persistence so caches survive restarts
//! - Cache-first and network-first strategies over any storage backend

mod entry;
mod layer;
mod storage;

pub use entry::{CacheResult, CacheSource, RequestKey};
pub use layer::CacheLayer;
pub use storage::{CacheStorage, SqliteStorage};
