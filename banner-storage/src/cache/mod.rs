//! Banner cache layer.
//!
//! Entries are keyed by the (tag, feature) pair a reader asks for and hold
//! the full banner state, so visibility can be decided from a cache hit
//! alone. Nothing here keeps the cache coherent with the durable store; the
//! service deletes affected keys after each committed write and the TTL
//! bounds staleness when that fails.
//!
//! Two backends:
//!
//! - [`LmdbBannerCache`]: memory-mapped, survives restarts, shared by all
//!   processes on a host.
//! - [`InMemoryBannerCache`]: per-process, for tests and single-node runs.

pub mod lmdb_backend;
pub mod memory_backend;
pub mod traits;

pub use lmdb_backend::LmdbBannerCache;
pub use memory_backend::InMemoryBannerCache;
pub use traits::{BannerCache, CachePattern, CacheResult, CacheStats};
