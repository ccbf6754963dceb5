//! Banner Storage - Store and Cache Abstractions
//!
//! Defines the durable store and cache contracts, ships in-memory and LMDB
//! implementations, and hosts [`BannerService`], which sequences both stores
//! for every banner operation. The PostgreSQL store lives in banner-api.

pub mod cache;
pub mod memory;
pub mod service;
pub mod store;

pub use cache::{
    BannerCache, CachePattern, CacheResult, CacheStats, InMemoryBannerCache, LmdbBannerCache,
};
pub use memory::MemoryBannerStore;
pub use service::BannerService;
pub use store::{BannerStore, BannerTx};
