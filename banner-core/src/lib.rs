//! Banner Core - Types and Consistency Rules
//!
//! Pure data structures and decision logic shared by the storage and API
//! crates. Nothing in here performs I/O.

pub mod config;
pub mod conflict;
pub mod entities;
pub mod error;
pub mod identity;
pub mod tags;
pub mod versioning;

pub use config::{CachePopulation, InvalidationPolicy, ServiceConfig};
pub use conflict::{ConflictCheck, ConflictScope};
pub use entities::{
    Banner, BannerContent, BannerFilter, BannerPatch, NewBanner, Role, VersionSnapshot,
};
pub use error::{BannerError, BannerResult, CacheError, ErrorKind, StorageError};
pub use identity::{BannerId, Binding, FeatureId, TagId, Timestamp, Version};
pub use tags::TagDiff;
pub use versioning::{prune_target, version_listing, INITIAL_VERSION, RETENTION};
