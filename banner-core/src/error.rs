//! Error types for banner operations
//!
//! Every [`BannerError`] carries an [`ErrorKind`] and a map of named context
//! fields. Boundary layers decide how much of that to show.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::identity::{BannerId, Binding, FeatureId, TagId, Version};

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Connection pool error: {reason}")]
    PoolFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Failed to decode column {column}: {reason}")]
    DecodeFailed { column: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Cache serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Cache deserialization error: {reason}")]
    Deserialization { reason: String },
}

/// Coarse classification used by boundary layers to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    Conflict,
    Internal,
}

/// Master error type for banner operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BannerError {
    #[error("Banner {banner_id} not found")]
    BannerNotFound { banner_id: BannerId },

    #[error("No banner for tag {tag_id} and feature {feature_id}")]
    KeyNotFound { tag_id: TagId, feature_id: FeatureId },

    /// Banner exists but is inactive and the caller may not see it.
    #[error("No banner for tag {tag_id} and feature {feature_id}")]
    Hidden { tag_id: TagId, feature_id: FeatureId },

    #[error("Version {version} of banner {banner_id} not found")]
    VersionNotFound { banner_id: BannerId, version: Version },

    #[error("Tag/feature pairs already bound to another banner: {}", format_bindings(.conflicts))]
    BindingConflict { conflicts: Vec<Binding> },

    #[error("Nothing to update for banner {banner_id}")]
    NothingToUpdate { banner_id: BannerId },

    #[error("Banner {banner_id} was modified concurrently (expected version {expected_version})")]
    ConcurrentModification {
        banner_id: BannerId,
        expected_version: Version,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl BannerError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BannerError::BannerNotFound { .. }
            | BannerError::KeyNotFound { .. }
            | BannerError::Hidden { .. }
            | BannerError::VersionNotFound { .. } => ErrorKind::NotFound,
            BannerError::BindingConflict { .. }
            | BannerError::NothingToUpdate { .. }
            | BannerError::InvalidInput { .. } => ErrorKind::InvalidRequest,
            BannerError::ConcurrentModification { .. } => ErrorKind::Conflict,
            BannerError::Storage(_) | BannerError::Cache(_) => ErrorKind::Internal,
        }
    }

    /// Named context fields describing this error.
    pub fn context(&self) -> BTreeMap<&'static str, Value> {
        let mut ctx = BTreeMap::new();
        match self {
            BannerError::BannerNotFound { banner_id } => {
                ctx.insert("banner_id", json!(banner_id));
            }
            BannerError::KeyNotFound { tag_id, feature_id } => {
                ctx.insert("tag_id", json!(tag_id));
                ctx.insert("feature_id", json!(feature_id));
            }
            BannerError::Hidden { tag_id, feature_id } => {
                ctx.insert("tag_id", json!(tag_id));
                ctx.insert("feature_id", json!(feature_id));
                ctx.insert("reason", json!("inactive"));
            }
            BannerError::VersionNotFound { banner_id, version } => {
                ctx.insert("banner_id", json!(banner_id));
                ctx.insert("version", json!(version));
            }
            BannerError::BindingConflict { conflicts } => {
                ctx.insert("conflicts", json!(conflicts));
            }
            BannerError::NothingToUpdate { banner_id } => {
                ctx.insert("banner_id", json!(banner_id));
            }
            BannerError::ConcurrentModification {
                banner_id,
                expected_version,
            } => {
                ctx.insert("banner_id", json!(banner_id));
                ctx.insert("expected_version", json!(expected_version));
            }
            BannerError::InvalidInput { field, reason } => {
                ctx.insert("field", json!(field));
                ctx.insert("reason", json!(reason));
            }
            BannerError::Storage(e) => {
                ctx.insert("source", json!("storage"));
                ctx.insert("detail", json!(e.to_string()));
            }
            BannerError::Cache(e) => {
                ctx.insert("source", json!("cache"));
                ctx.insert("detail", json!(e.to_string()));
            }
        }
        ctx
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

fn format_bindings(bindings: &[Binding]) -> String {
    bindings
        .iter()
        .map(Binding::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for banner operations.
pub type BannerResult<T> = Result<T, BannerError>;

// =============================================================================
// TESTS
// =============================================================================
