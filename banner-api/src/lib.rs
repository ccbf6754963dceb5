//! Banner API - HTTP surface for the banner service
//!
//! Axum routes over [`banner_storage::BannerService`], the PostgreSQL
//! [`PgBannerStore`], role-token middleware and the server configuration.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod validation;

pub use config::{ApiConfig, CacheBackend, RoleTokens, StoreBackend};
pub use db::{run_migrations, DbConfig, PgBannerStore};
pub use error::{ApiError, ApiResult, ErrorCode, ErrorRenderer, ErrorVerbosity};
pub use middleware::{auth_middleware, AuthMiddlewareState, RoleExtractor, TOKEN_HEADER};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
pub use types::*;
