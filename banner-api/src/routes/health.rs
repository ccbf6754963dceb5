//! Health Check Endpoints
//!
//! - /health - Cache status plus build version and uptime
//! - /health/live - Process alive check
//!
//! No authentication required for health endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use banner_storage::{BannerCache, CacheStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthDetails {
    pub cache: CacheHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Cache component status. Counters are absent when stats could not be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expirations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CacheStats> for CacheHealth {
    fn from(stats: CacheStats) -> Self {
        Self {
            status: HealthStatus::Healthy,
            entries: Some(stats.entry_count),
            hit_rate: Some(stats.hit_rate()),
            expirations: Some(stats.expirations),
            error: None,
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
pub struct HealthState {
    pub cache: Arc<dyn BannerCache>,
    pub start_time: std::time::Instant,
}

impl HealthState {
    pub fn new(cache: Arc<dyn BannerCache>) -> Self {
        Self {
            cache,
            start_time: std::time::Instant::now(),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/live - Process liveness check
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
))]
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health - Service status with cache details
///
/// A failing cache degrades the service but never takes it down: reads fall
/// back to the durable store.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse),
    ),
))]
pub async fn health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let cache = match state.cache.stats().await {
        Ok(stats) => CacheHealth::from(stats),
        Err(e) => {
            tracing::warn!(error = %e, "Cache stats unavailable");
            CacheHealth {
                status: HealthStatus::Degraded,
                entries: None,
                hit_rate: None,
                expirations: None,
                error: Some(e.to_string()),
            }
        }
    };

    let response = HealthResponse {
        status: cache.status,
        message: None,
        details: Some(HealthDetails {
            cache,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    (StatusCode::OK, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router (no auth required)
pub fn create_router(cache: Arc<dyn BannerCache>) -> Router {
    let state = Arc::new(HealthState::new(cache));

    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .with_state(state)
}
