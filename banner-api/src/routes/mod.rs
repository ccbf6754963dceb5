//! REST API Routes Module
//!
//! - `/user_banner` for user and admin tokens
//! - `/banner/*` administration for admin tokens
//! - `/health` and `/openapi.json` without authentication

pub mod banner;
pub mod health;
pub mod user_banner;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use banner_core::Role;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::middleware::{auth_middleware, AuthMiddlewareState, TOKEN_HEADER};
use crate::state::AppState;

pub use banner::create_router as banner_router;
pub use health::create_router as health_router;
pub use user_banner::create_router as user_banner_router;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

#[cfg(feature = "openapi")]
async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(crate::openapi::OPENAPI_DOC.clone())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// Empty origins allow any origin.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(TOKEN_HEADER),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

// ============================================================================
// API ROUTER
// ============================================================================

/// Create the complete API router.
///
/// The role gate is applied with `route_layer`, so unknown paths answer 404
/// instead of 401.
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    let tokens = Arc::new(config.tokens.clone());
    let cache = state.service.cache().clone();
    let state = Arc::new(state);

    let user_gate = AuthMiddlewareState::new(tokens.clone(), Role::User);
    let admin_gate = AuthMiddlewareState::new(tokens, Role::Admin);

    let user_routes = user_banner::create_router(state.clone())
        .route_layer(from_fn_with_state(user_gate, auth_middleware));
    let admin_routes = banner::create_router(state)
        .route_layer(from_fn_with_state(admin_gate, auth_middleware));

    let router = Router::new()
        .merge(user_routes)
        .merge(admin_routes)
        .merge(health::create_router(cache));

    #[cfg(feature = "openapi")]
    let router = router.route("/openapi.json", axum::routing::get(openapi_json));

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(build_cors_layer(config)),
    )
}
