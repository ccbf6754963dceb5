//! User-facing banner lookup
//!
//! `GET /user_banner` serves the content bound to one (tag, feature) pair.
//! Accepts user and admin tokens; only admins see inactive banners.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use banner_core::{BannerContent, Binding, FeatureId, TagId};

use crate::{
    error::ApiResult,
    middleware::RoleExtractor,
    state::AppState,
    types::UserBannerQuery,
};

/// GET /user_banner - Banner content for a tag and feature
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/user_banner",
    tag = "Banners",
    params(UserBannerQuery),
    responses(
        (status = 200, description = "Banner content", body = BannerContent),
        (status = 400, description = "Invalid query", body = crate::error::ApiError),
        (status = 401, description = "Missing token", body = crate::error::ApiError),
        (status = 403, description = "Token not allowed", body = crate::error::ApiError),
        (status = 404, description = "No visible banner for the pair", body = crate::error::ApiError),
    ),
    security(("token" = []))
))]
pub async fn get_user_banner(
    State(state): State<Arc<AppState>>,
    RoleExtractor(role): RoleExtractor,
    query: Result<Query<UserBannerQuery>, QueryRejection>,
) -> ApiResult<Json<BannerContent>> {
    let Query(params) = query?;
    let key = Binding::new(TagId(params.tag_id), FeatureId(params.feature_id));

    let banner = state
        .service
        .get_banner(key, params.use_last_version, role)
        .await
        .map_err(|e| state.render(e))?;

    Ok(Json(banner.content))
}

/// Create the user banner router. Callers add the role gate.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/user_banner", get(get_user_banner))
        .with_state(state)
}
