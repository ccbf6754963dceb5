//! Banner administration routes
//!
//! Listing, creation, patching, deletion, version history and rollback.
//! Every route here requires an admin token.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, patch, put},
    Json, Router,
};
use banner_core::{Banner, BannerId};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    types::{
        BannerListQuery, CreateBannerRequest, CreateBannerResponse, PatchBannerRequest,
        PatchBannerResponse, RollbackResponse,
    },
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /banner - List banners filtered by feature and/or tag
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/banner",
    tag = "Banners",
    params(BannerListQuery),
    responses(
        (status = 200, description = "Banners ordered by id", body = Vec<Banner>),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Missing token", body = ApiError),
        (status = 403, description = "Admin token required", body = ApiError),
    ),
    security(("token" = []))
))]
pub async fn list_banners(
    State(state): State<Arc<AppState>>,
    query: Result<Query<BannerListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Banner>>> {
    let Query(params) = query?;
    let filter = params.into_filter(state.default_page_limit)?;

    let banners = state
        .service
        .get_many_banner(&filter)
        .await
        .map_err(|e| state.render(e))?;

    Ok(Json(banners))
}

/// POST /banner - Create a banner
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/banner",
    tag = "Banners",
    request_body = CreateBannerRequest,
    responses(
        (status = 201, description = "Banner created", body = CreateBannerResponse),
        (status = 400, description = "Invalid request or binding conflict", body = ApiError),
        (status = 401, description = "Missing token", body = ApiError),
        (status = 403, description = "Admin token required", body = ApiError),
    ),
    security(("token" = []))
))]
pub async fn create_banner(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateBannerRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateBannerResponse>)> {
    let Json(req) = body?;

    let banner = state
        .service
        .add_banner(req.into_new_banner())
        .await
        .map_err(|e| state.render(e))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBannerResponse {
            banner_id: banner.banner_id,
        }),
    ))
}

/// PATCH /banner/{id} - Update some fields of a banner
#[cfg_attr(feature = "openapi", utoipa::path(
    patch,
    path = "/banner/{id}",
    tag = "Banners",
    params(("id" = i64, Path, description = "Banner ID")),
    request_body = PatchBannerRequest,
    responses(
        (status = 200, description = "Banner updated", body = PatchBannerResponse),
        (status = 400, description = "Invalid request, binding conflict or nothing to update", body = ApiError),
        (status = 404, description = "Banner not found", body = ApiError),
        (status = 409, description = "Banner modified concurrently", body = ApiError),
    ),
    security(("token" = []))
))]
pub async fn patch_banner(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<PatchBannerRequest>, JsonRejection>,
) -> ApiResult<Json<PatchBannerResponse>> {
    let Path(id) = path?;
    let Json(req) = body?;

    state
        .service
        .patch_banner(BannerId(id), req.into_patch())
        .await
        .map_err(|e| state.render(e))?;

    Ok(Json(PatchBannerResponse {}))
}

/// DELETE /banner/{id} - Delete a banner with its tags and history
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/banner/{id}",
    tag = "Banners",
    params(("id" = i64, Path, description = "Banner ID")),
    responses(
        (status = 204, description = "Banner deleted"),
        (status = 404, description = "Banner not found", body = ApiError),
    ),
    security(("token" = []))
))]
pub async fn delete_banner(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = path?;

    state
        .service
        .delete_banner(BannerId(id))
        .await
        .map_err(|e| state.render(e))?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /banner/{id}/versions - Current state and retained history
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/banner/{id}/versions",
    tag = "Banners",
    params(("id" = i64, Path, description = "Banner ID")),
    responses(
        (status = 200, description = "Versions, newest first", body = Vec<Banner>),
        (status = 404, description = "Banner not found", body = ApiError),
    ),
    security(("token" = []))
))]
pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Vec<Banner>>> {
    let Path(id) = path?;

    let versions = state
        .service
        .view_versions(BannerId(id))
        .await
        .map_err(|e| state.render(e))?;

    Ok(Json(versions))
}

/// PUT /banner/{id}/rollback/{version} - Restore a retained version
#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/banner/{id}/rollback/{version}",
    tag = "Banners",
    params(
        ("id" = i64, Path, description = "Banner ID"),
        ("version" = i64, Path, description = "Retained version to restore"),
    ),
    responses(
        (status = 200, description = "Rolled back as a new version", body = RollbackResponse),
        (status = 400, description = "Binding conflict or identical state", body = ApiError),
        (status = 404, description = "Banner or version not found", body = ApiError),
        (status = 409, description = "Banner modified concurrently", body = ApiError),
    ),
    security(("token" = []))
))]
pub async fn rollback_banner(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> ApiResult<Json<RollbackResponse>> {
    let Path((id, version)) = path?;

    let banner = state
        .service
        .rollback(BannerId(id), version)
        .await
        .map_err(|e| state.render(e))?;

    Ok(Json(RollbackResponse {
        banner_id: banner.banner_id,
        version: banner.version,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the banner administration router. Callers add the role gate.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/banner", get(list_banners).post(create_banner))
        .route("/banner/:id", patch(patch_banner).delete(delete_banner))
        .route("/banner/:id/versions", get(list_versions))
        .route("/banner/:id/rollback/:version", put(rollback_banner))
        .with_state(state)
}
