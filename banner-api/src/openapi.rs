//! OpenAPI document for the banner service, generated by utoipa from the
//! route annotations and schema derives.

use once_cell::sync::Lazy;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use banner_core::{Banner, BannerContent, BannerId, FeatureId, TagId};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{banner, health, user_banner};
use crate::types::{
    CreateBannerRequest, CreateBannerResponse, PatchBannerRequest, PatchBannerResponse,
    PatchContent, RollbackResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Banner Service API",
        version = "0.1.0",
        description = "Feature/tag banner delivery with cached reads and version history"
    ),
    servers(
        (url = "http://localhost:8080", description = "Local Development")
    ),
    tags(
        (name = "Banners", description = "Banner lookup and administration"),
        (name = "Health", description = "Service health")
    ),
    paths(
        user_banner::get_user_banner,
        banner::list_banners,
        banner::create_banner,
        banner::patch_banner,
        banner::delete_banner,
        banner::list_versions,
        banner::rollback_banner,
        health::health,
        health::liveness,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            Banner, BannerContent, BannerId, TagId, FeatureId,
            CreateBannerRequest, CreateBannerResponse,
            PatchBannerRequest, PatchContent, PatchBannerResponse,
            RollbackResponse,
            health::HealthResponse, health::HealthStatus, health::HealthDetails,
            health::CacheHealth,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `token` header scheme referenced by every guarded path.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("token"))),
            );
        }
    }
}

/// Document built once and served from `/openapi.json`.
pub static OPENAPI_DOC: Lazy<utoipa::openapi::OpenApi> = Lazy::new(ApiDoc::openapi);

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&*OPENAPI_DOC)
    }
}
