//! Request and response bodies for the HTTP surface.
//!
//! Full banners are returned as [`banner_core::Banner`] directly; the types
//! here cover everything shaped differently on the wire.

use banner_core::{
    BannerContent, BannerId, BannerPatch, FeatureId, NewBanner, TagId, Version,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// QUERIES
// ============================================================================

/// Query string of `GET /user_banner`.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct UserBannerQuery {
    pub tag_id: i64,
    pub feature_id: i64,
    /// Read straight from the durable store, bypassing the cache.
    #[serde(default)]
    pub use_last_version: bool,
}

/// Query string of `GET /banner`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct BannerListQuery {
    pub feature_id: Option<i64>,
    pub tag_id: Option<i64>,
    /// Maximum number of banners. 0 or absent = server default.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ============================================================================
// REQUESTS
// ============================================================================

/// Body of `POST /banner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateBannerRequest {
    /// Duplicates are collapsed.
    pub tag_ids: Vec<i64>,
    pub feature_id: i64,
    pub content: BannerContent,
    pub is_active: bool,
}

impl CreateBannerRequest {
    pub fn into_new_banner(self) -> NewBanner {
        NewBanner::new(
            self.tag_ids.into_iter().map(TagId),
            FeatureId(self.feature_id),
            self.content,
            self.is_active,
        )
    }
}

/// Content fields of a patch; each one optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PatchContent {
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
}

/// Body of `PATCH /banner/{id}`. Absent fields stay untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PatchBannerRequest {
    pub tag_ids: Option<Vec<i64>>,
    pub feature_id: Option<i64>,
    pub content: Option<PatchContent>,
    pub is_active: Option<bool>,
}

impl PatchBannerRequest {
    pub fn into_patch(self) -> BannerPatch {
        let content = self.content.unwrap_or_default();
        BannerPatch {
            tag_ids: self
                .tag_ids
                .map(|ids| ids.into_iter().map(TagId).collect()),
            feature_id: self.feature_id.map(FeatureId),
            title: content.title,
            text: content.text,
            url: content.url,
            is_active: self.is_active,
        }
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateBannerResponse {
    pub banner_id: BannerId,
}

/// Empty object returned by a successful patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PatchBannerResponse {}

/// Identity of the version a rollback produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RollbackResponse {
    pub banner_id: BannerId,
    pub version: Version,
}
