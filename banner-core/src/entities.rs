//! Banner aggregate and the request shapes that mutate it

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{BannerError, BannerResult};
use crate::identity::{BannerId, Binding, FeatureId, TagId, Timestamp, Version};

// ============================================================================
// CONTENT
// ============================================================================

/// The payload a banner serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BannerContent {
    pub title: String,
    pub text: String,
    pub url: String,
}

impl BannerContent {
    pub fn new(title: impl Into<String>, text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            url: url.into(),
        }
    }
}

// ============================================================================
// BANNER AGGREGATE
// ============================================================================

/// Full banner state as held by the durable store.
///
/// `tag_ids` is a set: a banner never holds the same tag twice, and its JSON
/// form is an ascending array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Banner {
    pub banner_id: BannerId,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<i64>))]
    pub tag_ids: BTreeSet<TagId>,
    pub feature_id: FeatureId,
    pub content: BannerContent,
    pub is_active: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    pub version: Version,
}

impl Banner {
    /// Every (tag, feature) pair this banner occupies.
    pub fn bindings(&self) -> Vec<Binding> {
        self.tag_ids
            .iter()
            .map(|tag_id| Binding::new(*tag_id, self.feature_id))
            .collect()
    }

    /// Whether a caller holding `role` may read this banner.
    pub fn is_visible_to(&self, role: Role) -> bool {
        self.is_active || role == Role::Admin
    }
}

/// Immutable copy of a banner at a past version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionSnapshot {
    state: Banner,
}

impl VersionSnapshot {
    /// Capture the state of `banner` as it is right now.
    pub fn capture(banner: &Banner) -> Self {
        Self {
            state: banner.clone(),
        }
    }

    pub fn banner_id(&self) -> BannerId {
        self.state.banner_id
    }

    pub fn version(&self) -> Version {
        self.state.version
    }

    pub fn state(&self) -> &Banner {
        &self.state
    }

    pub fn into_state(self) -> Banner {
        self.state
    }
}

// ============================================================================
// CALLER ROLE
// ============================================================================

/// Caller privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

// ============================================================================
// REQUESTS
// ============================================================================

/// Input for creating a banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBanner {
    pub tag_ids: BTreeSet<TagId>,
    pub feature_id: FeatureId,
    pub content: BannerContent,
    pub is_active: bool,
}

impl NewBanner {
    /// Build from a raw tag list; duplicates collapse.
    pub fn new(
        tag_ids: impl IntoIterator<Item = TagId>,
        feature_id: FeatureId,
        content: BannerContent,
        is_active: bool,
    ) -> Self {
        Self {
            tag_ids: tag_ids.into_iter().collect(),
            feature_id,
            content,
            is_active,
        }
    }

    pub fn validate(&self) -> BannerResult<()> {
        if self.tag_ids.is_empty() {
            return Err(BannerError::invalid_input("tag_ids", "at least one tag is required"));
        }
        require_non_blank("content.title", &self.content.title)?;
        require_non_blank("content.text", &self.content.text)?;
        require_non_blank("content.url", &self.content.url)?;
        Ok(())
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.tag_ids
            .iter()
            .map(|tag_id| Binding::new(*tag_id, self.feature_id))
            .collect()
    }
}

/// Partial update of a banner. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BannerPatch {
    pub tag_ids: Option<BTreeSet<TagId>>,
    pub feature_id: Option<FeatureId>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub url: Option<String>,
    pub is_active: Option<bool>,
}

impl BannerPatch {
    /// A patch that restores every field of `snapshot`.
    pub fn restoring(snapshot: &VersionSnapshot) -> Self {
        let state = snapshot.state();
        Self {
            tag_ids: Some(state.tag_ids.clone()),
            feature_id: Some(state.feature_id),
            title: Some(state.content.title.clone()),
            text: Some(state.content.text.clone()),
            url: Some(state.content.url.clone()),
            is_active: Some(state.is_active),
        }
    }

    pub fn validate(&self) -> BannerResult<()> {
        if let Some(tag_ids) = &self.tag_ids {
            if tag_ids.is_empty() {
                return Err(BannerError::invalid_input(
                    "tag_ids",
                    "a banner must keep at least one tag",
                ));
            }
        }
        if let Some(title) = &self.title {
            require_non_blank("content.title", title)?;
        }
        if let Some(text) = &self.text {
            require_non_blank("content.text", text)?;
        }
        if let Some(url) = &self.url {
            require_non_blank("content.url", url)?;
        }
        Ok(())
    }

    /// True when applying this patch would not change `current`.
    ///
    /// Tag sets compare as sets, so request order never matters.
    pub fn is_noop_for(&self, current: &Banner) -> bool {
        fn same<T: PartialEq>(requested: &Option<T>, current: &T) -> bool {
            requested.as_ref().map_or(true, |value| value == current)
        }

        same(&self.tag_ids, &current.tag_ids)
            && same(&self.feature_id, &current.feature_id)
            && same(&self.title, &current.content.title)
            && same(&self.text, &current.content.text)
            && same(&self.url, &current.content.url)
            && same(&self.is_active, &current.is_active)
    }

    /// Next state of `current` with this patch applied: version bumped by
    /// one and `updated_at` set to `now`.
    pub fn apply_to(&self, current: &Banner, now: Timestamp) -> Banner {
        Banner {
            banner_id: current.banner_id,
            tag_ids: self
                .tag_ids
                .clone()
                .unwrap_or_else(|| current.tag_ids.clone()),
            feature_id: self.feature_id.unwrap_or(current.feature_id),
            content: BannerContent {
                title: self
                    .title
                    .clone()
                    .unwrap_or_else(|| current.content.title.clone()),
                text: self
                    .text
                    .clone()
                    .unwrap_or_else(|| current.content.text.clone()),
                url: self.url.clone().unwrap_or_else(|| current.content.url.clone()),
            },
            is_active: self.is_active.unwrap_or(current.is_active),
            created_at: current.created_at,
            updated_at: now,
            version: current.version + 1,
        }
    }
}

/// Filters for listing banners. Results are ordered by banner id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BannerFilter {
    pub feature_id: Option<FeatureId>,
    pub tag_id: Option<TagId>,
    /// `None` means no limit.
    pub limit: Option<u64>,
    pub offset: u64,
}

impl BannerFilter {
    pub fn matches(&self, banner: &Banner) -> bool {
        self.feature_id.map_or(true, |f| banner.feature_id == f)
            && self.tag_id.map_or(true, |t| banner.tag_ids.contains(&t))
    }
}

fn require_non_blank(field: &'static str, value: &str) -> BannerResult<()> {
    if value.trim().is_empty() {
        return Err(BannerError::invalid_input(field, "must not be empty"));
    }
    Ok(())
}
