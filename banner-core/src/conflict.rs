//! Uniqueness rules for (tag, feature) bindings
//!
//! A patch only needs to check the bindings it would newly occupy. Which
//! bindings those are depends on whether the feature and/or the tag set
//! change:
//!
//! | feature changed | tags changed | checked |
//! |---|---|---|
//! | no  | no  | nothing |
//! | no  | yes | newly added tags under the current feature |
//! | yes | no  | all current tags under the new feature |
//! | yes | yes | all requested tags under the new feature |

use std::collections::BTreeSet;

use crate::entities::{Banner, BannerPatch, NewBanner};
use crate::identity::{BannerId, Binding, FeatureId, TagId};
use crate::tags::TagDiff;

/// Query sent to the durable store: which of these bindings are already
/// held by a banner other than `exclude`?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictCheck {
    pub tag_ids: BTreeSet<TagId>,
    pub feature_id: FeatureId,
    pub exclude: Option<BannerId>,
}

impl ConflictCheck {
    pub fn for_new(new: &NewBanner) -> Self {
        Self {
            tag_ids: new.tag_ids.clone(),
            feature_id: new.feature_id,
            exclude: None,
        }
    }

    pub fn candidates(&self) -> Vec<Binding> {
        self.tag_ids
            .iter()
            .map(|tag_id| Binding::new(*tag_id, self.feature_id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tag_ids.is_empty()
    }
}

/// Which bindings a patch would newly occupy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictScope {
    /// Neither feature nor tags change.
    Unchanged,
    /// Same feature, different tag set: only the added tags are new.
    TagsChanged {
        feature_id: FeatureId,
        added: BTreeSet<TagId>,
    },
    /// Same tags moved to another feature.
    FeatureChanged {
        feature_id: FeatureId,
        tags: BTreeSet<TagId>,
    },
    /// New tag set under a new feature.
    BothChanged {
        feature_id: FeatureId,
        tags: BTreeSet<TagId>,
    },
}

impl ConflictScope {
    pub fn resolve(current: &Banner, patch: &BannerPatch) -> Self {
        let new_feature = patch
            .feature_id
            .filter(|feature_id| *feature_id != current.feature_id);
        let new_tags = patch
            .tag_ids
            .as_ref()
            .filter(|tag_ids| **tag_ids != current.tag_ids);

        match (new_feature, new_tags) {
            (None, None) => ConflictScope::Unchanged,
            (None, Some(requested)) => ConflictScope::TagsChanged {
                feature_id: current.feature_id,
                added: TagDiff::between(&current.tag_ids, requested).to_add,
            },
            (Some(feature_id), None) => ConflictScope::FeatureChanged {
                feature_id,
                tags: current.tag_ids.clone(),
            },
            (Some(feature_id), Some(requested)) => ConflictScope::BothChanged {
                feature_id,
                tags: requested.clone(),
            },
        }
    }

    /// The store query for this scope, or `None` when nothing needs checking.
    pub fn check_for(&self, banner_id: BannerId) -> Option<ConflictCheck> {
        let (feature_id, tag_ids) = match self {
            ConflictScope::Unchanged => return None,
            ConflictScope::TagsChanged { feature_id, added } => (*feature_id, added),
            ConflictScope::FeatureChanged { feature_id, tags }
            | ConflictScope::BothChanged { feature_id, tags } => (*feature_id, tags),
        };
        if tag_ids.is_empty() {
            return None;
        }
        Some(ConflictCheck {
            tag_ids: tag_ids.clone(),
            feature_id,
            exclude: Some(banner_id),
        })
    }
}
