//! Banner Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for banner requests
//! - Fixtures wiring a service over in-memory backends
//! - Assertions for banner error variants

use std::sync::Arc;

pub use banner_storage::{BannerService, InMemoryBannerCache, MemoryBannerStore};

pub use banner_core::{
    Banner, BannerContent, BannerError, BannerFilter, BannerId, BannerPatch, BannerResult,
    Binding, FeatureId, NewBanner, Role, ServiceConfig, TagId,
};

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for banner requests.

    use super::*;
    use proptest::collection::btree_set;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    pub fn arb_tag_id() -> impl Strategy<Value = TagId> {
        (1i64..1_000).prop_map(TagId)
    }

    pub fn arb_feature_id() -> impl Strategy<Value = FeatureId> {
        (1i64..1_000).prop_map(FeatureId)
    }

    /// Non-empty tag set.
    pub fn arb_tag_ids() -> impl Strategy<Value = BTreeSet<TagId>> {
        btree_set(arb_tag_id(), 1..6)
    }

    /// Non-blank title, text and url.
    pub fn arb_content() -> impl Strategy<Value = BannerContent> {
        ("[A-Za-z][A-Za-z0-9 ]{0,30}", "[A-Za-z][A-Za-z0-9 .,]{0,80}", "[a-z]{1,12}")
            .prop_map(|(title, text, host)| {
                BannerContent::new(title, text, format!("https://{}.example.com", host))
            })
    }

    pub fn arb_new_banner() -> impl Strategy<Value = NewBanner> {
        (arb_tag_ids(), arb_feature_id(), arb_content(), any::<bool>()).prop_map(
            |(tag_ids, feature_id, content, is_active)| {
                NewBanner::new(tag_ids, feature_id, content, is_active)
            },
        )
    }

    /// Valid patch; every field independently present or absent.
    pub fn arb_patch() -> impl Strategy<Value = BannerPatch> {
        (
            proptest::option::of(arb_tag_ids()),
            proptest::option::of(arb_feature_id()),
            proptest::option::of(arb_content()),
            proptest::option::of(any::<bool>()),
        )
            .prop_map(|(tag_ids, feature_id, content, is_active)| BannerPatch {
                tag_ids,
                feature_id,
                title: content.as_ref().map(|c| c.title.clone()),
                text: content.as_ref().map(|c| c.text.clone()),
                url: content.map(|c| c.url),
                is_active,
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values and wiring for common scenarios.

    use super::*;

    /// Service over a fresh in-memory store and cache. The store and cache
    /// handles share state with the service.
    pub fn memory_service(
        config: ServiceConfig,
    ) -> (BannerService, MemoryBannerStore, Arc<InMemoryBannerCache>) {
        let store = MemoryBannerStore::new();
        let cache = Arc::new(InMemoryBannerCache::new());
        let service = BannerService::new(Arc::new(store.clone()), cache.clone(), config);
        (service, store, cache)
    }

    pub fn content(title: &str) -> BannerContent {
        BannerContent::new(title, "Limited offer", "https://example.com/offer")
    }

    pub fn active_banner(tags: &[i64], feature: i64) -> NewBanner {
        NewBanner::new(
            tags.iter().copied().map(TagId),
            FeatureId(feature),
            content("Spring sale"),
            true,
        )
    }

    pub fn inactive_banner(tags: &[i64], feature: i64) -> NewBanner {
        NewBanner {
            is_active: false,
            ..active_banner(tags, feature)
        }
    }

    pub fn key(tag: i64, feature: i64) -> Binding {
        Binding::new(TagId(tag), FeatureId(feature))
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for banner error variants.

    use super::*;

    /// Assert that a result is any not-found error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &BannerResult<T>) {
        match result {
            Err(e) if e.is_not_found() => {}
            other => panic!("Expected not found, got: {:?}", other),
        }
    }

    /// Assert that a result is a conflict listing exactly `expected`.
    #[track_caller]
    pub fn assert_conflicts<T: std::fmt::Debug>(result: &BannerResult<T>, expected: &[Binding]) {
        match result {
            Err(BannerError::BindingConflict { conflicts }) => {
                assert_eq!(conflicts.as_slice(), expected, "Wrong conflict set");
            }
            other => panic!("Expected BindingConflict, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_nothing_to_update<T: std::fmt::Debug>(result: &BannerResult<T>) {
        match result {
            Err(BannerError::NothingToUpdate { .. }) => {}
            other => panic!("Expected NothingToUpdate, got: {:?}", other),
        }
    }
}
