//! End-to-end flows of the banner service over the in-memory store and cache.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use banner_core::{
    Banner, BannerError, BannerFilter, BannerId, BannerPatch, BannerResult, Binding, CacheError,
    CachePopulation, FeatureId, InvalidationPolicy, NewBanner, Role, ServiceConfig, TagId,
};
use banner_storage::{
    BannerCache, BannerService, CachePattern, CacheResult, CacheStats, InMemoryBannerCache,
    MemoryBannerStore,
};
use banner_test_utils::assertions::{assert_conflicts, assert_not_found, assert_nothing_to_update};
use banner_test_utils::fixtures::{content, key, memory_service};

// ============================================================================
// FIXTURES
// ============================================================================

struct Harness {
    service: BannerService,
    store: MemoryBannerStore,
    cache: Arc<InMemoryBannerCache>,
}

fn harness_with(config: ServiceConfig) -> Harness {
    let (service, store, cache) = memory_service(config);
    Harness {
        service,
        store,
        cache,
    }
}

fn harness() -> Harness {
    harness_with(ServiceConfig::default())
}

fn tags(ids: &[i64]) -> BTreeSet<TagId> {
    ids.iter().copied().map(TagId).collect()
}

fn new_banner(tag_ids: &[i64], feature: i64, title: &str, active: bool) -> NewBanner {
    NewBanner::new(
        tag_ids.iter().copied().map(TagId),
        FeatureId(feature),
        content(title),
        active,
    )
}

fn retitle(title: &str) -> BannerPatch {
    BannerPatch {
        title: Some(title.to_string()),
        ..Default::default()
    }
}

/// Cache whose operations can be switched to fail.
#[derive(Default)]
struct FlakyCache {
    inner: InMemoryBannerCache,
    fail_reads: AtomicBool,
    fail_deletes: AtomicBool,
}

fn unavailable() -> CacheError {
    CacheError::Unavailable {
        reason: "connection refused".to_string(),
    }
}

#[async_trait]
impl BannerCache for FlakyCache {
    async fn get(&self, key: Binding) -> CacheResult<Option<Banner>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: Binding, banner: &Banner, ttl: Duration) -> CacheResult<()> {
        self.inner.set(key, banner, ttl).await
    }

    async fn delete_matching(&self, pattern: CachePattern) -> CacheResult<u64> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.delete_matching(pattern).await
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        self.inner.stats().await
    }
}

fn flaky_service(policy: InvalidationPolicy) -> (BannerService, Arc<FlakyCache>) {
    let cache = Arc::new(FlakyCache::default());
    let service = BannerService::new(
        Arc::new(MemoryBannerStore::new()),
        cache.clone(),
        ServiceConfig::default().with_invalidation_policy(policy),
    );
    (service, cache)
}

// ============================================================================
// READ PATH
// ============================================================================

#[tokio::test]
async fn test_add_then_get_round_trip() -> BannerResult<()> {
    let h = harness();
    let new = new_banner(&[1, 2, 3], 5, "Spring sale", true);
    let created = h.service.add_banner(new.clone()).await?;

    let got = h.service.get_banner(key(1, 5), false, Role::User).await?;
    assert_eq!(got.content, new.content);
    assert_eq!(got.version, 1);
    assert_eq!(got.banner_id, created.banner_id);
    assert_eq!(got.tag_ids, tags(&[1, 2, 3]));
    Ok(())
}

#[tokio::test]
async fn test_get_unknown_key_is_not_found() {
    let h = harness();
    let err = h.service.get_banner(key(1, 1), false, Role::Admin).await;
    assert_not_found(&err);
}

#[tokio::test]
async fn test_lazy_population_fills_cache_on_first_read() -> BannerResult<()> {
    let h = harness();
    h.service.add_banner(new_banner(&[1, 2], 5, "t", true)).await?;
    assert!(h.cache.is_empty());

    h.service.get_banner(key(1, 5), false, Role::User).await?;
    assert_eq!(h.cache.len(), 1);

    h.service.get_banner(key(1, 5), false, Role::User).await?;
    let stats = h.cache.stats().await?;
    assert_eq!(stats.hits, 1);
    Ok(())
}

#[tokio::test]
async fn test_use_last_version_bypasses_cache() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1], 5, "fresh", true)).await?;

    let mut stale = created.clone();
    stale.content.title = "stale".to_string();
    h.cache
        .set(key(1, 5), &stale, Duration::from_secs(60))
        .await?;

    let cached = h.service.get_banner(key(1, 5), false, Role::User).await?;
    assert_eq!(cached.content.title, "stale");

    let latest = h.service.get_banner(key(1, 5), true, Role::User).await?;
    assert_eq!(latest.content.title, "fresh");
    Ok(())
}

#[tokio::test]
async fn test_inactive_banner_hidden_from_users_on_both_paths() -> BannerResult<()> {
    let h = harness();
    h.service.add_banner(new_banner(&[1], 5, "secret", false)).await?;

    // Store path.
    let err = h.service.get_banner(key(1, 5), true, Role::User).await;
    assert!(matches!(err, Err(BannerError::Hidden { .. })));

    // Admin read fills the cache.
    let admin = h.service.get_banner(key(1, 5), false, Role::Admin).await?;
    assert_eq!(admin.content.title, "secret");
    assert_eq!(h.cache.len(), 1);

    // Cache path.
    let err = h.service.get_banner(key(1, 5), false, Role::User).await;
    assert!(matches!(err, Err(BannerError::Hidden { .. })));
    Ok(())
}

#[tokio::test]
async fn test_cache_read_failure_degrades_to_store() -> BannerResult<()> {
    let (service, cache) = flaky_service(InvalidationPolicy::Strict);
    service.add_banner(new_banner(&[1], 5, "t", true)).await?;
    cache.fail_reads.store(true, Ordering::SeqCst);

    let got = service.get_banner(key(1, 5), false, Role::User).await?;
    assert_eq!(got.content.title, "t");
    Ok(())
}

#[tokio::test]
async fn test_get_many_filters_and_orders() -> BannerResult<()> {
    let h = harness();
    h.service.add_banner(new_banner(&[1, 2], 1, "a", true)).await?;
    h.service.add_banner(new_banner(&[2], 2, "b", false)).await?;
    h.service.add_banner(new_banner(&[3], 1, "c", true)).await?;

    let all = h.service.get_many_banner(&BannerFilter::default()).await?;
    let titles: Vec<&str> = all.iter().map(|b| b.content.title.as_str()).collect();
    assert_eq!(titles, vec!["a", "b", "c"]);

    let by_tag = h
        .service
        .get_many_banner(&BannerFilter {
            tag_id: Some(TagId(2)),
            ..Default::default()
        })
        .await?;
    assert_eq!(by_tag.len(), 2);
    assert_eq!(by_tag[0].tag_ids, tags(&[1, 2]));

    let by_both = h
        .service
        .get_many_banner(&BannerFilter {
            tag_id: Some(TagId(2)),
            feature_id: Some(FeatureId(1)),
            ..Default::default()
        })
        .await?;
    assert_eq!(by_both.len(), 1);

    let page = h
        .service
        .get_many_banner(&BannerFilter {
            limit: Some(1),
            offset: 2,
            ..Default::default()
        })
        .await?;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].content.title, "c");
    Ok(())
}

// ============================================================================
// ADD
// ============================================================================

#[tokio::test]
async fn test_second_add_reports_every_conflict() -> BannerResult<()> {
    let h = harness();
    h.service.add_banner(new_banner(&[1, 2, 3], 5, "a", true)).await?;

    let err = h
        .service
        .add_banner(new_banner(&[1, 2, 3], 5, "b", true))
        .await;
    assert_conflicts(&err, &[key(1, 5), key(2, 5), key(3, 5)]);
    assert_eq!(h.store.banner_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_add_partial_overlap_rejects_whole_request() -> BannerResult<()> {
    let h = harness();
    h.service.add_banner(new_banner(&[1, 2], 5, "a", true)).await?;

    let err = h.service.add_banner(new_banner(&[2, 7], 5, "b", true)).await;
    assert_conflicts(&err, &[key(2, 5)]);
    // Tag 7 was not bound by the rejected request.
    let err = h.service.get_banner(key(7, 5), true, Role::Admin).await;
    assert!(matches!(err, Err(BannerError::KeyNotFound { .. })));

    // Same tags under another feature are fine.
    h.service.add_banner(new_banner(&[1, 2], 6, "c", true)).await?;
    assert_eq!(h.store.banner_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_add_rejects_invalid_input() {
    let h = harness();
    let err = h.service.add_banner(new_banner(&[], 5, "t", true)).await;
    assert!(matches!(err, Err(BannerError::InvalidInput { ref field, .. }) if field == "tag_ids"));

    let err = h.service.add_banner(new_banner(&[1], 5, "  ", true)).await;
    assert!(matches!(err, Err(BannerError::InvalidInput { .. })));
}

#[tokio::test]
async fn test_eager_population_writes_every_key() -> BannerResult<()> {
    let h = harness_with(ServiceConfig::default().with_cache_population(CachePopulation::Eager));
    h.service.add_banner(new_banner(&[1, 2, 3], 5, "t", true)).await?;
    assert_eq!(h.cache.len(), 3);
    assert!(h.cache.get(key(2, 5)).await?.is_some());
    Ok(())
}

// ============================================================================
// PATCH
// ============================================================================

#[tokio::test]
async fn test_patch_with_current_values_is_nothing_to_update() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1, 2, 3], 5, "t", true)).await?;

    let patch = BannerPatch {
        tag_ids: Some(tags(&[3, 1, 2])),
        feature_id: Some(FeatureId(5)),
        title: Some("t".to_string()),
        is_active: Some(true),
        ..Default::default()
    };
    let err = h.service.patch_banner(created.banner_id, patch).await;
    assert_nothing_to_update(&err);

    let versions = h.service.view_versions(created.banner_id).await?;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, 1);
    Ok(())
}

#[tokio::test]
async fn test_patch_unknown_banner_is_not_found() {
    let h = harness();
    let err = h.service.patch_banner(BannerId(99), retitle("x")).await;
    assert_not_found(&err);
}

#[tokio::test]
async fn test_patch_reconciles_tags() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1, 2, 3], 5, "t", true)).await?;

    let patched = h
        .service
        .patch_banner(
            created.banner_id,
            BannerPatch {
                tag_ids: Some(tags(&[2, 3, 4])),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(patched.tag_ids, tags(&[2, 3, 4]));
    assert_eq!(patched.version, 2);

    let err = h.service.get_banner(key(1, 5), true, Role::Admin).await;
    assert!(matches!(err, Err(BannerError::KeyNotFound { .. })));
    let got = h.service.get_banner(key(4, 5), true, Role::Admin).await?;
    assert_eq!(got.banner_id, created.banner_id);
    Ok(())
}

#[tokio::test]
async fn test_patch_conflicts_follow_decision_table() -> BannerResult<()> {
    let h = harness();
    let a = h.service.add_banner(new_banner(&[1, 2], 5, "a", true)).await?;
    h.service.add_banner(new_banner(&[3], 5, "b", true)).await?;
    h.service.add_banner(new_banner(&[1], 6, "c", true)).await?;

    // Tags changed: only the added tag 3 is checked under feature 5.
    let err = h
        .service
        .patch_banner(
            a.banner_id,
            BannerPatch {
                tag_ids: Some(tags(&[1, 2, 3])),
                ..Default::default()
            },
        )
        .await;
    assert_conflicts(&err, &[key(3, 5)]);

    // Feature changed: current tags {1, 2} are checked under feature 6.
    let err = h
        .service
        .patch_banner(
            a.banner_id,
            BannerPatch {
                feature_id: Some(FeatureId(6)),
                ..Default::default()
            },
        )
        .await;
    assert_conflicts(&err, &[key(1, 6)]);

    // Both changed: requested tags {2, 9} under feature 6 are free.
    let moved = h
        .service
        .patch_banner(
            a.banner_id,
            BannerPatch {
                feature_id: Some(FeatureId(6)),
                tag_ids: Some(tags(&[2, 9])),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(moved.feature_id, FeatureId(6));
    assert_eq!(moved.version, 2);
    Ok(())
}

#[tokio::test]
async fn test_patch_invalidates_old_and_new_keys() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1, 2], 5, "old", true)).await?;
    h.service.get_banner(key(1, 5), false, Role::User).await?;
    h.service.get_banner(key(2, 5), false, Role::User).await?;
    assert_eq!(h.cache.len(), 2);

    h.service
        .patch_banner(
            created.banner_id,
            BannerPatch {
                title: Some("new".to_string()),
                feature_id: Some(FeatureId(8)),
                ..Default::default()
            },
        )
        .await?;
    assert!(h.cache.is_empty());

    let got = h.service.get_banner(key(1, 8), false, Role::User).await?;
    assert_eq!(got.content.title, "new");
    let err = h.service.get_banner(key(1, 5), false, Role::User).await;
    assert!(matches!(err, Err(BannerError::KeyNotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_patch_rejects_empty_tag_set() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1], 5, "t", true)).await?;
    let err = h
        .service
        .patch_banner(
            created.banner_id,
            BannerPatch {
                tag_ids: Some(BTreeSet::new()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(err, Err(BannerError::InvalidInput { .. })));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_patches_each_get_a_version() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1], 5, "t0", true)).await?;

    let mut handles = Vec::new();
    for i in 1..=8 {
        let service = h.service.clone();
        let id = created.banner_id;
        handles.push(tokio::spawn(async move {
            service.patch_banner(id, retitle(&format!("t{}", i))).await
        }));
    }
    for handle in handles {
        match handle.await {
            Ok(result) => {
                result?;
            }
            Err(e) => panic!("task failed: {}", e),
        }
    }

    let versions = h.service.view_versions(created.banner_id).await?;
    assert_eq!(versions[0].version, 9);
    Ok(())
}

// ============================================================================
// VERSIONS AND ROLLBACK
// ============================================================================

#[tokio::test]
async fn test_five_patches_keep_current_plus_three() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1], 5, "v1", true)).await?;
    for v in 2..=6 {
        h.service
            .patch_banner(created.banner_id, retitle(&format!("v{}", v)))
            .await?;
    }

    let versions = h.service.view_versions(created.banner_id).await?;
    let numbers: Vec<i64> = versions.iter().map(|b| b.version).collect();
    assert_eq!(numbers, vec![6, 5, 4, 3]);
    assert_eq!(versions[3].version, versions[0].version - 3);
    assert_eq!(versions[1].content.title, "v5");
    assert_eq!(h.store.snapshot_count(created.banner_id).await, 3);
    Ok(())
}

#[tokio::test]
async fn test_view_versions_unknown_banner() {
    let h = harness();
    let err = h.service.view_versions(BannerId(42)).await;
    assert_not_found(&err);
}

#[tokio::test]
async fn test_rollback_restores_snapshot_as_new_version() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1, 2, 3], 5, "A", true)).await?;
    let id = created.banner_id;
    h.service
        .patch_banner(
            id,
            BannerPatch {
                title: Some("B".to_string()),
                tag_ids: Some(tags(&[4])),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
    h.service.patch_banner(id, retitle("C")).await?;

    // Stale entry for a key the target snapshot held.
    h.cache
        .set(key(2, 5), &created, Duration::from_secs(60))
        .await?;

    let restored = h.service.rollback(id, 1).await?;
    assert_eq!(restored.version, 4);
    assert_eq!(restored.content, created.content);
    assert_eq!(restored.tag_ids, tags(&[1, 2, 3]));
    assert!(restored.is_active);
    assert!(h.cache.get(key(2, 5)).await?.is_none());

    let got = h.service.get_banner(key(2, 5), false, Role::User).await?;
    assert_eq!(got.version, 4);
    let err = h.service.get_banner(key(4, 5), true, Role::Admin).await;
    assert!(matches!(err, Err(BannerError::KeyNotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_rollback_to_unretained_version_is_not_found() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1], 5, "v1", true)).await?;
    let id = created.banner_id;
    for v in 2..=6 {
        h.service.patch_banner(id, retitle(&format!("v{}", v))).await?;
    }

    for version in [1, 2, 6, 7] {
        let err = h.service.rollback(id, version).await;
        assert!(
            matches!(err, Err(BannerError::VersionNotFound { .. })),
            "version {} should not be restorable",
            version
        );
    }
    let restored = h.service.rollback(id, 3).await?;
    assert_eq!(restored.content.title, "v3");
    assert_eq!(restored.version, 7);
    Ok(())
}

#[tokio::test]
async fn test_rollback_blocked_by_taken_binding() -> BannerResult<()> {
    let h = harness();
    let a = h.service.add_banner(new_banner(&[1], 5, "a", true)).await?;
    h.service
        .patch_banner(
            a.banner_id,
            BannerPatch {
                tag_ids: Some(tags(&[2])),
                ..Default::default()
            },
        )
        .await?;
    h.service.add_banner(new_banner(&[1], 5, "b", true)).await?;

    let err = h.service.rollback(a.banner_id, 1).await;
    assert_conflicts(&err, &[key(1, 5)]);
    Ok(())
}

#[tokio::test]
async fn test_rollback_to_identical_state_is_nothing_to_update() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1], 5, "same", true)).await?;
    h.service.patch_banner(created.banner_id, retitle("other")).await?;
    h.service.patch_banner(created.banner_id, retitle("same")).await?;

    let err = h.service.rollback(created.banner_id, 1).await;
    assert_nothing_to_update(&err);
    Ok(())
}

// ============================================================================
// DELETE
// ============================================================================

#[tokio::test]
async fn test_delete_removes_everything() -> BannerResult<()> {
    let h = harness();
    let created = h.service.add_banner(new_banner(&[1, 2, 3], 5, "t", true)).await?;
    h.service.patch_banner(created.banner_id, retitle("u")).await?;
    for tag in [1, 2, 3] {
        h.service.get_banner(key(tag, 5), false, Role::User).await?;
    }
    assert_eq!(h.cache.len(), 3);

    h.service.delete_banner(created.banner_id).await?;

    for tag in [1, 2, 3] {
        let err = h.service.get_banner(key(tag, 5), false, Role::User).await;
        assert!(matches!(err, Err(BannerError::KeyNotFound { .. })));
    }
    let err = h.service.view_versions(created.banner_id).await;
    assert!(matches!(err, Err(BannerError::BannerNotFound { .. })));
    assert_eq!(h.store.snapshot_count(created.banner_id).await, 0);

    let err = h.service.delete_banner(created.banner_id).await;
    assert_not_found(&err);
    Ok(())
}

// ============================================================================
// INVALIDATION POLICY
// ============================================================================

#[tokio::test]
async fn test_strict_policy_surfaces_invalidation_failure_after_commit() -> BannerResult<()> {
    let (service, cache) = flaky_service(InvalidationPolicy::Strict);
    let created = service.add_banner(new_banner(&[1], 5, "t", true)).await?;
    cache.fail_deletes.store(true, Ordering::SeqCst);

    let err = service.patch_banner(created.banner_id, retitle("u")).await;
    assert!(matches!(err, Err(BannerError::Cache(_))));

    // The durable write still happened.
    let got = service.get_banner(key(1, 5), true, Role::User).await?;
    assert_eq!(got.content.title, "u");
    assert_eq!(got.version, 2);
    Ok(())
}

#[tokio::test]
async fn test_best_effort_policy_reports_success() -> BannerResult<()> {
    let (service, cache) = flaky_service(InvalidationPolicy::BestEffort);
    let created = service.add_banner(new_banner(&[1], 5, "t", true)).await?;
    cache.fail_deletes.store(true, Ordering::SeqCst);

    let patched = service.patch_banner(created.banner_id, retitle("u")).await?;
    assert_eq!(patched.version, 2);
    service.delete_banner(created.banner_id).await?;
    Ok(())
}
