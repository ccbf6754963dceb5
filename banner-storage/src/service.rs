//! Banner Service
//!
//! Top-level read and write flows over the durable store and the cache.
//!
//! Every write runs inside a single store transaction and only touches the
//! cache after that transaction committed. A failed step rolls the whole
//! transaction back.

use std::collections::BTreeSet;
use std::sync::Arc;

use banner_core::{
    prune_target, version_listing, Banner, BannerError, BannerFilter, BannerId, BannerPatch,
    BannerResult, Binding, CachePopulation, ConflictCheck, ConflictScope, InvalidationPolicy,
    NewBanner, Role, ServiceConfig, TagDiff, Timestamp, Version, VersionSnapshot,
};
use chrono::Utc;

use crate::cache::{BannerCache, CachePattern};
use crate::store::{BannerStore, BannerTx};

/// Coordinates the durable store and the cache for every banner operation.
#[derive(Clone)]
pub struct BannerService {
    store: Arc<dyn BannerStore>,
    cache: Arc<dyn BannerCache>,
    config: ServiceConfig,
}

impl BannerService {
    pub fn new(
        store: Arc<dyn BannerStore>,
        cache: Arc<dyn BannerCache>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn BannerCache> {
        &self.cache
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Banner bound to `key` as seen by a caller with `role`.
    ///
    /// Unless `use_last_version` is set, the cache is consulted first and
    /// refilled on a miss. Inactive banners are hidden from non-admin callers
    /// on both paths.
    pub async fn get_banner(
        &self,
        key: Binding,
        use_last_version: bool,
        role: Role,
    ) -> BannerResult<Banner> {
        if !use_last_version {
            match self.cache.get(key).await {
                Ok(Some(banner)) => {
                    tracing::debug!(%key, "banner served from cache");
                    return visible_to(banner, key, role);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%key, error = %e, "cache read failed, reading store");
                }
            }
        }

        let banner = self
            .store
            .banner_by_key(key)
            .await?
            .ok_or(BannerError::KeyNotFound {
                tag_id: key.tag_id,
                feature_id: key.feature_id,
            })?;

        if !use_last_version {
            if let Err(e) = self.cache.set(key, &banner, self.config.cache_ttl).await {
                tracing::warn!(%key, error = %e, "cache fill failed");
            }
        }

        visible_to(banner, key, role)
    }

    /// Banners matching `filter`, straight from the durable store.
    pub async fn get_many_banner(&self, filter: &BannerFilter) -> BannerResult<Vec<Banner>> {
        self.store.banner_list(filter).await
    }

    /// Current state followed by retained snapshots, newest first.
    pub async fn view_versions(&self, banner_id: BannerId) -> BannerResult<Vec<Banner>> {
        let mut tx = self.store.begin().await?;
        let result = read_versions(tx.as_mut(), banner_id).await;
        let (current, snapshots) = finish(tx, result, "view_versions").await?;
        Ok(version_listing(current, snapshots))
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Create a banner at version 1.
    pub async fn add_banner(&self, new: NewBanner) -> BannerResult<Banner> {
        new.validate()?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let result = add_in_tx(tx.as_mut(), &new, now).await;
        let banner = finish(tx, result, "add_banner").await?;

        tracing::info!(
            banner_id = %banner.banner_id,
            feature_id = %banner.feature_id,
            tags = banner.tag_ids.len(),
            "banner created"
        );

        if self.config.cache_population == CachePopulation::Eager {
            for key in banner.bindings() {
                if let Err(e) = self.cache.set(key, &banner, self.config.cache_ttl).await {
                    tracing::warn!(%key, error = %e, "eager cache fill failed");
                }
            }
        }

        Ok(banner)
    }

    /// Apply `patch` to a banner, producing the next version.
    pub async fn patch_banner(
        &self,
        banner_id: BannerId,
        patch: BannerPatch,
    ) -> BannerResult<Banner> {
        patch.validate()?;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let result = patch_in_tx(tx.as_mut(), banner_id, &patch, now).await;
        let (previous, next) = finish(tx, result, "patch_banner").await?;

        tracing::info!(
            banner_id = %banner_id,
            version = next.version,
            "banner patched"
        );

        self.invalidate(affected_keys(&previous, &next), "patch_banner")
            .await?;
        Ok(next)
    }

    /// Remove a banner with its tags and history.
    pub async fn delete_banner(&self, banner_id: BannerId) -> BannerResult<()> {
        let mut tx = self.store.begin().await?;
        let result = delete_in_tx(tx.as_mut(), banner_id).await;
        let removed = finish(tx, result, "delete_banner").await?;

        tracing::info!(banner_id = %banner_id, "banner deleted");

        self.invalidate(removed.bindings().into_iter().collect(), "delete_banner")
            .await
    }

    /// Restore the content, tags, feature and flag of a retained snapshot as
    /// a new version.
    pub async fn rollback(&self, banner_id: BannerId, version: Version) -> BannerResult<Banner> {
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let result = rollback_in_tx(tx.as_mut(), banner_id, version, now).await;
        let (previous, next) = finish(tx, result, "rollback").await?;

        tracing::info!(
            banner_id = %banner_id,
            restored = version,
            version = next.version,
            "banner rolled back"
        );

        self.invalidate(affected_keys(&previous, &next), "rollback")
            .await?;
        Ok(next)
    }

    /// Delete every key in `keys`, attempting all of them even after a
    /// failure. What a failure means depends on the invalidation policy.
    async fn invalidate(&self, keys: BTreeSet<Binding>, operation: &'static str) -> BannerResult<()> {
        let mut removed = 0u64;
        let mut failure = None;

        for key in &keys {
            match self.cache.delete_matching(CachePattern::exact(*key)).await {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::warn!(operation, %key, error = %e, "cache invalidation failed");
                    failure.get_or_insert(e);
                }
            }
        }

        tracing::debug!(operation, keys = keys.len(), removed, "cache invalidated");

        match (failure, self.config.invalidation_policy) {
            (None, _) => Ok(()),
            (Some(e), InvalidationPolicy::Strict) => {
                tracing::error!(operation, error = %e, "write committed but cache may be stale");
                Err(e.into())
            }
            (Some(_), InvalidationPolicy::BestEffort) => Ok(()),
        }
    }
}

// ============================================================================
// TRANSACTION BODIES
// ============================================================================

/// Commit on success, roll back on failure.
async fn finish<T>(
    tx: Box<dyn BannerTx>,
    result: BannerResult<T>,
    operation: &'static str,
) -> BannerResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(operation, error = %rollback_err, "rollback failed");
            }
            tracing::debug!(operation, error = %e, "transaction rolled back");
            Err(e)
        }
    }
}

async fn load(tx: &mut dyn BannerTx, banner_id: BannerId) -> BannerResult<Banner> {
    tx.banner_get(banner_id)
        .await?
        .ok_or(BannerError::BannerNotFound { banner_id })
}

async fn reject_conflicts(tx: &mut dyn BannerTx, check: &ConflictCheck) -> BannerResult<()> {
    let conflicts = tx.bindings_find(check).await?;
    if conflicts.is_empty() {
        return Ok(());
    }
    let conflicts: BTreeSet<Binding> = conflicts.into_iter().collect();
    Err(BannerError::BindingConflict {
        conflicts: conflicts.into_iter().collect(),
    })
}

async fn add_in_tx(tx: &mut dyn BannerTx, new: &NewBanner, now: Timestamp) -> BannerResult<Banner> {
    reject_conflicts(tx, &ConflictCheck::for_new(new)).await?;

    let banner_id = tx.banner_insert(new, now).await?;
    tx.tags_add(banner_id, &new.tag_ids).await?;
    load(tx, banner_id).await
}

/// Shared by patch and rollback. Returns the state before and after.
async fn apply_patch(
    tx: &mut dyn BannerTx,
    current: Banner,
    patch: &BannerPatch,
    now: Timestamp,
) -> BannerResult<(Banner, Banner)> {
    let banner_id = current.banner_id;

    if let Some(check) = ConflictScope::resolve(&current, patch).check_for(banner_id) {
        reject_conflicts(tx, &check).await?;
    }

    if patch.is_noop_for(&current) {
        return Err(BannerError::NothingToUpdate { banner_id });
    }

    let next = patch.apply_to(&current, now);
    if !tx.banner_update(&next, current.version).await? {
        return Err(BannerError::ConcurrentModification {
            banner_id,
            expected_version: current.version,
        });
    }

    let diff = TagDiff::between(&current.tag_ids, &next.tag_ids);
    if !diff.to_add.is_empty() {
        tx.tags_add(banner_id, &diff.to_add).await?;
    }
    if !diff.to_remove.is_empty() {
        tx.tags_remove(banner_id, &diff.to_remove).await?;
    }

    let snapshot = VersionSnapshot::capture(&current);
    tx.version_insert(&snapshot).await?;
    if let Some(stale) = prune_target(snapshot.version()) {
        tx.version_delete(banner_id, stale).await?;
    }

    Ok((current, next))
}

async fn patch_in_tx(
    tx: &mut dyn BannerTx,
    banner_id: BannerId,
    patch: &BannerPatch,
    now: Timestamp,
) -> BannerResult<(Banner, Banner)> {
    let current = load(tx, banner_id).await?;
    apply_patch(tx, current, patch, now).await
}

async fn rollback_in_tx(
    tx: &mut dyn BannerTx,
    banner_id: BannerId,
    version: Version,
    now: Timestamp,
) -> BannerResult<(Banner, Banner)> {
    let current = load(tx, banner_id).await?;
    let snapshot = tx
        .version_get(banner_id, version)
        .await?
        .ok_or(BannerError::VersionNotFound { banner_id, version })?;
    apply_patch(tx, current, &BannerPatch::restoring(&snapshot), now).await
}

async fn delete_in_tx(tx: &mut dyn BannerTx, banner_id: BannerId) -> BannerResult<Banner> {
    let banner = load(tx, banner_id).await?;
    tx.versions_clear(banner_id).await?;
    tx.tags_clear(banner_id).await?;
    tx.banner_delete(banner_id).await?;
    Ok(banner)
}

async fn read_versions(
    tx: &mut dyn BannerTx,
    banner_id: BannerId,
) -> BannerResult<(Banner, Vec<VersionSnapshot>)> {
    let current = load(tx, banner_id).await?;
    let snapshots = tx.version_list(banner_id).await?;
    Ok((current, snapshots))
}

// ============================================================================
// HELPERS
// ============================================================================

fn visible_to(banner: Banner, key: Binding, role: Role) -> BannerResult<Banner> {
    if banner.is_visible_to(role) {
        Ok(banner)
    } else {
        Err(BannerError::Hidden {
            tag_id: key.tag_id,
            feature_id: key.feature_id,
        })
    }
}

/// Every key that could hold either state: old and new tags under old and
/// new feature.
fn affected_keys(previous: &Banner, next: &Banner) -> BTreeSet<Binding> {
    let features = [previous.feature_id, next.feature_id];
    previous
        .tag_ids
        .union(&next.tag_ids)
        .flat_map(|tag_id| features.iter().map(move |f| Binding::new(*tag_id, *f)))
        .collect()
}
