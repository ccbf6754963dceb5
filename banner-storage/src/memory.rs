//! In-memory durable store.
//!
//! Transactions take the store-wide lock for their whole lifetime and work on
//! a private copy of the state; commit swaps the copy in. Reads outside a
//! transaction wait for any open transaction to finish.
//!
//! All work is therefore serialized behind one lock, which suits tests and
//! single-instance deployments. The PostgreSQL store runs transactions
//! concurrently and its reads never wait on writers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ::async_trait::async_trait;
use banner_core::{
    Banner, BannerFilter, BannerId, BannerResult, Binding, ConflictCheck, NewBanner, TagId,
    Timestamp, Version, VersionSnapshot, INITIAL_VERSION,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{BannerStore, BannerTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_id: i64,
    banners: BTreeMap<BannerId, Banner>,
    versions: BTreeMap<(BannerId, Version), VersionSnapshot>,
}

impl MemoryState {
    fn banner_for_key(&self, key: Binding) -> Option<&Banner> {
        self.banners
            .values()
            .find(|b| b.feature_id == key.feature_id && b.tag_ids.contains(&key.tag_id))
    }
}

/// Durable store kept entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBannerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBannerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of banners currently stored.
    pub async fn banner_count(&self) -> usize {
        self.state.lock().await.banners.len()
    }

    /// Number of snapshots stored for a banner.
    pub async fn snapshot_count(&self, banner_id: BannerId) -> usize {
        self.state
            .lock()
            .await
            .versions
            .keys()
            .filter(|(id, _)| *id == banner_id)
            .count()
    }
}

#[async_trait]
impl BannerStore for MemoryBannerStore {
    async fn begin(&self) -> BannerResult<Box<dyn BannerTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn banner_by_key(&self, key: Binding) -> BannerResult<Option<Banner>> {
        let state = self.state.lock().await;
        Ok(state.banner_for_key(key).cloned())
    }

    async fn banner_list(&self, filter: &BannerFilter) -> BannerResult<Vec<Banner>> {
        let state = self.state.lock().await;
        let offset = usize::try_from(filter.offset).unwrap_or(usize::MAX);
        let limit = filter
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(state
            .banners
            .values()
            .filter(|b| filter.matches(b))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Open transaction on a [`MemoryBannerStore`].
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl BannerTx for MemoryTx {
    async fn banner_get(&mut self, banner_id: BannerId) -> BannerResult<Option<Banner>> {
        Ok(self.work.banners.get(&banner_id).cloned())
    }

    async fn banner_insert(&mut self, new: &NewBanner, now: Timestamp) -> BannerResult<BannerId> {
        self.work.last_id += 1;
        let banner_id = BannerId(self.work.last_id);
        self.work.banners.insert(
            banner_id,
            Banner {
                banner_id,
                tag_ids: BTreeSet::new(),
                feature_id: new.feature_id,
                content: new.content.clone(),
                is_active: new.is_active,
                created_at: now,
                updated_at: now,
                version: INITIAL_VERSION,
            },
        );
        Ok(banner_id)
    }

    async fn banner_update(
        &mut self,
        next: &Banner,
        expected_version: Version,
    ) -> BannerResult<bool> {
        match self.work.banners.get_mut(&next.banner_id) {
            Some(stored) if stored.version == expected_version => {
                let tag_ids = std::mem::take(&mut stored.tag_ids);
                *stored = Banner {
                    tag_ids,
                    ..next.clone()
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn banner_delete(&mut self, banner_id: BannerId) -> BannerResult<bool> {
        Ok(self.work.banners.remove(&banner_id).is_some())
    }

    async fn bindings_find(&mut self, check: &ConflictCheck) -> BannerResult<Vec<Binding>> {
        let taken: BTreeSet<Binding> = self
            .work
            .banners
            .values()
            .filter(|b| Some(b.banner_id) != check.exclude && b.feature_id == check.feature_id)
            .flat_map(|b| b.tag_ids.intersection(&check.tag_ids).copied())
            .map(|tag_id| Binding::new(tag_id, check.feature_id))
            .collect();
        Ok(taken.into_iter().collect())
    }

    async fn tags_add(
        &mut self,
        banner_id: BannerId,
        tag_ids: &BTreeSet<TagId>,
    ) -> BannerResult<()> {
        if let Some(banner) = self.work.banners.get_mut(&banner_id) {
            banner.tag_ids.extend(tag_ids.iter().copied());
        }
        Ok(())
    }

    async fn tags_remove(
        &mut self,
        banner_id: BannerId,
        tag_ids: &BTreeSet<TagId>,
    ) -> BannerResult<()> {
        if let Some(banner) = self.work.banners.get_mut(&banner_id) {
            banner.tag_ids.retain(|t| !tag_ids.contains(t));
        }
        Ok(())
    }

    async fn tags_clear(&mut self, banner_id: BannerId) -> BannerResult<u64> {
        Ok(self
            .work
            .banners
            .get_mut(&banner_id)
            .map(|banner| std::mem::take(&mut banner.tag_ids).len() as u64)
            .unwrap_or(0))
    }

    async fn version_insert(&mut self, snapshot: &VersionSnapshot) -> BannerResult<()> {
        self.work
            .versions
            .insert((snapshot.banner_id(), snapshot.version()), snapshot.clone());
        Ok(())
    }

    async fn version_get(
        &mut self,
        banner_id: BannerId,
        version: Version,
    ) -> BannerResult<Option<VersionSnapshot>> {
        Ok(self.work.versions.get(&(banner_id, version)).cloned())
    }

    async fn version_list(&mut self, banner_id: BannerId) -> BannerResult<Vec<VersionSnapshot>> {
        Ok(self
            .work
            .versions
            .range((banner_id, Version::MIN)..=(banner_id, Version::MAX))
            .rev()
            .map(|(_, snapshot)| snapshot.clone())
            .collect())
    }

    async fn version_delete(
        &mut self,
        banner_id: BannerId,
        version: Version,
    ) -> BannerResult<bool> {
        Ok(self.work.versions.remove(&(banner_id, version)).is_some())
    }

    async fn versions_clear(&mut self, banner_id: BannerId) -> BannerResult<u64> {
        let before = self.work.versions.len();
        self.work.versions.retain(|(id, _), _| *id != banner_id);
        Ok((before - self.work.versions.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> BannerResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> BannerResult<()> {
        Ok(())
    }
}
