//! Durable store abstraction.
//!
//! The store is split in two: [`BannerStore`] serves reads that need no
//! transaction and hands out [`BannerTx`] handles. Every mutating flow runs
//! entirely inside one `BannerTx` and ends with exactly one call to
//! [`BannerTx::commit`] or [`BannerTx::rollback`].

use std::collections::BTreeSet;

use ::async_trait::async_trait;
use banner_core::{
    Banner, BannerFilter, BannerId, BannerResult, Binding, ConflictCheck, NewBanner, TagId,
    Timestamp, Version, VersionSnapshot,
};

/// Entry point to the durable record of truth.
#[async_trait]
pub trait BannerStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> BannerResult<Box<dyn BannerTx>>;

    /// The banner bound to `key`, with its full tag set.
    async fn banner_by_key(&self, key: Binding) -> BannerResult<Option<Banner>>;

    /// Banners matching `filter`, ordered by banner id.
    async fn banner_list(&self, filter: &BannerFilter) -> BannerResult<Vec<Banner>>;
}

/// A single transaction against the durable store.
///
/// Dropping a transaction without finishing it discards its writes.
#[async_trait]
pub trait BannerTx: Send {
    // ========================================================================
    // BANNER ROWS
    // ========================================================================

    /// Load a banner with its tags, locking the row until the transaction ends.
    async fn banner_get(&mut self, banner_id: BannerId) -> BannerResult<Option<Banner>>;

    /// Insert a banner row at version 1 and return its new id. Tag
    /// associations are written separately with [`BannerTx::tags_add`].
    async fn banner_insert(&mut self, new: &NewBanner, now: Timestamp) -> BannerResult<BannerId>;

    /// Overwrite the row columns of `next.banner_id` if its stored version is
    /// still `expected_version`. Returns false when the version moved on.
    ///
    /// Tag associations are not touched.
    async fn banner_update(&mut self, next: &Banner, expected_version: Version)
        -> BannerResult<bool>;

    async fn banner_delete(&mut self, banner_id: BannerId) -> BannerResult<bool>;

    // ========================================================================
    // TAG ASSOCIATIONS
    // ========================================================================

    /// Bindings from `check` that some banner other than `check.exclude`
    /// already holds.
    async fn bindings_find(&mut self, check: &ConflictCheck) -> BannerResult<Vec<Binding>>;

    async fn tags_add(&mut self, banner_id: BannerId, tag_ids: &BTreeSet<TagId>)
        -> BannerResult<()>;

    async fn tags_remove(
        &mut self,
        banner_id: BannerId,
        tag_ids: &BTreeSet<TagId>,
    ) -> BannerResult<()>;

    /// Remove every tag association of a banner.
    async fn tags_clear(&mut self, banner_id: BannerId) -> BannerResult<u64>;

    // ========================================================================
    // VERSION HISTORY
    // ========================================================================

    async fn version_insert(&mut self, snapshot: &VersionSnapshot) -> BannerResult<()>;

    async fn version_get(
        &mut self,
        banner_id: BannerId,
        version: Version,
    ) -> BannerResult<Option<VersionSnapshot>>;

    /// All retained snapshots of a banner, newest first.
    async fn version_list(&mut self, banner_id: BannerId) -> BannerResult<Vec<VersionSnapshot>>;

    async fn version_delete(&mut self, banner_id: BannerId, version: Version)
        -> BannerResult<bool>;

    async fn versions_clear(&mut self, banner_id: BannerId) -> BannerResult<u64>;

    // ========================================================================
    // COMPLETION
    // ========================================================================

    async fn commit(self: Box<Self>) -> BannerResult<()>;

    async fn rollback(self: Box<Self>) -> BannerResult<()>;
}
