//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts and can be shared by
//! every worker on one host.
//!
//! # Layout
//!
//! - Key: 16 bytes, `tag_id` then `feature_id`, both big-endian, so all
//!   features of one tag are adjacent.
//! - Value: 8-byte little-endian expiry (Unix millis) followed by the banner
//!   as JSON.
//!
//! Expired values read as a miss and are deleted on that read.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use banner_core::{Banner, Binding, CacheError, FeatureId, TagId};
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::traits::{BannerCache, CachePattern, CacheResult, CacheStats};

const KEY_LEN: usize = 16;
const EXPIRY_LEN: usize = 8;

fn encode_key(key: Binding) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    out[..8].copy_from_slice(&key.tag_id.get().to_be_bytes());
    out[8..].copy_from_slice(&key.feature_id.get().to_be_bytes());
    out
}

fn decode_key(bytes: &[u8]) -> Option<Binding> {
    let tag: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    let feature: [u8; 8] = bytes.get(8..KEY_LEN)?.try_into().ok()?;
    Some(Binding::new(
        TagId(i64::from_be_bytes(tag)),
        FeatureId(i64::from_be_bytes(feature)),
    ))
}

fn txn_error(e: heed::Error) -> CacheError {
    CacheError::TransactionFailed {
        reason: e.to_string(),
    }
}

/// LMDB-backed banner cache.
///
/// # Example
///
/// ```ignore
/// let cache = LmdbBannerCache::new("./data/banner-cache", 256)?;
/// cache.set(Binding::new(TagId(1), FeatureId(5)), &banner, Duration::from_secs(300)).await?;
/// ```
pub struct LmdbBannerCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    stats: RwLock<CacheStats>,
}

impl LmdbBannerCache {
    /// Open (or create) a cache under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the memory map in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> CacheResult<Self> {
        std::fs::create_dir_all(&path).map_err(|e| CacheError::Unavailable {
            reason: e.to_string(),
        })?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| CacheError::Unavailable {
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| CacheError::Unavailable {
                reason: e.to_string(),
            })?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    /// Remove `key` only if it still holds an expired value.
    fn evict_expired(&self, key: &[u8]) -> CacheResult<bool> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let still_expired = match self.db.get(&wtxn, key).map_err(txn_error)? {
            Some(bytes) => read_expiry(bytes).map_or(true, |expiry| expiry <= now),
            None => false,
        };
        let deleted = still_expired && self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    /// Keys matching `pattern`. Tag patterns use a prefix scan.
    fn collect_matching(&self, pattern: CachePattern) -> CacheResult<Vec<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let mut keys = Vec::new();

        match pattern.tag_id {
            Some(tag_id) => {
                let prefix = tag_id.get().to_be_bytes();
                let iter = self
                    .db
                    .prefix_iter(&rtxn, prefix.as_slice())
                    .map_err(txn_error)?;
                for (key, _) in iter.flatten() {
                    if decode_key(key).is_some_and(|k| pattern.matches(k)) {
                        keys.push(key.to_vec());
                    }
                }
            }
            None => {
                let iter = self.db.iter(&rtxn).map_err(txn_error)?;
                for (key, _) in iter.flatten() {
                    if decode_key(key).is_some_and(|k| pattern.matches(k)) {
                        keys.push(key.to_vec());
                    }
                }
            }
        }

        Ok(keys)
    }
}

fn read_expiry(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; EXPIRY_LEN] = bytes.get(..EXPIRY_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(raw))
}

#[async_trait]
impl BannerCache for LmdbBannerCache {
    async fn get(&self, key: Binding) -> CacheResult<Option<Banner>> {
        let encoded = encode_key(key);
        let now = Utc::now().timestamp_millis();

        let decoded = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            match self.db.get(&rtxn, encoded.as_slice()).map_err(txn_error)? {
                None => None,
                Some(bytes) => match read_expiry(bytes) {
                    Some(expiry) if expiry > now => Some(Some(
                        serde_json::from_slice::<Banner>(&bytes[EXPIRY_LEN..]).map_err(|e| {
                            CacheError::Deserialization {
                                reason: e.to_string(),
                            }
                        })?,
                    )),
                    _ => Some(None),
                },
            }
        };

        match decoded {
            Some(Some(banner)) => {
                self.record(|s| s.hits += 1);
                Ok(Some(banner))
            }
            Some(None) => {
                let evicted = self.evict_expired(encoded.as_slice())?;
                self.record(|s| {
                    s.misses += 1;
                    if evicted {
                        s.expirations += 1;
                    }
                });
                Ok(None)
            }
            None => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: Binding, banner: &Banner, ttl: Duration) -> CacheResult<()> {
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expiry = Utc::now().timestamp_millis().saturating_add(ttl_millis);
        let json = serde_json::to_vec(banner).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

        let mut value = Vec::with_capacity(EXPIRY_LEN + json.len());
        value.extend_from_slice(&expiry.to_le_bytes());
        value.extend_from_slice(&json);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, encode_key(key).as_slice(), &value)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn delete_matching(&self, pattern: CachePattern) -> CacheResult<u64> {
        let keys = match pattern.as_exact() {
            Some(key) => vec![encode_key(key).to_vec()],
            None => self.collect_matching(pattern)?,
        };
        if keys.is_empty() {
            return Ok(0);
        }

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for key in &keys {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        let entry_count = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            self.db.len(&rtxn).map_err(txn_error)?
        };
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = entry_count;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banner_core::{BannerContent, BannerId};
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbBannerCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbBannerCache::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    fn make_banner(title: &str) -> Banner {
        let now = Utc::now();
        Banner {
            banner_id: BannerId(7),
            tag_ids: [TagId(1), TagId(2)].into_iter().collect(),
            feature_id: FeatureId(3),
            content: BannerContent::new(title, "text", "https://example.com"),
            is_active: false,
            created_at: now,
            updated_at: now,
            version: 2,
        }
    }

    fn key(tag: i64, feature: i64) -> Binding {
        Binding::new(TagId(tag), FeatureId(feature))
    }

    #[test]
    fn test_key_layout() {
        let encoded = encode_key(key(1, 258));
        assert_eq!(&encoded[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&encoded[8..], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(decode_key(&encoded), Some(key(1, 258)));
        assert_eq!(decode_key(&encoded[..10]), None);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (backend, _temp_dir) = create_test_backend();
        let banner = make_banner("hello");

        let miss = backend.get(key(1, 3)).await.expect("get should succeed");
        assert!(miss.is_none());

        backend
            .set(key(1, 3), &banner, Duration::from_secs(60))
            .await
            .expect("set should succeed");
        let cached = backend.get(key(1, 3)).await.expect("get should succeed");
        assert_eq!(cached, Some(banner));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let (backend, _temp_dir) = create_test_backend();
        backend
            .set(key(1, 3), &make_banner("old"), Duration::ZERO)
            .await
            .expect("set should succeed");

        let cached = backend.get(key(1, 3)).await.expect("get should succeed");
        assert!(cached.is_none());

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entry_count, 0);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (backend, _temp_dir) = create_test_backend();
        let ttl = Duration::from_secs(60);
        backend
            .set(key(1, 3), &make_banner("first"), ttl)
            .await
            .expect("set should succeed");
        backend
            .set(key(1, 3), &make_banner("second"), ttl)
            .await
            .expect("set should succeed");

        let cached = backend
            .get(key(1, 3))
            .await
            .expect("get should succeed")
            .expect("entry should exist");
        assert_eq!(cached.content.title, "second");
    }

    #[tokio::test]
    async fn test_delete_matching() {
        let (backend, _temp_dir) = create_test_backend();
        let ttl = Duration::from_secs(60);
        let banner = make_banner("b");
        for (tag, feature) in [(1, 3), (1, 4), (2, 3), (10, 3)] {
            backend
                .set(key(tag, feature), &banner, ttl)
                .await
                .expect("set should succeed");
        }

        let deleted = backend
            .delete_matching(CachePattern::tag(TagId(1)))
            .await
            .expect("delete should succeed");
        assert_eq!(deleted, 2);

        let deleted = backend
            .delete_matching(CachePattern::feature(FeatureId(3)))
            .await
            .expect("delete should succeed");
        assert_eq!(deleted, 2);

        let deleted = backend
            .delete_matching(CachePattern::exact(key(1, 3)))
            .await
            .expect("delete should succeed");
        assert_eq!(deleted, 0);

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.entry_count, 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let (backend, _temp_dir) = create_test_backend();
        let _ = backend.get(key(5, 5)).await;
        backend
            .set(key(5, 5), &make_banner("s"), Duration::from_secs(60))
            .await
            .expect("set should succeed");
        let _ = backend.get(key(5, 5)).await;
        let _ = backend.get(key(5, 5)).await;

        let stats = backend.stats().await.expect("stats should succeed");
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entry_count, 1);
    }
}
