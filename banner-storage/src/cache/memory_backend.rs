//! In-process cache backend on a concurrent hash map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use banner_core::{Banner, Binding};
use dashmap::DashMap;

use super::traits::{BannerCache, CachePattern, CacheResult, CacheStats};

#[derive(Debug, Clone)]
struct Entry {
    banner: Banner,
    expires_at: Instant,
}

/// Cache held in process memory. Entries do not survive a restart and are
/// not shared between instances.
#[derive(Debug, Default)]
pub struct InMemoryBannerCache {
    entries: DashMap<Binding, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl InMemoryBannerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl BannerCache for InMemoryBannerCache {
    async fn get(&self, key: Binding) -> CacheResult<Option<Banner>> {
        let now = Instant::now();
        let found = self.entries.get(&key).map(|entry| {
            if entry.expires_at > now {
                Some(entry.banner.clone())
            } else {
                None
            }
        });

        match found {
            Some(Some(banner)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(banner))
            }
            Some(None) => {
                // Guard re-checks expiry so a concurrent refresh is not lost.
                if self
                    .entries
                    .remove_if(&key, |_, entry| entry.expires_at <= now)
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: Binding, banner: &Banner, ttl: Duration) -> CacheResult<()> {
        self.entries.insert(
            key,
            Entry {
                banner: banner.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete_matching(&self, pattern: CachePattern) -> CacheResult<u64> {
        if let Some(key) = pattern.as_exact() {
            return Ok(u64::from(self.entries.remove(&key).is_some()));
        }
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.matches(*key));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}
