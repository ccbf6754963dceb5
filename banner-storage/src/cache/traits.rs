//! Cache backend trait, key patterns and statistics.

use std::time::Duration;

use async_trait::async_trait;
use banner_core::{Banner, Binding, CacheError, FeatureId, TagId};

pub type CacheResult<T> = Result<T, CacheError>;

/// Selects cache keys for deletion. `None` matches any value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CachePattern {
    pub tag_id: Option<TagId>,
    pub feature_id: Option<FeatureId>,
}

impl CachePattern {
    /// Exactly one key.
    pub fn exact(key: Binding) -> Self {
        Self {
            tag_id: Some(key.tag_id),
            feature_id: Some(key.feature_id),
        }
    }

    /// Every feature under one tag.
    pub fn tag(tag_id: TagId) -> Self {
        Self {
            tag_id: Some(tag_id),
            feature_id: None,
        }
    }

    /// Every tag under one feature.
    pub fn feature(feature_id: FeatureId) -> Self {
        Self {
            tag_id: None,
            feature_id: Some(feature_id),
        }
    }

    /// Every key.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, key: Binding) -> bool {
        self.tag_id.map_or(true, |t| t == key.tag_id)
            && self.feature_id.map_or(true, |f| f == key.feature_id)
    }

    /// The single key this pattern selects, if it is exact.
    pub fn as_exact(&self) -> Option<Binding> {
        match (self.tag_id, self.feature_id) {
            (Some(tag_id), Some(feature_id)) => Some(Binding::new(tag_id, feature_id)),
            _ => None,
        }
    }
}

/// Key/value cache addressed by (tag, feature) with per-entry TTL.
///
/// Expired entries read as a miss. Implementations must be safe to share
/// between tasks.
#[async_trait]
pub trait BannerCache: Send + Sync {
    /// Cached banner for `key`, or `None` on a miss.
    async fn get(&self, key: Binding) -> CacheResult<Option<Banner>>;

    /// Store `banner` under `key` for `ttl`.
    async fn set(&self, key: Binding, banner: &Banner, ttl: Duration) -> CacheResult<()>;

    /// Delete all entries matching `pattern`, returning how many were removed.
    async fn delete_matching(&self, pattern: CachePattern) -> CacheResult<u64>;

    async fn stats(&self) -> CacheResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped because their TTL ran out.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_pattern_matching() {
        let key = Binding::new(TagId(1), FeatureId(2));
        assert!(CachePattern::exact(key).matches(key));
        assert!(CachePattern::tag(TagId(1)).matches(key));
        assert!(!CachePattern::tag(TagId(3)).matches(key));
        assert!(CachePattern::feature(FeatureId(2)).matches(key));
        assert!(CachePattern::all().matches(key));
        assert_eq!(CachePattern::exact(key).as_exact(), Some(key));
        assert_eq!(CachePattern::tag(TagId(1)).as_exact(), None);
    }
}
