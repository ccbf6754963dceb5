//! Service policy configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::BannerError;

/// What to do when cache invalidation fails after a committed write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Surface the failure as an internal error.
    #[default]
    Strict,
    /// Log the failure and report success; staleness is bounded by the TTL.
    BestEffort,
}

/// When cache entries for a new banner are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePopulation {
    /// On the first read miss.
    #[default]
    Lazy,
    /// Right after the banner is committed.
    Eager,
}

impl FromStr for InvalidationPolicy {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            other => Err(BannerError::invalid_input(
                "invalidation_policy",
                format!("unknown policy '{}'", other),
            )),
        }
    }
}

impl FromStr for CachePopulation {
    type Err = BannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lazy" => Ok(Self::Lazy),
            "eager" => Ok(Self::Eager),
            other => Err(BannerError::invalid_input(
                "cache_population",
                format!("unknown population mode '{}'", other),
            )),
        }
    }
}

impl fmt::Display for InvalidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::BestEffort => write!(f, "best_effort"),
        }
    }
}

/// Policy knobs for the banner service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// TTL for cache entries.
    pub cache_ttl: Duration,
    pub invalidation_policy: InvalidationPolicy,
    pub cache_population: CachePopulation,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            invalidation_policy: InvalidationPolicy::Strict,
            cache_population: CachePopulation::Lazy,
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_invalidation_policy(mut self, policy: InvalidationPolicy) -> Self {
        self.invalidation_policy = policy;
        self
    }

    pub fn with_cache_population(mut self, population: CachePopulation) -> Self {
        self.cache_population = population;
        self
    }
}
