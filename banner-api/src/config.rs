//! API Configuration Module
//!
//! Settings for CORS, role tokens, backend selection, cache policy and error
//! verbosity. Configuration is loaded from environment variables with
//! defaults suitable for local development.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use banner_core::{CachePopulation, InvalidationPolicy, ServiceConfig};
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ApiError, ApiResult, ErrorVerbosity};

// ============================================================================
// BACKEND SELECTION
// ============================================================================

/// Which durable store the server runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(ApiError::invalid_input(format!(
                "Unknown store backend '{}', expected postgres or memory",
                other
            ))),
        }
    }
}

/// Which cache store the server runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheBackend {
    #[default]
    Lmdb,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lmdb" => Ok(Self::Lmdb),
            "memory" => Ok(Self::Memory),
            other => Err(ApiError::invalid_input(format!(
                "Unknown cache backend '{}', expected lmdb or memory",
                other
            ))),
        }
    }
}

// ============================================================================
// ROLE TOKENS
// ============================================================================

/// Tokens accepted in the `token` header, per role.
///
/// Tokens are kept secret so they never end up in logs or debug output.
#[derive(Debug, Clone)]
pub struct RoleTokens {
    user: Vec<SecretString>,
    admin: Vec<SecretString>,
}

impl Default for RoleTokens {
    fn default() -> Self {
        Self::new(["user_token"], ["admin_token"])
    }
}

impl RoleTokens {
    pub fn new<U, A>(user: U, admin: A) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            user: user.into_iter().map(|t| SecretString::from(t.into())).collect(),
            admin: admin.into_iter().map(|t| SecretString::from(t.into())).collect(),
        }
    }

    pub fn is_user(&self, token: &str) -> bool {
        contains(&self.user, token)
    }

    pub fn is_admin(&self, token: &str) -> bool {
        contains(&self.admin, token)
    }
}

fn contains(tokens: &[SecretString], token: &str) -> bool {
    tokens.iter().any(|t| t.expose_secret() == token)
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    pub tokens: RoleTokens,

    pub store_backend: StoreBackend,
    pub cache_backend: CacheBackend,

    /// LMDB environment directory.
    pub cache_path: PathBuf,
    pub cache_max_size_mb: usize,
    pub cache_ttl: Duration,

    pub invalidation_policy: InvalidationPolicy,
    pub cache_population: CachePopulation,
    pub error_verbosity: ErrorVerbosity,

    /// Limit applied to banner listings that do not ask for one. 0 = unlimited.
    pub default_page_limit: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            tokens: RoleTokens::default(),
            store_backend: StoreBackend::default(),
            cache_backend: CacheBackend::default(),
            cache_path: PathBuf::from("./data/banner-cache"),
            cache_max_size_mb: 256,
            cache_ttl: Duration::from_secs(300),
            invalidation_policy: InvalidationPolicy::default(),
            cache_population: CachePopulation::default(),
            error_verbosity: ErrorVerbosity::default(),
            default_page_limit: 0,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `BANNER_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `BANNER_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `BANNER_USER_TOKENS` / `BANNER_ADMIN_TOKENS`: Comma-separated role tokens
    /// - `BANNER_STORE_BACKEND`: postgres | memory (default: postgres)
    /// - `BANNER_CACHE_BACKEND`: lmdb | memory (default: lmdb)
    /// - `BANNER_CACHE_PATH`: LMDB directory (default: ./data/banner-cache)
    /// - `BANNER_CACHE_MAX_SIZE_MB`: LMDB map size (default: 256)
    /// - `BANNER_CACHE_TTL_SECS`: Cache entry TTL (default: 300)
    /// - `BANNER_INVALIDATION_POLICY`: strict | best_effort (default: strict)
    /// - `BANNER_CACHE_POPULATION`: lazy | eager (default: lazy)
    /// - `BANNER_ERROR_VERBOSITY`: terse | verbose (default: terse)
    /// - `BANNER_DEFAULT_PAGE_LIMIT`: Listing limit when none is given (default: 0)
    ///
    /// Numeric values that fail to parse fall back to their default. Unknown
    /// names for backends and policies are rejected.
    pub fn from_env() -> ApiResult<Self> {
        let defaults = Self::default();

        let tokens = RoleTokens::new(
            env_list("BANNER_USER_TOKENS").unwrap_or_else(|| vec!["user_token".to_string()]),
            env_list("BANNER_ADMIN_TOKENS").unwrap_or_else(|| vec!["admin_token".to_string()]),
        );

        Ok(Self {
            cors_origins: env_list("BANNER_CORS_ORIGINS").unwrap_or_default(),
            cors_max_age_secs: env_parse("BANNER_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            tokens,
            store_backend: env_choice::<StoreBackend>("BANNER_STORE_BACKEND")?.unwrap_or_default(),
            cache_backend: env_choice::<CacheBackend>("BANNER_CACHE_BACKEND")?.unwrap_or_default(),
            cache_path: std::env::var("BANNER_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            cache_max_size_mb: env_parse("BANNER_CACHE_MAX_SIZE_MB")
                .unwrap_or(defaults.cache_max_size_mb),
            cache_ttl: env_parse("BANNER_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            invalidation_policy: env_choice::<InvalidationPolicy>("BANNER_INVALIDATION_POLICY")
                .map_err(ApiError::from)?
                .unwrap_or_default(),
            cache_population: env_choice::<CachePopulation>("BANNER_CACHE_POPULATION")
                .map_err(ApiError::from)?
                .unwrap_or_default(),
            error_verbosity: env_choice::<ErrorVerbosity>("BANNER_ERROR_VERBOSITY")?.unwrap_or_default(),
            default_page_limit: env_parse("BANNER_DEFAULT_PAGE_LIMIT")
                .unwrap_or(defaults.default_page_limit),
        })
    }

    /// Policy settings handed to the banner service.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::new()
            .with_ttl(self.cache_ttl)
            .with_invalidation_policy(self.invalidation_policy)
            .with_cache_population(self.cache_population)
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|s| {
        s.split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    })
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_choice<T: FromStr>(key: &str) -> Result<Option<T>, T::Err> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.parse().map(Some),
        _ => Ok(None),
    }
}
