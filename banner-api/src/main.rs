//! Banner API Server Entry Point
//!
//! Reads configuration from the environment, wires the configured store and
//! cache into a [`BannerService`] and serves the Axum router.

use std::net::SocketAddr;
use std::sync::Arc;

use banner_api::telemetry::init_tracing;
use banner_api::{
    create_api_router, run_migrations, ApiConfig, ApiError, ApiResult, AppState, CacheBackend,
    DbConfig, PgBannerStore, StoreBackend,
};
use banner_storage::{
    BannerCache, BannerService, BannerStore, InMemoryBannerCache, LmdbBannerCache,
    MemoryBannerStore,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let config = ApiConfig::from_env()?;
    let store = build_store(config.store_backend).await?;
    let cache = build_cache(&config)?;

    let service = BannerService::new(store, cache, config.service_config());
    let app = create_api_router(AppState::new(service, &config), &config);

    let addr = resolve_bind_addr()?;
    tracing::info!(
        %addr,
        store = ?config.store_backend,
        cache = ?config.cache_backend,
        "Starting banner API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

async fn build_store(backend: StoreBackend) -> ApiResult<Arc<dyn BannerStore>> {
    match backend {
        StoreBackend::Postgres => {
            let store = PgBannerStore::from_config(&DbConfig::from_env())?;
            run_migrations(store.pool()).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryBannerStore::new()))
        }
    }
}

fn build_cache(config: &ApiConfig) -> ApiResult<Arc<dyn BannerCache>> {
    match config.cache_backend {
        CacheBackend::Lmdb => {
            let cache = LmdbBannerCache::new(&config.cache_path, config.cache_max_size_mb)
                .map_err(|e| ApiError::internal_error(format!("Failed to open cache: {}", e)))?;
            Ok(Arc::new(cache))
        }
        CacheBackend::Memory => Ok(Arc::new(InMemoryBannerCache::new())),
    }
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("BANNER_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("BANNER_API_PORT").ok())
        .unwrap_or_else(|| "8080".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
