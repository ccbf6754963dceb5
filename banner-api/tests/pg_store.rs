//! PostgreSQL store tests.
//!
//! Need a reachable database configured through the `BANNER_DB_*` variables:
//!   cargo test -p banner-api --features db-tests --test pg_store

#![cfg(feature = "db-tests")]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use banner_api::{run_migrations, DbConfig, PgBannerStore};
use banner_core::{BannerError, BannerFilter, BannerPatch, FeatureId, Role, ServiceConfig};
use banner_storage::{BannerService, BannerStore, InMemoryBannerCache};
use banner_test_utils::fixtures::{active_banner, inactive_banner, key};

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Feature ids unique to this run, so reruns against the same database do
/// not collide with leftovers.
fn fresh_feature() -> i64 {
    static NEXT: AtomicI64 = AtomicI64::new(0);
    let base = (std::process::id() as i64) * 1_000;
    base + NEXT.fetch_add(1, Ordering::SeqCst)
}

async fn pg_service() -> Result<(BannerService, PgBannerStore), Box<dyn std::error::Error>> {
    let store = PgBannerStore::from_config(&DbConfig::from_env())?;
    run_migrations(store.pool()).await?;
    let service = BannerService::new(
        Arc::new(store.clone()),
        Arc::new(InMemoryBannerCache::new()),
        ServiceConfig::new(),
    );
    Ok((service, store))
}

#[tokio::test]
async fn test_migrations_are_idempotent() -> TestResult {
    let (_, store) = pg_service().await?;
    run_migrations(store.pool()).await?;
    Ok(())
}

#[tokio::test]
async fn test_create_read_and_delete() -> TestResult {
    let (service, store) = pg_service().await?;
    let feature = fresh_feature();

    let banner = service.add_banner(active_banner(&[1, 2], feature)).await?;
    assert_eq!(banner.version, 1);

    let found = store.banner_by_key(key(2, feature)).await?;
    assert_eq!(found.map(|b| b.banner_id), Some(banner.banner_id));

    let listed = store
        .banner_list(&BannerFilter {
            feature_id: Some(FeatureId(feature)),
            ..Default::default()
        })
        .await?;
    let ids: Vec<_> = listed.iter().map(|b| b.banner_id).collect();
    assert_eq!(ids, vec![banner.banner_id]);

    service.delete_banner(banner.banner_id).await?;
    assert!(store.banner_by_key(key(1, feature)).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_conflicts_are_rejected() -> TestResult {
    let (service, _) = pg_service().await?;
    let feature = fresh_feature();

    let first = service.add_banner(active_banner(&[1, 2], feature)).await?;
    let err = service
        .add_banner(active_banner(&[2, 3], feature))
        .await
        .err();
    assert!(matches!(err, Some(BannerError::BindingConflict { .. })));

    service.delete_banner(first.banner_id).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_for_same_binding_admit_one() -> TestResult {
    let (service, _) = pg_service().await?;
    let feature = fresh_feature();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let service = service.clone();
        tasks.spawn(async move { service.add_banner(active_banner(&[1, 2], feature)).await });
    }

    let mut created = Vec::new();
    let mut conflicts = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(banner) => created.push(banner.banner_id),
            Err(BannerError::BindingConflict { .. }) => conflicts += 1,
            Err(other) => return Err(other.into()),
        }
    }
    assert_eq!(created.len(), 1, "exactly one add may win");
    assert_eq!(conflicts, 15);

    let found = service.get_banner(key(1, feature), true, Role::Admin).await?;
    assert_eq!(found.banner_id, created[0]);

    service.delete_banner(created[0]).await?;
    Ok(())
}

#[tokio::test]
async fn test_history_is_pruned_and_rollback_works() -> TestResult {
    let (service, _) = pg_service().await?;
    let feature = fresh_feature();
    let banner = service.add_banner(inactive_banner(&[1], feature)).await?;

    for n in 2..=6 {
        let patch = BannerPatch {
            title: Some(format!("v{n}")),
            ..Default::default()
        };
        service.patch_banner(banner.banner_id, patch).await?;
    }

    let versions = service.view_versions(banner.banner_id).await?;
    let numbers: Vec<i64> = versions.iter().map(|b| b.version).collect();
    assert_eq!(numbers, vec![6, 5, 4, 3]);

    let restored = service.rollback(banner.banner_id, 3).await?;
    assert_eq!(restored.version, 7);
    assert_eq!(restored.content.title, "v3");

    let err = service.rollback(banner.banner_id, 1).await.err();
    assert!(matches!(err, Some(BannerError::VersionNotFound { .. })));

    let hidden = service.get_banner(key(1, feature), true, Role::User).await.err();
    assert!(matches!(hidden, Some(BannerError::Hidden { .. })));

    service.delete_banner(banner.banner_id).await?;
    Ok(())
}
