//! Database Connection Pool and PostgreSQL Store
//!
//! This module provides PostgreSQL connection pooling using deadpool-postgres
//! and [`PgBannerStore`], the durable banner store.
//!
//! A transaction owns one pooled connection from `BEGIN` until `COMMIT` or
//! `ROLLBACK`. If a [`PgTx`] is dropped before either, its connection is
//! detached from the pool and closed, so the server aborts the transaction
//! instead of handing a half-finished session to the next request.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use banner_core::{
    Banner, BannerContent, BannerError, BannerFilter, BannerId, BannerResult, Binding,
    ConflictCheck, FeatureId, NewBanner, StorageError, TagId, Timestamp, Version,
    VersionSnapshot,
};
use banner_storage::{BannerStore, BannerTx};
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolError, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

/// Schema migration applied at startup.
const SCHEMA_SQL: &str = include_str!("../migrations/001_banner_schema.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create/recycle timeout for pooled connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "banners".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("BANNER_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("BANNER_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("BANNER_DB_NAME").unwrap_or_else(|_| "banners".to_string()),
            user: std::env::var("BANNER_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("BANNER_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("BANNER_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("BANNER_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        pool_cfg.timeouts.recycle = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

/// Apply the embedded schema. Every statement is idempotent.
pub async fn run_migrations(pool: &Pool) -> ApiResult<()> {
    let conn = pool.get().await.map_err(pool_error)?;
    conn.batch_execute(SCHEMA_SQL)
        .await
        .map_err(|e| ApiError::database_error(format!("Migration failed: {}", e)))?;
    tracing::info!("database schema up to date");
    Ok(())
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

fn query_error(err: tokio_postgres::Error) -> BannerError {
    tracing::error!("Database error: {:?}", err);
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
    .into()
}

fn pool_error(err: PoolError) -> BannerError {
    tracing::error!("Connection pool error: {:?}", err);
    let reason = match err {
        PoolError::Timeout(_) => "connection pool exhausted".to_string(),
        PoolError::Closed => "connection pool is closed".to_string(),
        other => other.to_string(),
    };
    StorageError::PoolFailed { reason }.into()
}

fn decode<'a, T>(row: &'a Row, column: &str) -> BannerResult<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(column).map_err(|e| {
        StorageError::DecodeFailed {
            column: column.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

// ============================================================================
// ROW MAPPING
// ============================================================================

/// Columns selected for a live banner, with its tag set aggregated in.
const BANNER_COLUMNS: &str = "b.banner_id, b.title, b.text, b.url, b.feature_id, b.is_active, \
     b.created_at, b.updated_at, b.version, \
     ARRAY(SELECT t.tag_id FROM banner_schema.banners_x_tags t \
           WHERE t.banner_id = b.banner_id ORDER BY t.tag_id) AS tag_ids";

const VERSION_COLUMNS: &str = "banner_id, version, title, text, url, feature_id, tag_ids, \
     is_active, created_at, updated_at";

/// Banner row shape shared by the live and version tables.
fn banner_from_row(row: &Row) -> BannerResult<Banner> {
    let tag_ids: Vec<i64> = decode(row, "tag_ids")?;
    Ok(Banner {
        banner_id: BannerId(decode(row, "banner_id")?),
        tag_ids: tag_ids.into_iter().map(TagId).collect(),
        feature_id: FeatureId(decode(row, "feature_id")?),
        content: BannerContent {
            title: decode(row, "title")?,
            text: decode(row, "text")?,
            url: decode(row, "url")?,
        },
        is_active: decode(row, "is_active")?,
        created_at: decode(row, "created_at")?,
        updated_at: decode(row, "updated_at")?,
        version: decode(row, "version")?,
    })
}

fn tag_array(tag_ids: &BTreeSet<TagId>) -> Vec<i64> {
    tag_ids.iter().map(|t| t.get()).collect()
}

fn page_param(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ============================================================================
// STORE
// ============================================================================

/// Durable banner store on PostgreSQL.
#[derive(Clone)]
pub struct PgBannerStore {
    pool: Pool,
}

impl PgBannerStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn get_conn(&self) -> BannerResult<Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl BannerStore for PgBannerStore {
    async fn begin(&self) -> BannerResult<Box<dyn BannerTx>> {
        let conn = self.get_conn().await?;
        conn.batch_execute("BEGIN").await.map_err(|e| {
            BannerError::from(StorageError::TransactionFailed {
                reason: e.to_string(),
            })
        })?;
        Ok(Box::new(PgTx { conn: Some(conn) }))
    }

    async fn banner_by_key(&self, key: Binding) -> BannerResult<Option<Banner>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM banner_schema.banners b \
             JOIN banner_schema.banners_x_tags bt ON bt.banner_id = b.banner_id \
             WHERE bt.tag_id = $1 AND b.feature_id = $2",
            BANNER_COLUMNS
        );
        let row = conn
            .query_opt(&sql, &[&key.tag_id.get(), &key.feature_id.get()])
            .await
            .map_err(query_error)?;
        row.as_ref().map(banner_from_row).transpose()
    }

    async fn banner_list(&self, filter: &BannerFilter) -> BannerResult<Vec<Banner>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM banner_schema.banners b \
             WHERE ($1::BIGINT IS NULL OR b.feature_id = $1) \
               AND ($2::BIGINT IS NULL OR EXISTS ( \
                     SELECT 1 FROM banner_schema.banners_x_tags f \
                     WHERE f.banner_id = b.banner_id AND f.tag_id = $2)) \
             ORDER BY b.banner_id \
             LIMIT $3 OFFSET $4",
            BANNER_COLUMNS
        );
        let feature_id = filter.feature_id.map(FeatureId::get);
        let tag_id = filter.tag_id.map(TagId::get);
        let limit = filter.limit.map(page_param);
        let offset = page_param(filter.offset);

        let rows = conn
            .query(&sql, &[&feature_id, &tag_id, &limit, &offset])
            .await
            .map_err(query_error)?;
        rows.iter().map(banner_from_row).collect()
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// Open transaction on a [`PgBannerStore`].
pub struct PgTx {
    conn: Option<Object>,
}

impl PgTx {
    fn conn(&self) -> BannerResult<&Object> {
        self.conn.as_ref().ok_or_else(|| {
            StorageError::TransactionFailed {
                reason: "transaction already finished".to_string(),
            }
            .into()
        })
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> BannerResult<()> {
        let conn = self.conn.take().ok_or_else(|| {
            BannerError::from(StorageError::TransactionFailed {
                reason: "transaction already finished".to_string(),
            })
        })?;
        match conn.batch_execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Session state is unknown now; do not return it to the pool.
                drop(Object::take(conn));
                Err(StorageError::TransactionFailed {
                    reason: format!("{} failed: {}", statement, e),
                }
                .into())
            }
        }
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("transaction dropped without commit or rollback, closing connection");
            drop(Object::take(conn));
        }
    }
}

#[async_trait]
impl BannerTx for PgTx {
    async fn banner_get(&mut self, banner_id: BannerId) -> BannerResult<Option<Banner>> {
        let sql = format!(
            "SELECT {} FROM banner_schema.banners b WHERE b.banner_id = $1 FOR UPDATE OF b",
            BANNER_COLUMNS
        );
        let row = self
            .conn()?
            .query_opt(&sql, &[&banner_id.get()])
            .await
            .map_err(query_error)?;
        row.as_ref().map(banner_from_row).transpose()
    }

    async fn banner_insert(&mut self, new: &NewBanner, now: Timestamp) -> BannerResult<BannerId> {
        let row = self
            .conn()?
            .query_one(
                "INSERT INTO banner_schema.banners \
                 (title, text, url, feature_id, is_active, created_at, updated_at, version) \
                 VALUES ($1, $2, $3, $4, $5, $6, $6, $7) \
                 RETURNING banner_id",
                &[
                    &new.content.title,
                    &new.content.text,
                    &new.content.url,
                    &new.feature_id.get(),
                    &new.is_active,
                    &now,
                    &banner_core::INITIAL_VERSION,
                ],
            )
            .await
            .map_err(query_error)?;
        Ok(BannerId(decode(&row, "banner_id")?))
    }

    async fn banner_update(
        &mut self,
        next: &Banner,
        expected_version: Version,
    ) -> BannerResult<bool> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE banner_schema.banners \
                 SET title = $2, text = $3, url = $4, feature_id = $5, is_active = $6, \
                     updated_at = $7, version = $8 \
                 WHERE banner_id = $1 AND version = $9",
                &[
                    &next.banner_id.get(),
                    &next.content.title,
                    &next.content.text,
                    &next.content.url,
                    &next.feature_id.get(),
                    &next.is_active,
                    &next.updated_at,
                    &next.version,
                    &expected_version,
                ],
            )
            .await
            .map_err(query_error)?;
        Ok(updated == 1)
    }

    async fn banner_delete(&mut self, banner_id: BannerId) -> BannerResult<bool> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM banner_schema.banners WHERE banner_id = $1",
                &[&banner_id.get()],
            )
            .await
            .map_err(query_error)?;
        Ok(deleted > 0)
    }

    async fn bindings_find(&mut self, check: &ConflictCheck) -> BannerResult<Vec<Binding>> {
        if check.is_empty() {
            return Ok(Vec::new());
        }
        let exclude = check.exclude.map(BannerId::get);
        let conn = self.conn()?;
        // Held until commit or rollback, so two writers targeting the same
        // feature cannot both pass the check before either inserts its tags.
        conn.execute(
            "SELECT pg_advisory_xact_lock($1)",
            &[&check.feature_id.get()],
        )
        .await
        .map_err(query_error)?;
        let rows = conn
            .query(
                "SELECT DISTINCT t.tag_id FROM banner_schema.banners_x_tags t \
                 JOIN banner_schema.banners b ON b.banner_id = t.banner_id \
                 WHERE b.feature_id = $1 AND t.tag_id = ANY($2) \
                   AND ($3::BIGINT IS NULL OR b.banner_id <> $3) \
                 ORDER BY t.tag_id",
                &[&check.feature_id.get(), &tag_array(&check.tag_ids), &exclude],
            )
            .await
            .map_err(query_error)?;
        rows.iter()
            .map(|row| {
                let tag_id: i64 = decode(row, "tag_id")?;
                Ok(Binding::new(TagId(tag_id), check.feature_id))
            })
            .collect()
    }

    async fn tags_add(
        &mut self,
        banner_id: BannerId,
        tag_ids: &BTreeSet<TagId>,
    ) -> BannerResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO banner_schema.banners_x_tags (banner_id, tag_id) \
                 SELECT $1, UNNEST($2::BIGINT[]) \
                 ON CONFLICT DO NOTHING",
                &[&banner_id.get(), &tag_array(tag_ids)],
            )
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn tags_remove(
        &mut self,
        banner_id: BannerId,
        tag_ids: &BTreeSet<TagId>,
    ) -> BannerResult<()> {
        self.conn()?
            .execute(
                "DELETE FROM banner_schema.banners_x_tags \
                 WHERE banner_id = $1 AND tag_id = ANY($2)",
                &[&banner_id.get(), &tag_array(tag_ids)],
            )
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn tags_clear(&mut self, banner_id: BannerId) -> BannerResult<u64> {
        self.conn()?
            .execute(
                "DELETE FROM banner_schema.banners_x_tags WHERE banner_id = $1",
                &[&banner_id.get()],
            )
            .await
            .map_err(query_error)
    }

    async fn version_insert(&mut self, snapshot: &VersionSnapshot) -> BannerResult<()> {
        let state = snapshot.state();
        self.conn()?
            .execute(
                "INSERT INTO banner_schema.banner_versions \
                 (banner_id, version, title, text, url, feature_id, tag_ids, \
                  is_active, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &state.banner_id.get(),
                    &state.version,
                    &state.content.title,
                    &state.content.text,
                    &state.content.url,
                    &state.feature_id.get(),
                    &tag_array(&state.tag_ids),
                    &state.is_active,
                    &state.created_at,
                    &state.updated_at,
                ],
            )
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn version_get(
        &mut self,
        banner_id: BannerId,
        version: Version,
    ) -> BannerResult<Option<VersionSnapshot>> {
        let sql = format!(
            "SELECT {} FROM banner_schema.banner_versions \
             WHERE banner_id = $1 AND version = $2",
            VERSION_COLUMNS
        );
        let row = self
            .conn()?
            .query_opt(&sql, &[&banner_id.get(), &version])
            .await
            .map_err(query_error)?;
        row.as_ref()
            .map(|row| banner_from_row(row).map(|b| VersionSnapshot::capture(&b)))
            .transpose()
    }

    async fn version_list(&mut self, banner_id: BannerId) -> BannerResult<Vec<VersionSnapshot>> {
        let sql = format!(
            "SELECT {} FROM banner_schema.banner_versions \
             WHERE banner_id = $1 ORDER BY version DESC",
            VERSION_COLUMNS
        );
        let rows = self
            .conn()?
            .query(&sql, &[&banner_id.get()])
            .await
            .map_err(query_error)?;
        rows.iter()
            .map(|row| banner_from_row(row).map(|b| VersionSnapshot::capture(&b)))
            .collect()
    }

    async fn version_delete(
        &mut self,
        banner_id: BannerId,
        version: Version,
    ) -> BannerResult<bool> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM banner_schema.banner_versions \
                 WHERE banner_id = $1 AND version = $2",
                &[&banner_id.get(), &version],
            )
            .await
            .map_err(query_error)?;
        Ok(deleted > 0)
    }

    async fn versions_clear(&mut self, banner_id: BannerId) -> BannerResult<u64> {
        self.conn()?
            .execute(
                "DELETE FROM banner_schema.banner_versions WHERE banner_id = $1",
                &[&banner_id.get()],
            )
            .await
            .map_err(query_error)
    }

    async fn commit(self: Box<Self>) -> BannerResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> BannerResult<()> {
        self.finish("ROLLBACK").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.dbname, "banners");
        assert_eq!(config.port, 5432);
        assert_eq!(config.max_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_pool_creation_is_lazy() -> ApiResult<()> {
        // No connection is opened until the first checkout.
        let pool = DbConfig::default().create_pool()?;
        assert_eq!(pool.status().max_size, 16);
        Ok(())
    }

    #[test]
    fn test_page_param_saturates() {
        assert_eq!(page_param(10), 10);
        assert_eq!(page_param(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_schema_covers_all_tables() {
        for table in ["banners", "banners_x_tags", "banner_versions"] {
            assert!(SCHEMA_SQL.contains(&format!("banner_schema.{} (", table)));
        }
        assert!(SCHEMA_SQL.contains("tag_ids     BIGINT[]"));
    }
}
