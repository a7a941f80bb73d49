use crate::application::use_cases::entity_stream::sources::{ShardOpener, ShardReader};
use crate::domain::entity::RawEntityRecord;
use crate::domain::error::{AppError, Result};
use crate::domain::project::DataShard;
use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Read-only view over one shard file.
pub struct ShardCatalog {
    shard_id: i64,
    pool: SqlitePool,
    catalog_names: Vec<String>,
}

impl ShardCatalog {
    /// Opens an existing shard file. The file is never created or written.
    pub async fn open(
        shard_id: i64,
        path: &Path,
        catalog_names: Vec<String>,
        busy_timeout: Duration,
    ) -> Result<Self> {
        if !path.is_file() {
            return Err(AppError::ShardError(format!(
                "Shard {} file not found: {}",
                shard_id,
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::ShardError(format!("Failed to open shard {}: {e}", shard_id))
            })?;

        debug!(shard_id, path = %path.display(), "Shard opened");
        Ok(Self {
            shard_id,
            pool,
            catalog_names,
        })
    }

    pub async fn list_uploads(&self) -> Result<Vec<i64>> {
        sqlx::query_scalar("SELECT id FROM uploads ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::ShardError(format!(
                    "Failed to list uploads of shard {}: {e}",
                    self.shard_id
                ))
            })
    }

    pub async fn fetch_items(
        &self,
        upload_id: i64,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RawEntityRecord>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT i.id, i.catalog_id, i.reference, i.code, i.name, i.attributes_xml
             FROM catalog_items i
             JOIN catalogs c ON c.id = i.catalog_id
             WHERE c.upload_id = ",
        );
        query.push_bind(upload_id);
        query.push(" AND i.id > ");
        query.push_bind(after_id);

        if !self.catalog_names.is_empty() {
            query.push(" AND c.name IN (");
            let mut names = query.separated(", ");
            for name in &self.catalog_names {
                names.push_bind(name.clone());
            }
            query.push(")");
        }

        query.push(" ORDER BY i.id ASC LIMIT ");
        query.push_bind(limit.max(1) as i64);

        let rows = query
            .build_query_as::<CatalogItemEntity>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::ShardError(format!(
                    "Failed to read catalog items of shard {}: {e}",
                    self.shard_id
                ))
            })?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ShardReader for ShardCatalog {
    async fn list_uploads(&self) -> Result<Vec<i64>> {
        ShardCatalog::list_uploads(self).await
    }

    async fn fetch_items(
        &self,
        upload_id: i64,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RawEntityRecord>> {
        ShardCatalog::fetch_items(self, upload_id, after_id, limit).await
    }

    async fn close(&self) {
        ShardCatalog::close(self).await
    }
}

/// Opens shards as SQLite files at their registered paths.
#[derive(Debug, Clone)]
pub struct SqliteShardOpener {
    catalog_names: Vec<String>,
    busy_timeout: Duration,
}

impl SqliteShardOpener {
    pub fn new(catalog_names: Vec<String>, busy_timeout: Duration) -> Self {
        Self {
            catalog_names,
            busy_timeout,
        }
    }
}

#[async_trait]
impl ShardOpener for SqliteShardOpener {
    async fn open(&self, shard: &DataShard) -> Result<Box<dyn ShardReader>> {
        let catalog = ShardCatalog::open(
            shard.id,
            &shard.file_path,
            self.catalog_names.clone(),
            self.busy_timeout,
        )
        .await?;
        Ok(Box::new(catalog))
    }
}

#[derive(sqlx::FromRow)]
struct CatalogItemEntity {
    id: i64,
    catalog_id: i64,
    reference: String,
    code: Option<String>,
    name: String,
    attributes_xml: Option<String>,
}

impl From<CatalogItemEntity> for RawEntityRecord {
    fn from(entity: CatalogItemEntity) -> Self {
        Self {
            id: entity.id,
            catalog_id: entity.catalog_id,
            reference: entity.reference,
            code: entity.code,
            name: entity.name,
            attributes: entity.attributes_xml,
        }
    }
}
