use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::DatabaseConfig;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const SERVICE_SCHEMA: &str = include_str!("../../../resources/service/schema.sql");

const SERVICE_SCHEMA_VERSION: i32 = 1;

/// The central embedded store backing sessions, projects, shards and
/// normalized entities.
pub struct ServiceDb {
    pool: SqlitePool,
    schema_ready: OnceCell<()>,
}

impl ServiceDb {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db_url = db_path_to_url(&config.path)?;
        let options = db_url
            .parse::<SqliteConnectOptions>()
            .map_err(|e| AppError::DatabaseError(format!("Failed to parse service DB URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout())
            .with_regexp();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect service DB: {e}")))?;

        let db = Self {
            pool,
            schema_ready: OnceCell::new(),
        };
        db.ensure_schema().await?;

        info!(path = %config.path.display(), "Service database ready");
        Ok(db)
    }

    /// Applies the schema at most once per instance. Concurrent callers wait
    /// on the same initialisation instead of racing on table creation.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                apply_schema(&self.pool).await?;
                set_user_version(&self.pool, SERVICE_SCHEMA_VERSION).await?;
                sqlx::query("SELECT 1")
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(format!("Service database health check failed: {e}"))
                    })?;
                Ok::<(), AppError>(())
            })
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn schema_version(&self) -> Result<i32> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read user_version: {e}")))?;
        row.try_get::<i32, _>(0)
            .map_err(|e| AppError::DatabaseError(format!("Failed to decode user_version: {e}")))
    }
}

pub(crate) fn db_path_to_url(db_path: &Path) -> Result<String> {
    let db_path_str = db_path.to_str().ok_or_else(|| {
        AppError::DatabaseError("Database path is not valid UTF-8".to_string())
    })?;
    Ok(format!("sqlite://{}", db_path_str.replace('\\', "/")))
}

async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SERVICE_SCHEMA.split(';') {
        let stmt = statement.trim();
        if stmt.is_empty() {
            continue;
        }
        sqlx::query(stmt).execute(pool).await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to apply service schema statement: {e}"))
        })?;
    }
    debug!("Service schema applied");
    Ok(())
}

async fn set_user_version(pool: &SqlitePool, version: i32) -> Result<()> {
    // PRAGMA does not accept bound parameters
    let stmt = format!("PRAGMA user_version = {}", version);
    sqlx::query(&stmt)
        .execute(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to set user_version: {e}")))?;
    Ok(())
}
