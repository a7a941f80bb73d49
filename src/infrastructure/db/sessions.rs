use crate::domain::error::{AppError, Result};
use crate::domain::session::{
    AcquireOutcome, ProcessingSession, SessionStatistics, SessionStatus,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, warn};

use super::{millis_to_utc, now_millis};

const SESSION_COLUMNS: &str = "id, project_database_id, status, priority, timeout_seconds,
     started_at, last_activity_at, finished_at, created_at";

/// Persistence for processing sessions. Every state change is conditioned on
/// the row still being `running`, so concurrent writers and reapers never
/// move a session out of a terminal state.
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Check-and-insert under `BEGIN IMMEDIATE`: the write lock is taken up
    /// front, so the store serializes competing acquirers. The partial unique
    /// index on running sessions backs the same invariant.
    pub async fn try_acquire(
        &self,
        shard_id: i64,
        priority: i64,
        timeout_seconds: i64,
    ) -> Result<AcquireOutcome> {
        // The guard rolls back on drop, so a cancelled caller never leaves
        // the write lock held on a pooled connection
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to begin session transaction: {e}"))
        })?;

        match acquire_in_transaction(&mut *tx, shard_id, priority, timeout_seconds).await {
            Ok(outcome) => {
                tx.commit().await.map_err(|e| {
                    AppError::DatabaseError(format!("Failed to commit session: {e}"))
                })?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(shard_id, error = %rollback_err, "Session rollback failed");
                }
                Err(err)
            }
        }
    }

    pub async fn get(&self, session_id: i64) -> Result<ProcessingSession> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM processing_sessions WHERE id = ?");
        let session = sqlx::query_as::<_, SessionEntity>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch session: {e}")))?;

        match session {
            Some(session) => session.try_into(),
            None => Err(AppError::NotFound(format!(
                "Processing session not found: {}",
                session_id
            ))),
        }
    }

    /// `running -> {completed, failed, stopped}`. `timeout` is reserved for
    /// the reaper.
    pub async fn update_status(
        &self,
        session_id: i64,
        status: SessionStatus,
        finished_at_ms: Option<i64>,
    ) -> Result<()> {
        if matches!(status, SessionStatus::Running | SessionStatus::Timeout) {
            return Err(AppError::ValidationError(format!(
                "Cannot transition a session to '{}'",
                status
            )));
        }

        let now = now_millis();
        let finished_at = finished_at_ms.unwrap_or(now);
        let result = sqlx::query(
            "UPDATE processing_sessions
             SET status = ?, finished_at = ?, last_activity_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(status.as_db())
        .bind(finished_at)
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update session status: {e}")))?;

        if result.rows_affected() == 0 {
            let current = self.get(session_id).await?;
            return Err(AppError::ValidationError(format!(
                "Session {} is already '{}'",
                session_id, current.status
            )));
        }
        Ok(())
    }

    /// Returns whether a running session was touched.
    pub async fn heartbeat(&self, session_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE processing_sessions SET last_activity_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(now_millis())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to record heartbeat: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn reap_stale(&self) -> Result<u64> {
        self.reap_stale_at(now_millis()).await
    }

    /// Marks every running session idle past its budget as `timeout`.
    pub async fn reap_stale_at(&self, now_ms: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE processing_sessions
             SET status = 'timeout', finished_at = ?
             WHERE status = 'running'
               AND (? - last_activity_at) > timeout_seconds * 1000",
        )
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to reap stale sessions: {e}")))?;

        Ok(result.rows_affected())
    }

    pub async fn latest(&self, shard_id: i64) -> Result<Option<ProcessingSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM processing_sessions
             WHERE project_database_id = ?
             ORDER BY started_at DESC, id DESC LIMIT 1"
        );
        let session = sqlx::query_as::<_, SessionEntity>(&sql)
            .bind(shard_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch latest session: {e}")))?;

        session.map(ProcessingSession::try_from).transpose()
    }

    pub async fn list_running(&self) -> Result<Vec<ProcessingSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM processing_sessions
             WHERE status = 'running'
             ORDER BY priority DESC, started_at ASC, id ASC"
        );
        let sessions = sqlx::query_as::<_, SessionEntity>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list running sessions: {e}")))?;

        sessions.into_iter().map(ProcessingSession::try_from).collect()
    }

    /// Session history for one status, newest first.
    pub async fn list_by_status(&self, status: SessionStatus) -> Result<Vec<ProcessingSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM processing_sessions
             WHERE status = ?
             ORDER BY COALESCE(finished_at, started_at) DESC, id DESC"
        );
        let sessions = sqlx::query_as::<_, SessionEntity>(&sql)
            .bind(status.as_db())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list {status} sessions: {e}")))?;

        sessions.into_iter().map(ProcessingSession::try_from).collect()
    }

    pub async fn update_priority(&self, session_id: i64, priority: i64) -> Result<()> {
        let result = sqlx::query("UPDATE processing_sessions SET priority = ? WHERE id = ?")
            .bind(priority)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to update session priority: {e}"))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Processing session not found: {}",
                session_id
            )));
        }
        Ok(())
    }

    pub async fn statistics_for_project(&self, project_id: i64) -> Result<SessionStatistics> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT s.status, COUNT(*)
             FROM processing_sessions s
             JOIN project_databases d ON d.id = s.project_database_id
             WHERE d.client_project_id = ?
             GROUP BY s.status",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to count sessions: {e}")))?;

        let mut stats = SessionStatistics::default();
        for (status, count) in rows {
            stats.total += count;
            match SessionStatus::from_str(&status) {
                Ok(SessionStatus::Running) => stats.running = count,
                Ok(SessionStatus::Completed) => stats.completed = count,
                Ok(SessionStatus::Failed) => stats.failed = count,
                Ok(SessionStatus::Stopped) => stats.stopped = count,
                Ok(SessionStatus::Timeout) => stats.timeout = count,
                Err(_) => warn!(project_id, status = %status, "Unknown session status in store"),
            }
        }

        let sql = format!(
            "SELECT s.id, s.project_database_id, s.status, s.priority, s.timeout_seconds,
                    s.started_at, s.last_activity_at, s.finished_at, s.created_at
             FROM processing_sessions s
             JOIN project_databases d ON d.id = s.project_database_id
             WHERE d.client_project_id = ?
             ORDER BY s.started_at DESC, s.id DESC LIMIT 1"
        );
        let last = sqlx::query_as::<_, SessionEntity>(&sql)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch last session: {e}")))?;
        stats.last_session = last.map(ProcessingSession::try_from).transpose()?;

        Ok(stats)
    }
}

async fn acquire_in_transaction(
    conn: &mut SqliteConnection,
    shard_id: i64,
    priority: i64,
    timeout_seconds: i64,
) -> Result<AcquireOutcome> {
    let running: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM processing_sessions
         WHERE project_database_id = ? AND status = 'running'",
    )
    .bind(shard_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(format!("Failed to check running sessions: {e}")))?;

    if running > 0 {
        debug!(shard_id, "Shard already has a running session");
        return Ok(AcquireOutcome::Contended);
    }

    let now = now_millis();
    let inserted = sqlx::query(
        "INSERT INTO processing_sessions
            (project_database_id, status, priority, timeout_seconds,
             started_at, last_activity_at, created_at)
         VALUES (?, 'running', ?, ?, ?, ?, ?)",
    )
    .bind(shard_id)
    .bind(priority)
    .bind(timeout_seconds)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(result) => Ok(AcquireOutcome::Acquired {
            session_id: result.last_insert_rowid(),
        }),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            debug!(shard_id, "Running-session index rejected a second claim");
            Ok(AcquireOutcome::Contended)
        }
        Err(e) => Err(AppError::DatabaseError(format!(
            "Failed to create processing session: {e}"
        ))),
    }
}

#[derive(sqlx::FromRow)]
struct SessionEntity {
    id: i64,
    project_database_id: i64,
    status: String,
    priority: i64,
    timeout_seconds: i64,
    started_at: i64,
    last_activity_at: i64,
    finished_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<SessionEntity> for ProcessingSession {
    type Error = AppError;

    fn try_from(entity: SessionEntity) -> Result<Self> {
        let status = SessionStatus::from_str(&entity.status).map_err(AppError::DatabaseError)?;
        Ok(Self {
            id: entity.id,
            shard_id: entity.project_database_id,
            status,
            priority: entity.priority,
            timeout_seconds: entity.timeout_seconds,
            started_at: millis_to_utc(entity.started_at),
            last_activity_at: millis_to_utc(entity.last_activity_at),
            finished_at: entity.finished_at.map(millis_to_utc),
            created_at: millis_to_utc(entity.created_at),
        })
    }
}
