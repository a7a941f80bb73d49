use crate::domain::error::Result;
use crate::domain::session::{AcquireOutcome, ProcessingSession, SessionStatistics, SessionStatus};
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::db::sessions::SessionRepository;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Grants workers exclusive processing rights over a shard and tracks the
/// lifecycle of each claim.
pub struct SessionCoordinator {
    repository: Arc<SessionRepository>,
    config: SessionConfig,
}

impl SessionCoordinator {
    pub fn new(repository: Arc<SessionRepository>, config: SessionConfig) -> Self {
        Self { repository, config }
    }

    /// Contention comes back as `AcquireOutcome::Contended`; only storage
    /// failures are errors. A non-positive timeout uses the configured default.
    pub async fn try_acquire(
        &self,
        shard_id: i64,
        priority: i64,
        timeout_seconds: i64,
    ) -> Result<AcquireOutcome> {
        let timeout_seconds = if timeout_seconds > 0 {
            timeout_seconds
        } else {
            self.config.default_timeout_secs
        };

        let outcome = self
            .repository
            .try_acquire(shard_id, priority, timeout_seconds)
            .await?;
        match outcome {
            AcquireOutcome::Acquired { session_id } => {
                info!(shard_id, session_id, priority, timeout_seconds, "Session acquired")
            }
            AcquireOutcome::Contended => debug!(shard_id, "Shard busy, session not acquired"),
        }
        Ok(outcome)
    }

    pub async fn update_status(
        &self,
        session_id: i64,
        status: SessionStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.repository
            .update_status(session_id, status, finished_at.map(|t| t.timestamp_millis()))
            .await?;
        info!(session_id, status = %status, "Session finished");
        Ok(())
    }

    pub async fn stop(&self, session_id: i64) -> Result<()> {
        self.update_status(session_id, SessionStatus::Stopped, None).await
    }

    /// Returns whether the session was still running.
    pub async fn heartbeat(&self, session_id: i64) -> Result<bool> {
        let touched = self.repository.heartbeat(session_id).await?;
        if !touched {
            debug!(session_id, "Heartbeat ignored for non-running session");
        }
        Ok(touched)
    }

    pub async fn reap_stale(&self) -> Result<u64> {
        let reaped = self.repository.reap_stale().await?;
        if reaped > 0 {
            info!(reaped, "Stale sessions marked as timed out");
        }
        Ok(reaped)
    }

    pub async fn latest(&self, shard_id: i64) -> Result<Option<ProcessingSession>> {
        self.repository.latest(shard_id).await
    }

    pub async fn get(&self, session_id: i64) -> Result<ProcessingSession> {
        self.repository.get(session_id).await
    }

    pub async fn list_running(&self) -> Result<Vec<ProcessingSession>> {
        self.repository.list_running().await
    }

    pub async fn list_by_status(&self, status: SessionStatus) -> Result<Vec<ProcessingSession>> {
        self.repository.list_by_status(status).await
    }

    pub async fn update_priority(&self, session_id: i64, priority: i64) -> Result<()> {
        self.repository.update_priority(session_id, priority).await
    }

    pub async fn statistics(&self, project_id: i64) -> Result<SessionStatistics> {
        self.repository.statistics_for_project(project_id).await
    }

    /// Acquires the shard, runs `work` with the session id, and records
    /// `completed` or `failed` depending on its result. `Ok(None)` means the
    /// shard was owned by someone else and `work` never ran.
    pub async fn run_exclusive<F, Fut, T>(
        &self,
        shard_id: i64,
        priority: i64,
        timeout_seconds: i64,
        work: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(i64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let AcquireOutcome::Acquired { session_id } =
            self.try_acquire(shard_id, priority, timeout_seconds).await?
        else {
            return Ok(None);
        };

        let result = work(session_id).await;
        let status = if result.is_ok() {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        if let Err(err) = self.update_status(session_id, status, None).await {
            // The reaper may have timed the session out while work ran
            warn!(session_id, error = %err, "Could not record session outcome");
        }
        result.map(Some)
    }

    /// Periodically reaps stale sessions until `cancel` fires.
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Session reaper started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.reap_stale().await {
                            error!(error = %err, "Session reaper pass failed");
                        }
                    }
                }
            }
            info!("Session reaper stopped");
        })
    }
}
