use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a processing session.
///
/// `Running` is the only non-terminal state. Once a session leaves it, the
/// row is never transitioned again; history is kept for auditing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Stopped,
    Timeout,
}

impl SessionStatus {
    pub fn as_db(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            "timeout" => Ok(Self::Timeout),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// One claim of exclusive processing rights over a data shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingSession {
    pub id: i64,
    pub shard_id: i64,
    pub status: SessionStatus,
    pub priority: i64,
    pub timeout_seconds: i64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of `try_acquire`. Contention is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { session_id: i64 },
    Contended,
}

impl AcquireOutcome {
    pub fn acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired { .. })
    }

    pub fn session_id(&self) -> Option<i64> {
        match self {
            AcquireOutcome::Acquired { session_id } => Some(*session_id),
            AcquireOutcome::Contended => None,
        }
    }
}

/// Per-status session counts across the shards of one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStatistics {
    pub total: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub stopped: i64,
    pub timeout: i64,
    pub last_session: Option<ProcessingSession>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trips_through_db_text() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Stopped,
            SessionStatus::Timeout,
        ] {
            assert_eq!(SessionStatus::from_str(status.as_db()), Ok(status));
        }
        assert_eq!(SessionStatus::from_str("RUNNING"), Ok(SessionStatus::Running));
        assert!(SessionStatus::from_str("paused").is_err());
    }

    #[test]
    fn test_only_running_is_non_terminal() {
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Stopped.is_terminal());
        assert!(SessionStatus::Timeout.is_terminal());
    }

    #[test]
    fn test_acquire_outcome_accessors() {
        let won = AcquireOutcome::Acquired { session_id: 42 };
        assert!(won.acquired());
        assert_eq!(won.session_id(), Some(42));
        assert!(!AcquireOutcome::Contended.acquired());
        assert_eq!(AcquireOutcome::Contended.session_id(), None);
    }
}
