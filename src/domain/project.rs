use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientProject {
    pub id: i64,
    pub client_id: i64,
    pub name: String,
    pub project_type: Option<String>,
    pub status: String,
}

/// One physical data source (a SQLite file) belonging to a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataShard {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub file_path: PathBuf,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}
