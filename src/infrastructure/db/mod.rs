pub mod normalized_entities;
pub mod projects;
pub mod service;
pub mod sessions;
pub mod shard_catalog;

#[cfg(test)]
pub(crate) mod test_support;

pub use normalized_entities::NormalizedEntityRepository;
pub use projects::ProjectRepository;
pub use service::ServiceDb;
pub use sessions::SessionRepository;
pub use shard_catalog::{ShardCatalog, SqliteShardOpener};

use chrono::{DateTime, TimeZone, Utc};

/// Stored timestamps are epoch milliseconds.
pub(crate) fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
