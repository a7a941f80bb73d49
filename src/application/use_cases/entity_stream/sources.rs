//! Seams between the aggregator and the stores it reads. The SQLite
//! implementations live in `infrastructure::db`; tests plug in stubs.

use crate::domain::entity::{NormalizedEntityRecord, RawEntityRecord};
use crate::domain::error::Result;
use crate::domain::project::{ClientProject, DataShard};
use async_trait::async_trait;

/// Resolves a scope into projects and their shards.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn get_project(&self, project_id: i64) -> Result<ClientProject>;
    async fn projects_for_client(&self, client_id: i64) -> Result<Vec<ClientProject>>;
    async fn shards_for_project(&self, project_id: i64) -> Result<Vec<DataShard>>;
}

/// Keyset-paged access to the central normalized store.
#[async_trait]
pub trait NormalizedStore: Send + Sync {
    /// Records of `project_id` with `id > after_id`, ascending by id. A
    /// non-empty `search` is pushed into the query.
    async fn fetch_page(
        &self,
        project_id: i64,
        search: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<NormalizedEntityRecord>>;
}

#[async_trait]
pub trait ShardOpener: Send + Sync {
    async fn open(&self, shard: &DataShard) -> Result<Box<dyn ShardReader>>;
}

/// An open, read-only shard.
#[async_trait]
pub trait ShardReader: Send + Sync {
    /// Upload ids in ascending order.
    async fn list_uploads(&self) -> Result<Vec<i64>>;

    /// Items of one upload with `id > after_id`, in natural catalog order.
    async fn fetch_items(
        &self,
        upload_id: i64,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RawEntityRecord>>;

    async fn close(&self);
}
