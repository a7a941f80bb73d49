use crate::application::use_cases::entity_ranking::{rank, RankingOptions};
use crate::application::use_cases::entity_stream::EntityStreamService;
use crate::domain::entity::UnifiedEntity;
use crate::domain::error::Result;
use crate::domain::project::ClientProject;
use crate::domain::stream::{
    SortField, SortOrder, SourceFilter, StreamOptions, StreamScope, StreamStats,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListRequest {
    pub scope: StreamScope,
    pub search: String,
    pub source: SourceFilter,
    pub quality_min: Option<f64>,
    pub quality_max: Option<f64>,
    pub sort_by: SortField,
    pub order: Option<SortOrder>,
    pub offset: usize,
    pub limit: usize,
}

impl ListRequest {
    pub fn new(scope: StreamScope) -> Self {
        Self {
            scope,
            search: String::new(),
            source: SourceFilter::All,
            quality_min: None,
            quality_max: None,
            sort_by: SortField::Default,
            order: None,
            offset: 0,
            limit: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityPage {
    pub entities: Vec<UnifiedEntity>,
    pub projects: Vec<ClientProject>,
    pub total_count: usize,
    pub stats: StreamStats,
    pub cancelled: bool,
}

/// Listing with a globally consistent order: everything is streamed first,
/// then filtered, sorted and sliced in one place.
pub struct EntityListingService {
    stream: Arc<EntityStreamService>,
}

impl EntityListingService {
    pub fn new(stream: Arc<EntityStreamService>) -> Self {
        Self { stream }
    }

    pub async fn list(&self, cancel: &CancellationToken, request: &ListRequest) -> Result<EntityPage> {
        let mut options = StreamOptions::new(request.scope);
        options.search = request.search.clone();
        options.source = request.source;
        options.quality_min = request.quality_min;
        options.quality_max = request.quality_max;

        let mut collected: Vec<UnifiedEntity> = Vec::new();
        let report = self
            .stream
            .stream(cancel, &options, |batch| {
                collected.extend(batch);
                Ok(())
            })
            .await?;

        let page = rank(
            collected,
            &RankingOptions {
                quality_min: request.quality_min,
                quality_max: request.quality_max,
                sort_by: request.sort_by,
                order: request.order,
                offset: request.offset,
                limit: request.limit,
            },
        );

        Ok(EntityPage {
            entities: page.entities,
            projects: report.projects,
            total_count: page.total_count,
            stats: report.stats,
            cancelled: report.cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntitySource;
    use crate::domain::error::AppError;
    use crate::infrastructure::config::StreamConfig;
    use crate::infrastructure::db::test_support::{
        seed_normalized, seed_project, seed_shard, temp_service_db, write_shard_file, ShardItem,
    };
    use crate::infrastructure::db::{
        NormalizedEntityRepository, ProjectRepository, ServiceDb, SqliteShardOpener,
    };
    use std::time::Duration;

    fn listing(db: &ServiceDb) -> EntityListingService {
        let stream = EntityStreamService::new(
            Arc::new(ProjectRepository::new(db.pool().clone())),
            Arc::new(NormalizedEntityRepository::new(db.pool().clone())),
            Arc::new(SqliteShardOpener::new(Vec::new(), Duration::from_secs(1))),
            StreamConfig {
                catalog_page_size: 2,
                batch_size: 2,
                catalog_names: Vec::new(),
            },
        );
        EntityListingService::new(Arc::new(stream))
    }

    #[tokio::test]
    async fn test_lists_across_shards_and_store_despite_unreachable_shard() {
        let (dir, db) = temp_service_db().await;
        let project = seed_project(db.pool(), 1, "Alpha").await;

        let shard_a_path = dir.path().join("shard-a.db");
        write_shard_file(
            &shard_a_path,
            &[
                ShardItem::new("r1", "Acme", Some("ИНН: 7707083893")),
                ShardItem::new("r2", "Borealis", Some("БИН: 050340002351")),
                ShardItem::new("r3", "Cyclone", Some("без реквизитов")),
            ],
        )
        .await;
        seed_shard(db.pool(), project, "shard-a", &shard_a_path).await;
        seed_shard(db.pool(), project, "shard-b", &dir.path().join("missing.db")).await;

        seed_normalized(db.pool(), project, "Zenith", Some("7812014560"), Some(0.9)).await;
        seed_normalized(db.pool(), project, "Aardvark", None, None).await;

        let mut request = ListRequest::new(StreamScope::client(1));
        request.limit = 2;
        let page = listing(&db)
            .list(&CancellationToken::new(), &request)
            .await
            .unwrap();

        assert_eq!(page.entities.len(), 2);
        assert_eq!(page.entities[0].name, "Zenith");
        assert_eq!(page.entities[0].quality_score, Some(0.9));
        assert_eq!(page.entities[1].name, "Aardvark");
        assert_eq!(page.entities[1].source, EntitySource::Normalized);

        assert_eq!(page.total_count, 5);
        assert_eq!(page.stats.shards_processed, 2);
        assert_eq!(page.stats.shards_failed, 1);
        assert_eq!(page.stats.total_raw, 3);
        assert_eq!(page.stats.total_normalized, 2);
        assert!((page.stats.average_quality - 0.9).abs() < 1e-9);
        assert_eq!(page.projects.len(), 1);
    }

    #[tokio::test]
    async fn test_raw_records_carry_extracted_identifiers() {
        let (dir, db) = temp_service_db().await;
        let project = seed_project(db.pool(), 1, "Alpha").await;
        let path = dir.path().join("shard-a.db");
        write_shard_file(
            &path,
            &[
                ShardItem::new("r1", "Acme", Some("ИНН: 7707083893")),
                ShardItem::new("r2", "Borealis", Some("БИН: 050340002351")),
            ],
        )
        .await;
        seed_shard(db.pool(), project, "shard-a", &path).await;

        let mut request = ListRequest::new(StreamScope::project(1, project));
        request.source = SourceFilter::Raw;
        request.sort_by = SortField::Name;
        let page = listing(&db)
            .list(&CancellationToken::new(), &request)
            .await
            .unwrap();

        assert_eq!(page.entities.len(), 2);
        assert_eq!(page.entities[0].tax_id.as_deref(), Some("7707083893"));
        assert_eq!(page.entities[1].bin.as_deref(), Some("050340002351"));
        assert_eq!(page.entities[1].tax_id.as_deref(), Some("050340002351"));
        assert_eq!(page.entities[0].shard_name.as_deref(), Some("shard-a"));
    }

    #[tokio::test]
    async fn test_invalid_quality_bounds_are_rejected() {
        let (_dir, db) = temp_service_db().await;
        let mut request = ListRequest::new(StreamScope::client(1));
        request.quality_min = Some(0.9);
        request.quality_max = Some(0.1);
        let err = listing(&db)
            .list(&CancellationToken::new(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
