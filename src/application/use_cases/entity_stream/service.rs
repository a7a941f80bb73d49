use super::accumulator::{Accumulator, Flow};
use super::sources::{NormalizedStore, ProjectDirectory, ShardOpener, ShardReader};
use super::unify::{normalized_to_unified, raw_to_unified};
use crate::domain::entity::UnifiedEntity;
use crate::domain::error::{AppError, Result};
use crate::domain::project::{ClientProject, DataShard};
use crate::domain::stream::{StreamOptions, StreamReport, StreamScope};
use crate::infrastructure::config::StreamConfig;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a scan over one source stopped early.
enum ScanError {
    /// The source itself failed; the caller decides whether to skip it.
    Source(AppError),
    /// Anything else, including consumer errors. Aborts the stream.
    Fatal(AppError),
}

/// The streaming aggregator: walks every shard and the normalized store of a
/// scope, unifies records, and hands them to a consumer in batches.
pub struct EntityStreamService {
    projects: Arc<dyn ProjectDirectory>,
    normalized: Arc<dyn NormalizedStore>,
    shards: Arc<dyn ShardOpener>,
    config: StreamConfig,
}

impl EntityStreamService {
    pub fn new(
        projects: Arc<dyn ProjectDirectory>,
        normalized: Arc<dyn NormalizedStore>,
        shards: Arc<dyn ShardOpener>,
        config: StreamConfig,
    ) -> Self {
        Self {
            projects,
            normalized,
            shards,
            config,
        }
    }

    /// Streams the scope. Batches already handed to `consumer` stay
    /// delivered if the stream is cancelled; the report then carries the
    /// partial statistics with `cancelled` set.
    pub async fn stream<F>(
        &self,
        cancel: &CancellationToken,
        options: &StreamOptions,
        consumer: F,
    ) -> Result<StreamReport>
    where
        F: FnMut(Vec<UnifiedEntity>) -> Result<()> + Send,
    {
        options.validate()?;
        let started = Instant::now();

        let projects = self.resolve_scope(&options.scope).await?;
        if projects.is_empty() {
            let mut report = StreamReport::default();
            report.stats.processing_time_ms = elapsed_ms(started);
            return Ok(report);
        }

        let batch_size = options.effective_batch_size(self.config.batch_size);
        let mut acc = Accumulator::new(options, batch_size, consumer);
        acc.stats_mut().projects_processed = projects.len();

        let mut flow = Flow::Continue;
        if options.source.includes_raw() {
            flow = self.stream_shards(cancel, &projects, options, &mut acc).await?;
        }
        if !flow.should_stop() && options.source.includes_normalized() {
            flow = self
                .stream_normalized(cancel, &projects, options, batch_size, &mut acc)
                .await?;
        }

        let cancelled = flow == Flow::Cancelled;
        let summary = if cancelled {
            acc.abandon()
        } else {
            acc.finish()?
        };

        let mut stats = summary.stats;
        stats.processing_time_ms = elapsed_ms(started);
        info!(
            client_id = options.scope.client_id,
            projects = stats.projects_processed,
            shards = stats.shards_processed,
            shards_failed = stats.shards_failed,
            uploads_skipped = stats.uploads_skipped,
            raw = stats.total_raw,
            normalized = stats.total_normalized,
            matched = summary.total_matched,
            limit_reached = summary.limit_reached,
            cancelled,
            elapsed_ms = stats.processing_time_ms,
            "Entity stream finished"
        );

        Ok(StreamReport {
            stats,
            projects,
            total_matched: summary.total_matched,
            limit_reached: summary.limit_reached,
            cancelled,
        })
    }

    async fn resolve_scope(&self, scope: &StreamScope) -> Result<Vec<ClientProject>> {
        match scope.project_id {
            Some(project_id) => {
                let project = self.projects.get_project(project_id).await?;
                if project.client_id != scope.client_id {
                    return Err(AppError::ValidationError(format!(
                        "Project {} does not belong to client {}",
                        project_id, scope.client_id
                    )));
                }
                Ok(vec![project])
            }
            None => self.projects.projects_for_client(scope.client_id).await,
        }
    }

    async fn stream_shards<F>(
        &self,
        cancel: &CancellationToken,
        projects: &[ClientProject],
        options: &StreamOptions,
        acc: &mut Accumulator<'_, F>,
    ) -> Result<Flow>
    where
        F: FnMut(Vec<UnifiedEntity>) -> Result<()> + Send,
    {
        for project in projects {
            if cancel.is_cancelled() {
                return Ok(Flow::Cancelled);
            }
            let shards = match self.projects.shards_for_project(project.id).await {
                Ok(shards) => shards,
                Err(err) => {
                    warn!(project_id = project.id, error = %err, "Skipping project shards");
                    continue;
                }
            };

            for shard in shards.iter().filter(|s| s.is_active) {
                if cancel.is_cancelled() {
                    return Ok(Flow::Cancelled);
                }
                // Counts attempts, including shards that fail to open
                acc.stats_mut().shards_processed += 1;

                let reader = match self.shards.open(shard).await {
                    Ok(reader) => reader,
                    Err(err) => {
                        warn!(shard_id = shard.id, path = %shard.file_path.display(), error = %err, "Skipping unreadable shard");
                        acc.stats_mut().shards_failed += 1;
                        continue;
                    }
                };

                let result = self
                    .stream_single_shard(cancel, reader.as_ref(), project, shard, options, acc)
                    .await;
                reader.close().await;

                match result {
                    Ok(Flow::Continue) => {}
                    Ok(stop) => return Ok(stop),
                    Err(ScanError::Source(err)) => {
                        warn!(shard_id = shard.id, error = %err, "Shard read failed, skipping");
                        acc.stats_mut().shards_failed += 1;
                    }
                    Err(ScanError::Fatal(err)) => return Err(err),
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn stream_single_shard<F>(
        &self,
        cancel: &CancellationToken,
        reader: &dyn ShardReader,
        project: &ClientProject,
        shard: &DataShard,
        options: &StreamOptions,
        acc: &mut Accumulator<'_, F>,
    ) -> std::result::Result<Flow, ScanError>
    where
        F: FnMut(Vec<UnifiedEntity>) -> Result<()> + Send,
    {
        let uploads = reader.list_uploads().await.map_err(ScanError::Source)?;
        let page_size = self.config.catalog_page_size.max(1);

        for upload_id in uploads {
            let mut after_id = 0;
            loop {
                if cancel.is_cancelled() {
                    return Ok(Flow::Cancelled);
                }
                let items = match reader.fetch_items(upload_id, after_id, page_size).await {
                    Ok(items) => items,
                    Err(err) => {
                        warn!(shard_id = shard.id, upload_id, error = %err, "Skipping upload");
                        acc.stats_mut().uploads_skipped += 1;
                        break;
                    }
                };
                debug!(shard_id = shard.id, upload_id, after_id, fetched = items.len(), "Catalog page");

                let fetched = items.len();
                let Some(last_id) = items.last().map(|item| item.id) else {
                    break;
                };
                after_id = last_id;

                for item in items {
                    let unified = raw_to_unified(item, project, shard);
                    if !unified.matches_search(&options.search) {
                        continue;
                    }
                    let flow = acc.add(unified).map_err(ScanError::Fatal)?;
                    if flow.should_stop() {
                        return Ok(flow);
                    }
                }

                if fetched < page_size {
                    break;
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn stream_normalized<F>(
        &self,
        cancel: &CancellationToken,
        projects: &[ClientProject],
        options: &StreamOptions,
        page_size: usize,
        acc: &mut Accumulator<'_, F>,
    ) -> Result<Flow>
    where
        F: FnMut(Vec<UnifiedEntity>) -> Result<()> + Send,
    {
        for project in projects {
            let mut after_id = 0;
            loop {
                if cancel.is_cancelled() {
                    return Ok(Flow::Cancelled);
                }
                let page = self
                    .normalized
                    .fetch_page(project.id, &options.search, after_id, page_size)
                    .await?;
                debug!(project_id = project.id, after_id, fetched = page.len(), "Normalized page");

                let fetched = page.len();
                let Some(last_id) = page.last().map(|record| record.id) else {
                    break;
                };
                after_id = last_id;

                for record in page {
                    let flow = acc.add(normalized_to_unified(record, project))?;
                    if flow.should_stop() {
                        return Ok(flow);
                    }
                }

                if fetched < page_size {
                    break;
                }
            }
        }
        Ok(Flow::Continue)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
