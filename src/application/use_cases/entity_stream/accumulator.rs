use crate::domain::entity::{EntitySource, UnifiedEntity};
use crate::domain::error::Result;
use crate::domain::stream::{passes_quality, StreamOptions, StreamStats};

/// Control signal threaded out of every scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The inline limit is satisfied; no source should be read any further.
    LimitReached,
    Cancelled,
}

impl Flow {
    pub fn should_stop(&self) -> bool {
        !matches!(self, Flow::Continue)
    }
}

/// Per-candidate bookkeeping for one stream: statistics, the optional inline
/// quality filter and pagination, and batching towards the consumer.
pub struct Accumulator<'a, F> {
    options: &'a StreamOptions,
    batch_size: usize,
    consumer: F,
    batch: Vec<UnifiedEntity>,
    stats: StreamStats,
    matched: usize,
    emitted: usize,
    quality_sum: f64,
    quality_count: usize,
}

pub struct AccumulatorSummary {
    pub stats: StreamStats,
    pub total_matched: usize,
    pub limit_reached: bool,
}

impl<'a, F> Accumulator<'a, F>
where
    F: FnMut(Vec<UnifiedEntity>) -> Result<()>,
{
    pub fn new(options: &'a StreamOptions, batch_size: usize, consumer: F) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            options,
            batch_size,
            consumer,
            batch: Vec::with_capacity(batch_size),
            stats: StreamStats::default(),
            matched: 0,
            emitted: 0,
            quality_sum: 0.0,
            quality_count: 0,
        }
    }

    pub fn stats_mut(&mut self) -> &mut StreamStats {
        &mut self.stats
    }

    pub fn limit_reached(&self) -> bool {
        self.options.apply_pagination && self.options.limit > 0 && self.emitted >= self.options.limit
    }

    /// Feeds one candidate. Once the limit is hit the pending batch is
    /// flushed before `LimitReached` is returned.
    pub fn add(&mut self, entity: UnifiedEntity) -> Result<Flow> {
        if self.limit_reached() {
            return Ok(Flow::LimitReached);
        }

        match entity.source {
            EntitySource::Raw => self.stats.total_raw += 1,
            EntitySource::Normalized => {
                self.stats.total_normalized += 1;
                if entity.quality_score.is_some() {
                    self.stats.total_with_quality += 1;
                }
            }
        }
        if let Some(score) = entity.quality_score {
            self.quality_sum += score;
            self.quality_count += 1;
        }

        if self.options.apply_quality_filter
            && !passes_quality(
                entity.quality_score,
                self.options.quality_min,
                self.options.quality_max,
            )
        {
            return Ok(Flow::Continue);
        }

        self.matched += 1;
        if self.options.apply_pagination && self.matched <= self.options.offset {
            return Ok(Flow::Continue);
        }

        self.batch.push(entity);
        self.emitted += 1;

        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        if self.limit_reached() {
            self.flush()?;
            return Ok(Flow::LimitReached);
        }
        Ok(Flow::Continue)
    }

    fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        (self.consumer)(batch)
    }

    pub fn average_quality(&self) -> f64 {
        if self.quality_count == 0 {
            0.0
        } else {
            self.quality_sum / self.quality_count as f64
        }
    }

    /// Delivers any remainder and closes the stream.
    pub fn finish(mut self) -> Result<AccumulatorSummary> {
        self.flush()?;
        Ok(self.into_summary())
    }

    /// Closes the stream without delivering the pending batch.
    pub fn abandon(self) -> AccumulatorSummary {
        self.into_summary()
    }

    fn into_summary(self) -> AccumulatorSummary {
        let limit_reached = self.limit_reached();
        let average_quality = self.average_quality();
        let mut stats = self.stats;
        stats.average_quality = average_quality;
        AccumulatorSummary {
            stats,
            total_matched: self.matched,
            limit_reached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::AppError;
    use crate::domain::stream::StreamScope;

    fn entity(id: i64, source: EntitySource, quality_score: Option<f64>) -> UnifiedEntity {
        UnifiedEntity {
            id,
            source,
            name: format!("Entity {id}"),
            project_id: 1,
            project_name: "Alpha".to_string(),
            shard_id: None,
            shard_name: None,
            reference: None,
            code: None,
            attributes: None,
            normalized_name: None,
            source_name: None,
            source_reference: None,
            tax_id: None,
            kpp: None,
            bin: None,
            legal_address: None,
            postal_address: None,
            contact_phone: None,
            contact_email: None,
            contact_person: None,
            quality_score,
            shards: Vec::new(),
        }
    }

    fn options() -> StreamOptions {
        StreamOptions::new(StreamScope::client(1))
    }

    #[test]
    fn test_batches_flush_at_size_and_on_finish() {
        let opts = options();
        let mut batches: Vec<usize> = Vec::new();
        let mut acc = Accumulator::new(&opts, 2, |batch: Vec<UnifiedEntity>| {
            batches.push(batch.len());
            Ok(())
        });
        for id in 0..5 {
            assert_eq!(acc.add(entity(id, EntitySource::Raw, None)).unwrap(), Flow::Continue);
        }
        let summary = acc.finish().unwrap();
        assert_eq!(batches, vec![2, 2, 1]);
        assert_eq!(summary.total_matched, 5);
        assert_eq!(summary.stats.total_raw, 5);
        assert!(!summary.limit_reached);
    }

    #[test]
    fn test_average_quality_ignores_missing_scores() {
        let opts = options();
        let mut acc = Accumulator::new(&opts, 10, |_batch: Vec<UnifiedEntity>| Ok(()));
        acc.add(entity(1, EntitySource::Normalized, Some(0.9))).unwrap();
        acc.add(entity(2, EntitySource::Normalized, None)).unwrap();
        acc.add(entity(3, EntitySource::Normalized, Some(0.5))).unwrap();
        acc.add(entity(4, EntitySource::Raw, None)).unwrap();

        let summary = acc.finish().unwrap();
        assert!((summary.stats.average_quality - 0.7).abs() < 1e-9);
        assert_eq!(summary.stats.total_normalized, 3);
        assert_eq!(summary.stats.total_with_quality, 2);
        assert_eq!(summary.stats.total_raw, 1);
    }

    #[test]
    fn test_offset_then_limit_flushes_before_signalling() {
        let mut opts = options();
        opts.apply_pagination = true;
        opts.offset = 2;
        opts.limit = 3;

        let mut delivered: Vec<i64> = Vec::new();
        let mut acc = Accumulator::new(&opts, 10, |batch: Vec<UnifiedEntity>| {
            delivered.extend(batch.iter().map(|e| e.id));
            Ok(())
        });

        let mut flows = Vec::new();
        for id in 0..10 {
            let flow = acc.add(entity(id, EntitySource::Raw, None)).unwrap();
            flows.push(flow);
            if flow.should_stop() {
                break;
            }
        }
        let summary = acc.finish().unwrap();

        assert_eq!(flows.len(), 5);
        assert_eq!(flows.last(), Some(&Flow::LimitReached));
        assert_eq!(delivered, vec![2, 3, 4]);
        assert_eq!(summary.total_matched, 5);
        assert!(summary.limit_reached);
    }

    #[test]
    fn test_inline_quality_filter_still_counts_stats() {
        let mut opts = options();
        opts.apply_quality_filter = true;
        opts.quality_min = Some(0.6);

        let mut delivered = 0;
        let mut acc = Accumulator::new(&opts, 10, |batch: Vec<UnifiedEntity>| {
            delivered += batch.len();
            Ok(())
        });
        acc.add(entity(1, EntitySource::Normalized, Some(0.9))).unwrap();
        acc.add(entity(2, EntitySource::Normalized, Some(0.3))).unwrap();
        acc.add(entity(3, EntitySource::Raw, None)).unwrap();
        let summary = acc.finish().unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(summary.total_matched, 1);
        assert_eq!(summary.stats.total_normalized, 2);
        assert!((summary.stats.average_quality - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_consumer_error_propagates() {
        let opts = options();
        let mut acc = Accumulator::new(&opts, 1, |_batch: Vec<UnifiedEntity>| {
            Err(AppError::Internal("consumer closed".to_string()))
        });
        let err = acc.add(entity(1, EntitySource::Raw, None)).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_abandon_drops_pending_batch() {
        let opts = options();
        let mut calls = 0;
        let mut acc = Accumulator::new(&opts, 10, |_batch: Vec<UnifiedEntity>| {
            calls += 1;
            Ok(())
        });
        acc.add(entity(1, EntitySource::Raw, None)).unwrap();
        let summary = acc.abandon();
        assert_eq!(summary.stats.total_raw, 1);
        assert_eq!(calls, 0);
    }
}
