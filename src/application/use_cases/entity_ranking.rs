//! Ranking & pagination over a fully collected entity set.

use crate::domain::entity::UnifiedEntity;
use crate::domain::stream::{passes_quality, SortField, SortOrder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RankingOptions {
    pub quality_min: Option<f64>,
    pub quality_max: Option<f64>,
    pub sort_by: SortField,
    /// `None` keeps the field's natural direction.
    pub order: Option<SortOrder>,
    pub offset: usize,
    /// 0 means no limit.
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedPage {
    pub entities: Vec<UnifiedEntity>,
    /// Size of the filtered set before slicing
    pub total_count: usize,
}

pub fn rank(entities: Vec<UnifiedEntity>, options: &RankingOptions) -> RankedPage {
    let mut filtered = filter_by_quality(entities, options.quality_min, options.quality_max);
    sort_entities(&mut filtered, options.sort_by, options.order);
    let total_count = filtered.len();
    RankedPage {
        entities: paginate(filtered, options.offset, options.limit),
        total_count,
    }
}

/// Same bounds semantics as the inline filter in the aggregator.
pub fn filter_by_quality(
    entities: Vec<UnifiedEntity>,
    min: Option<f64>,
    max: Option<f64>,
) -> Vec<UnifiedEntity> {
    if min.is_none() && max.is_none() {
        return entities;
    }
    entities
        .into_iter()
        .filter(|e| passes_quality(e.quality_score, min, max))
        .collect()
}

/// Sorts in place. The entity key is the last tie-break, so the result does
/// not depend on input order.
pub fn sort_entities(entities: &mut [UnifiedEntity], field: SortField, order: Option<SortOrder>) {
    entities.sort_by(|a, b| compare(a, b, field, order).then_with(|| a.key().cmp(&b.key())));
}

/// `[offset, offset + limit)` clamped to the slice.
pub fn paginate(entities: Vec<UnifiedEntity>, offset: usize, limit: usize) -> Vec<UnifiedEntity> {
    if offset >= entities.len() {
        return Vec::new();
    }
    let take = if limit == 0 { usize::MAX } else { limit };
    entities.into_iter().skip(offset).take(take).collect()
}

fn compare(a: &UnifiedEntity, b: &UnifiedEntity, field: SortField, order: Option<SortOrder>) -> Ordering {
    let natural = match field {
        SortField::Default | SortField::Quality => SortOrder::Desc,
        SortField::Name | SortField::Source | SortField::Id => SortOrder::Asc,
    };
    let descending = order.unwrap_or(natural) == SortOrder::Desc;

    match field {
        SortField::Quality => compare_quality(a.quality_score, b.quality_score, descending),
        SortField::Name => directed(compare_names(a, b), descending),
        SortField::Source => directed(a.source.cmp(&b.source), descending),
        SortField::Id => directed(a.id.cmp(&b.id), descending),
        // Name and id follow the quality direction inverted, so the default
        // reads "best first, then alphabetical"
        SortField::Default => compare_quality(a.quality_score, b.quality_score, descending)
            .then_with(|| directed(compare_names(a, b), !descending))
            .then_with(|| directed(a.id.cmp(&b.id), !descending)),
    }
}

/// Missing scores sort last in either direction.
fn compare_quality(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(x.total_cmp(&y), descending),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_names(a: &UnifiedEntity, b: &UnifiedEntity) -> Ordering {
    a.name.to_lowercase().cmp(&b.name.to_lowercase())
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}
