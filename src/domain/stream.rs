use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{AppError, Result};
use super::project::ClientProject;

/// Which projects a stream covers: one project, or every project of a client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamScope {
    pub client_id: i64,
    pub project_id: Option<i64>,
}

impl StreamScope {
    pub fn client(client_id: i64) -> Self {
        Self {
            client_id,
            project_id: None,
        }
    }

    pub fn project(client_id: i64, project_id: i64) -> Self {
        Self {
            client_id,
            project_id: Some(project_id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    #[default]
    All,
    Raw,
    Normalized,
}

impl SourceFilter {
    pub fn includes_raw(&self) -> bool {
        matches!(self, SourceFilter::All | SourceFilter::Raw)
    }

    pub fn includes_normalized(&self) -> bool {
        matches!(self, SourceFilter::All | SourceFilter::Normalized)
    }
}

impl std::str::FromStr for SourceFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "raw" | "database" => Ok(Self::Raw),
            "normalized" => Ok(Self::Normalized),
            _ => Err(format!("Unknown source filter: {}", s)),
        }
    }
}

/// Immutable description of one streaming request.
///
/// `batch_size == 0` means "use the configured default". `limit == 0` means
/// no limit. `offset`/`limit` and the quality bounds are only applied inline
/// when the matching `apply_*` flag is set; otherwise they are left for the
/// ranking stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamOptions {
    pub scope: StreamScope,
    pub search: String,
    pub source: SourceFilter,
    pub quality_min: Option<f64>,
    pub quality_max: Option<f64>,
    pub batch_size: usize,
    pub apply_quality_filter: bool,
    pub apply_pagination: bool,
    pub offset: usize,
    pub limit: usize,
}

impl StreamOptions {
    pub fn new(scope: StreamScope) -> Self {
        Self {
            scope,
            search: String::new(),
            source: SourceFilter::All,
            quality_min: None,
            quality_max: None,
            batch_size: 0,
            apply_quality_filter: false,
            apply_pagination: false,
            offset: 0,
            limit: 0,
        }
    }

    pub fn effective_batch_size(&self, default: usize) -> usize {
        if self.batch_size > 0 {
            self.batch_size
        } else {
            default.max(1)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.quality_min, self.quality_max) {
            if min > max {
                return Err(AppError::ValidationError(format!(
                    "quality_min ({}) is greater than quality_max ({})",
                    min, max
                )));
            }
        }
        for bound in [self.quality_min, self.quality_max].into_iter().flatten() {
            if bound.is_nan() {
                return Err(AppError::ValidationError(
                    "quality bounds must be numbers".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Inclusive quality bounds. An entity without a score passes only when no
/// lower bound is set.
pub fn passes_quality(score: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(value) = score else {
        return min.is_none();
    };
    if let Some(min) = min {
        if value < min {
            return false;
        }
    }
    if let Some(max) = max {
        if value > max {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamStats {
    pub total_raw: usize,
    pub total_normalized: usize,
    pub total_with_quality: usize,
    pub average_quality: f64,
    pub shards_processed: usize,
    pub shards_failed: usize,
    /// Uploads abandoned after a page read failed inside a readable shard
    pub uploads_skipped: usize,
    pub projects_processed: usize,
    pub processing_time_ms: u64,
}

/// What `stream` hands back alongside the batches already delivered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamReport {
    pub stats: StreamStats,
    pub projects: Vec<ClientProject>,
    pub total_matched: usize,
    pub limit_reached: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    /// Quality desc (nulls last), then name, then id.
    #[default]
    Default,
    Quality,
    Name,
    Source,
    Id,
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Quality => write!(f, "quality"),
            Self::Name => write!(f, "name"),
            Self::Source => write!(f, "source"),
            Self::Id => write!(f, "id"),
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "quality" => Ok(Self::Quality),
            "name" => Ok(Self::Name),
            "source" => Ok(Self::Source),
            "id" => Ok(Self::Id),
            _ => Err(format!("Unknown sort field: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("Unknown sort order: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_source_filter_from_str() {
        assert_eq!(SourceFilter::from_str(""), Ok(SourceFilter::All));
        assert_eq!(SourceFilter::from_str("Raw"), Ok(SourceFilter::Raw));
        assert_eq!(SourceFilter::from_str("database"), Ok(SourceFilter::Raw));
        assert_eq!(SourceFilter::from_str("normalized"), Ok(SourceFilter::Normalized));
        assert!(SourceFilter::from_str("both").is_err());

        assert!(SourceFilter::All.includes_raw() && SourceFilter::All.includes_normalized());
        assert!(!SourceFilter::Raw.includes_normalized());
        assert!(!SourceFilter::Normalized.includes_raw());
    }

    #[test]
    fn test_passes_quality_bounds() {
        assert!(passes_quality(None, None, None));
        assert!(passes_quality(None, None, Some(0.5)));
        assert!(!passes_quality(None, Some(0.1), None));
        assert!(passes_quality(Some(0.5), Some(0.5), Some(0.5)));
        assert!(!passes_quality(Some(0.49), Some(0.5), None));
        assert!(!passes_quality(Some(0.91), None, Some(0.9)));
    }

    #[test]
    fn test_options_validation_and_batch_default() {
        let mut opts = StreamOptions::new(StreamScope::client(1));
        assert_eq!(opts.effective_batch_size(1000), 1000);
        opts.batch_size = 25;
        assert_eq!(opts.effective_batch_size(1000), 25);

        assert!(opts.validate().is_ok());
        opts.quality_min = Some(0.8);
        opts.quality_max = Some(0.2);
        assert!(matches!(opts.validate(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_sort_field_from_str() {
        assert_eq!(SortField::from_str(""), Ok(SortField::Default));
        assert_eq!(SortField::from_str("QUALITY"), Ok(SortField::Quality));
        assert_eq!(SortField::from_str("id"), Ok(SortField::Id));
        assert!(SortField::from_str("created").is_err());
        assert_eq!(SortOrder::from_str("Desc"), Ok(SortOrder::Desc));
    }
}
