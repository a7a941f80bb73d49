//! Entity record shapes: what is read from shards, what the normalized store
//! holds, and the unified view handed to callers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Where a unified entity came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntitySource {
    Raw,
    Normalized,
}

impl EntitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitySource::Raw => "raw",
            EntitySource::Normalized => "normalized",
        }
    }
}

impl fmt::Display for EntitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Ord for EntitySource {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for EntitySource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A record read from a shard catalog. Ephemeral, produced per read.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntityRecord {
    pub id: i64,
    pub catalog_id: i64,
    pub reference: String,
    pub code: Option<String>,
    pub name: String,
    pub attributes: Option<String>,
}

/// Link between a normalized record and a shard it was observed in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShardRef {
    pub shard_id: i64,
    pub shard_name: String,
    pub source_reference: Option<String>,
    pub source_name: Option<String>,
}

/// A previously reconciled record from the central store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedEntityRecord {
    pub id: i64,
    pub project_id: i64,
    pub source_reference: Option<String>,
    pub source_name: Option<String>,
    pub normalized_name: String,
    pub tax_id: Option<String>,
    pub kpp: Option<String>,
    pub bin: Option<String>,
    pub legal_address: Option<String>,
    pub postal_address: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub contact_person: Option<String>,
    pub legal_form: Option<String>,
    pub quality_score: Option<f64>,
    pub source_enrichment: Option<String>,
    pub subcategory: Option<String>,
    pub shards: Vec<ShardRef>,
}

/// Stable identity of a unified entity. Raw ids are only unique within a
/// shard, so the shard id is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub source: EntitySource,
    pub shard_id: Option<i64>,
    pub id: i64,
}

/// Output shape of the aggregator: a superset of raw and normalized fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnifiedEntity {
    pub id: i64,
    pub source: EntitySource,
    pub name: String,
    pub project_id: i64,
    pub project_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kpp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shards: Vec<ShardRef>,
}

impl UnifiedEntity {
    pub fn key(&self) -> EntityKey {
        let shard_id = match self.source {
            EntitySource::Raw => self.shard_id,
            EntitySource::Normalized => None,
        };
        EntityKey {
            source: self.source,
            shard_id,
            id: self.id,
        }
    }

    /// Case-insensitive substring match over the identifying fields.
    pub fn matches_search(&self, search: &str) -> bool {
        let needle = search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let contains = |value: Option<&str>| {
            value
                .map(|v| v.to_lowercase().contains(&needle))
                .unwrap_or(false)
        };
        contains(Some(&self.name))
            || contains(self.tax_id.as_deref())
            || contains(self.bin.as_deref())
            || contains(self.normalized_name.as_deref())
            || contains(self.source_name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> UnifiedEntity {
        UnifiedEntity {
            id: 3,
            source: EntitySource::Raw,
            name: name.to_string(),
            project_id: 1,
            project_name: "Alpha".to_string(),
            shard_id: Some(10),
            shard_name: Some("shard-a".to_string()),
            reference: None,
            code: None,
            attributes: None,
            normalized_name: None,
            source_name: None,
            source_reference: None,
            tax_id: Some("7707083893".to_string()),
            kpp: None,
            bin: None,
            legal_address: None,
            postal_address: None,
            contact_phone: None,
            contact_email: None,
            contact_person: None,
            quality_score: None,
            shards: Vec::new(),
        }
    }

    #[test]
    fn test_search_matches_name_and_tax_id_case_insensitively() {
        let e = entity("ООО Ромашка");
        assert!(e.matches_search("ромашка"));
        assert!(e.matches_search("70830"));
        assert!(e.matches_search(""));
        assert!(!e.matches_search("лютик"));
    }

    #[test]
    fn test_raw_key_includes_shard() {
        let mut a = entity("A");
        let mut b = entity("A");
        b.shard_id = Some(11);
        assert_ne!(a.key(), b.key());

        a.source = EntitySource::Normalized;
        assert_eq!(a.key().shard_id, None);
    }

    #[test]
    fn test_source_serializes_as_lowercase_tag() {
        assert_eq!(EntitySource::Raw.to_string(), "raw");
        assert_eq!(EntitySource::Normalized.to_string(), "normalized");
        assert!(EntitySource::Normalized < EntitySource::Raw);
    }

    #[test]
    fn test_json_shape_skips_missing_fields() {
        let value = serde_json::to_value(entity("Acme")).unwrap();
        assert_eq!(value["source"], "raw");
        assert_eq!(value["tax_id"], "7707083893");
        assert!(value.get("quality_score").is_none());
        assert!(value.get("shards").is_none());

        let back: UnifiedEntity = serde_json::from_value(value).unwrap();
        assert_eq!(back, entity("Acme"));
    }
}
