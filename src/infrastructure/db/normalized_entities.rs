use crate::application::use_cases::entity_stream::sources::NormalizedStore;
use crate::domain::entity::{NormalizedEntityRecord, ShardRef};
use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::QueryBuilder;
use std::collections::HashMap;

/// Columns the free-text search is pushed into.
const SEARCH_COLUMNS: [&str; 9] = [
    "normalized_name",
    "source_name",
    "tax_id",
    "bin",
    "legal_address",
    "postal_address",
    "contact_email",
    "contact_phone",
    "contact_person",
];

#[derive(Clone)]
pub struct NormalizedEntityRepository {
    pool: SqlitePool,
}

impl NormalizedEntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn fetch_page(
        &self,
        project_id: i64,
        search: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<NormalizedEntityRecord>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, client_project_id, source_reference, source_name, normalized_name,
                    tax_id, kpp, bin, legal_address, postal_address, contact_phone,
                    contact_email, contact_person, legal_form, quality_score,
                    source_enrichment, subcategory
             FROM normalized_entities WHERE client_project_id = ",
        );
        query.push_bind(project_id);
        query.push(" AND id > ");
        query.push_bind(after_id);

        let search = search.trim();
        if !search.is_empty() {
            let pattern = search_pattern(search);
            query.push(" AND (");
            let mut columns = query.separated(" OR ");
            for column in SEARCH_COLUMNS {
                columns.push(format!("COALESCE({column}, '') REGEXP "));
                columns.push_bind_unseparated(pattern.clone());
            }
            query.push(")");
        }

        query.push(" ORDER BY id ASC LIMIT ");
        query.push_bind(limit.max(1) as i64);

        let rows = query
            .build_query_as::<NormalizedEntityEntity>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to fetch normalized entities: {e}"))
            })?;

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut links = self.shard_links(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let shards = links.remove(&row.id).unwrap_or_default();
                row.into_record(shards)
            })
            .collect())
    }

    /// Shard links for a page of records, loaded in one query.
    async fn shard_links(&self, entity_ids: &[i64]) -> Result<HashMap<i64, Vec<ShardRef>>> {
        let mut links: HashMap<i64, Vec<ShardRef>> = HashMap::new();
        if entity_ids.is_empty() {
            return Ok(links);
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT s.normalized_entity_id, s.project_database_id, d.name AS shard_name,
                    s.source_reference, s.source_name
             FROM normalized_entity_shards s
             JOIN project_databases d ON d.id = s.project_database_id
             WHERE s.normalized_entity_id IN (",
        );
        let mut ids = query.separated(", ");
        for id in entity_ids {
            ids.push_bind(*id);
        }
        query.push(") ORDER BY s.normalized_entity_id, s.id");

        let rows = query
            .build_query_as::<ShardLinkEntity>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch shard links: {e}")))?;

        for row in rows {
            links
                .entry(row.normalized_entity_id)
                .or_default()
                .push(ShardRef {
                    shard_id: row.project_database_id,
                    shard_name: row.shard_name,
                    source_reference: row.source_reference,
                    source_name: row.source_name,
                });
        }
        Ok(links)
    }
}

#[async_trait]
impl NormalizedStore for NormalizedEntityRepository {
    async fn fetch_page(
        &self,
        project_id: i64,
        search: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<NormalizedEntityRecord>> {
        NormalizedEntityRepository::fetch_page(self, project_id, search, after_id, limit).await
    }
}

/// Literal, Unicode case-insensitive match for the store's `REGEXP`
/// function, so Cyrillic folds the same way as in-memory search.
fn search_pattern(search: &str) -> String {
    format!("(?i){}", regex::escape(search))
}

#[derive(sqlx::FromRow)]
struct NormalizedEntityEntity {
    id: i64,
    client_project_id: i64,
    source_reference: Option<String>,
    source_name: Option<String>,
    normalized_name: String,
    tax_id: Option<String>,
    kpp: Option<String>,
    bin: Option<String>,
    legal_address: Option<String>,
    postal_address: Option<String>,
    contact_phone: Option<String>,
    contact_email: Option<String>,
    contact_person: Option<String>,
    legal_form: Option<String>,
    quality_score: Option<f64>,
    source_enrichment: Option<String>,
    subcategory: Option<String>,
}

impl NormalizedEntityEntity {
    fn into_record(self, shards: Vec<ShardRef>) -> NormalizedEntityRecord {
        NormalizedEntityRecord {
            id: self.id,
            project_id: self.client_project_id,
            source_reference: self.source_reference,
            source_name: self.source_name,
            normalized_name: self.normalized_name,
            tax_id: self.tax_id,
            kpp: self.kpp,
            bin: self.bin,
            legal_address: self.legal_address,
            postal_address: self.postal_address,
            contact_phone: self.contact_phone,
            contact_email: self.contact_email,
            contact_person: self.contact_person,
            legal_form: self.legal_form,
            quality_score: self.quality_score,
            source_enrichment: self.source_enrichment,
            subcategory: self.subcategory,
            shards,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ShardLinkEntity {
    normalized_entity_id: i64,
    project_database_id: i64,
    shard_name: String,
    source_reference: Option<String>,
    source_name: Option<String>,
}
