//! Seeding helpers shared by the repository and use-case tests.

use crate::infrastructure::config::DatabaseConfig;
use crate::infrastructure::db::ServiceDb;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use tempfile::TempDir;

pub async fn temp_service_db() -> (TempDir, ServiceDb) {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("service.db"),
        ..DatabaseConfig::default()
    };
    let db = ServiceDb::connect(&config).await.unwrap();
    (dir, db)
}

pub async fn seed_project(pool: &SqlitePool, client_id: i64, name: &str) -> i64 {
    sqlx::query("INSERT INTO client_projects (client_id, name, project_type) VALUES (?, ?, 'counterparty')")
        .bind(client_id)
        .bind(name)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub async fn seed_shard(pool: &SqlitePool, project_id: i64, name: &str, file_path: &Path) -> i64 {
    sqlx::query("INSERT INTO project_databases (client_project_id, name, file_path) VALUES (?, ?, ?)")
        .bind(project_id)
        .bind(name)
        .bind(file_path.to_string_lossy().to_string())
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub async fn deactivate_shard(pool: &SqlitePool, shard_id: i64) {
    sqlx::query("UPDATE project_databases SET is_active = 0 WHERE id = ?")
        .bind(shard_id)
        .execute(pool)
        .await
        .unwrap();
}

/// One catalog row to write into a shard file.
pub struct ShardItem<'a> {
    pub catalog: &'a str,
    pub reference: &'a str,
    pub code: Option<&'a str>,
    pub name: &'a str,
    pub attributes: Option<&'a str>,
}

impl<'a> ShardItem<'a> {
    pub fn new(reference: &'a str, name: &'a str, attributes: Option<&'a str>) -> Self {
        Self {
            catalog: "Counterparties",
            reference,
            code: None,
            name,
            attributes,
        }
    }
}

/// Writes a shard file with a single upload holding `items` in order.
pub async fn write_shard_file(path: &Path, items: &[ShardItem<'_>]) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.unwrap();

    for stmt in [
        "CREATE TABLE uploads (id INTEGER PRIMARY KEY AUTOINCREMENT, uploaded_at TEXT)",
        "CREATE TABLE catalogs (id INTEGER PRIMARY KEY AUTOINCREMENT, upload_id INTEGER NOT NULL, name TEXT NOT NULL)",
        "CREATE TABLE catalog_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            catalog_id INTEGER NOT NULL,
            reference TEXT NOT NULL,
            code TEXT,
            name TEXT NOT NULL,
            attributes_xml TEXT
        )",
    ] {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }

    let upload_id = sqlx::query("INSERT INTO uploads (uploaded_at) VALUES ('2024-01-01')")
        .execute(&pool)
        .await
        .unwrap()
        .last_insert_rowid();

    for item in items {
        let catalog_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM catalogs WHERE upload_id = ? AND name = ?")
                .bind(upload_id)
                .bind(item.catalog)
                .fetch_optional(&pool)
                .await
                .unwrap();
        let catalog_id = match catalog_id {
            Some(id) => id,
            None => sqlx::query("INSERT INTO catalogs (upload_id, name) VALUES (?, ?)")
                .bind(upload_id)
                .bind(item.catalog)
                .execute(&pool)
                .await
                .unwrap()
                .last_insert_rowid(),
        };
        sqlx::query(
            "INSERT INTO catalog_items (catalog_id, reference, code, name, attributes_xml)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(catalog_id)
        .bind(item.reference)
        .bind(item.code)
        .bind(item.name)
        .bind(item.attributes)
        .execute(&pool)
        .await
        .unwrap();
    }

    pool.close().await;
}

pub async fn seed_normalized(
    pool: &SqlitePool,
    project_id: i64,
    name: &str,
    tax_id: Option<&str>,
    quality_score: Option<f64>,
) -> i64 {
    sqlx::query(
        "INSERT INTO normalized_entities
            (client_project_id, source_name, normalized_name, tax_id, quality_score)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(name)
    .bind(name)
    .bind(tax_id)
    .bind(quality_score)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

pub async fn link_normalized_to_shard(
    pool: &SqlitePool,
    entity_id: i64,
    shard_id: i64,
    source_reference: &str,
) {
    sqlx::query(
        "INSERT INTO normalized_entity_shards
            (normalized_entity_id, project_database_id, source_reference, source_name)
         VALUES (?, ?, ?, NULL)",
    )
    .bind(entity_id)
    .bind(shard_id)
    .bind(source_reference)
    .execute(pool)
    .await
    .unwrap();
}
