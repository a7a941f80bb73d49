use crate::application::use_cases::entity_stream::sources::ProjectDirectory;
use crate::domain::error::{AppError, Result};
use crate::domain::project::{ClientProject, DataShard};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

use super::millis_to_utc;

#[derive(Clone)]
pub struct ProjectRepository {
    pool: SqlitePool,
}

impl ProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_project(&self, project_id: i64) -> Result<ClientProject> {
        let project = sqlx::query_as::<_, ClientProjectEntity>(
            "SELECT id, client_id, name, project_type, status
             FROM client_projects WHERE id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch project: {e}")))?;

        match project {
            Some(project) => Ok(project.into()),
            None => Err(AppError::NotFound(format!(
                "Client project not found: {}",
                project_id
            ))),
        }
    }

    pub async fn projects_for_client(&self, client_id: i64) -> Result<Vec<ClientProject>> {
        let projects = sqlx::query_as::<_, ClientProjectEntity>(
            "SELECT id, client_id, name, project_type, status
             FROM client_projects WHERE client_id = ? ORDER BY id",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list client projects: {e}")))?;

        Ok(projects.into_iter().map(|p| p.into()).collect())
    }

    /// All shards of a project, active or not, in registration order.
    pub async fn shards_for_project(&self, project_id: i64) -> Result<Vec<DataShard>> {
        let shards = sqlx::query_as::<_, DataShardEntity>(
            "SELECT id, client_project_id, name, file_path, is_active, last_used_at
             FROM project_databases WHERE client_project_id = ? ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list project shards: {e}")))?;

        Ok(shards.into_iter().map(|s| s.into()).collect())
    }
}

#[async_trait]
impl ProjectDirectory for ProjectRepository {
    async fn get_project(&self, project_id: i64) -> Result<ClientProject> {
        ProjectRepository::get_project(self, project_id).await
    }

    async fn projects_for_client(&self, client_id: i64) -> Result<Vec<ClientProject>> {
        ProjectRepository::projects_for_client(self, client_id).await
    }

    async fn shards_for_project(&self, project_id: i64) -> Result<Vec<DataShard>> {
        ProjectRepository::shards_for_project(self, project_id).await
    }
}

#[derive(sqlx::FromRow)]
struct ClientProjectEntity {
    id: i64,
    client_id: i64,
    name: String,
    project_type: Option<String>,
    status: String,
}

impl From<ClientProjectEntity> for ClientProject {
    fn from(entity: ClientProjectEntity) -> Self {
        Self {
            id: entity.id,
            client_id: entity.client_id,
            name: entity.name,
            project_type: entity.project_type,
            status: entity.status,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DataShardEntity {
    id: i64,
    client_project_id: i64,
    name: String,
    file_path: String,
    is_active: i64,
    last_used_at: Option<i64>,
}

impl From<DataShardEntity> for DataShard {
    fn from(entity: DataShardEntity) -> Self {
        Self {
            id: entity.id,
            project_id: entity.client_project_id,
            name: entity.name,
            file_path: PathBuf::from(entity.file_path),
            is_active: entity.is_active != 0,
            last_used_at: entity.last_used_at.map(millis_to_utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::test_support::{
        deactivate_shard, seed_project, seed_shard, temp_service_db,
    };

    #[tokio::test]
    async fn test_projects_and_shards_by_scope() {
        let (dir, db) = temp_service_db().await;
        let alpha = seed_project(db.pool(), 1, "Alpha").await;
        let beta = seed_project(db.pool(), 1, "Beta").await;
        seed_project(db.pool(), 2, "Other client").await;
        let a = seed_shard(db.pool(), alpha, "a", &dir.path().join("a.db")).await;
        let b = seed_shard(db.pool(), alpha, "b", &dir.path().join("b.db")).await;
        deactivate_shard(db.pool(), b).await;

        let repo = ProjectRepository::new(db.pool().clone());
        let names: Vec<String> = repo
            .projects_for_client(1)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);

        let shards = repo.shards_for_project(alpha).await.unwrap();
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].id, a);
        assert!(shards[0].is_active);
        assert!(!shards[1].is_active);
        assert_eq!(shards[0].file_path, dir.path().join("a.db"));
        assert!(repo.shards_for_project(beta).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let (_dir, db) = temp_service_db().await;
        let repo = ProjectRepository::new(db.pool().clone());
        assert!(matches!(
            repo.get_project(42).await,
            Err(AppError::NotFound(_))
        ));
    }
}
