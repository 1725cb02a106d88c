//! Project persistence with SQLite.
//!
//! The ProjectStore owns all durable state for wharf: the project records,
//! their deploy status, and the container IDs from the last deploy.

use crate::error::{Result, WharfError};
use crate::project::{DeployKind, Project, ProjectStatus};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, instrument};

pub mod migrations;

#[cfg(test)]
mod tests;

/// Persistent store for project records.
#[derive(Clone)]
pub struct ProjectStore {
    pool: SqlitePool,
}

impl ProjectStore {
    /// Create a new ProjectStore with an in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    /// Create a new ProjectStore with a database at the specified path.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Initializing project store at {:?}", db_path);

        if db_path != Path::new(":memory:") {
            if let Some(parent) = db_path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    WharfError::InvalidConfig {
                        reason: format!("Failed to create directory {}: {}", parent.display(), e),
                    }
                })?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(db_path.to_str().ok_or_else(|| {
            WharfError::InvalidConfig { reason: "Invalid database path".to_string() }
        })?)
        .map_err(|e| WharfError::DatabaseError(e.to_string()))?;

        options = options.create_if_missing(true).log_statements(tracing::log::LevelFilter::Debug);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| WharfError::DatabaseError(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!("Project store initialized");
        Ok(store)
    }

    #[instrument(skip(self))]
    async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    /// Insert a new project. A duplicate name is a conflict, not a
    /// database error.
    #[instrument(skip(self, project), fields(project_id = %project.id, name = %project.name))]
    pub async fn create(&self, project: &Project) -> Result<()> {
        let env_vars = serde_json::to_string(&project.env_vars)
            .map_err(|e| WharfError::DatabaseError(format!("Failed to serialize env vars: {}", e)))?;
        let container_ids = serde_json::to_string(&project.container_ids).map_err(|e| {
            WharfError::DatabaseError(format!("Failed to serialize container ids: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO projects (
                id, name, git_url, branch, deploy_kind, image, domain, use_subdomain,
                port, env_vars, auto_deploy, last_commit, status, status_msg,
                container_ids, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.git_url)
        .bind(&project.branch)
        .bind(project.deploy_kind.as_str())
        .bind(&project.image)
        .bind(&project.domain)
        .bind(project.use_subdomain as i64)
        .bind(project.port as i64)
        .bind(env_vars)
        .bind(project.auto_deploy as i64)
        .bind(&project.last_commit)
        .bind(project.status.as_str())
        .bind(&project.status_msg)
        .bind(container_ids)
        .bind(project.created_at.to_rfc3339())
        .bind(project.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                WharfError::ProjectExists { name: project.name.clone() }
            }
            _ => {
                metrics::counter!("wharf_db_errors_total", "operation" => "create").increment(1);
                WharfError::DatabaseError(e.to_string())
            }
        })?;

        Ok(())
    }

    /// Get a project by ID.
    #[instrument(skip(self), fields(project_id = %id))]
    pub async fn get(&self, id: &str) -> Result<Project> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                metrics::counter!("wharf_db_errors_total", "operation" => "get").increment(1);
                WharfError::DatabaseError(e.to_string())
            })?;

        match row {
            Some(row) => row_to_project(row),
            None => Err(WharfError::ProjectNotFound { project: id.to_string() }),
        }
    }

    /// Get a project by its unique name.
    #[instrument(skip(self), fields(name = %name))]
    pub async fn get_by_name(&self, name: &str) -> Result<Project> {
        let row = sqlx::query("SELECT * FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| WharfError::DatabaseError(e.to_string()))?;

        match row {
            Some(row) => row_to_project(row),
            None => Err(WharfError::ProjectNotFound { project: name.to_string() }),
        }
    }

    /// List all projects, oldest first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WharfError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(row_to_project).collect()
    }

    /// List projects with auto-deploy enabled.
    #[instrument(skip(self))]
    pub async fn list_auto_deploy(&self) -> Result<Vec<Project>> {
        let rows =
            sqlx::query("SELECT * FROM projects WHERE auto_deploy = 1 ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| WharfError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(row_to_project).collect()
    }

    /// Update a full project record. The stored updated_at is bumped.
    #[instrument(skip(self, project), fields(project_id = %project.id))]
    pub async fn update(&self, project: &Project) -> Result<()> {
        let env_vars = serde_json::to_string(&project.env_vars)
            .map_err(|e| WharfError::DatabaseError(format!("Failed to serialize env vars: {}", e)))?;
        let container_ids = serde_json::to_string(&project.container_ids).map_err(|e| {
            WharfError::DatabaseError(format!("Failed to serialize container ids: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE projects SET
                name = ?, git_url = ?, branch = ?, deploy_kind = ?, image = ?,
                domain = ?, use_subdomain = ?, port = ?, env_vars = ?, auto_deploy = ?,
                last_commit = ?, status = ?, status_msg = ?, container_ids = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&project.name)
        .bind(&project.git_url)
        .bind(&project.branch)
        .bind(project.deploy_kind.as_str())
        .bind(&project.image)
        .bind(&project.domain)
        .bind(project.use_subdomain as i64)
        .bind(project.port as i64)
        .bind(env_vars)
        .bind(project.auto_deploy as i64)
        .bind(&project.last_commit)
        .bind(project.status.as_str())
        .bind(&project.status_msg)
        .bind(container_ids)
        .bind(Utc::now().to_rfc3339())
        .bind(&project.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::counter!("wharf_db_errors_total", "operation" => "update").increment(1);
            WharfError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            return Err(WharfError::ProjectNotFound { project: project.id.clone() });
        }

        Ok(())
    }

    /// Update project status and status message.
    #[instrument(skip(self), fields(project_id = %id, status = %status))]
    pub async fn update_status(&self, id: &str, status: ProjectStatus, msg: &str) -> Result<()> {
        sqlx::query("UPDATE projects SET status = ?, status_msg = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(msg)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Record the container IDs serving a project.
    #[instrument(skip(self, container_ids), fields(project_id = %id))]
    pub async fn update_container_ids(&self, id: &str, container_ids: &[String]) -> Result<()> {
        let json = serde_json::to_string(container_ids).map_err(|e| {
            WharfError::DatabaseError(format!("Failed to serialize container ids: {}", e))
        })?;

        sqlx::query("UPDATE projects SET container_ids = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Record the last deployed commit.
    #[instrument(skip(self), fields(project_id = %id))]
    pub async fn update_last_commit(&self, id: &str, commit: &str) -> Result<()> {
        sqlx::query("UPDATE projects SET last_commit = ?, updated_at = ? WHERE id = ?")
            .bind(commit)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| WharfError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    /// Delete a project record.
    #[instrument(skip(self), fields(project_id = %id))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                metrics::counter!("wharf_db_errors_total", "operation" => "delete").increment(1);
                WharfError::DatabaseError(e.to_string())
            })?;

        if result.rows_affected() == 0 {
            return Err(WharfError::ProjectNotFound { project: id.to_string() });
        }

        Ok(())
    }
}

fn row_to_project(row: sqlx::sqlite::SqliteRow) -> Result<Project> {
    let env_vars_json: String = row.get("env_vars");
    let env_vars = serde_json::from_str(&env_vars_json)
        .map_err(|e| WharfError::DatabaseError(format!("Failed to deserialize env vars: {}", e)))?;

    let container_ids_json: String = row.get("container_ids");
    let container_ids = serde_json::from_str(&container_ids_json).map_err(|e| {
        WharfError::DatabaseError(format!("Failed to deserialize container ids: {}", e))
    })?;

    let deploy_kind_str: String = row.get("deploy_kind");
    let deploy_kind = DeployKind::parse(&deploy_kind_str)
        .map_err(|_| WharfError::DatabaseError(format!("Bad deploy kind '{}'", deploy_kind_str)))?;

    let status_str: String = row.get("status");
    let status = ProjectStatus::parse(&status_str);

    Ok(Project {
        id: row.get("id"),
        name: row.get("name"),
        git_url: row.get("git_url"),
        branch: row.get("branch"),
        deploy_kind,
        image: row.get("image"),
        domain: row.get("domain"),
        use_subdomain: row.get::<i64, _>("use_subdomain") != 0,
        port: row.get::<i64, _>("port") as u16,
        env_vars,
        auto_deploy: row.get::<i64, _>("auto_deploy") != 0,
        last_commit: row.get("last_commit"),
        status,
        status_msg: row.get("status_msg"),
        container_ids,
        created_at: parse_timestamp(row.get("created_at"))?,
        updated_at: parse_timestamp(row.get("updated_at"))?,
    })
}

fn parse_timestamp(raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| WharfError::DatabaseError(format!("Bad timestamp '{}': {}", raw, e)))
}
