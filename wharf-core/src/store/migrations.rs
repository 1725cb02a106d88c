//! Database migrations.

use crate::error::{Result, WharfError};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 1;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| WharfError::MigrationFailed { reason: e.to_string() })?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| WharfError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(|e| WharfError::MigrationFailed { reason: e.to_string() })?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await
        .map_err(|e| WharfError::MigrationFailed { reason: e.to_string() })?;

    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT UNIQUE NOT NULL,
            git_url TEXT NOT NULL DEFAULT '',
            branch TEXT NOT NULL DEFAULT 'main',
            deploy_kind TEXT NOT NULL,
            image TEXT NOT NULL DEFAULT '',
            domain TEXT NOT NULL DEFAULT '',
            use_subdomain INTEGER NOT NULL DEFAULT 0,
            port INTEGER NOT NULL DEFAULT 0,
            env_vars TEXT NOT NULL DEFAULT '{}',
            auto_deploy INTEGER NOT NULL DEFAULT 0,
            last_commit TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            status_msg TEXT NOT NULL DEFAULT '',
            container_ids TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| WharfError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status)")
        .execute(pool)
        .await
        .map_err(|e| WharfError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_auto_deploy ON projects(auto_deploy)")
        .execute(pool)
        .await
        .map_err(|e| WharfError::MigrationFailed { reason: e.to_string() })?;

    Ok(())
}
