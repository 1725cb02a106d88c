//! Tests for the project store.

use super::*;
use crate::project::{DeployKind, Project, ProjectStatus};

fn sample_project(name: &str) -> Project {
    let mut p = Project::new(name, DeployKind::Image);
    p.git_url = "https://git.example.com/acme/blog.git".to_string();
    p.image = "ghcr.io/acme/blog:latest".to_string();
    p.use_subdomain = true;
    p.port = 3000;
    p.env_vars.insert("NODE_ENV".to_string(), "production".to_string());
    p.auto_deploy = true;
    p
}

#[tokio::test]
async fn test_create_and_get() {
    let store = ProjectStore::new_in_memory().await.unwrap();
    let project = sample_project("blog");

    store.create(&project).await.unwrap();

    let loaded = store.get(&project.id).await.unwrap();
    assert_eq!(loaded.name, "blog");
    assert_eq!(loaded.deploy_kind, DeployKind::Image);
    assert_eq!(loaded.port, 3000);
    assert_eq!(loaded.env_vars.get("NODE_ENV"), Some(&"production".to_string()));
    assert_eq!(loaded.status, ProjectStatus::Pending);
    assert!(loaded.auto_deploy);

    let by_name = store.get_by_name("blog").await.unwrap();
    assert_eq!(by_name.id, project.id);
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let store = ProjectStore::new_in_memory().await.unwrap();
    let err = store.get("no-such-id").await.unwrap_err();
    assert!(matches!(err, WharfError::ProjectNotFound { .. }));
}

#[tokio::test]
async fn test_duplicate_name_is_conflict() {
    let store = ProjectStore::new_in_memory().await.unwrap();
    store.create(&sample_project("blog")).await.unwrap();

    let err = store.create(&sample_project("blog")).await.unwrap_err();
    assert!(matches!(err, WharfError::ProjectExists { .. }));
}

#[tokio::test]
async fn test_list_and_list_auto_deploy() {
    let store = ProjectStore::new_in_memory().await.unwrap();
    let mut manual = sample_project("manual");
    manual.auto_deploy = false;
    store.create(&manual).await.unwrap();
    store.create(&sample_project("tracked")).await.unwrap();

    assert_eq!(store.list().await.unwrap().len(), 2);

    let tracked = store.list_auto_deploy().await.unwrap();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].name, "tracked");
}

#[tokio::test]
async fn test_update_full_record() {
    let store = ProjectStore::new_in_memory().await.unwrap();
    let mut project = sample_project("blog");
    store.create(&project).await.unwrap();

    project.domain = "blog.example.com".to_string();
    project.port = 8080;
    store.update(&project).await.unwrap();

    let loaded = store.get(&project.id).await.unwrap();
    assert_eq!(loaded.domain, "blog.example.com");
    assert_eq!(loaded.port, 8080);
    assert!(loaded.updated_at >= project.updated_at);
}

#[tokio::test]
async fn test_update_missing_is_not_found() {
    let store = ProjectStore::new_in_memory().await.unwrap();
    let err = store.update(&sample_project("ghost")).await.unwrap_err();
    assert!(matches!(err, WharfError::ProjectNotFound { .. }));
}

#[tokio::test]
async fn test_status_and_commit_updates() {
    let store = ProjectStore::new_in_memory().await.unwrap();
    let project = sample_project("blog");
    store.create(&project).await.unwrap();

    store.update_status(&project.id, ProjectStatus::Deploying, "deploy started").await.unwrap();
    store.update_last_commit(&project.id, "abc123").await.unwrap();
    store
        .update_container_ids(&project.id, &["c1".to_string(), "c2".to_string()])
        .await
        .unwrap();

    let loaded = store.get(&project.id).await.unwrap();
    assert_eq!(loaded.status, ProjectStatus::Deploying);
    assert_eq!(loaded.status_msg, "deploy started");
    assert_eq!(loaded.last_commit, "abc123");
    assert_eq!(loaded.container_ids, vec!["c1".to_string(), "c2".to_string()]);
}

#[tokio::test]
async fn test_delete() {
    let store = ProjectStore::new_in_memory().await.unwrap();
    let project = sample_project("blog");
    store.create(&project).await.unwrap();

    store.delete(&project.id).await.unwrap();
    assert!(matches!(
        store.get(&project.id).await.unwrap_err(),
        WharfError::ProjectNotFound { .. }
    ));
    assert!(matches!(
        store.delete(&project.id).await.unwrap_err(),
        WharfError::ProjectNotFound { .. }
    ));
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wharf.db");

    {
        let store = ProjectStore::new(&db_path).await.unwrap();
        store.create(&sample_project("blog")).await.unwrap();
    }

    // Reopening runs migrations again against the existing schema.
    let store = ProjectStore::new(&db_path).await.unwrap();
    assert_eq!(store.list().await.unwrap().len(), 1);
}
