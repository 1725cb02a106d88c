//! Shared fixtures for daemon tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use wharf_core::error::{Result, WharfError};
use wharf_core::project::Project;
use wharf_core::runtime::RuntimeAdapter;

/// Scriptable in-memory runtime adapter.
#[derive(Default)]
pub struct MockAdapter {
    /// Fail bring_up with a start error.
    pub fail_bring_up: bool,
    /// Fail restart.
    pub fail_restart: bool,
    /// When set, bring_up blocks until the notify fires.
    pub gate: Option<Arc<Notify>>,
    pub bring_ups: AtomicUsize,
    pub tear_downs: AtomicUsize,
    pub restarts: AtomicUsize,
}

#[async_trait]
impl RuntimeAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn bring_up(&self, project: &Project, _base_domain: &str) -> Result<Vec<String>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.bring_ups.fetch_add(1, Ordering::SeqCst);
        if self.fail_bring_up {
            return Err(WharfError::ContainerStartFailed {
                project: project.name.clone(),
                reason: "mock failure".to_string(),
            });
        }
        Ok(vec![format!("mock-{}", project.name)])
    }

    async fn tear_down(&self, _project: &Project) -> Result<()> {
        self.tear_downs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn restart(&self, _project: &Project, _base_domain: &str) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        if self.fail_restart {
            return Err(WharfError::DockerError("mock restart failure".to_string()));
        }
        Ok(())
    }

    async fn logs(&self, _project: &Project, _tail: usize) -> Result<Vec<String>> {
        Ok(vec!["mock log line".to_string()])
    }
}

/// Adapter whose tear_down always fails, for best-effort removal tests.
pub struct FailingTeardownAdapter;

#[async_trait]
impl RuntimeAdapter for FailingTeardownAdapter {
    fn name(&self) -> &'static str {
        "failing-teardown"
    }

    async fn bring_up(&self, _project: &Project, _base_domain: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn tear_down(&self, _project: &Project) -> Result<()> {
        Err(WharfError::DockerError("teardown refused".to_string()))
    }

    async fn restart(&self, _project: &Project, _base_domain: &str) -> Result<()> {
        Ok(())
    }

    async fn logs(&self, _project: &Project, _tail: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Create a git repo with one commit on a `main` branch.
pub fn init_upstream(dir: &Path) -> git2::Repository {
    let repo = git2::Repository::init(dir).unwrap();
    {
        let oid = commit_file(&repo, "app.conf", "v1", &[]);
        let commit = repo.find_commit(oid).unwrap();
        repo.branch("main", &commit, true).unwrap();
        repo.set_head("refs/heads/main").unwrap();
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force())).unwrap();
    }
    repo
}

pub fn commit_file(
    repo: &git2::Repository,
    name: &str,
    content: &str,
    parents: &[git2::Oid],
) -> git2::Oid {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(name), content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = git2::Signature::now("tester", "tester@example.com").unwrap();
    let parent_commits: Vec<_> = parents.iter().map(|oid| repo.find_commit(*oid).unwrap()).collect();
    let parent_refs: Vec<_> = parent_commits.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parent_refs).unwrap()
}
