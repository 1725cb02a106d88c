//! Change watcher.
//!
//! Periodically scans auto-deploy projects for upstream commits and
//! redeploys the ones that moved. The scan loop never dies: every failure
//! is logged and the next project (or next tick) proceeds.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wharf_core::project::{Project, ProjectStatus};
use wharf_core::source::SourceSync;
use wharf_core::store::ProjectStore;

use crate::orchestrator::Orchestrator;

/// Upper bound on a single watcher-triggered deploy.
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(300);

/// Watches tracked projects and redeploys on upstream changes.
pub struct Watcher {
    store: ProjectStore,
    source: SourceSync,
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn new(
        store: ProjectStore,
        source: SourceSync,
        orchestrator: Arc<Orchestrator>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { store, source, orchestrator, interval, shutdown_tx, handle: None }
    }

    /// Spawn the scan loop. The first scan runs immediately.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        info!(interval = ?self.interval, "Starting change watcher");

        let store = self.store.clone();
        let source = self.source.clone();
        let orchestrator = self.orchestrator.clone();
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.handle = Some(tokio::spawn(async move {
            scan_once(&store, &source, &orchestrator).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the immediate tick; the scan above covered it
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scan_once(&store, &source, &orchestrator).await;
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Change watcher stopping");
                        break;
                    }
                }
            }
        }));
    }

    /// Signal the loop and wait for it to finish.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// One full scan over the auto-deploy projects.
pub async fn scan_once(store: &ProjectStore, source: &SourceSync, orchestrator: &Arc<Orchestrator>) {
    metrics::counter!("wharf_watcher_scans_total").increment(1);

    let projects = match store.list_auto_deploy().await {
        Ok(projects) => projects,
        Err(e) => {
            warn!("Watcher failed to list projects: {}", e);
            return;
        }
    };

    for project in projects {
        check_project(store, source, orchestrator, &project).await;
    }
}

async fn check_project(
    store: &ProjectStore,
    source: &SourceSync,
    orchestrator: &Arc<Orchestrator>,
    project: &Project,
) {
    if project.git_url.is_empty() {
        return;
    }
    if project.status == ProjectStatus::Deploying {
        debug!(project_id = %project.id, "Skipping project mid-deploy");
        return;
    }
    // First deploys are explicit; a missing checkout means this project
    // has never been deployed and is not ours to clone.
    if !source.exists(project) {
        debug!(project_id = %project.id, "Skipping project without checkout");
        return;
    }

    let remote = match source.has_update(project).await {
        Ok(Some(remote)) => remote,
        Ok(None) => return,
        Err(e) => {
            warn!(project_id = %project.id, "Update check failed: {}", e);
            return;
        }
    };

    info!(project_id = %project.id, commit = %remote, "Upstream change detected, redeploying");

    if let Err(e) = source.ensure(project).await {
        warn!(project_id = %project.id, "Pull failed: {}", e);
        return;
    }
    if let Err(e) = store.update_last_commit(&project.id, &remote).await {
        warn!(project_id = %project.id, "Failed to record commit: {}", e);
        return;
    }

    match tokio::time::timeout(DEPLOY_TIMEOUT, orchestrator.deploy(&project.id)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            // deploy already recorded the error status
            warn!(project_id = %project.id, "Auto-deploy failed: {}", e);
        }
        Err(_) => {
            warn!(project_id = %project.id, "Auto-deploy timed out");
            if let Err(e) = store
                .update_status(&project.id, ProjectStatus::Error, "deploy timed out")
                .await
            {
                warn!(project_id = %project.id, "Failed to record timeout: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{commit_file, init_upstream, MockAdapter};
    use std::sync::atomic::Ordering;
    use wharf_core::project::DeployKind;

    struct Fixture {
        store: ProjectStore,
        source: SourceSync,
        orchestrator: Arc<Orchestrator>,
        adapter: Arc<MockAdapter>,
        _deployments: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        let store = ProjectStore::new_in_memory().await.unwrap();
        let deployments = tempfile::tempdir().unwrap();
        let source = SourceSync::new(deployments.path(), None);
        let adapter = Arc::new(MockAdapter::default());
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            source.clone(),
            adapter.clone(),
            adapter.clone(),
            "localhost",
        ));
        Fixture { store, source, orchestrator, adapter, _deployments: deployments }
    }

    async fn tracked_project(fixture: &Fixture, upstream: &std::path::Path, name: &str) -> Project {
        let mut project = Project::new(name, DeployKind::Image);
        project.git_url = upstream.to_str().unwrap().to_string();
        project.branch = "main".to_string();
        project.auto_deploy = true;
        fixture.store.create(&project).await.unwrap();
        project
    }

    #[tokio::test]
    async fn test_scan_skips_project_without_checkout() {
        let upstream_dir = tempfile::tempdir().unwrap();
        init_upstream(upstream_dir.path());
        let fixture = setup().await;
        let project = tracked_project(&fixture, upstream_dir.path(), "blog").await;

        scan_once(&fixture.store, &fixture.source, &fixture.orchestrator).await;

        assert_eq!(fixture.adapter.bring_ups.load(Ordering::SeqCst), 0);
        assert_eq!(
            fixture.store.get(&project.id).await.unwrap().status,
            ProjectStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_scan_ignores_up_to_date_project() {
        let upstream_dir = tempfile::tempdir().unwrap();
        init_upstream(upstream_dir.path());
        let fixture = setup().await;
        let project = tracked_project(&fixture, upstream_dir.path(), "blog").await;

        // First deploy is explicit.
        fixture.orchestrator.deploy(&project.id).await.unwrap();
        assert_eq!(fixture.adapter.bring_ups.load(Ordering::SeqCst), 1);

        scan_once(&fixture.store, &fixture.source, &fixture.orchestrator).await;
        assert_eq!(fixture.adapter.bring_ups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scan_redeploys_on_upstream_change() {
        let upstream_dir = tempfile::tempdir().unwrap();
        let upstream = init_upstream(upstream_dir.path());
        let fixture = setup().await;
        let project = tracked_project(&fixture, upstream_dir.path(), "blog").await;

        fixture.orchestrator.deploy(&project.id).await.unwrap();
        let first = upstream.head().unwrap().target().unwrap();
        let second = commit_file(&upstream, "app.conf", "v2", &[first]);

        scan_once(&fixture.store, &fixture.source, &fixture.orchestrator).await;

        assert_eq!(fixture.adapter.bring_ups.load(Ordering::SeqCst), 2);
        let loaded = fixture.store.get(&project.id).await.unwrap();
        assert_eq!(loaded.last_commit, second.to_string());
        assert_eq!(loaded.status, ProjectStatus::Running);
    }

    #[tokio::test]
    async fn test_scan_skips_project_marked_deploying() {
        let upstream_dir = tempfile::tempdir().unwrap();
        let upstream = init_upstream(upstream_dir.path());
        let fixture = setup().await;
        let project = tracked_project(&fixture, upstream_dir.path(), "blog").await;

        fixture.orchestrator.deploy(&project.id).await.unwrap();
        let first = upstream.head().unwrap().target().unwrap();
        commit_file(&upstream, "app.conf", "v2", &[first]);
        fixture
            .store
            .update_status(&project.id, ProjectStatus::Deploying, "elsewhere")
            .await
            .unwrap();

        scan_once(&fixture.store, &fixture.source, &fixture.orchestrator).await;
        assert_eq!(fixture.adapter.bring_ups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watcher_start_stop() {
        let fixture = setup().await;
        let mut watcher = Watcher::new(
            fixture.store.clone(),
            fixture.source.clone(),
            fixture.orchestrator.clone(),
            Duration::from_secs(3600),
        );
        watcher.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        watcher.stop().await;
    }
}
