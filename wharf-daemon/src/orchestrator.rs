//! Deploy pipeline and project lifecycle.
//!
//! The orchestrator owns the state machine: it is the only component that
//! moves a project between pending, deploying, running, stopped and error,
//! and the only place where a deploy kind is mapped to a runtime adapter.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};

use wharf_core::error::{Result, WharfError};
use wharf_core::project::{DeployKind, Project, ProjectStatus};
use wharf_core::runtime::RuntimeAdapter;
use wharf_core::source::SourceSync;
use wharf_core::store::ProjectStore;

/// Drives deploys and lifecycle operations for all projects.
pub struct Orchestrator {
    store: ProjectStore,
    source: SourceSync,
    image_adapter: Arc<dyn RuntimeAdapter>,
    compose_adapter: Arc<dyn RuntimeAdapter>,
    base_domain: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Releases a project's deploy slot when the deploy finishes, on every
/// exit path including panics and cancellation.
struct FlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    project_id: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.project_id);
        }
    }
}

impl Orchestrator {
    pub fn new(
        store: ProjectStore,
        source: SourceSync,
        image_adapter: Arc<dyn RuntimeAdapter>,
        compose_adapter: Arc<dyn RuntimeAdapter>,
        base_domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            image_adapter,
            compose_adapter,
            base_domain: base_domain.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The single deploy-kind to adapter mapping.
    fn adapter_for(&self, kind: DeployKind) -> Arc<dyn RuntimeAdapter> {
        match kind {
            DeployKind::Image => self.image_adapter.clone(),
            DeployKind::Compose => self.compose_adapter.clone(),
        }
    }

    fn acquire(self: &Arc<Self>, project_id: &str) -> Result<FlightGuard> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| WharfError::Internal("in-flight lock poisoned".to_string()))?;
        if !set.insert(project_id.to_string()) {
            return Err(WharfError::DeployInProgress { project: project_id.to_string() });
        }
        // The guard holds the set without the orchestrator, so it can be
        // moved into detached tasks.
        Ok(FlightGuard { in_flight: self.in_flight.clone(), project_id: project_id.to_string() })
    }

    /// Deploy a project and wait for the result.
    ///
    /// Concurrent deploys of the same project are refused with
    /// DeployInProgress rather than queued.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn deploy(self: &Arc<Self>, project_id: &str) -> Result<()> {
        let _guard = self.acquire(project_id)?;
        self.deploy_inner(project_id).await
    }

    /// Kick off a deploy in the background and return immediately.
    ///
    /// The project shows as deploying right away; the outcome lands in its
    /// status when the detached task finishes.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn trigger_deploy(self: &Arc<Self>, project_id: &str) -> Result<()> {
        // Fail fast on unknown projects and in-flight deploys.
        self.store.get(project_id).await?;
        let guard = self.acquire(project_id)?;

        self.store
            .update_status(project_id, ProjectStatus::Deploying, "deploy queued")
            .await?;

        let orchestrator = self.clone();
        let id = project_id.to_string();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = orchestrator.deploy_inner(&id).await {
                error!(project_id = %id, "Background deploy failed: {}", e);
            }
        });

        Ok(())
    }

    async fn deploy_inner(&self, project_id: &str) -> Result<()> {
        let project = self.store.get(project_id).await?;
        metrics::counter!("wharf_deploys_started_total").increment(1);

        self.store
            .update_status(&project.id, ProjectStatus::Deploying, "deploy started")
            .await?;

        match self.run_pipeline(&project).await {
            Ok(container_ids) => {
                self.store.update_container_ids(&project.id, &container_ids).await?;
                self.store.update_status(&project.id, ProjectStatus::Running, "").await?;
                metrics::counter!("wharf_deploys_succeeded_total").increment(1);
                info!(project_id = %project.id, containers = container_ids.len(), "Deploy succeeded");
                Ok(())
            }
            Err(e) => {
                metrics::counter!("wharf_deploys_failed_total").increment(1);
                if let Err(status_err) = self
                    .store
                    .update_status(&project.id, ProjectStatus::Error, &e.to_string())
                    .await
                {
                    warn!(project_id = %project.id, "Failed to record deploy error: {}", status_err);
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, project: &Project) -> Result<Vec<String>> {
        if !project.git_url.is_empty() {
            self.source.ensure(project).await?;
            let commit = self.source.current_commit(project).await?;
            self.store.update_last_commit(&project.id, &commit).await?;
            info!(project_id = %project.id, commit = %commit, "Source synced");
        }

        let adapter = self.adapter_for(project.deploy_kind);
        adapter.bring_up(project, &self.base_domain).await
    }

    /// Tear the project's containers down and mark it stopped.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn stop(&self, project_id: &str) -> Result<()> {
        let project = self.store.get(project_id).await?;
        let adapter = self.adapter_for(project.deploy_kind);
        adapter.tear_down(&project).await?;
        self.store.update_status(&project.id, ProjectStatus::Stopped, "").await?;
        Ok(())
    }

    /// Restart the project's containers.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn restart(&self, project_id: &str) -> Result<()> {
        let project = self.store.get(project_id).await?;
        let adapter = self.adapter_for(project.deploy_kind);

        match adapter.restart(&project, &self.base_domain).await {
            Ok(()) => {
                self.store.update_status(&project.id, ProjectStatus::Running, "").await?;
                Ok(())
            }
            Err(e) => {
                self.store
                    .update_status(&project.id, ProjectStatus::Error, &e.to_string())
                    .await?;
                Err(e)
            }
        }
    }

    /// Remove a project: containers and checkout best-effort, record always.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn remove(&self, project_id: &str) -> Result<()> {
        let project = self.store.get(project_id).await?;

        let adapter = self.adapter_for(project.deploy_kind);
        if let Err(e) = adapter.tear_down(&project).await {
            warn!(project_id = %project.id, "Teardown during removal failed: {}", e);
        }
        if let Err(e) = self.source.remove(&project).await {
            warn!(project_id = %project.id, "Checkout removal failed: {}", e);
        }

        self.store.delete(&project.id).await
    }

    /// Fetch recent log lines for a project.
    pub async fn logs(&self, project_id: &str, tail: usize) -> Result<Vec<String>> {
        let project = self.store.get(project_id).await?;
        let adapter = self.adapter_for(project.deploy_kind);
        adapter.logs(&project, tail).await
    }
}
