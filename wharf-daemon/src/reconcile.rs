//! Startup state reconciliation.
//!
//! A deploy interrupted by a daemon crash leaves its project stuck in
//! `deploying` with no task behind it. On startup those projects are moved
//! to `error` so operators see they need a redeploy.

use tracing::{info, warn};

use wharf_core::error::Result;
use wharf_core::project::ProjectStatus;
use wharf_core::store::ProjectStore;

/// Report of reconciliation actions taken.
#[derive(Default, Debug)]
pub struct ReconcileReport {
    /// Projects that were stuck in `deploying`.
    pub interrupted: usize,
}

/// Reconcile stored project state after a restart.
pub async fn reconcile(store: &ProjectStore) -> Result<ReconcileReport> {
    info!("Reconciling project state");
    let mut report = ReconcileReport::default();

    for project in store.list().await? {
        if project.status == ProjectStatus::Deploying {
            warn!(
                project_id = %project.id,
                "Project was mid-deploy when the daemon stopped, marking as error"
            );
            store
                .update_status(&project.id, ProjectStatus::Error, "interrupted by daemon restart")
                .await?;
            report.interrupted += 1;
        }
    }

    info!("Reconciliation complete: {} interrupted deploys", report.interrupted);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wharf_core::project::{DeployKind, Project};

    #[tokio::test]
    async fn test_reconcile_marks_interrupted_deploys() {
        let store = ProjectStore::new_in_memory().await.unwrap();

        let stuck = Project::new("stuck", DeployKind::Image);
        store.create(&stuck).await.unwrap();
        store.update_status(&stuck.id, ProjectStatus::Deploying, "deploy started").await.unwrap();

        let mut healthy = Project::new("healthy", DeployKind::Image);
        healthy.status = ProjectStatus::Running;
        store.create(&healthy).await.unwrap();

        let report = reconcile(&store).await.unwrap();
        assert_eq!(report.interrupted, 1);

        let loaded = store.get(&stuck.id).await.unwrap();
        assert_eq!(loaded.status, ProjectStatus::Error);
        assert_eq!(loaded.status_msg, "interrupted by daemon restart");
        assert_eq!(store.get(&healthy.id).await.unwrap().status, ProjectStatus::Running);
    }
}
