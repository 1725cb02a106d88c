//! Runtime adapters.
//!
//! A RuntimeAdapter turns a project record into running containers. There
//! are two implementations: one driving the Docker Engine API directly for
//! single-image projects, and one shelling out to `docker compose` for
//! compose projects. The orchestrator picks the adapter from the project's
//! deploy kind in exactly one place.

use async_trait::async_trait;

use crate::error::Result;
use crate::project::Project;

pub mod compose_cli;
pub mod docker;

pub use compose_cli::ComposeCliAdapter;
pub use docker::DockerAdapter;

/// Container runtime operations for a project.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &'static str;

    /// Bring the project's containers up. Returns the IDs of the
    /// containers now serving the project.
    async fn bring_up(&self, project: &Project, base_domain: &str) -> Result<Vec<String>>;

    /// Stop and remove the project's containers.
    async fn tear_down(&self, project: &Project) -> Result<()>;

    /// Restart the project's containers in place. A compose project that
    /// was never deployed is brought up instead, which needs the base
    /// domain for label synthesis.
    async fn restart(&self, project: &Project, base_domain: &str) -> Result<()>;

    /// Fetch the last `tail` log lines.
    async fn logs(&self, project: &Project, tail: usize) -> Result<Vec<String>>;
}
