//! Compose adapter for compose-kind projects.
//!
//! Drives the `docker compose` CLI against a rewritten copy of the
//! operator's compose file (see the compose module). The operator's file is
//! never modified; all commands run against the derived file, falling back
//! to the original when the derived one does not exist yet.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, instrument};

use crate::compose::{self, DERIVED_FILE_NAME};
use crate::error::{Result, WharfError};
use crate::project::Project;
use crate::runtime::RuntimeAdapter;

/// Adapter running compose projects through the `docker compose` CLI.
#[derive(Debug, Clone)]
pub struct ComposeCliAdapter {
    deployments_dir: PathBuf,
}

impl ComposeCliAdapter {
    pub fn new(deployments_dir: impl Into<PathBuf>) -> Self {
        Self { deployments_dir: deployments_dir.into() }
    }

    fn project_dir(&self, project: &Project) -> PathBuf {
        self.deployments_dir.join(&project.name)
    }

    /// The compose file to run commands against: the derived file when it
    /// exists, else the operator's original.
    fn command_file(&self, project: &Project) -> Result<PathBuf> {
        let derived = self.project_dir(project).join(DERIVED_FILE_NAME);
        if derived.is_file() {
            Ok(derived)
        } else {
            compose::find_compose_file(&self.project_dir(project))
        }
    }

    /// Rewrite the compose file and return the derived file path.
    async fn prepare(&self, project: &Project, base_domain: &str) -> Result<PathBuf> {
        let dir = self.project_dir(project);
        let compose_path = compose::find_compose_file(&dir)?;
        let text = tokio::fs::read_to_string(&compose_path)
            .await
            .map_err(|e| WharfError::IoError { path: compose_path.clone(), source: e })?;
        let doc = compose::parse(&text)?;
        let rewritten = compose::inject_labels(&doc, project, base_domain);
        compose::write_derived(&dir, &rewritten).await
    }

    async fn run(&self, project: &Project, file: &Path, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("docker");
        cmd.arg("compose")
            .arg("-f")
            .arg(file)
            .arg("-p")
            .arg(compose_project_name(project))
            .args(args)
            .current_dir(self.project_dir(project))
            .envs(&project.env_vars)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|e| WharfError::ComposeCommandFailed {
            command: args.join(" "),
            output: format!("failed to spawn docker compose: {}", e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WharfError::ComposeCommandFailed {
                command: args.join(" "),
                output: format!("{}{}", stdout, stderr),
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl RuntimeAdapter for ComposeCliAdapter {
    fn name(&self) -> &'static str {
        "compose"
    }

    #[instrument(skip(self, project), fields(project_id = %project.id, name = %project.name))]
    async fn bring_up(&self, project: &Project, base_domain: &str) -> Result<Vec<String>> {
        let derived = self.prepare(project, base_domain).await?;

        info!("Running docker compose up");
        self.run(project, &derived, &["up", "-d", "--build", "--remove-orphans"]).await?;

        let ids = self.run(project, &derived, &["ps", "-q"]).await?;
        Ok(ids.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    #[instrument(skip(self, project), fields(project_id = %project.id))]
    async fn tear_down(&self, project: &Project) -> Result<()> {
        let file = self.command_file(project)?;
        self.run(project, &file, &["down", "--remove-orphans"]).await?;
        Ok(())
    }

    #[instrument(skip(self, project), fields(project_id = %project.id))]
    async fn restart(&self, project: &Project, base_domain: &str) -> Result<()> {
        let derived = self.project_dir(project).join(DERIVED_FILE_NAME);
        if !derived.is_file() {
            // Never deployed through wharf; a restart is a first deploy.
            self.bring_up(project, base_domain).await?;
            return Ok(());
        }
        self.run(project, &derived, &["restart"]).await?;
        Ok(())
    }

    async fn logs(&self, project: &Project, tail: usize) -> Result<Vec<String>> {
        let file = self.command_file(project)?;
        let tail_arg = tail.to_string();
        let out =
            self.run(project, &file, &["logs", "--tail", &tail_arg, "--no-color"]).await?;
        Ok(out.lines().map(|l| l.to_string()).collect())
    }
}

/// Compose project name, which namespaces containers and volumes.
pub fn compose_project_name(project: &Project) -> String {
    format!("wharf-{}", project.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::DeployKind;

    #[test]
    fn test_compose_project_name() {
        let p = Project::new("shop", DeployKind::Compose);
        assert_eq!(compose_project_name(&p), "wharf-shop");
    }

    #[tokio::test]
    async fn test_bring_up_without_compose_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("shop")).unwrap();
        let adapter = ComposeCliAdapter::new(dir.path());
        let p = Project::new("shop", DeployKind::Compose);

        let err = adapter.bring_up(&p, "localhost").await.unwrap_err();
        assert!(matches!(err, WharfError::ComposeFileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_restart_without_prior_deploy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("shop")).unwrap();
        let adapter = ComposeCliAdapter::new(dir.path());
        let p = Project::new("shop", DeployKind::Compose);

        // Falls back to bring_up, which fails on the missing compose file.
        let err = adapter.restart(&p, "localhost").await.unwrap_err();
        assert!(matches!(err, WharfError::ComposeFileNotFound { .. }));
    }
}
