//! Docker Engine adapter for image-kind projects.
//!
//! Deploys a project as a single named container: pull the image, replace
//! any previous container of the same name, attach it to the proxy network
//! with synthesized routing labels, and wait until it is actually running.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    NetworkingConfig, RemoveContainerOptions, RestartContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, EndpointSettings, HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, WharfError};
use crate::labels::{self, PROJECT_LABEL, PROXY_NETWORK};
use crate::project::Project;
use crate::runtime::RuntimeAdapter;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(60);
const STOP_GRACE_SECS: i64 = 10;

/// Adapter running single-image projects against the Docker Engine API.
#[derive(Clone)]
pub struct DockerAdapter {
    docker: Docker,
}

impl DockerAdapter {
    /// Connect to the local Docker daemon.
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| WharfError::DockerError(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Create the shared proxy network if it does not exist yet.
    #[instrument(skip(self))]
    pub async fn ensure_network(&self) -> Result<()> {
        match self.docker.inspect_network(PROXY_NETWORK, None::<InspectNetworkOptions<String>>).await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                info!(network = PROXY_NETWORK, "Creating proxy network");
                self.docker
                    .create_network(CreateNetworkOptions {
                        name: PROXY_NETWORK.to_string(),
                        driver: "bridge".to_string(),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| WharfError::DockerError(e.to_string()))?;
                Ok(())
            }
            Err(e) => Err(WharfError::DockerError(e.to_string())),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!(image = %image, "Pulling image");
        let mut stream = self.docker.create_image(
            Some(CreateImageOptions { from_image: image.to_string(), ..Default::default() }),
            None,
            None,
        );
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| WharfError::ImagePullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Remove a container by name, ignoring its absence.
    async fn remove_existing(&self, container_name: &str) {
        match self
            .docker
            .stop_container(container_name, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            Ok(()) => {}
            Err(e) if is_not_found(&e) || is_not_modified(&e) => {}
            Err(e) => debug!(container = container_name, "Stop before replace failed: {}", e),
        }
        match self
            .docker
            .remove_container(
                container_name,
                Some(RemoveContainerOptions { force: true, ..Default::default() }),
            )
            .await
        {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => debug!(container = container_name, "Remove before replace failed: {}", e),
        }
    }

    /// Poll until the container reports running, or fail on exit/timeout.
    async fn wait_healthy(&self, container_id: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + HEALTH_TIMEOUT;
        loop {
            let inspect = self
                .docker
                .inspect_container(container_id, None::<InspectContainerOptions>)
                .await
                .map_err(|e| WharfError::DockerError(e.to_string()))?;

            let status = inspect.state.as_ref().and_then(|s| s.status);
            match status {
                Some(ContainerStateStatusEnum::RUNNING) => return Ok(()),
                Some(
                    terminal @ (ContainerStateStatusEnum::EXITED | ContainerStateStatusEnum::DEAD),
                ) => {
                    let exit_code =
                        inspect.state.as_ref().and_then(|s| s.exit_code).unwrap_or_default();
                    return Err(WharfError::ContainerExited {
                        container_id: container_id.to_string(),
                        status: format!("{:?} (exit code {})", terminal, exit_code),
                    });
                }
                _ => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(WharfError::HealthCheckTimeout {
                    container_id: container_id.to_string(),
                });
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    async fn project_containers(&self, project: &Project) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", PROJECT_LABEL, project.id)],
        );
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| WharfError::DockerError(e.to_string()))?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}

#[async_trait]
impl RuntimeAdapter for DockerAdapter {
    fn name(&self) -> &'static str {
        "docker"
    }

    #[instrument(skip(self, project), fields(project_id = %project.id, name = %project.name))]
    async fn bring_up(&self, project: &Project, base_domain: &str) -> Result<Vec<String>> {
        if !project.image.is_empty() {
            self.pull_image(&project.image).await?;
        }

        let container_name = container_name_for(project);
        self.remove_existing(&container_name).await;

        let labels = labels::synthesize(project, base_domain);
        let env = env_list(project);

        let mut endpoints = HashMap::new();
        endpoints.insert(PROXY_NETWORK.to_string(), EndpointSettings::default());

        let config = Config {
            image: Some(project.image.clone()),
            env: Some(env),
            labels: Some(labels),
            host_config: Some(HostConfig {
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            networking_config: Some(NetworkingConfig { endpoints_config: endpoints }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions { name: container_name.clone(), platform: None }),
                config,
            )
            .await
            .map_err(|e| WharfError::ContainerStartFailed {
                project: project.name.clone(),
                reason: e.to_string(),
            })?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| WharfError::ContainerStartFailed {
                project: project.name.clone(),
                reason: e.to_string(),
            })?;

        self.wait_healthy(&created.id).await?;

        info!(container_id = %created.id, "Container up");
        Ok(vec![created.id])
    }

    #[instrument(skip(self, project), fields(project_id = %project.id))]
    async fn tear_down(&self, project: &Project) -> Result<()> {
        for id in self.project_containers(project).await? {
            match self
                .docker
                .stop_container(&id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
                .await
            {
                Ok(()) => {}
                Err(e) if is_not_found(&e) || is_not_modified(&e) => {}
                Err(e) => warn!(container_id = %id, "Stop failed: {}", e),
            }
            match self
                .docker
                .remove_container(&id, Some(RemoveContainerOptions { force: true, ..Default::default() }))
                .await
            {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(WharfError::DockerError(e.to_string())),
            }
        }
        Ok(())
    }

    #[instrument(skip(self, project), fields(project_id = %project.id))]
    async fn restart(&self, project: &Project, _base_domain: &str) -> Result<()> {
        for id in &project.container_ids {
            self.docker
                .restart_container(id, None::<RestartContainerOptions>)
                .await
                .map_err(|e| WharfError::DockerError(e.to_string()))?;
        }
        Ok(())
    }

    async fn logs(&self, project: &Project, tail: usize) -> Result<Vec<String>> {
        let target = match project.container_ids.first() {
            Some(id) => id.clone(),
            None => container_name_for(project),
        };

        let mut stream = self.docker.logs(
            &target,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: tail.to_string(),
                ..Default::default()
            }),
        );

        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            let output = chunk.map_err(|e| WharfError::DockerError(e.to_string()))?;
            let text = String::from_utf8_lossy(&output.into_bytes()).to_string();
            for line in text.lines() {
                lines.push(line.to_string());
            }
        }
        Ok(lines)
    }
}

/// Name of the managed container for an image-kind project.
pub fn container_name_for(project: &Project) -> String {
    format!("wharf-{}", project.name)
}

fn env_list(project: &Project) -> Vec<String> {
    let mut env: Vec<String> =
        project.env_vars.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    env.sort();
    env
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(err, bollard::errors::Error::DockerResponseServerError { status_code: 404, .. })
}

fn is_not_modified(err: &bollard::errors::Error) -> bool {
    matches!(err, bollard::errors::Error::DockerResponseServerError { status_code: 304, .. })
}
