//! Error types for wharf.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for wharf operations.
pub type Result<T> = std::result::Result<T, WharfError>;

/// Main error type for wharf.
#[derive(Error, Debug)]
pub enum WharfError {
    // Project errors
    #[error("Project not found: {project}")]
    ProjectNotFound { project: String },

    #[error("Project already exists: {name}")]
    ProjectExists { name: String },

    #[error("Deploy already in progress for project {project}")]
    DeployInProgress { project: String },

    // Source sync errors
    #[error("Git operation failed: {reason}")]
    GitError { reason: String },

    // Runtime errors
    #[error("Failed to pull image {image}: {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("Failed to start container for project {project}: {reason}")]
    ContainerStartFailed { project: String, reason: String },

    #[error("Container {container_id} exited during startup (status: {status})")]
    ContainerExited { container_id: String, status: String },

    #[error("Health check timeout for container {container_id}")]
    HealthCheckTimeout { container_id: String },

    #[error("docker compose {command} failed: {output}")]
    ComposeCommandFailed { command: String, output: String },

    #[error("Docker API error: {0}")]
    DockerError(String),

    // Compose document errors
    #[error("No compose file found in {dir:?}")]
    ComposeFileNotFound { dir: PathBuf },

    #[error("Compose parse error: {reason}")]
    ComposeParseError { reason: String },

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WharfError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<git2::Error> for WharfError {
    fn from(err: git2::Error) -> Self {
        Self::GitError { reason: err.message().to_string() }
    }
}
