//! Project data model.
//!
//! A project ties a source (git URL + branch) to a deployment (a single
//! image or a compose file) plus the routing configuration used to
//! synthesize reverse-proxy labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, WharfError};

/// How a project is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployKind {
    /// Run a single container from an image reference.
    Image,
    /// Bring up a compose file from the project checkout.
    Compose,
}

impl DeployKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "image" => Ok(DeployKind::Image),
            "compose" => Ok(DeployKind::Compose),
            other => Err(WharfError::InvalidConfig {
                reason: format!("Unknown deploy kind '{}': expected 'image' or 'compose'", other),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployKind::Image => "image",
            DeployKind::Compose => "compose",
        }
    }
}

impl fmt::Display for DeployKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Registered but never deployed.
    Pending,
    /// A deploy is currently running.
    Deploying,
    /// Containers are up.
    Running,
    /// Explicitly stopped.
    Stopped,
    /// Last operation failed; see status_msg.
    Error,
}

impl ProjectStatus {
    /// Parse a stored status string. Unknown values map to Error rather
    /// than failing, so a corrupted row stays visible.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => ProjectStatus::Pending,
            "deploying" => ProjectStatus::Deploying,
            "running" => ProjectStatus::Running,
            "stopped" => ProjectStatus::Stopped,
            _ => ProjectStatus::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Deploying => "deploying",
            ProjectStatus::Running => "running",
            ProjectStatus::Stopped => "stopped",
            ProjectStatus::Error => "error",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployable project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique ID (UUID v4).
    pub id: String,
    /// Unique human-readable name. Used for container and checkout naming.
    pub name: String,
    /// Git URL of the source repository. Empty for image-only projects.
    pub git_url: String,
    /// Branch to track.
    pub branch: String,
    /// Deployment variant.
    pub deploy_kind: DeployKind,
    /// Image reference for image-kind projects. Empty means the image is
    /// expected to exist locally and pull is skipped.
    pub image: String,
    /// Explicit routing domain. Empty means derive from use_subdomain.
    pub domain: String,
    /// Route name.base_domain when no explicit domain is set.
    pub use_subdomain: bool,
    /// Container port the proxy should target. 0 means unset (port 80).
    pub port: u16,
    /// Environment variables injected into containers.
    pub env_vars: HashMap<String, String>,
    /// Redeploy automatically when the tracked branch moves.
    pub auto_deploy: bool,
    /// Last deployed commit hash. Empty until first deploy.
    pub last_commit: String,
    pub status: ProjectStatus,
    /// Human-readable detail for the current status.
    pub status_msg: String,
    /// Container IDs from the last successful deploy.
    pub container_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project with defaults filled in.
    pub fn new(name: impl Into<String>, deploy_kind: DeployKind) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            git_url: String::new(),
            branch: "main".to_string(),
            deploy_kind,
            image: String::new(),
            domain: String::new(),
            use_subdomain: false,
            port: 0,
            env_vars: HashMap::new(),
            auto_deploy: false,
            last_commit: String::new(),
            status: ProjectStatus::Pending,
            status_msg: String::new(),
            container_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The domain this project should be routed under, if any.
    ///
    /// An explicit domain always wins. Otherwise `{name}.{base_domain}`
    /// when subdomain routing is enabled and a base domain is configured,
    /// else no routing at all.
    pub fn effective_domain(&self, base_domain: &str) -> Option<String> {
        if !self.domain.is_empty() {
            return Some(self.domain.clone());
        }
        if self.use_subdomain && !base_domain.is_empty() {
            return Some(format!("{}.{}", self.name, base_domain));
        }
        None
    }

    /// The container port the proxy targets (80 when unset).
    pub fn routed_port(&self) -> u16 {
        if self.port == 0 {
            80
        } else {
            self.port
        }
    }

    /// Parse a `KEY=VALUE`-per-line text blob into env vars.
    ///
    /// Blank lines and `#` comments are skipped, surrounding whitespace is
    /// trimmed, and later keys win.
    pub fn parse_env_text(text: &str) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    vars.insert(key.to_string(), value.trim().to_string());
                }
            }
        }
        vars
    }

    /// Render env vars back to the text-blob form, sorted by key.
    pub fn env_text(&self) -> String {
        let mut keys: Vec<_> = self.env_vars.keys().collect();
        keys.sort();
        keys.iter()
            .map(|k| format!("{}={}", k, self.env_vars[*k]))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Whether a domain resolves locally without public DNS.
pub fn is_local_domain(domain: &str) -> bool {
    domain == "localhost" || domain.ends_with(".localhost")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_domain_explicit_wins() {
        let mut p = Project::new("blog", DeployKind::Image);
        p.domain = "blog.example.com".to_string();
        p.use_subdomain = true;
        assert_eq!(p.effective_domain("apps.dev"), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_effective_domain_subdomain() {
        let mut p = Project::new("blog", DeployKind::Image);
        p.use_subdomain = true;
        assert_eq!(p.effective_domain("apps.dev"), Some("blog.apps.dev".to_string()));
    }

    #[test]
    fn test_effective_domain_none() {
        let p = Project::new("blog", DeployKind::Image);
        assert_eq!(p.effective_domain("apps.dev"), None);
    }

    #[test]
    fn test_effective_domain_subdomain_needs_base() {
        let mut p = Project::new("blog", DeployKind::Image);
        p.use_subdomain = true;
        assert_eq!(p.effective_domain(""), None);
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for s in
            [ProjectStatus::Pending, ProjectStatus::Deploying, ProjectStatus::Running, ProjectStatus::Stopped, ProjectStatus::Error]
        {
            assert_eq!(ProjectStatus::parse(s.as_str()), s);
        }
        assert_eq!(ProjectStatus::parse("garbage"), ProjectStatus::Error);
    }

    #[test]
    fn test_deploy_kind_parse() {
        assert_eq!(DeployKind::parse("image").unwrap(), DeployKind::Image);
        assert_eq!(DeployKind::parse("compose").unwrap(), DeployKind::Compose);
        assert!(DeployKind::parse("swarm").is_err());
    }

    #[test]
    fn test_parse_env_text() {
        let vars = Project::parse_env_text("FOO=bar\n\n# comment\n  BAZ = qux \nFOO=override\n=nokey\n");
        assert_eq!(vars.get("FOO"), Some(&"override".to_string()));
        assert_eq!(vars.get("BAZ"), Some(&"qux".to_string()));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_is_local_domain() {
        assert!(is_local_domain("localhost"));
        assert!(is_local_domain("blog.localhost"));
        assert!(!is_local_domain("example.com"));
        assert!(!is_local_domain("notlocalhost"));
    }

    #[test]
    fn test_routed_port_default() {
        let mut p = Project::new("blog", DeployKind::Image);
        assert_eq!(p.routed_port(), 80);
        p.port = 3000;
        assert_eq!(p.routed_port(), 3000);
    }
}
