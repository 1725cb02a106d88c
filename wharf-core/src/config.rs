//! Daemon configuration.
//!
//! All configuration comes from environment variables with sensible
//! defaults, so a bare `wharfd` works on a laptop.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_METRICS_PORT: u16 = 9920;

/// Runtime configuration for the daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the SQLite database.
    pub data_dir: PathBuf,
    /// Parent directory for project git checkouts.
    pub deployments_dir: PathBuf,
    /// Base domain for subdomain routing.
    pub base_domain: String,
    /// SSH private key for git authentication, if any.
    pub ssh_key_path: Option<PathBuf>,
    /// How often the change watcher scans tracked projects.
    pub watch_interval: Duration,
    /// Port for the Prometheus metrics exporter.
    pub metrics_port: u16,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Self {
        let data_dir =
            PathBuf::from(std::env::var("WHARF_DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
        let deployments_dir = PathBuf::from(
            std::env::var("WHARF_DEPLOYMENTS_DIR").unwrap_or_else(|_| "./deployments".to_string()),
        );
        let base_domain =
            std::env::var("WHARF_BASE_DOMAIN").unwrap_or_else(|_| "localhost".to_string());
        let ssh_key_path =
            std::env::var("WHARF_SSH_KEY_PATH").ok().filter(|s| !s.is_empty()).map(PathBuf::from);

        let watch_interval = match std::env::var("WHARF_WATCH_INTERVAL") {
            Ok(raw) => parse_watch_interval(&raw),
            Err(_) => DEFAULT_WATCH_INTERVAL,
        };

        let metrics_port = match std::env::var("WHARF_METRICS_PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid WHARF_METRICS_PORT '{}', using {}", raw, DEFAULT_METRICS_PORT);
                DEFAULT_METRICS_PORT
            }),
            Err(_) => DEFAULT_METRICS_PORT,
        };

        Self { data_dir, deployments_dir, base_domain, ssh_key_path, watch_interval, metrics_port }
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("wharf.db")
    }

    /// Checkout directory for a project.
    pub fn project_dir(&self, project_name: &str) -> PathBuf {
        self.deployments_dir.join(project_name)
    }
}

fn parse_watch_interval(raw: &str) -> Duration {
    match humantime::parse_duration(raw) {
        Ok(d) if d >= Duration::from_secs(1) => d,
        Ok(_) => {
            warn!("WHARF_WATCH_INTERVAL '{}' below 1s, using 60s", raw);
            DEFAULT_WATCH_INTERVAL
        }
        Err(e) => {
            warn!("Invalid WHARF_WATCH_INTERVAL '{}' ({}), using 60s", raw, e);
            DEFAULT_WATCH_INTERVAL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_interval() {
        assert_eq!(parse_watch_interval("90s"), Duration::from_secs(90));
        assert_eq!(parse_watch_interval("5m"), Duration::from_secs(300));
        assert_eq!(parse_watch_interval("bogus"), DEFAULT_WATCH_INTERVAL);
        assert_eq!(parse_watch_interval("10ms"), DEFAULT_WATCH_INTERVAL);
    }

    #[test]
    fn test_derived_paths() {
        let config = Config {
            data_dir: PathBuf::from("/var/lib/wharf"),
            deployments_dir: PathBuf::from("/var/lib/wharf/deployments"),
            base_domain: "localhost".to_string(),
            ssh_key_path: None,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            metrics_port: DEFAULT_METRICS_PORT,
        };
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/wharf/wharf.db"));
        assert_eq!(
            config.project_dir("blog"),
            PathBuf::from("/var/lib/wharf/deployments/blog")
        );
    }
}
