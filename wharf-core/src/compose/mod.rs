//! Compose document handling.
//!
//! Compose-kind projects are deployed through the `docker compose` CLI, but
//! wharf first rewrites the operator's compose file: every service joins the
//! proxy network and gets management labels, and the main service gets the
//! synthesized routing labels. The rewrite is written to a derived file next
//! to the original, which is never modified.

use serde_yaml::Value;
use std::path::{Path, PathBuf};

use crate::error::{Result, WharfError};
use crate::labels::{self, MANAGED_LABEL, PROJECT_LABEL, PROXY_NETWORK};
use crate::project::Project;

pub mod types;

pub use types::{ComposeDocument, ComposeService, LabelSet, NetworkAttachment};

/// File name of the rewritten compose file inside a project checkout.
pub const DERIVED_FILE_NAME: &str = ".wharf-compose.yml";

/// Names recognized as a compose file, in lookup order.
const COMPOSE_FILE_NAMES: [&str; 4] =
    ["docker-compose.yml", "docker-compose.yaml", "compose.yml", "compose.yaml"];

/// Service names considered the "main" (routed) service, in priority order.
const MAIN_SERVICE_PRIORITY: [&str; 7] =
    ["app", "web", "api", "server", "frontend", "backend", "nginx"];

/// Locate the compose file in a project checkout.
pub fn find_compose_file(dir: &Path) -> Result<PathBuf> {
    for name in COMPOSE_FILE_NAMES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(WharfError::ComposeFileNotFound { dir: dir.to_path_buf() })
}

/// Parse a compose document from YAML text.
pub fn parse(text: &str) -> Result<ComposeDocument> {
    serde_yaml::from_str(text)
        .map_err(|e| WharfError::ComposeParseError { reason: e.to_string() })
}

/// Pick the service that receives routing labels.
///
/// Well-known names win in priority order; otherwise the lexicographically
/// first service, so the choice is stable across runs.
pub fn main_service(doc: &ComposeDocument) -> Option<&str> {
    for name in MAIN_SERVICE_PRIORITY {
        if doc.services.contains_key(name) {
            return Some(name);
        }
    }
    doc.services.keys().next().map(|s| s.as_str())
}

/// Rewrite a compose document for deployment. The input is not modified.
///
/// Every service joins the proxy network and gets management labels;
/// operator-supplied `traefik.*` labels are stripped (except
/// `traefik.enable`) so routing is always wharf's to decide. The main
/// service additionally gets the synthesized routing labels.
pub fn inject_labels(
    doc: &ComposeDocument,
    project: &Project,
    base_domain: &str,
) -> ComposeDocument {
    let mut out = doc.clone();

    // The proxy network is created by the daemon, not by compose.
    let mut external = serde_yaml::Mapping::new();
    external.insert(Value::String("external".to_string()), Value::Bool(true));
    out.networks.insert(PROXY_NETWORK.to_string(), Value::Mapping(external));

    let main = main_service(doc).map(|s| s.to_string());

    for (name, service) in out.services.iter_mut() {
        service
            .networks
            .get_or_insert_with(|| NetworkAttachment::List(Vec::new()))
            .join(PROXY_NETWORK);

        let mut label_map = service.labels.as_ref().map(|l| l.to_map()).unwrap_or_default();
        label_map.retain(|k, _| !k.starts_with("traefik.") || k == "traefik.enable");
        label_map.insert(MANAGED_LABEL.to_string(), "true".to_string());
        label_map.insert(PROJECT_LABEL.to_string(), project.id.clone());

        if main.as_deref() == Some(name.as_str()) {
            for (k, v) in labels::synthesize_for_service(project, name, base_domain) {
                label_map.insert(k, v);
            }
        }

        service.labels = Some(LabelSet::from_map(label_map));
    }

    out
}

/// Serialize a rewritten document to the derived file in `dir`.
pub async fn write_derived(dir: &Path, doc: &ComposeDocument) -> Result<PathBuf> {
    let path = dir.join(DERIVED_FILE_NAME);
    let yaml = serde_yaml::to_string(doc)
        .map_err(|e| WharfError::ComposeParseError { reason: e.to_string() })?;
    tokio::fs::write(&path, yaml)
        .await
        .map_err(|e| WharfError::IoError { path: path.clone(), source: e })?;
    Ok(path)
}
