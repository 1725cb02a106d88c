//! Compose file document types.
//!
//! Only the keys wharf rewrites are typed; everything else flattens into
//! catch-all mappings so an arbitrary compose file survives a parse,
//! rewrite, serialize cycle with its unknown keys intact.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Root of a compose file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComposeDocument {
    /// Services keyed by name.
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,

    /// Top-level network definitions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, Value>,

    /// Everything else (version, volumes, secrets, x-* extensions, ...).
    #[serde(flatten)]
    pub rest: serde_yaml::Mapping,
}

/// A single service. Only labels and networks are typed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComposeService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<NetworkAttachment>,

    #[serde(flatten)]
    pub rest: serde_yaml::Mapping,
}

/// Labels can be specified as a map or a list of KEY=value strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelSet {
    /// Labels as a key-value map. Values may be YAML scalars
    /// (e.g. `traefik.enable: true`), not just strings.
    Map(BTreeMap<String, Value>),
    /// Labels as a list of KEY=value strings.
    List(Vec<String>),
}

impl LabelSet {
    /// Normalize to a string-valued map regardless of input form.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            LabelSet::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                .collect(),
            LabelSet::List(list) => list
                .iter()
                .filter_map(|s| {
                    s.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))
                })
                .collect(),
        }
    }

    /// Build the map form from string pairs.
    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        LabelSet::Map(map.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
    }
}

/// Service network attachment: list form or map form with per-network config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkAttachment {
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl NetworkAttachment {
    /// Attach the service to `network` if it is not already attached.
    pub fn join(&mut self, network: &str) {
        match self {
            NetworkAttachment::List(list) => {
                if !list.iter().any(|n| n == network) {
                    list.push(network.to_string());
                }
            }
            NetworkAttachment::Map(map) => {
                map.entry(network.to_string()).or_insert(Value::Null);
            }
        }
    }

    pub fn contains(&self, network: &str) -> bool {
        match self {
            NetworkAttachment::List(list) => list.iter().any(|n| n == network),
            NetworkAttachment::Map(map) => map.contains_key(network),
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim_end().to_string(),
    }
}
