use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Environment variable on a container service, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// A managed reasoning-engine runtime as fetched from the runtime API.
///
/// Fields beyond the ones the console reads are preserved in `extra` so the
/// record can round-trip into detail views untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedRuntimeRecord {
    /// Full resource path, e.g. `projects/p/locations/l/reasoningEngines/123`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// A generic container service as fetched from the container API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerServiceRecord {
    /// Full resource path, e.g. `projects/p/locations/l/services/my-agent`.
    pub name: String,
    /// Public serving URI, if the service is reachable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl ContainerServiceRecord {
    /// Value of the named environment variable, if set.
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|var| var.name == name)
            .map(|var| var.value.as_str())
    }
}

/// A live session scoped to one managed runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub name: String,
}

/// One node of the logical discovery hierarchy (collection, app or
/// assistant). Only its resource path matters to the walker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Embedded protocol card on a logical agent, naming a public endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// A user-defined logical agent record from the discovery hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Direct reference to a managed runtime's resource path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_engine: Option<String>,
    /// Protocol card naming a container runtime's public endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_card: Option<AgentCard>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Trailing segment of a resource path, used as a short display id.
pub fn trailing_segment(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
