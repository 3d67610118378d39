use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Candidate locations of the logical agent hierarchy. Most projects only
/// populate one of these; the others legitimately return errors or nothing.
pub const DEFAULT_DISCOVERY_LOCATIONS: &[&str] = &["global", "us", "eu"];

/// Which kind of compute backs a runtime. Determines which optional fields of
/// [`RuntimeRecord`] are populated and which deletion protocol applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    ManagedRuntime,
    ContainerAgentRuntime,
}

/// A discovered compute resource capable of hosting an agent, normalized
/// across both kinds.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRecord {
    /// Globally unique resource path; the correlation and selection key.
    pub identity: String,
    /// Trailing path segment, for display.
    pub short_id: String,
    pub display_name: String,
    pub kind: RuntimeKind,
    pub location: String,
    /// ManagedRuntime only. `None` means the count could not be determined,
    /// which is distinct from `Some(0)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_count: Option<u32>,
    /// ContainerAgentRuntime only; correlation key for protocol agents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_uri: Option<String>,
    /// Original fetched record, retained opaquely for detail views.
    pub raw: Value,
}

/// How a logical agent names its runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RuntimeReference {
    /// Direct resource-path reference to a managed runtime.
    Engine { identity: String },
    /// Embedded protocol card naming a container runtime's public endpoint.
    Card { url: String },
}

/// A user-facing agent definition referencing zero or one runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogicalAgent {
    pub identity: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_reference: Option<RuntimeReference>,
}

/// Runtime identity → logical agents referencing it, in discovery order.
///
/// A runtime with no correlated agents has an empty bucket; lookups treat a
/// missing key and an empty bucket identically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationIndex {
    buckets: HashMap<String, Vec<LogicalAgent>>,
}

impl CorrelationIndex {
    /// Ensure an (empty) bucket exists for `identity`.
    pub fn seed(&mut self, identity: &str) {
        self.buckets.entry(identity.to_string()).or_default();
    }

    pub fn push(&mut self, identity: &str, agent: LogicalAgent) {
        self.buckets
            .entry(identity.to_string())
            .or_default()
            .push(agent);
    }

    pub fn agents_for(&self, identity: &str) -> &[LogicalAgent] {
        self.buckets
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn total_agents(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

/// One fetch cycle's view of the world. A new fetch fully replaces the
/// snapshot; nothing is patched incrementally.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub runtimes: Vec<RuntimeRecord>,
    pub correlation: CorrelationIndex,
    /// False when any discovery branch failed, so the view can caveat its
    /// usage data instead of claiming completeness.
    pub usage_data_complete: bool,
    /// Unix milliseconds.
    pub fetched_at: i64,
}

/// Project/location space one registry fetch covers.
#[derive(Debug, Clone)]
pub struct RegistryScope {
    pub project: String,
    /// Locations scanned for compute resources.
    pub locations: Vec<String>,
    /// Locations scanned for the logical agent hierarchy.
    pub discovery_locations: Vec<String>,
}

impl RegistryScope {
    pub fn new(project: impl Into<String>, locations: Vec<String>) -> Self {
        Self {
            project: project.into(),
            locations,
            discovery_locations: DEFAULT_DISCOVERY_LOCATIONS
                .iter()
                .map(|location| (*location).to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(identity: &str) -> LogicalAgent {
        LogicalAgent {
            identity: identity.to_string(),
            display_name: identity.to_string(),
            runtime_reference: None,
        }
    }

    #[test]
    fn missing_key_and_empty_bucket_are_equivalent() {
        let mut index = CorrelationIndex::default();
        index.seed("seeded");
        assert_eq!(index.agents_for("seeded"), &[] as &[LogicalAgent]);
        assert_eq!(index.agents_for("never-seen"), &[] as &[LogicalAgent]);
    }

    #[test]
    fn buckets_keep_insertion_order_without_dedup() {
        let mut index = CorrelationIndex::default();
        index.push("rt", agent("a"));
        index.push("rt", agent("b"));
        index.push("rt", agent("a"));
        let names: Vec<_> = index
            .agents_for("rt")
            .iter()
            .map(|agent| agent.identity.as_str())
            .collect();
        assert_eq!(names, ["a", "b", "a"]);
    }
}
