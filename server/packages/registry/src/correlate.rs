//! Correlation of logical agents with the runtimes they reference.

use crate::types::{CorrelationIndex, LogicalAgent, RuntimeKind, RuntimeRecord, RuntimeReference};

/// Build the runtime → agents index.
///
/// Two independent matching rules per agent: direct resource-path equality
/// against managed runtimes (case-sensitive, no normalization) and URL-prefix
/// matching against container runtimes' public URIs. When an agent's URL is a
/// prefix match for more than one runtime, the first runtime in enumeration
/// order wins.
pub fn correlate(runtimes: &[RuntimeRecord], agents: &[LogicalAgent]) -> CorrelationIndex {
    let mut index = CorrelationIndex::default();
    for runtime in runtimes {
        index.seed(&runtime.identity);
    }

    for agent in agents {
        match &agent.runtime_reference {
            Some(RuntimeReference::Engine { identity }) => {
                if let Some(runtime) = runtimes.iter().find(|runtime| {
                    runtime.kind == RuntimeKind::ManagedRuntime && runtime.identity == *identity
                }) {
                    index.push(&runtime.identity, agent.clone());
                }
            }
            Some(RuntimeReference::Card { url }) => {
                if let Some(runtime) = runtimes.iter().find(|runtime| {
                    runtime.kind == RuntimeKind::ContainerAgentRuntime
                        && runtime
                            .public_uri
                            .as_deref()
                            .is_some_and(|uri| !uri.is_empty() && url.starts_with(uri))
                }) {
                    index.push(&runtime.identity, agent.clone());
                }
            }
            None => {}
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn runtime(identity: &str, kind: RuntimeKind, public_uri: Option<&str>) -> RuntimeRecord {
        RuntimeRecord {
            identity: identity.to_string(),
            short_id: identity.rsplit('/').next().unwrap_or(identity).to_string(),
            display_name: identity.to_string(),
            kind,
            location: "us-central1".to_string(),
            session_count: None,
            public_uri: public_uri.map(ToOwned::to_owned),
            raw: Value::Null,
        }
    }

    fn engine_agent(identity: &str, engine: &str) -> LogicalAgent {
        LogicalAgent {
            identity: identity.to_string(),
            display_name: identity.to_string(),
            runtime_reference: Some(RuntimeReference::Engine {
                identity: engine.to_string(),
            }),
        }
    }

    fn card_agent(identity: &str, url: &str) -> LogicalAgent {
        LogicalAgent {
            identity: identity.to_string(),
            display_name: identity.to_string(),
            runtime_reference: Some(RuntimeReference::Card {
                url: url.to_string(),
            }),
        }
    }

    #[test]
    fn direct_reference_matches_exactly() {
        let runtimes = [runtime(
            "projects/p/locations/l/reasoningEngines/1",
            RuntimeKind::ManagedRuntime,
            None,
        )];
        let agents = [
            engine_agent("a", "projects/p/locations/l/reasoningEngines/1"),
            engine_agent("b", "projects/p/locations/l/reasoningengines/1"),
        ];
        let index = correlate(&runtimes, &agents);
        let bucket = index.agents_for("projects/p/locations/l/reasoningEngines/1");
        assert_eq!(bucket.len(), 1, "case-sensitive match only");
        assert_eq!(bucket[0].identity, "a");
    }

    #[test]
    fn url_prefix_matches_extended_paths() {
        let runtimes = [runtime(
            "projects/p/locations/l/services/svc",
            RuntimeKind::ContainerAgentRuntime,
            Some("https://svc.example.run.app"),
        )];
        let agents = [
            card_agent("hit", "https://svc.example.run.app/invoke"),
            card_agent("miss", "https://other.example.run.app/invoke"),
        ];
        let index = correlate(&runtimes, &agents);
        let bucket = index.agents_for("projects/p/locations/l/services/svc");
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket[0].identity, "hit");
    }

    #[test]
    fn shared_uri_prefix_resolves_to_first_runtime_in_order() {
        let runtimes = [
            runtime(
                "projects/p/locations/l/services/base",
                RuntimeKind::ContainerAgentRuntime,
                Some("https://agents.example.run.app"),
            ),
            runtime(
                "projects/p/locations/l/services/nested",
                RuntimeKind::ContainerAgentRuntime,
                Some("https://agents.example.run.app/nested"),
            ),
        ];
        let agents = [card_agent("a", "https://agents.example.run.app/nested/invoke")];
        let index = correlate(&runtimes, &agents);
        assert_eq!(
            index.agents_for("projects/p/locations/l/services/base").len(),
            1
        );
        assert!(index
            .agents_for("projects/p/locations/l/services/nested")
            .is_empty());
    }

    #[test]
    fn unreferenced_runtime_gets_empty_bucket_not_absent_key() {
        let runtimes = [runtime(
            "projects/p/locations/l/reasoningEngines/idle",
            RuntimeKind::ManagedRuntime,
            None,
        )];
        let index = correlate(&runtimes, &[]);
        assert!(index
            .identities()
            .any(|id| id == "projects/p/locations/l/reasoningEngines/idle"));
        assert!(index
            .agents_for("projects/p/locations/l/reasoningEngines/idle")
            .is_empty());
    }

    #[test]
    fn empty_public_uri_never_matches() {
        let runtimes = [runtime(
            "projects/p/locations/l/services/svc",
            RuntimeKind::ContainerAgentRuntime,
            Some(""),
        )];
        let agents = [card_agent("a", "https://anything.example")];
        let index = correlate(&runtimes, &agents);
        assert!(index
            .agents_for("projects/p/locations/l/services/svc")
            .is_empty());
    }

    #[test]
    fn agents_without_references_are_ignored() {
        let runtimes = [runtime(
            "projects/p/locations/l/reasoningEngines/1",
            RuntimeKind::ManagedRuntime,
            None,
        )];
        let agents = [LogicalAgent {
            identity: "loose".to_string(),
            display_name: "loose".to_string(),
            runtime_reference: None,
        }];
        let index = correlate(&runtimes, &agents);
        assert_eq!(index.total_agents(), 0);
    }
}
