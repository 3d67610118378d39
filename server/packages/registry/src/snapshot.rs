//! Assembly of the unified registry snapshot.

use std::collections::{HashMap, HashSet};

use futures::{stream, StreamExt};
use serde_json::Value;

use agent_console_error::ConsoleError;
use agent_console_provider::{trailing_segment, ProviderApi};

use crate::classify::{classify, ENV_AGENT_CARD_URL};
use crate::correlate::correlate;
use crate::discovery::discover_agents;
use crate::sessions::session_count;
use crate::types::{RegistryScope, RegistrySnapshot, RuntimeKind, RuntimeRecord};

const SESSION_COUNT_FANOUT: usize = 8;

/// Fetch and merge both runtime kinds into one homogeneous snapshot.
///
/// The primary listings are fatal on failure; session counts and agent
/// discovery are best-effort enrichment and degrade to `None` buckets and an
/// incomplete-usage flag.
pub async fn build_snapshot(
    provider: &dyn ProviderApi,
    scope: &RegistryScope,
) -> Result<RegistrySnapshot, ConsoleError> {
    let mut runtimes = Vec::new();

    for location in &scope.locations {
        let managed = provider
            .list_managed_runtimes(&scope.project, location)
            .await
            .map_err(|err| ConsoleError::RegistryRefreshFailed {
                message: err.to_string(),
            })?;
        for record in managed {
            let display_name = record
                .display_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| trailing_segment(&record.name).to_string());
            runtimes.push(RuntimeRecord {
                short_id: trailing_segment(&record.name).to_string(),
                display_name,
                kind: RuntimeKind::ManagedRuntime,
                location: location.clone(),
                session_count: None,
                public_uri: None,
                raw: serde_json::to_value(&record).unwrap_or(Value::Null),
                identity: record.name,
            });
        }

        let services = provider
            .list_container_services(&scope.project, location)
            .await
            .map_err(|err| ConsoleError::RegistryRefreshFailed {
                message: err.to_string(),
            })?;
        for record in services {
            let classification = classify(&record);
            // Agent-capable services without a protocol card are not
            // independently manageable runtimes; they stay out of the
            // registry.
            if !(classification.agent_capable && classification.protocol_agent) {
                continue;
            }
            let public_uri = record
                .env_value(ENV_AGENT_CARD_URL)
                .filter(|url| !url.trim().is_empty())
                .map(ToOwned::to_owned)
                .or_else(|| record.uri.clone());
            runtimes.push(RuntimeRecord {
                short_id: trailing_segment(&record.name).to_string(),
                display_name: classification.display_name,
                kind: RuntimeKind::ContainerAgentRuntime,
                location: location.clone(),
                session_count: None,
                public_uri,
                raw: serde_json::to_value(&record).unwrap_or(Value::Null),
                identity: record.name,
            });
        }
    }

    debug_assert!(
        runtimes
            .iter()
            .map(|runtime| runtime.identity.as_str())
            .collect::<HashSet<_>>()
            .len()
            == runtimes.len(),
        "runtime identities must be unique within one snapshot"
    );

    annotate_session_counts(provider, &mut runtimes).await;

    let discovery = discover_agents(provider, &scope.project, &scope.discovery_locations).await;
    let correlation = correlate(&runtimes, &discovery.agents);

    Ok(RegistrySnapshot {
        runtimes,
        correlation,
        usage_data_complete: discovery.complete,
        fetched_at: now_ms(),
    })
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One best-effort count fetch per managed runtime, fanned out concurrently
/// and joined by identity; a failed fetch leaves that runtime's count `None`.
async fn annotate_session_counts(provider: &dyn ProviderApi, runtimes: &mut [RuntimeRecord]) {
    let identities: Vec<String> = runtimes
        .iter()
        .filter(|runtime| runtime.kind == RuntimeKind::ManagedRuntime)
        .map(|runtime| runtime.identity.clone())
        .collect();

    let counts: HashMap<String, Option<u32>> = stream::iter(identities)
        .map(|identity| async move {
            let count = session_count(provider, &identity).await;
            (identity, count)
        })
        .buffer_unordered(SESSION_COUNT_FANOUT)
        .collect()
        .await;

    for runtime in runtimes {
        if runtime.kind == RuntimeKind::ManagedRuntime {
            runtime.session_count = counts.get(&runtime.identity).copied().flatten();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use agent_console_provider::testing::{container_service, managed_runtime, FakeProvider};

    use crate::classify::{ENV_AGENT_CARD_URL, ENV_AGENT_DISPLAY_NAME};
    use crate::types::LogicalAgent;

    use super::*;

    const LOCATION: &str = "us-central1";

    fn scope() -> RegistryScope {
        RegistryScope::new("p", vec![LOCATION.to_string()])
    }

    #[tokio::test]
    async fn only_protocol_agent_services_are_admitted() {
        let fake = FakeProvider::new();
        fake.add_container_service(
            LOCATION,
            container_service(
                "projects/p/locations/us-central1/services/a2a-front",
                Some("https://a2a-front.example.run.app"),
                &[],
            ),
        );
        fake.add_container_service(
            LOCATION,
            container_service(
                "projects/p/locations/us-central1/services/backend",
                Some("https://backend.example.run.app"),
                &[(ENV_AGENT_DISPLAY_NAME, "Capable But Private")],
            ),
        );

        let snapshot = build_snapshot(&fake, &scope()).await.unwrap();
        let identities: Vec<_> = snapshot
            .runtimes
            .iter()
            .map(|runtime| runtime.identity.as_str())
            .collect();
        assert_eq!(
            identities,
            ["projects/p/locations/us-central1/services/a2a-front"]
        );
        assert_eq!(
            snapshot.runtimes[0].kind,
            RuntimeKind::ContainerAgentRuntime
        );
    }

    #[tokio::test]
    async fn public_uri_prefers_card_env_over_service_uri() {
        let fake = FakeProvider::new();
        fake.add_container_service(
            LOCATION,
            container_service(
                "projects/p/locations/us-central1/services/svc",
                Some("https://svc.internal.run.app"),
                &[(ENV_AGENT_CARD_URL, "https://svc.public.example")],
            ),
        );
        let snapshot = build_snapshot(&fake, &scope()).await.unwrap();
        assert_eq!(
            snapshot.runtimes[0].public_uri.as_deref(),
            Some("https://svc.public.example")
        );
    }

    #[tokio::test]
    async fn session_counts_degrade_per_runtime() {
        let fake = FakeProvider::new();
        fake.add_managed_runtime(
            LOCATION,
            managed_runtime("projects/p/locations/us-central1/reasoningEngines/a", None),
        );
        fake.add_managed_runtime(
            LOCATION,
            managed_runtime("projects/p/locations/us-central1/reasoningEngines/b", None),
        );
        fake.add_sessions("projects/p/locations/us-central1/reasoningEngines/a", 2);
        fake.fail_on("list_sessions projects/p/locations/us-central1/reasoningEngines/b");

        let snapshot = build_snapshot(&fake, &scope()).await.unwrap();
        let counts: HashMap<_, _> = snapshot
            .runtimes
            .iter()
            .map(|runtime| (runtime.short_id.as_str(), runtime.session_count))
            .collect();
        assert_eq!(counts["a"], Some(2));
        assert_eq!(counts["b"], None, "failed count stays unknown, not zero");
    }

    #[tokio::test]
    async fn primary_listing_failure_is_fatal() {
        let fake = FakeProvider::new();
        fake.fail_on("list_managed_runtimes p us-central1");
        let err = build_snapshot(&fake, &scope()).await.unwrap_err();
        assert!(matches!(err, ConsoleError::RegistryRefreshFailed { .. }));
    }

    #[tokio::test]
    async fn discovery_failure_only_flags_incompleteness() {
        let fake = FakeProvider::new();
        fake.add_managed_runtime(
            LOCATION,
            managed_runtime("projects/p/locations/us-central1/reasoningEngines/a", None),
        );
        fake.fail_on("list_collections p global");
        let snapshot = build_snapshot(&fake, &scope()).await.unwrap();
        assert!(!snapshot.usage_data_complete);
        assert_eq!(snapshot.runtimes.len(), 1);
    }

    #[tokio::test]
    async fn rebuild_over_unchanged_data_is_idempotent() {
        let fake = FakeProvider::new();
        fake.add_managed_runtime(
            LOCATION,
            managed_runtime(
                "projects/p/locations/us-central1/reasoningEngines/a",
                Some("Engine A"),
            ),
        );
        fake.add_container_service(
            LOCATION,
            container_service(
                "projects/p/locations/us-central1/services/a2a-svc",
                Some("https://a2a-svc.example.run.app"),
                &[],
            ),
        );

        let first = build_snapshot(&fake, &scope()).await.unwrap();
        let second = build_snapshot(&fake, &scope()).await.unwrap();

        let ids = |snapshot: &RegistrySnapshot| -> HashSet<String> {
            snapshot
                .runtimes
                .iter()
                .map(|runtime| runtime.identity.clone())
                .collect()
        };
        assert_eq!(ids(&first), ids(&second));

        let buckets = |snapshot: &RegistrySnapshot| -> HashMap<String, Vec<LogicalAgent>> {
            snapshot
                .correlation
                .identities()
                .map(|id| {
                    (
                        id.to_string(),
                        snapshot.correlation.agents_for(id).to_vec(),
                    )
                })
                .collect()
        };
        assert_eq!(buckets(&first), buckets(&second));
    }
}
