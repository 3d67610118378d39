//! Best-effort traversal of the logical agent hierarchy.

use futures::{stream, StreamExt};

use agent_console_provider::{trailing_segment, AgentRecord, ProviderApi, ProviderError};

use crate::types::{LogicalAgent, RuntimeReference};

/// Locations are walked concurrently; nested levels stay serial within a
/// branch to keep request fan-out bounded on the provider side.
const LOCATION_FANOUT: usize = 4;

#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub agents: Vec<LogicalAgent>,
    /// False when any branch failed; the assembled agent list is then a lower
    /// bound, and the view must not claim completeness.
    pub complete: bool,
}

/// Enumerate every logical agent reachable under the candidate locations.
///
/// Each listing call is independently fault-tolerant: a failing branch
/// contributes zero agents and flips `complete`, nothing more. Some locations
/// legitimately hold no resources and answer with errors indistinguishable
/// from real faults, so the walker never reports failure to its caller.
pub async fn discover_agents(
    provider: &dyn ProviderApi,
    project: &str,
    locations: &[String],
) -> DiscoveryResult {
    let branches: Vec<(Vec<LogicalAgent>, bool)> = stream::iter(locations.iter().cloned())
        .map(|location| async move { walk_location(provider, project, &location).await })
        .buffer_unordered(LOCATION_FANOUT)
        .collect()
        .await;

    let mut result = DiscoveryResult {
        agents: Vec::new(),
        complete: true,
    };
    for (agents, complete) in branches {
        result.agents.extend(agents);
        result.complete &= complete;
    }
    result
}

async fn walk_location(
    provider: &dyn ProviderApi,
    project: &str,
    location: &str,
) -> (Vec<LogicalAgent>, bool) {
    let mut agents = Vec::new();
    let mut complete = true;

    let collections = try_level(
        provider.list_collections(project, location).await,
        &mut complete,
        "collections",
        location,
    );
    for collection in collections {
        let apps = try_level(
            provider.list_apps(&collection.name).await,
            &mut complete,
            "apps",
            &collection.name,
        );
        for app in apps {
            let assistants = try_level(
                provider.list_assistants(&app.name).await,
                &mut complete,
                "assistants",
                &app.name,
            );
            for assistant in assistants {
                let records = try_level(
                    provider.list_agents(&assistant.name).await,
                    &mut complete,
                    "agents",
                    &assistant.name,
                );
                agents.extend(records.into_iter().map(to_logical_agent));
            }
        }
    }

    (agents, complete)
}

/// The per-node fault-isolation policy: keep what listed, log what didn't,
/// continue with siblings.
fn try_level<T>(
    result: Result<Vec<T>, ProviderError>,
    complete: &mut bool,
    level: &str,
    scope: &str,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(level, scope, error = %err, "discovery branch failed");
            *complete = false;
            Vec::new()
        }
    }
}

fn to_logical_agent(record: AgentRecord) -> LogicalAgent {
    let runtime_reference = match (record.reasoning_engine, record.agent_card) {
        (Some(identity), _) => Some(RuntimeReference::Engine { identity }),
        (None, Some(card)) => card.url.map(|url| RuntimeReference::Card { url }),
        (None, None) => None,
    };
    let display_name = record
        .display_name
        .unwrap_or_else(|| trailing_segment(&record.name).to_string());
    LogicalAgent {
        identity: record.name,
        display_name,
        runtime_reference,
    }
}

#[cfg(test)]
mod tests {
    use agent_console_provider::testing::{
        agent_with_card, agent_with_engine, discovery_record, FakeProvider,
    };

    use super::*;

    fn locations(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    fn seed_branch(fake: &FakeProvider, location: &str, suffix: &str) {
        let collection = format!("projects/p/locations/{location}/collections/default");
        let app = format!("{collection}/apps/app-{suffix}");
        let assistant = format!("{app}/assistants/default");
        fake.add_collection(location, discovery_record(&collection));
        fake.add_app(&collection, discovery_record(&app));
        fake.add_assistant(&app, discovery_record(&assistant));
        fake.add_agent(
            &assistant,
            agent_with_engine(
                &format!("{assistant}/agents/{suffix}"),
                "projects/p/locations/l/reasoningEngines/1",
            ),
        );
    }

    #[tokio::test]
    async fn walks_all_four_levels() {
        let fake = FakeProvider::new();
        seed_branch(&fake, "global", "one");
        let result = discover_agents(&fake, "p", &locations(&["global"])).await;
        assert!(result.complete);
        assert_eq!(result.agents.len(), 1);
        assert_eq!(
            result.agents[0].runtime_reference,
            Some(RuntimeReference::Engine {
                identity: "projects/p/locations/l/reasoningEngines/1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn failed_location_does_not_abort_siblings() {
        let fake = FakeProvider::new();
        seed_branch(&fake, "global", "one");
        fake.fail_on("list_collections p us");
        let result = discover_agents(&fake, "p", &locations(&["global", "us"])).await;
        assert!(!result.complete);
        assert_eq!(result.agents.len(), 1);
    }

    #[tokio::test]
    async fn failed_app_listing_keeps_sibling_collections() {
        let fake = FakeProvider::new();
        seed_branch(&fake, "global", "one");
        let broken_collection = "projects/p/locations/global/collections/broken";
        fake.add_collection("global", discovery_record(broken_collection));
        fake.fail_on(&format!("list_apps {broken_collection}"));

        let result = discover_agents(&fake, "p", &locations(&["global"])).await;
        assert!(!result.complete);
        assert_eq!(result.agents.len(), 1, "healthy sibling collection still walked");
    }

    #[tokio::test]
    async fn failed_mid_level_keeps_sibling_branches() {
        let fake = FakeProvider::new();
        seed_branch(&fake, "global", "one");
        let collection = "projects/p/locations/global/collections/default";
        let broken_app = format!("{collection}/apps/app-broken");
        fake.add_app(collection, discovery_record(&broken_app));
        fake.fail_on(&format!("list_assistants {broken_app}"));

        let result = discover_agents(&fake, "p", &locations(&["global"])).await;
        assert!(!result.complete);
        assert_eq!(result.agents.len(), 1, "healthy sibling app still walked");
    }

    #[tokio::test]
    async fn failed_agent_listing_flips_completeness_only() {
        let fake = FakeProvider::new();
        seed_branch(&fake, "global", "one");
        let assistant =
            "projects/p/locations/global/collections/default/apps/app-one/assistants/default";
        fake.fail_on(&format!("list_agents {assistant}"));
        let result = discover_agents(&fake, "p", &locations(&["global"])).await;
        assert!(!result.complete);
        assert!(result.agents.is_empty());
    }

    #[tokio::test]
    async fn card_agents_resolve_to_url_references() {
        let fake = FakeProvider::new();
        let collection = "projects/p/locations/global/collections/default";
        let app = format!("{collection}/apps/app");
        let assistant = format!("{app}/assistants/default");
        fake.add_collection("global", discovery_record(collection));
        fake.add_app(collection, discovery_record(&app));
        fake.add_assistant(&app, discovery_record(&assistant));
        fake.add_agent(
            &assistant,
            agent_with_card(
                &format!("{assistant}/agents/card"),
                "https://svc.example.run.app/invoke",
            ),
        );

        let result = discover_agents(&fake, "p", &locations(&["global"])).await;
        assert_eq!(
            result.agents[0].runtime_reference,
            Some(RuntimeReference::Card {
                url: "https://svc.example.run.app/invoke".to_string()
            })
        );
    }
}
