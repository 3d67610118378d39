//! Heuristic classification of container services as agent runtimes.

use agent_console_provider::{trailing_segment, ContainerServiceRecord};

/// Env var the deployment tooling sets to label an agent service.
pub const ENV_AGENT_DISPLAY_NAME: &str = "AGENT_DISPLAY_NAME";
/// Env var carrying the public protocol-card URL of an agent service.
pub const ENV_AGENT_CARD_URL: &str = "A2A_AGENT_CARD_URL";
/// Env var naming the organization behind a protocol agent.
pub const ENV_PROVIDER_ORGANIZATION: &str = "A2A_PROVIDER_ORGANIZATION";

const PROTOCOL_NAME_MARKER: &str = "a2a";
const AGENT_NAME_MARKER: &str = "agent";

pub const FALLBACK_DISPLAY_NAME: &str = "Unnamed agent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The service hosts an agent of some form.
    pub agent_capable: bool,
    /// The service exposes a machine-discoverable protocol card/endpoint and
    /// is independently manageable as a runtime.
    pub protocol_agent: bool,
    pub display_name: String,
}

/// Decide whether a container service is an agent runtime, and of which
/// sub-kind. Pure and total: absence of data degrades to "not agent-capable",
/// never to an error.
pub fn classify(service: &ContainerServiceRecord) -> Classification {
    let display_env = non_empty(service.env_value(ENV_AGENT_DISPLAY_NAME));
    let card_url = non_empty(service.env_value(ENV_AGENT_CARD_URL));
    let provider_org = non_empty(service.env_value(ENV_PROVIDER_ORGANIZATION));

    let short_name = trailing_segment(&service.name).to_ascii_lowercase();

    let protocol_agent =
        card_url.is_some() || provider_org.is_some() || short_name.contains(PROTOCOL_NAME_MARKER);
    let agent_capable =
        protocol_agent || display_env.is_some() || short_name.contains(AGENT_NAME_MARKER);

    let display_name = display_env
        .map(ToOwned::to_owned)
        .or_else(|| non_empty(Some(trailing_segment(&service.name))).map(ToOwned::to_owned))
        .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string());

    Classification {
        agent_capable,
        protocol_agent,
        display_name,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}
