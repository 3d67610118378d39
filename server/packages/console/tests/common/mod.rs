use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use agent_console::router::{build_router, AppState, AuthConfig};
use agent_console_provider::testing::{
    agent_with_card, agent_with_engine, container_service, discovery_record, managed_runtime,
    FakeProvider,
};
use agent_console_registry::types::RegistryScope;

pub const PROJECT: &str = "demo-project";
pub const LOCATION: &str = "us-central1";

pub struct TestApp {
    pub app: Router,
    pub provider: Arc<FakeProvider>,
}

impl TestApp {
    pub fn new(provider: FakeProvider) -> Self {
        Self::with_auth(provider, AuthConfig::disabled())
    }

    pub fn with_auth(provider: FakeProvider, auth: AuthConfig) -> Self {
        let provider = Arc::new(provider);
        let scope = RegistryScope::new(PROJECT, vec![LOCATION.to_string()]);
        let state = AppState::new(auth, provider.clone(), scope);
        Self {
            app: build_router(state),
            provider,
        }
    }
}

pub fn engine(id: &str) -> String {
    format!("projects/{PROJECT}/locations/{LOCATION}/reasoningEngines/{id}")
}

pub fn service(id: &str) -> String {
    format!("projects/{PROJECT}/locations/{LOCATION}/services/{id}")
}

pub fn service_uri(id: &str) -> String {
    format!("https://{id}.example.run.app")
}

/// The reference scenario: managed runtimes A (one session) and B (none), a
/// protocol-agent container service C, one logical agent referencing A
/// directly and one referencing C's URL.
pub fn seed_scenario(provider: &FakeProvider) {
    provider.add_managed_runtime(LOCATION, managed_runtime(&engine("a"), Some("Engine A")));
    provider.add_managed_runtime(LOCATION, managed_runtime(&engine("b"), Some("Engine B")));
    provider.add_sessions(&engine("a"), 1);
    provider.add_container_service(
        LOCATION,
        container_service(&service("a2a-c"), Some(&service_uri("a2a-c")), &[]),
    );

    let collection = format!("projects/{PROJECT}/locations/global/collections/default");
    let app = format!("{collection}/apps/console");
    let assistant = format!("{app}/assistants/default");
    provider.add_collection("global", discovery_record(&collection));
    provider.add_app(&collection, discovery_record(&app));
    provider.add_assistant(&app, discovery_record(&assistant));
    provider.add_agent(
        &assistant,
        agent_with_engine(&format!("{assistant}/agents/direct"), &engine("a")),
    );
    provider.add_agent(
        &assistant,
        agent_with_card(
            &format!("{assistant}/agents/card"),
            &format!("{}/invoke", service_uri("a2a-c")),
        ),
    );
}

pub async fn send_json(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(
            body.map(|value| value.to_string()).unwrap_or_default(),
        ))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let payload = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, payload)
}

pub async fn send_status(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> StatusCode {
    let (status, _) = send_json(app, method, path, body).await;
    status
}

pub fn runtime_identities(registry: &Value) -> Vec<String> {
    let mut identities: Vec<String> = registry
        .get("runtimes")
        .and_then(Value::as_array)
        .map(|runtimes| {
            runtimes
                .iter()
                .filter_map(|runtime| runtime.get("identity").and_then(Value::as_str))
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default();
    identities.sort();
    identities
}

pub fn runtime_entry<'a>(registry: &'a Value, identity: &str) -> &'a Value {
    registry
        .get("runtimes")
        .and_then(Value::as_array)
        .and_then(|runtimes| {
            runtimes
                .iter()
                .find(|runtime| runtime.get("identity").and_then(Value::as_str) == Some(identity))
        })
        .unwrap_or_else(|| panic!("runtime {identity} missing from {registry}"))
}
