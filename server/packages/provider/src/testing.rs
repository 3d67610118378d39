//! Scripted in-memory provider for tests.
//!
//! Failure injection and the ordered call log share one namespace: the exact
//! strings recorded in [`FakeProvider::calls`]. `fail_on` takes the same
//! string a call would log and makes that call fail instead.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{ProviderApi, ProviderError};
use crate::records::{
    AgentCard, AgentRecord, ContainerServiceRecord, DiscoveryRecord, EnvVar, ManagedRuntimeRecord,
    SessionRecord,
};

#[derive(Debug, Default)]
struct FakeState {
    managed: HashMap<String, Vec<ManagedRuntimeRecord>>,
    services: HashMap<String, Vec<ContainerServiceRecord>>,
    sessions: HashMap<String, Vec<SessionRecord>>,
    collections: HashMap<String, Vec<DiscoveryRecord>>,
    apps: HashMap<String, Vec<DiscoveryRecord>>,
    assistants: HashMap<String, Vec<DiscoveryRecord>>,
    agents: HashMap<String, Vec<AgentRecord>>,
    failures: HashSet<String>,
    calls: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_managed_runtime(&self, location: &str, record: ManagedRuntimeRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .managed
            .entry(location.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_container_service(&self, location: &str, record: ContainerServiceRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .services
            .entry(location.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_sessions(&self, runtime_identity: &str, count: usize) {
        let mut state = self.state.lock().unwrap();
        let sessions = state
            .sessions
            .entry(runtime_identity.to_string())
            .or_default();
        let start = sessions.len();
        for index in start..start + count {
            sessions.push(SessionRecord {
                name: format!("{runtime_identity}/sessions/{index}"),
            });
        }
    }

    pub fn add_collection(&self, location: &str, record: DiscoveryRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .collections
            .entry(location.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_app(&self, collection: &str, record: DiscoveryRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .apps
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_assistant(&self, app: &str, record: DiscoveryRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .assistants
            .entry(app.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_agent(&self, assistant: &str, record: AgentRecord) {
        let mut state = self.state.lock().unwrap();
        state
            .agents
            .entry(assistant.to_string())
            .or_default()
            .push(record);
    }

    /// Make the call that would log `key` fail with a 503 instead.
    pub fn fail_on(&self, key: &str) {
        self.state.lock().unwrap().failures.insert(key.to_string());
    }

    /// Ordered log of every call made so far.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn session_count(&self, runtime_identity: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .sessions
            .get(runtime_identity)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn record(&self, key: String) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        let failing = state.failures.contains(&key);
        state.calls.push(key.clone());
        if failing {
            return Err(ProviderError::Status {
                status: 503,
                message: format!("injected failure: {key}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderApi for FakeProvider {
    async fn list_managed_runtimes(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<ManagedRuntimeRecord>, ProviderError> {
        self.record(format!("list_managed_runtimes {project} {location}"))?;
        let state = self.state.lock().unwrap();
        Ok(state.managed.get(location).cloned().unwrap_or_default())
    }

    async fn list_container_services(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<ContainerServiceRecord>, ProviderError> {
        self.record(format!("list_container_services {project} {location}"))?;
        let state = self.state.lock().unwrap();
        Ok(state.services.get(location).cloned().unwrap_or_default())
    }

    async fn list_sessions(
        &self,
        runtime_identity: &str,
    ) -> Result<Vec<SessionRecord>, ProviderError> {
        self.record(format!("list_sessions {runtime_identity}"))?;
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .get(runtime_identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_session(&self, session_identity: &str) -> Result<(), ProviderError> {
        self.record(format!("delete_session {session_identity}"))?;
        let mut state = self.state.lock().unwrap();
        for sessions in state.sessions.values_mut() {
            sessions.retain(|session| session.name != session_identity);
        }
        Ok(())
    }

    async fn delete_managed_runtime(&self, identity: &str) -> Result<(), ProviderError> {
        self.record(format!("delete_managed_runtime {identity}"))?;
        let mut state = self.state.lock().unwrap();
        for runtimes in state.managed.values_mut() {
            runtimes.retain(|runtime| runtime.name != identity);
        }
        state.sessions.remove(identity);
        Ok(())
    }

    async fn delete_container_service(&self, identity: &str) -> Result<(), ProviderError> {
        self.record(format!("delete_container_service {identity}"))?;
        let mut state = self.state.lock().unwrap();
        for services in state.services.values_mut() {
            services.retain(|service| service.name != identity);
        }
        Ok(())
    }

    async fn list_collections(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<DiscoveryRecord>, ProviderError> {
        self.record(format!("list_collections {project} {location}"))?;
        let state = self.state.lock().unwrap();
        Ok(state.collections.get(location).cloned().unwrap_or_default())
    }

    async fn list_apps(&self, collection: &str) -> Result<Vec<DiscoveryRecord>, ProviderError> {
        self.record(format!("list_apps {collection}"))?;
        let state = self.state.lock().unwrap();
        Ok(state.apps.get(collection).cloned().unwrap_or_default())
    }

    async fn list_assistants(&self, app: &str) -> Result<Vec<DiscoveryRecord>, ProviderError> {
        self.record(format!("list_assistants {app}"))?;
        let state = self.state.lock().unwrap();
        Ok(state.assistants.get(app).cloned().unwrap_or_default())
    }

    async fn list_agents(&self, assistant: &str) -> Result<Vec<AgentRecord>, ProviderError> {
        self.record(format!("list_agents {assistant}"))?;
        let state = self.state.lock().unwrap();
        Ok(state.agents.get(assistant).cloned().unwrap_or_default())
    }
}

pub fn managed_runtime(name: &str, display_name: Option<&str>) -> ManagedRuntimeRecord {
    ManagedRuntimeRecord {
        name: name.to_string(),
        display_name: display_name.map(ToOwned::to_owned),
        extra: Default::default(),
    }
}

pub fn container_service(
    name: &str,
    uri: Option<&str>,
    env: &[(&str, &str)],
) -> ContainerServiceRecord {
    ContainerServiceRecord {
        name: name.to_string(),
        uri: uri.map(ToOwned::to_owned),
        env: env
            .iter()
            .map(|(name, value)| EnvVar {
                name: (*name).to_string(),
                value: (*value).to_string(),
            })
            .collect(),
        extra: Default::default(),
    }
}

pub fn discovery_record(name: &str) -> DiscoveryRecord {
    DiscoveryRecord {
        name: name.to_string(),
        display_name: None,
    }
}

pub fn agent_with_engine(name: &str, engine: &str) -> AgentRecord {
    AgentRecord {
        name: name.to_string(),
        display_name: None,
        reasoning_engine: Some(engine.to_string()),
        agent_card: None,
        extra: Default::default(),
    }
}

pub fn agent_with_card(name: &str, url: &str) -> AgentRecord {
    AgentRecord {
        name: name.to_string(),
        display_name: None,
        reasoning_engine: None,
        agent_card: Some(AgentCard {
            url: Some(url.to_string()),
            extra: Default::default(),
        }),
        extra: Default::default(),
    }
}
