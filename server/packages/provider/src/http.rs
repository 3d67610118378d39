use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use url::Url;

use crate::api::{ProviderApi, ProviderError};
use crate::records::{
    AgentRecord, ContainerServiceRecord, DiscoveryRecord, ManagedRuntimeRecord, SessionRecord,
};

/// Endpoints and auth material for the real provider APIs.
///
/// Token acquisition and refresh are the caller's concern; the provider only
/// attaches whatever bearer token it is handed.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// Base URL of the managed reasoning-engine runtime API.
    pub runtime_api: Url,
    /// Base URL of the container-service API.
    pub container_api: Url,
    /// Base URL of the logical agent hierarchy API.
    pub discovery_api: Url,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
    config: HttpProviderConfig,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::builder().build()?,
            config,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T>(&self, url: Url) -> Result<T, ProviderError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.authorize(self.client.get(url.clone())).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::debug!(%url, status = status.as_u16(), "provider listing failed");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))
    }

    async fn delete(&self, url: Url) -> Result<(), ProviderError> {
        let response = self.authorize(self.client.delete(url.clone())).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::debug!(%url, status = status.as_u16(), "provider delete failed");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

fn endpoint(base: &Url, path: &str) -> Result<Url, ProviderError> {
    Ok(Url::parse(&format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path
    ))?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeListEnvelope {
    #[serde(default)]
    reasoning_engines: Vec<ManagedRuntimeRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceListEnvelope {
    #[serde(default)]
    services: Vec<ContainerServiceRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionListEnvelope {
    #[serde(default)]
    sessions: Vec<SessionRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct CollectionListEnvelope {
    #[serde(default)]
    collections: Vec<DiscoveryRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct AppListEnvelope {
    #[serde(default)]
    apps: Vec<DiscoveryRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantListEnvelope {
    #[serde(default)]
    assistants: Vec<DiscoveryRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentListEnvelope {
    #[serde(default)]
    agents: Vec<AgentRecord>,
}

#[async_trait]
impl ProviderApi for HttpProvider {
    async fn list_managed_runtimes(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<ManagedRuntimeRecord>, ProviderError> {
        let url = endpoint(
            &self.config.runtime_api,
            &format!("v1beta1/projects/{project}/locations/{location}/reasoningEngines"),
        )?;
        let envelope: RuntimeListEnvelope = self.get_json(url).await?;
        Ok(envelope.reasoning_engines)
    }

    async fn list_container_services(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<ContainerServiceRecord>, ProviderError> {
        let url = endpoint(
            &self.config.container_api,
            &format!("v2/projects/{project}/locations/{location}/services"),
        )?;
        let envelope: ServiceListEnvelope = self.get_json(url).await?;
        Ok(envelope.services)
    }

    async fn list_sessions(
        &self,
        runtime_identity: &str,
    ) -> Result<Vec<SessionRecord>, ProviderError> {
        let url = endpoint(
            &self.config.runtime_api,
            &format!("v1beta1/{runtime_identity}/sessions"),
        )?;
        let envelope: SessionListEnvelope = self.get_json(url).await?;
        Ok(envelope.sessions)
    }

    async fn delete_session(&self, session_identity: &str) -> Result<(), ProviderError> {
        let url = endpoint(
            &self.config.runtime_api,
            &format!("v1beta1/{session_identity}"),
        )?;
        self.delete(url).await
    }

    async fn delete_managed_runtime(&self, identity: &str) -> Result<(), ProviderError> {
        // force tears down child resources (sessions the drain step missed).
        let url = endpoint(
            &self.config.runtime_api,
            &format!("v1beta1/{identity}?force=true"),
        )?;
        self.delete(url).await
    }

    async fn delete_container_service(&self, identity: &str) -> Result<(), ProviderError> {
        let url = endpoint(&self.config.container_api, &format!("v2/{identity}"))?;
        self.delete(url).await
    }

    async fn list_collections(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<DiscoveryRecord>, ProviderError> {
        let url = endpoint(
            &self.config.discovery_api,
            &format!("v1alpha/projects/{project}/locations/{location}/collections"),
        )?;
        let envelope: CollectionListEnvelope = self.get_json(url).await?;
        Ok(envelope.collections)
    }

    async fn list_apps(&self, collection: &str) -> Result<Vec<DiscoveryRecord>, ProviderError> {
        let url = endpoint(&self.config.discovery_api, &format!("v1alpha/{collection}/apps"))?;
        let envelope: AppListEnvelope = self.get_json(url).await?;
        Ok(envelope.apps)
    }

    async fn list_assistants(&self, app: &str) -> Result<Vec<DiscoveryRecord>, ProviderError> {
        let url = endpoint(&self.config.discovery_api, &format!("v1alpha/{app}/assistants"))?;
        let envelope: AssistantListEnvelope = self.get_json(url).await?;
        Ok(envelope.assistants)
    }

    async fn list_agents(&self, assistant: &str) -> Result<Vec<AgentRecord>, ProviderError> {
        let url = endpoint(
            &self.config.discovery_api,
            &format!("v1alpha/{assistant}/agents"),
        )?;
        let envelope: AgentListEnvelope = self.get_json(url).await?;
        Ok(envelope.agents)
    }
}
