use async_trait::async_trait;
use thiserror::Error;

use crate::records::{
    AgentRecord, ContainerServiceRecord, DiscoveryRecord, ManagedRuntimeRecord, SessionRecord,
};

/// Transport-level failure from any provider call.
///
/// The console treats every variant uniformly as "this branch or attempt
/// failed"; the message is preserved for user-facing reports.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("decode error: {0}")]
    Decode(String),
}

/// In-process contract with the cloud provider's APIs.
///
/// Auth signing, retries and timeouts live behind the implementation; callers
/// only see records and `ProviderError`.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    async fn list_managed_runtimes(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<ManagedRuntimeRecord>, ProviderError>;

    async fn list_container_services(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<ContainerServiceRecord>, ProviderError>;

    /// Active sessions of one managed runtime.
    async fn list_sessions(
        &self,
        runtime_identity: &str,
    ) -> Result<Vec<SessionRecord>, ProviderError>;

    async fn delete_session(&self, session_identity: &str) -> Result<(), ProviderError>;

    async fn delete_managed_runtime(&self, identity: &str) -> Result<(), ProviderError>;

    async fn delete_container_service(&self, identity: &str) -> Result<(), ProviderError>;

    async fn list_collections(
        &self,
        project: &str,
        location: &str,
    ) -> Result<Vec<DiscoveryRecord>, ProviderError>;

    async fn list_apps(&self, collection: &str) -> Result<Vec<DiscoveryRecord>, ProviderError>;

    async fn list_assistants(&self, app: &str) -> Result<Vec<DiscoveryRecord>, ProviderError>;

    async fn list_agents(&self, assistant: &str) -> Result<Vec<AgentRecord>, ProviderError>;
}
