use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidRequest,
    TokenInvalid,
    RuntimeNotFound,
    SelectionEmpty,
    DeletionInProgress,
    SessionDrainFailed,
    ResourceDeleteFailed,
    RegistryRefreshFailed,
    ProviderUnavailable,
}

impl ErrorType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "urn:agent-console:error:invalid_request",
            Self::TokenInvalid => "urn:agent-console:error:token_invalid",
            Self::RuntimeNotFound => "urn:agent-console:error:runtime_not_found",
            Self::SelectionEmpty => "urn:agent-console:error:selection_empty",
            Self::DeletionInProgress => "urn:agent-console:error:deletion_in_progress",
            Self::SessionDrainFailed => "urn:agent-console:error:session_drain_failed",
            Self::ResourceDeleteFailed => "urn:agent-console:error:resource_delete_failed",
            Self::RegistryRefreshFailed => "urn:agent-console:error:registry_refresh_failed",
            Self::ProviderUnavailable => "urn:agent-console:error:provider_unavailable",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "Invalid Request",
            Self::TokenInvalid => "Token Invalid",
            Self::RuntimeNotFound => "Runtime Not Found",
            Self::SelectionEmpty => "Selection Empty",
            Self::DeletionInProgress => "Deletion In Progress",
            Self::SessionDrainFailed => "Session Drain Failed",
            Self::ResourceDeleteFailed => "Resource Delete Failed",
            Self::RegistryRefreshFailed => "Registry Refresh Failed",
            Self::ProviderUnavailable => "Provider Unavailable",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::TokenInvalid => 401,
            Self::RuntimeNotFound => 404,
            Self::SelectionEmpty => 400,
            Self::DeletionInProgress => 409,
            Self::SessionDrainFailed => 500,
            Self::ResourceDeleteFailed => 502,
            Self::RegistryRefreshFailed => 502,
            Self::ProviderUnavailable => 502,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    pub fn new(error_type: ErrorType, detail: Option<String>) -> Self {
        Self {
            type_: error_type.as_urn().to_string(),
            title: error_type.title().to_string(),
            status: error_type.status_code(),
            detail,
            instance: None,
            extensions: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConsoleError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("missing or invalid token")]
    TokenInvalid,
    #[error("runtime not found: {identity}")]
    RuntimeNotFound { identity: String },
    #[error("no runtimes selected")]
    SelectionEmpty,
    #[error("a deletion batch is already running")]
    DeletionInProgress,
    #[error("failed to drain sessions for {identity}: {message}")]
    SessionDrainFailed { identity: String, message: String },
    #[error("failed to delete {identity}: {message}")]
    ResourceDeleteFailed { identity: String, message: String },
    #[error("failed to refresh runtime registry: {message}")]
    RegistryRefreshFailed { message: String },
    #[error("provider unavailable: {message}")]
    ProviderUnavailable { message: String },
}

impl ConsoleError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::InvalidRequest { .. } => ErrorType::InvalidRequest,
            Self::TokenInvalid => ErrorType::TokenInvalid,
            Self::RuntimeNotFound { .. } => ErrorType::RuntimeNotFound,
            Self::SelectionEmpty => ErrorType::SelectionEmpty,
            Self::DeletionInProgress => ErrorType::DeletionInProgress,
            Self::SessionDrainFailed { .. } => ErrorType::SessionDrainFailed,
            Self::ResourceDeleteFailed { .. } => ErrorType::ResourceDeleteFailed,
            Self::RegistryRefreshFailed { .. } => ErrorType::RegistryRefreshFailed,
            Self::ProviderUnavailable { .. } => ErrorType::ProviderUnavailable,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::RuntimeNotFound { identity }
            | Self::SessionDrainFailed { identity, .. }
            | Self::ResourceDeleteFailed { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let mut problem = ProblemDetails::new(self.error_type(), Some(self.to_string()));
        let mut extensions = Map::new();
        if let Some(identity) = self.identity() {
            extensions.insert("identity".to_string(), Value::String(identity.to_string()));
        }
        problem.extensions = extensions;
        problem
    }
}

impl From<ConsoleError> for ProblemDetails {
    fn from(value: ConsoleError) -> Self {
        value.to_problem_details()
    }
}

impl From<&ConsoleError> for ProblemDetails {
    fn from(value: &ConsoleError) -> Self {
        value.to_problem_details()
    }
}
