//! Boundary to the cloud provider APIs.
//!
//! Everything the console knows about the provider goes through the
//! [`ProviderApi`] trait; the rest of the workspace never touches HTTP
//! directly.

mod api;
mod http;
mod records;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api::{ProviderApi, ProviderError};
pub use http::{HttpProvider, HttpProviderConfig};
pub use records::{
    trailing_segment, AgentCard, AgentRecord, ContainerServiceRecord, DiscoveryRecord, EnvVar,
    ManagedRuntimeRecord, SessionRecord,
};
