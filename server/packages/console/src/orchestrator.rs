//! Selection and deletion orchestration over the runtime registry.
//!
//! One orchestrator instance backs one active console view. It exclusively
//! owns the registry snapshot and the selection set; every mutation goes
//! through it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{stream, StreamExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use agent_console_error::ConsoleError;
use agent_console_provider::ProviderApi;
use agent_console_registry::sessions::drain_sessions;
use agent_console_registry::snapshot::build_snapshot;
use agent_console_registry::types::{
    RegistryScope, RegistrySnapshot, RuntimeKind, RuntimeRecord,
};

const DELETE_FANOUT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Deleting,
}

/// Result of one deletion attempt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletionOutcome {
    pub identity: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Result of one deletion batch, including the unconditional post-batch
/// registry refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub outcomes: Vec<DeletionOutcome>,
    /// One human-readable summary of every failed identity, absent when the
    /// whole batch succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_report: Option<String>,
    /// Set when the post-batch registry refresh failed; the view must switch
    /// to its page-level error state, distinct from per-resource failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_error: Option<String>,
}

pub struct Orchestrator {
    provider: Arc<dyn ProviderApi>,
    scope: RegistryScope,
    snapshot: Option<RegistrySnapshot>,
    selection: HashSet<String>,
    phase: Phase,
    epoch: u64,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn ProviderApi>, scope: RegistryScope) -> Self {
        Self {
            provider,
            scope,
            snapshot: None,
            selection: HashSet::new(),
            phase: Phase::Idle,
            epoch: 0,
        }
    }

    pub fn provider(&self) -> Arc<dyn ProviderApi> {
        self.provider.clone()
    }

    pub fn scope(&self) -> &RegistryScope {
        &self.scope
    }

    pub fn snapshot(&self) -> Option<&RegistrySnapshot> {
        self.snapshot.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Selected identities, sorted for stable output.
    pub fn selection(&self) -> Vec<String> {
        let mut selection: Vec<String> = self.selection.iter().cloned().collect();
        selection.sort();
        selection
    }

    /// Start a fetch cycle and return its token. Only the completion carrying
    /// the newest token may install a snapshot; older in-flight fetches
    /// resolve into no-ops (last write wins on the single registry slot).
    pub fn begin_refresh(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Install (or discard, if stale) the result of a fetch started with
    /// `begin_refresh`. Returns whether the snapshot was installed.
    pub fn complete_refresh(
        &mut self,
        token: u64,
        result: Result<RegistrySnapshot, ConsoleError>,
    ) -> Result<bool, ConsoleError> {
        if token != self.epoch {
            tracing::debug!(token, current = self.epoch, "discarding stale registry fetch");
            return Ok(false);
        }
        match result {
            Ok(snapshot) => {
                self.snapshot = Some(snapshot);
                self.selection.clear();
                Ok(true)
            }
            Err(err) => {
                // Nothing meaningful is left to show; the view degrades to
                // its blocking error state rather than stale data.
                self.snapshot = None;
                self.selection.clear();
                Err(err)
            }
        }
    }

    /// Fetch a fresh snapshot and install it.
    pub async fn refresh(&mut self) -> Result<(), ConsoleError> {
        let token = self.begin_refresh();
        let result = build_snapshot(self.provider.as_ref(), &self.scope).await;
        self.complete_refresh(token, result)?;
        Ok(())
    }

    /// Toggle one runtime in or out of the selection. Returns the new state.
    pub fn toggle(&mut self, identity: &str) -> Result<bool, ConsoleError> {
        if self.phase == Phase::Deleting {
            return Err(ConsoleError::DeletionInProgress);
        }
        let known = self
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| {
                snapshot
                    .runtimes
                    .iter()
                    .any(|runtime| runtime.identity == identity)
            });
        if !known {
            return Err(ConsoleError::RuntimeNotFound {
                identity: identity.to_string(),
            });
        }
        if self.selection.remove(identity) {
            Ok(false)
        } else {
            self.selection.insert(identity.to_string());
            Ok(true)
        }
    }

    /// Select every runtime in the current snapshot. Returns the selection
    /// size.
    pub fn select_all(&mut self) -> Result<usize, ConsoleError> {
        if self.phase == Phase::Deleting {
            return Err(ConsoleError::DeletionInProgress);
        }
        if let Some(snapshot) = &self.snapshot {
            self.selection = snapshot
                .runtimes
                .iter()
                .map(|runtime| runtime.identity.clone())
                .collect();
        }
        Ok(self.selection.len())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Delete every selected runtime, each independently, then re-fetch the
    /// registry unconditionally. No single failure aborts the batch.
    pub async fn delete_selected(&mut self) -> Result<DeletionReport, ConsoleError> {
        if self.phase == Phase::Deleting {
            return Err(ConsoleError::DeletionInProgress);
        }
        let snapshot = self.snapshot.as_ref().ok_or(ConsoleError::InvalidRequest {
            message: "no registry snapshot loaded".to_string(),
        })?;
        if self.selection.is_empty() {
            return Err(ConsoleError::SelectionEmpty);
        }

        let targets: Vec<RuntimeRecord> = snapshot
            .runtimes
            .iter()
            .filter(|runtime| self.selection.contains(&runtime.identity))
            .cloned()
            .collect();

        self.phase = Phase::Deleting;
        let provider = self.provider.clone();
        let unordered: Vec<DeletionOutcome> = stream::iter(targets.clone())
            .map(|runtime| {
                let provider = provider.clone();
                async move { delete_one(provider.as_ref(), &runtime).await }
            })
            .buffer_unordered(DELETE_FANOUT)
            .collect()
            .await;

        let mut by_identity: HashMap<String, DeletionOutcome> = unordered
            .into_iter()
            .map(|outcome| (outcome.identity.clone(), outcome))
            .collect();
        let outcomes: Vec<DeletionOutcome> = targets
            .iter()
            .filter_map(|runtime| by_identity.remove(&runtime.identity))
            .collect();

        let failures: Vec<String> = outcomes
            .iter()
            .filter(|outcome| !outcome.succeeded)
            .map(|outcome| {
                format!(
                    "{}: {}",
                    outcome.identity,
                    outcome.error_message.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();
        let failure_report = if failures.is_empty() {
            None
        } else {
            Some(format!(
                "failed to delete {} of {} selected runtimes: {}",
                failures.len(),
                outcomes.len(),
                failures.join("; ")
            ))
        };

        self.selection.clear();
        self.phase = Phase::Idle;

        // The displayed state must never silently diverge from provider
        // truth, so the registry is re-fetched even when every attempt
        // failed.
        let token = self.begin_refresh();
        let result = build_snapshot(self.provider.as_ref(), &self.scope).await;
        let refresh_error = match self.complete_refresh(token, result) {
            Ok(_) => None,
            Err(err) => Some(err.to_string()),
        };

        Ok(DeletionReport {
            outcomes,
            failure_report,
            refresh_error,
        })
    }
}

/// One runtime's deletion procedure: drain (managed only, best-effort), then
/// delete. The two steps are strictly sequential; a drain failure is logged
/// and never blocks the delete, since a stuck session must not make the
/// resource undeletable.
async fn delete_one(provider: &dyn ProviderApi, runtime: &RuntimeRecord) -> DeletionOutcome {
    if runtime.kind == RuntimeKind::ManagedRuntime {
        match drain_sessions(provider, &runtime.identity).await {
            Ok(terminated) if terminated > 0 => {
                tracing::info!(identity = %runtime.identity, terminated, "drained sessions");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(identity = %runtime.identity, error = %err, "session drain failed, continuing with delete");
            }
        }
    }

    let result = match runtime.kind {
        RuntimeKind::ManagedRuntime => provider.delete_managed_runtime(&runtime.identity).await,
        RuntimeKind::ContainerAgentRuntime => {
            provider.delete_container_service(&runtime.identity).await
        }
    };

    match result {
        Ok(()) => DeletionOutcome {
            identity: runtime.identity.clone(),
            succeeded: true,
            error_message: None,
        },
        Err(err) => {
            let err = ConsoleError::ResourceDeleteFailed {
                identity: runtime.identity.clone(),
                message: err.to_string(),
            };
            tracing::error!(identity = %runtime.identity, error = %err, "runtime deletion failed");
            DeletionOutcome {
                identity: runtime.identity.clone(),
                succeeded: false,
                error_message: Some(err.to_string()),
            }
        }
    }
}
