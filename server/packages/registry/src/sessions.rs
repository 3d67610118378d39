//! Session inspection and draining for managed runtimes.

use agent_console_error::ConsoleError;
use agent_console_provider::ProviderApi;

/// Best-effort live session count for one managed runtime. `None` means the
/// count could not be determined, which callers must keep distinct from zero.
pub async fn session_count(provider: &dyn ProviderApi, identity: &str) -> Option<u32> {
    match provider.list_sessions(identity).await {
        Ok(sessions) => Some(sessions.len() as u32),
        Err(err) => {
            tracing::warn!(identity, error = %err, "session count unavailable");
            None
        }
    }
}

/// Terminate every active session of one managed runtime. Returns the number
/// of sessions terminated; failures on individual terminations are collected
/// into one error rather than stopping at the first.
pub async fn drain_sessions(
    provider: &dyn ProviderApi,
    identity: &str,
) -> Result<usize, ConsoleError> {
    let sessions = provider.list_sessions(identity).await.map_err(|err| {
        ConsoleError::SessionDrainFailed {
            identity: identity.to_string(),
            message: err.to_string(),
        }
    })?;

    let mut terminated = 0;
    let mut failures = Vec::new();
    for session in sessions {
        match provider.delete_session(&session.name).await {
            Ok(()) => terminated += 1,
            Err(err) => failures.push(format!("{}: {err}", session.name)),
        }
    }

    if failures.is_empty() {
        Ok(terminated)
    } else {
        Err(ConsoleError::SessionDrainFailed {
            identity: identity.to_string(),
            message: failures.join("; "),
        })
    }
}
