//! Unified agent runtime registry.
//!
//! Discovers agent-capable compute of two kinds (managed reasoning-engine
//! runtimes and container-service runtimes), correlates each runtime with the
//! logical agents that reference it, and assembles one homogeneous snapshot
//! for the console to act on.

pub mod classify;
pub mod correlate;
pub mod discovery;
pub mod sessions;
pub mod snapshot;
pub mod types;
