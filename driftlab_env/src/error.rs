//! Failures surfaced by environment collaborators.

use thiserror::Error;

/// What a cluster or platform call can report back.
///
/// One variant per collaborator seam: sync failures come from
/// [`Cluster::blocking_sync`](crate::Cluster::blocking_sync), unreachable
/// peers from connectivity checks, platform failures from orchestrator
/// stop calls.
#[derive(Debug, Error)]
pub enum EnvError {
    /// An anti-entropy exchange did not finish.
    #[error("Sync error: {0}")]
    SyncError(String),

    /// A peer could not be reached (partition, or not up yet).
    #[error("Node unreachable: {0}")]
    NodeUnreachable(String),

    /// The orchestrator rejected or failed a control-plane request.
    #[error("Platform error: {0}")]
    PlatformError(String),
}

impl EnvError {
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::SyncError(msg.into())
    }

    pub fn unreachable(node: impl std::fmt::Display) -> Self {
        Self::NodeUnreachable(node.to_string())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::PlatformError(msg.into())
    }
}
