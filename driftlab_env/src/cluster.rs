//! Cluster membership and anti-entropy abstraction for Driftlab.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EnvError;

/// Predicate selecting which replicated objects an anti-entropy exchange
/// covers. `|_| true` selects every object.
pub type ObjectFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Returns a filter that selects every replicated object.
pub fn all_objects() -> ObjectFilter {
    Arc::new(|_| true)
}

/// Abstraction over the membership and replication layer.
///
/// # Implementations
///
/// - **Production**: Wraps the real membership service and replica exchange
/// - **Simulation**: Recording double with configurable connectivity/failures
///
/// # Exchange Flow
///
/// ```text
/// Controller                 Cluster                    Peers
///   |                           |                          |
///   |-- blocking_sync(filter)-->|                          |
///   |                           |-- [exchange replicas] -->|
///   |<------ Ok(()) ------------|<-------------------------|
/// ```
#[async_trait]
pub trait Cluster: Send + Sync + 'static {
    /// Reports whether this node has joined the experiment overlay.
    ///
    /// Orchestrated deployments poll this before starting a run so that
    /// every client is reachable when the workload begins.
    fn was_connected(&self) -> bool;

    /// Runs one anti-entropy exchange with peers and waits for it to finish.
    ///
    /// # Arguments
    /// * `filter` - Selects which replicated objects to exchange
    ///
    /// # Returns
    /// * `Ok(())` - Exchange completed against reachable peers
    /// * `Err(EnvError::SyncError)` - Exchange failed or was aborted
    ///
    /// # Blocking
    /// This method does not return until the exchange round completes.
    /// There is no internal timeout.
    async fn blocking_sync(&self, filter: ObjectFilter) -> Result<(), EnvError>;
}
