//! Simulated cluster membership with fault injection.

use async_trait::async_trait;
use driftlab_env::{Cluster, EnvError, ObjectFilter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Recording cluster double.
///
/// Stands in for the real membership/replication layer. Knobs:
/// - `disconnected_for(n)`: report "not connected" for the first `n` probes
/// - `fail_next_syncs(n)`: make the next `n` sync passes return an error
///
/// Every `blocking_sync` call is counted, so exactly-once assertions read
/// straight off the double.
pub struct SimCluster {
    /// Probes left to answer "not connected". 0 = connected now.
    disconnected_probes: AtomicUsize,

    /// Sync passes left to fail before succeeding again.
    failing_syncs: AtomicUsize,

    /// Total blocking_sync invocations.
    sync_calls: AtomicUsize,

    /// Filter passed to the most recent sync, for inspection.
    last_filter: Mutex<Option<ObjectFilter>>,
}

impl SimCluster {
    /// Creates a cluster that is connected from the start.
    pub fn new() -> Self {
        Self {
            disconnected_probes: AtomicUsize::new(0),
            failing_syncs: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            last_filter: Mutex::new(None),
        }
    }

    /// Creates a cluster that reports "not connected" for the first
    /// `probes` connectivity checks.
    pub fn disconnected_for(probes: usize) -> Self {
        let cluster = Self::new();
        cluster.disconnected_probes.store(probes, Ordering::SeqCst);
        cluster
    }

    /// Makes the next `count` sync passes fail.
    pub fn fail_next_syncs(&self, count: usize) {
        self.failing_syncs.store(count, Ordering::SeqCst);
    }

    /// How many sync passes have been requested so far.
    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    /// The object filter of the most recent sync pass, if any.
    pub fn last_filter(&self) -> Option<ObjectFilter> {
        self.last_filter.lock().unwrap().clone()
    }
}

impl Default for SimCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cluster for SimCluster {
    fn was_connected(&self) -> bool {
        // Consume one "not connected" probe if any remain.
        self.disconnected_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    async fn blocking_sync(&self, filter: ObjectFilter) -> Result<(), EnvError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_filter.lock().unwrap() = Some(filter);

        let should_fail = self
            .failing_syncs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(EnvError::sync("injected sync failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftlab_env::all_objects;

    #[test]
    fn test_connected_by_default() {
        let cluster = SimCluster::new();
        assert!(cluster.was_connected());
        assert!(cluster.was_connected());
    }

    #[test]
    fn test_disconnected_probes_are_consumed() {
        let cluster = SimCluster::disconnected_for(2);
        assert!(!cluster.was_connected());
        assert!(!cluster.was_connected());
        assert!(cluster.was_connected());
    }

    #[tokio::test]
    async fn test_sync_counts_and_injected_failures() {
        let cluster = SimCluster::new();
        cluster.fail_next_syncs(1);

        assert!(cluster.blocking_sync(all_objects()).await.is_err());
        assert!(cluster.blocking_sync(all_objects()).await.is_ok());
        assert_eq!(cluster.sync_calls(), 2);
    }

    #[tokio::test]
    async fn test_last_filter_is_recorded() {
        let cluster = SimCluster::new();
        cluster.blocking_sync(all_objects()).await.unwrap();

        let filter = cluster.last_filter().unwrap();
        assert!(filter("any-object"));
    }
}
