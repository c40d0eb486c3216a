//! Task Progress Tracking - Who Has Finished Which Phase
//!
//! An experiment advances through named phases ("events", "logs", ...). Every
//! participating node reports its own completion of each phase; the controller
//! polls the aggregate to decide when the cluster as a whole has moved on.
//!
//! Tasks are created implicitly by the first report and never deleted during
//! a run. The completed-set for a task only grows.

use std::collections::HashSet;
use std::sync::Arc;

use driftlab_env::NodeId;

use crate::store::{AtomicStore, StoreError};

/// Phase in which clients generate workload events.
pub const TASK_EVENTS: &str = "events";

/// Phase in which clients push their local logs.
pub const TASK_LOGS: &str = "logs";

/// Marker task recording that an anti-entropy pass ran.
pub const TASK_ANTI_ENTROPY: &str = "anti_entropy";

/// Marker task for the controller's own convergence milestone.
pub const TASK_CONVERGENCE: &str = "convergence";

/// Aggregated view of per-node task completion.
///
/// Reports may arrive concurrently from any participant; implementations must
/// tolerate duplicate reports from the same node (the completed-set is a set).
pub trait TaskTracker: Send + Sync {
    /// Records that `node` finished `task`. Idempotent per (task, node) pair.
    fn report_completion(&self, task: &str, node: NodeId) -> Result<(), StoreError>;

    /// Returns the set of nodes that have reported completion of `task`.
    ///
    /// A task nobody reported yet yields the empty set, not an error.
    fn progress(&self, task: &str) -> Result<HashSet<NodeId>, StoreError>;

    /// True when every expected node has reported completion of `task`.
    fn is_complete(&self, task: &str) -> Result<bool, StoreError>;

    /// True when at least `count` nodes have reported completion of `task`.
    fn completed_by(&self, task: &str, count: usize) -> Result<bool, StoreError> {
        Ok(self.progress(task)?.len() >= count)
    }
}

/// Tracker persisting completion reports through an [`AtomicStore`].
///
/// Each report is one marker record under the key `<task>/<node-uuid>`, so a
/// report is a blind idempotent `put` and the completed-set falls out of the
/// key space. No read-modify-write is needed, which keeps concurrent reports
/// race-free without coordination above the store.
pub struct StoreTracker {
    store: Arc<AtomicStore>,
    expected_nodes: usize,
}

impl StoreTracker {
    /// Creates a tracker over `store` expecting `expected_nodes` reports per
    /// task for cluster-wide completion.
    pub fn new(store: Arc<AtomicStore>, expected_nodes: usize) -> Self {
        Self {
            store,
            expected_nodes,
        }
    }

    fn marker_key(task: &str, node: NodeId) -> String {
        format!("{}/{}", task, node.as_uuid())
    }
}

impl TaskTracker for StoreTracker {
    fn report_completion(&self, task: &str, node: NodeId) -> Result<(), StoreError> {
        self.store.put(&Self::marker_key(task, node), &node)
    }

    fn progress(&self, task: &str) -> Result<HashSet<NodeId>, StoreError> {
        let prefix = format!("{}/", task);
        self.store.fold(HashSet::new(), |mut acc, key, node: NodeId| {
            if key.starts_with(&prefix) {
                acc.insert(node);
            }
            acc
        })
    }

    fn is_complete(&self, task: &str) -> Result<bool, StoreError> {
        Ok(self.progress(task)?.len() >= self.expected_nodes)
    }
}
