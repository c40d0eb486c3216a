//! Driftlab Core - Atomic Storage and Experiment Bookkeeping
//!
//! This library provides the state fabric under a divergence experiment:
//! 1. **Lost Update Problem**: serialized read-modify-write via the Atomic Store
//! 2. **Completion Problem**: per-task completion sets polled across the cluster
//! 3. **Overcount Problem**: threshold invariants and divergence measurement

pub mod counter;
pub mod instrument;
pub mod store;
pub mod tasks;

// Re-export key types for convenience
pub use counter::{LocalCounter, SharedCounter, StoreCounter, ThresholdInvariant};
pub use instrument::{DivergenceReport, FileInstrumentation, Instrumentation, NullInstrumentation};
pub use store::{AtomicStore, StoreError};
pub use tasks::{StoreTracker, TaskTracker};
pub use tasks::{TASK_ANTI_ENTROPY, TASK_CONVERGENCE, TASK_EVENTS, TASK_LOGS};
