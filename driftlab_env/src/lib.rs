//! Driftlab Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing Driftlab components
//! to run in both **Production** (tokio) and **Simulation** (virtual clock)
//! environments.
//!
//! # Core Concept: Intercepted Collaborators
//!
//! The experiment controller never touches the real world directly. All of
//! its effects go through seams defined here:
//! - Time (`now()`, `sleep()`)
//! - Membership and anti-entropy (`was_connected()`, `blocking_sync()`)
//! - Deployment control plane (`stop_kubernetes()`, `stop_marathon()`)
//!
//! Production wires in real implementations; tests wire in recording doubles
//! and a virtual clock, so a whole experiment run is reproducible from its
//! seed number.
//!
//! # Example
//!
//! ```ignore
//! use driftlab_env::{Cluster, DriftContext, all_objects};
//!
//! async fn settle<Ctx: DriftContext>(ctx: &Ctx, cluster: &dyn Cluster) {
//!     while !cluster.was_connected() {
//!         ctx.sleep(Duration::from_millis(100)).await;
//!     }
//!     cluster.blocking_sync(all_objects()).await.ok();
//! }
//! ```

mod cluster;
mod context;
mod error;
mod platform;
mod tokio_impl;
mod types;

pub use cluster::{all_objects, Cluster, ObjectFilter};
pub use context::DriftContext;
pub use error::EnvError;
pub use platform::{Orchestration, Platform};
pub use tokio_impl::TokioContext;
pub use types::NodeId;
