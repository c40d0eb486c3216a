//! Driftlab Divergence Simulation Harness
//!
//! This crate runs a complete divergence experiment in a single process:
//! an experiment controller supervising N simulated clients, with every
//! external collaborator intercepted so runs are deterministic.
//!
//! # Core Principle: Intercepted Collaborators
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock owned by the context; sleeps advance it instantly
//! - **Cluster**: Connectivity probes and sync outcomes are scripted knobs
//! - **Randomness**: Think time and duplicate events derive from one 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  ExperimentController                    │
//! │    (periodic status checks, one anti-entropy pass,       │
//! │     divergence measurement, platform teardown)           │
//! └────────┬──────────────────┬──────────────────┬───────────┘
//!          │                  │                  │
//!     ┌────▼─────┐      ┌─────▼─────┐      ┌─────▼─────┐
//!     │   Task   │      │  Shared   │      │ Cluster / │
//!     │ Tracker  │      │  Counter  │      │ Platform  │
//!     └────▲─────┘      └─────▲─────┘      └───────────┘
//!          │                  │
//!     ┌────┴──────────────────┴─────┐
//!     │      ClientWorkload x N     │
//!     │   (events, think time,      │
//!     │    duplicate applications)  │
//!     └─────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use driftlab_sim::{Collaborators, ExperimentConfig, ExperimentController};
//!
//! let config = ExperimentConfig::new()
//!     .with_max_events(100)
//!     .with_clients(3);
//!
//! let controller = ExperimentController::new(config, node, ctx, collaborators);
//! let report = controller.run().await?;
//! println!("divergence: {}", report);
//! ```

mod cluster;
mod config;
mod context;
mod controller;
mod platform;
mod workload;

pub use cluster::SimCluster;
pub use config::{ExperimentConfig, CONNECTIVITY_POLL, STATUS_INTERVAL};
pub use context::SimContext;
pub use controller::{
    Collaborators, ControllerError, ControllerState, ExperimentController, RunState,
};
pub use platform::{NullPlatform, SimPlatform};
pub use workload::ClientWorkload;
