//! Deployment platform abstraction for Driftlab experiments.

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::EnvError;

/// Which orchestration platform the experiment is deployed on.
///
/// Determines whether the controller waits for cluster connectivity before
/// starting, and which control-plane teardown call ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orchestration {
    /// Standalone run on a developer machine. No connectivity wait, no
    /// control-plane teardown.
    #[default]
    Local,
    /// Kubernetes deployment.
    Kubernetes,
    /// Marathon (Mesos) deployment.
    Marathon,
}

impl Orchestration {
    /// Human-readable platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Kubernetes => "kubernetes",
            Self::Marathon => "marathon",
        }
    }

    /// Whether this platform schedules nodes remotely.
    ///
    /// Remote platforms need the connectivity wait and the teardown call.
    pub fn is_orchestrated(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl std::fmt::Display for Orchestration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Orchestration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            "marathon" | "mesos" => Ok(Self::Marathon),
            other => Err(format!(
                "unknown orchestration '{}' (expected local, kubernetes, or marathon)",
                other
            )),
        }
    }
}

/// Control-plane handle for tearing down a finished experiment.
///
/// # Implementations
///
/// - **Production**: Talks to the Kubernetes API server or the Marathon REST API
/// - **Simulation**: Recording double that counts teardown calls
#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// Deletes the experiment's Kubernetes deployment.
    async fn stop_kubernetes(&self) -> Result<(), EnvError>;

    /// Destroys the experiment's Marathon application group.
    async fn stop_marathon(&self) -> Result<(), EnvError>;
}
