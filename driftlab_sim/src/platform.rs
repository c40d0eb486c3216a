//! Simulated deployment platforms.

use async_trait::async_trait;
use driftlab_env::{EnvError, Platform};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Recording platform double counting teardown calls per control plane.
pub struct SimPlatform {
    kubernetes_stops: AtomicUsize,
    marathon_stops: AtomicUsize,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            kubernetes_stops: AtomicUsize::new(0),
            marathon_stops: AtomicUsize::new(0),
        }
    }

    /// Number of Kubernetes teardown calls so far.
    pub fn kubernetes_stops(&self) -> usize {
        self.kubernetes_stops.load(Ordering::SeqCst)
    }

    /// Number of Marathon teardown calls so far.
    pub fn marathon_stops(&self) -> usize {
        self.marathon_stops.load(Ordering::SeqCst)
    }

    /// Total teardown calls across both control planes.
    pub fn total_stops(&self) -> usize {
        self.kubernetes_stops() + self.marathon_stops()
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for SimPlatform {
    async fn stop_kubernetes(&self) -> Result<(), EnvError> {
        self.kubernetes_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_marathon(&self) -> Result<(), EnvError> {
        self.marathon_stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Platform for standalone runs where teardown has nothing to tear down.
pub struct NullPlatform;

#[async_trait]
impl Platform for NullPlatform {
    async fn stop_kubernetes(&self) -> Result<(), EnvError> {
        Ok(())
    }

    async fn stop_marathon(&self) -> Result<(), EnvError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stops_are_counted_per_control_plane() {
        let platform = SimPlatform::new();
        platform.stop_kubernetes().await.unwrap();
        platform.stop_kubernetes().await.unwrap();
        platform.stop_marathon().await.unwrap();

        assert_eq!(platform.kubernetes_stops(), 2);
        assert_eq!(platform.marathon_stops(), 1);
        assert_eq!(platform.total_stops(), 3);
    }

    #[tokio::test]
    async fn test_null_platform_accepts_both_stop_calls() {
        let platform = NullPlatform;
        platform.stop_kubernetes().await.unwrap();
        platform.stop_marathon().await.unwrap();
    }
}
