//! Experiment configuration.

use driftlab_env::Orchestration;
use std::time::Duration;

/// How often the controller re-checks task progress.
pub const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// How often the controller re-probes cluster connectivity while waiting.
pub const CONNECTIVITY_POLL: Duration = Duration::from_millis(100);

/// Tunable parameters of one divergence experiment.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Events each client generates.
    pub max_events: u64,

    /// Number of client nodes participating.
    pub client_number: usize,

    /// Whether end-of-run measurements are emitted to the sink.
    pub instrumentation: bool,

    /// Deployment platform controlling connectivity wait and teardown.
    pub orchestration: Orchestration,

    /// Interval between periodic status checks.
    pub status_interval: Duration,

    /// Interval between connectivity probes while waiting.
    pub connectivity_poll: Duration,

    /// Upper bound on the connectivity wait. `None` waits without bound,
    /// which matches how a scheduler-managed cluster is expected to behave.
    pub connect_timeout: Option<Duration>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            client_number: 0,
            instrumentation: false,
            orchestration: Orchestration::Local,
            status_interval: STATUS_INTERVAL,
            connectivity_poll: CONNECTIVITY_POLL,
            connect_timeout: None,
        }
    }
}

impl ExperimentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many events each client generates.
    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = max_events;
        self
    }

    /// Sets the number of participating clients.
    pub fn with_clients(mut self, client_number: usize) -> Self {
        self.client_number = client_number;
        self
    }

    /// Enables or disables instrumentation output.
    pub fn with_instrumentation(mut self, enabled: bool) -> Self {
        self.instrumentation = enabled;
        self
    }

    /// Sets the deployment platform.
    pub fn with_orchestration(mut self, orchestration: Orchestration) -> Self {
        self.orchestration = orchestration;
        self
    }

    /// Sets the periodic status check interval.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Sets the connectivity probe interval.
    pub fn with_connectivity_poll(mut self, interval: Duration) -> Self {
        self.connectivity_poll = interval;
        self
    }

    /// Bounds the connectivity wait.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Total events the whole cluster is expected to generate.
    ///
    /// This is both the invariant threshold and the expectation the final
    /// divergence is measured against. Saturates instead of overflowing.
    pub fn expected_events(&self) -> u64 {
        self.max_events.saturating_mul(self.client_number as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_events_is_per_client_times_clients() {
        let config = ExperimentConfig::new().with_max_events(100).with_clients(3);
        assert_eq!(config.expected_events(), 300);
    }

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.max_events, 1000);
        assert_eq!(config.client_number, 0);
        assert!(!config.instrumentation);
        assert_eq!(config.orchestration, Orchestration::Local);
        assert_eq!(config.status_interval, Duration::from_secs(10));
        assert_eq!(config.connectivity_poll, Duration::from_millis(100));
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn test_expected_events_saturates() {
        let config = ExperimentConfig::new().with_max_events(u64::MAX).with_clients(2);
        assert_eq!(config.expected_events(), u64::MAX);
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use driftlab_core::DivergenceReport;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_expected_events_is_the_product(
            max_events in 0u64..1_000_000,
            clients in 0usize..10_000,
        ) {
            let config = ExperimentConfig::new()
                .with_max_events(max_events)
                .with_clients(clients);
            prop_assert_eq!(config.expected_events(), max_events * clients as u64);
        }

        #[test]
        fn test_divergence_overcount_is_observed_minus_expected(
            expected in 0u64..u32::MAX as u64,
            observed in 0u64..u32::MAX as u64,
        ) {
            let report = DivergenceReport::compute(expected, observed);
            prop_assert_eq!(report.overcount, observed as i64 - expected as i64);
        }

        #[test]
        fn test_divergence_percent_defined_iff_expected_nonzero(
            expected in 0u64..u32::MAX as u64,
            observed in 0u64..u32::MAX as u64,
        ) {
            let report = DivergenceReport::compute(expected, observed);
            match report.percent {
                None => prop_assert_eq!(expected, 0),
                Some(percent) => {
                    let recomputed = report.overcount as f64 * 100.0 / expected as f64;
                    prop_assert!((percent - recomputed).abs() < 1e-9);
                }
            }
        }
    }
}
