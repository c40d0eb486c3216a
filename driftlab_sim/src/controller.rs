//! Experiment controller - drives a divergence run to completion.
//!
//! The controller is the long-lived brain of an experiment:
//! 1. Optionally waits for the orchestrated cluster to connect
//! 2. Arms the events-generated threshold invariant and marks its own
//!    convergence milestone
//! 3. Polls task progress on a fixed interval
//! 4. Runs one anti-entropy pass once every client finished generating events
//! 5. On global log-push completion, measures divergence, emits it, and
//!    tears the deployment down

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use driftlab_core::instrument::{DivergenceReport, Instrumentation};
use driftlab_core::store::StoreError;
use driftlab_core::tasks::{TaskTracker, TASK_ANTI_ENTROPY, TASK_CONVERGENCE, TASK_EVENTS, TASK_LOGS};
use driftlab_core::{SharedCounter, ThresholdInvariant};
use driftlab_env::{all_objects, Cluster, DriftContext, EnvError, NodeId, Orchestration, Platform};

use crate::config::ExperimentConfig;

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Created, not yet started.
    Initializing,
    /// Polling the membership layer until the overlay forms.
    WaitingForConnectivity,
    /// Periodic status checks in progress.
    Running,
    /// Terminal. Further ticks are no-ops.
    Completed,
}

/// Errors that abort a run (startup failures and per-tick check failures).
///
/// Tick failures are logged by the run loop and retried on the next
/// interval; only startup failures terminate the run.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Environment error: {0}")]
    Env(#[from] EnvError),

    #[error("Cluster did not connect within {0:?}")]
    ConnectivityTimeout(Duration),
}

/// Shared run flags, readable by any collaborator that must short-circuit.
///
/// Cloning is cheap and every clone observes the same flags.
#[derive(Clone, Default)]
pub struct RunState {
    ended: Arc<AtomicBool>,
    events_generated: Arc<AtomicBool>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the controller reached its terminal transition.
    pub fn simulation_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// True once the events-generated threshold invariant has fired.
    pub fn events_generated(&self) -> bool {
        self.events_generated.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_ended(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_events_generated(&self) {
        self.events_generated.store(true, Ordering::SeqCst);
    }
}

/// External services the controller drives.
pub struct Collaborators {
    /// Membership and anti-entropy layer.
    pub cluster: Arc<dyn Cluster>,
    /// Deployment control plane for teardown.
    pub platform: Arc<dyn Platform>,
    /// Cluster-wide task completion bookkeeping.
    pub tracker: Arc<dyn TaskTracker>,
    /// The shared counter all client events funnel into.
    pub counter: Arc<dyn SharedCounter>,
    /// End-of-run measurement sink.
    pub instrumentation: Arc<dyn Instrumentation>,
}

/// Drives one divergence experiment from start to platform teardown.
///
/// # State machine
///
/// ```text
/// Initializing -> WaitingForConnectivity (orchestrated only)
///              -> Running (periodic status checks)
///              -> Completed (terminal)
/// ```
///
/// Status checks are strictly sequential: a check fully completes, including
/// any anti-entropy dispatch, before the next one begins. The anti-entropy
/// pass runs at most once per experiment; the task tracker is the single
/// source of truth for that guard, so a crashed-and-restarted controller
/// still will not repeat it.
pub struct ExperimentController<C: DriftContext> {
    config: ExperimentConfig,
    node: NodeId,
    ctx: Arc<C>,
    cluster: Arc<dyn Cluster>,
    platform: Arc<dyn Platform>,
    tracker: Arc<dyn TaskTracker>,
    counter: Arc<dyn SharedCounter>,
    instrumentation: Arc<dyn Instrumentation>,
    run_state: RunState,
    state: Mutex<ControllerState>,
}

impl<C: DriftContext> ExperimentController<C> {
    /// Creates a controller for `node` with the given collaborators.
    pub fn new(
        config: ExperimentConfig,
        node: NodeId,
        ctx: Arc<C>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            node,
            ctx,
            cluster: collaborators.cluster,
            platform: collaborators.platform,
            tracker: collaborators.tracker,
            counter: collaborators.counter,
            instrumentation: collaborators.instrumentation,
            run_state: RunState::new(),
            state: Mutex::new(ControllerState::Initializing),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap()
    }

    /// Handle to the shared run flags, for clients and collaborators.
    pub fn run_state(&self) -> RunState {
        self.run_state.clone()
    }

    /// Runs the experiment to completion and returns the final divergence.
    ///
    /// Startup failures (connectivity timeout, store errors while arming)
    /// are fatal and propagate. Failures inside a periodic check are logged
    /// and retried on the next interval, per the harness's
    /// stalled-progress-over-structured-errors policy.
    pub async fn run(&self) -> Result<DivergenceReport, ControllerError> {
        self.wait_for_connectivity().await?;
        self.begin_running()?;

        loop {
            self.ctx.sleep(self.config.status_interval).await;
            match self.tick().await {
                Ok(Some(report)) => return Ok(report),
                Ok(None) => {}
                Err(e) => warn!("Status check failed (will retry): {}", e),
            }
        }
    }

    /// Busy-polls the membership layer until the overlay forms.
    ///
    /// Standalone runs skip this entirely; orchestrated runs poll every
    /// `connectivity_poll` until connected or `connect_timeout` elapses.
    async fn wait_for_connectivity(&self) -> Result<(), ControllerError> {
        if !self.config.orchestration.is_orchestrated() {
            return Ok(());
        }

        *self.state.lock().unwrap() = ControllerState::WaitingForConnectivity;
        info!(
            "Waiting for {} cluster to connect",
            self.config.orchestration
        );

        let started = self.ctx.now();
        while !self.cluster.was_connected() {
            if let Some(limit) = self.config.connect_timeout {
                if self.ctx.now() - started >= limit {
                    return Err(ControllerError::ConnectivityTimeout(limit));
                }
            }
            self.ctx.sleep(self.config.connectivity_poll).await;
        }

        info!("Cluster connected after {:?}", self.ctx.now() - started);
        Ok(())
    }

    /// Arms the threshold invariant and enters Running.
    fn begin_running(&self) -> Result<(), ControllerError> {
        let threshold = self.config.expected_events();

        let run_state = self.run_state.clone();
        let invariant = Arc::new(ThresholdInvariant::new(threshold, move || {
            info!("Event threshold reached; all events generated");
            run_state.mark_events_generated();
        }));
        self.counter.install_invariant(invariant)?;

        // The controller's own convergence milestone.
        self.tracker.report_completion(TASK_CONVERGENCE, self.node)?;

        *self.state.lock().unwrap() = ControllerState::Running;
        info!(
            "Experiment running: clients={} threshold={} interval={:?}",
            self.config.client_number, threshold, self.config.status_interval
        );
        Ok(())
    }

    /// One periodic status check.
    ///
    /// Returns the final divergence report on the completing tick, `None`
    /// otherwise. A tick after completion is a no-op.
    pub async fn tick(&self) -> Result<Option<DivergenceReport>, ControllerError> {
        if self.state() == ControllerState::Completed {
            return Ok(None);
        }

        let events_done = self.tracker.progress(TASK_EVENTS)?.len();
        let logs_done = self.tracker.progress(TASK_LOGS)?.len();
        info!(
            "Status: events {}/{} | logs {}/{}",
            events_done, self.config.client_number, logs_done, self.config.client_number
        );

        if self.tracker.is_complete(TASK_EVENTS)?
            && !self.tracker.completed_by(TASK_ANTI_ENTROPY, 1)?
        {
            info!("All clients generated their events; running anti-entropy pass");
            self.cluster.blocking_sync(all_objects()).await?;
            self.tracker.report_completion(TASK_ANTI_ENTROPY, self.node)?;
        }

        if self.tracker.is_complete(TASK_LOGS)? {
            return Ok(Some(self.complete().await?));
        }
        Ok(None)
    }

    /// Terminal transition: measure, emit, and tear down.
    async fn complete(&self) -> Result<DivergenceReport, ControllerError> {
        let observed = self.counter.value()?;
        let report = DivergenceReport::compute(self.config.expected_events(), observed);
        info!("All clients pushed their logs; simulation done: {}", report);

        *self.state.lock().unwrap() = ControllerState::Completed;

        if self.config.instrumentation {
            if let Err(e) = self.instrumentation.record_divergence(&report) {
                warn!("Failed to record divergence: {}", e);
            }
            if let Err(e) = self.instrumentation.stop() {
                warn!("Failed to flush instrumentation: {}", e);
            }
            if let Err(e) = self.instrumentation.push_logs() {
                warn!("Failed to push logs: {}", e);
            }
        }

        self.run_state.mark_ended();
        self.stop_platform().await;
        Ok(report)
    }

    /// Dispatches the platform-specific teardown, exactly once.
    async fn stop_platform(&self) {
        let result = match self.config.orchestration {
            Orchestration::Local => return,
            Orchestration::Kubernetes => self.platform.stop_kubernetes().await,
            Orchestration::Marathon => self.platform.stop_marathon().await,
        };
        match result {
            Ok(()) => info!("Issued {} stop", self.config.orchestration),
            Err(e) => warn!("Platform stop failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::SimCluster;
    use crate::context::SimContext;
    use crate::platform::SimPlatform;
    use driftlab_core::{AtomicStore, LocalCounter, StoreTracker};
    use std::io;
    use std::sync::atomic::AtomicUsize;

    struct RecordingInstrumentation {
        reports: Mutex<Vec<DivergenceReport>>,
        stops: AtomicUsize,
        pushes: AtomicUsize,
    }

    impl RecordingInstrumentation {
        fn new() -> Self {
            Self {
                reports: Mutex::new(Vec::new()),
                stops: AtomicUsize::new(0),
                pushes: AtomicUsize::new(0),
            }
        }

        fn reports(&self) -> Vec<DivergenceReport> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl Instrumentation for RecordingInstrumentation {
        fn record_divergence(&self, report: &DivergenceReport) -> io::Result<()> {
            self.reports.lock().unwrap().push(*report);
            Ok(())
        }

        fn stop(&self) -> io::Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn push_logs(&self) -> io::Result<()> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        ctx: Arc<SimContext>,
        cluster: Arc<SimCluster>,
        platform: Arc<SimPlatform>,
        tracker: Arc<StoreTracker>,
        counter: Arc<LocalCounter>,
        sink: Arc<RecordingInstrumentation>,
        controller: ExperimentController<SimContext>,
        clients: Vec<NodeId>,
    }

    impl Harness {
        fn report_all(&self, task: &str) {
            for node in &self.clients {
                self.tracker.report_completion(task, *node).unwrap();
            }
        }
    }

    fn harness(config: ExperimentConfig) -> Harness {
        harness_with_cluster(config, SimCluster::new())
    }

    fn harness_with_cluster(config: ExperimentConfig, cluster: SimCluster) -> Harness {
        let ctx = SimContext::shared(42);
        let cluster = Arc::new(cluster);
        let platform = Arc::new(SimPlatform::new());
        let store = Arc::new(AtomicStore::temporary().unwrap());
        let tracker = Arc::new(StoreTracker::new(store, config.client_number));
        let counter = Arc::new(LocalCounter::new());
        let sink = Arc::new(RecordingInstrumentation::new());
        let clients = (0..config.client_number as u64)
            .map(NodeId::from_seed)
            .collect();

        let controller = ExperimentController::new(
            config,
            NodeId::from_seed(1000),
            Arc::clone(&ctx),
            Collaborators {
                cluster: Arc::clone(&cluster) as Arc<dyn Cluster>,
                platform: Arc::clone(&platform) as Arc<dyn Platform>,
                tracker: Arc::clone(&tracker) as Arc<dyn TaskTracker>,
                counter: Arc::clone(&counter) as Arc<dyn SharedCounter>,
                instrumentation: Arc::clone(&sink) as Arc<dyn Instrumentation>,
            },
        );

        Harness {
            ctx,
            cluster,
            platform,
            tracker,
            counter,
            sink,
            controller,
            clients,
        }
    }

    fn base_config() -> ExperimentConfig {
        ExperimentConfig::new()
            .with_max_events(100)
            .with_clients(3)
            .with_status_interval(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_local_run_skips_connectivity_wait() {
        let h = harness_with_cluster(base_config(), SimCluster::disconnected_for(usize::MAX));

        h.controller.wait_for_connectivity().await.unwrap();

        // Never probed, never slept.
        assert_eq!(h.ctx.now(), Duration::ZERO);
        assert_eq!(h.controller.state(), ControllerState::Initializing);
    }

    #[tokio::test]
    async fn test_orchestrated_run_polls_until_connected() {
        let config = base_config().with_orchestration(Orchestration::Kubernetes);
        let h = harness_with_cluster(config, SimCluster::disconnected_for(3));

        h.controller.wait_for_connectivity().await.unwrap();

        // Three failed probes, each followed by one 100ms poll sleep.
        assert_eq!(h.ctx.now(), Duration::from_millis(300));
        assert_eq!(h.controller.state(), ControllerState::WaitingForConnectivity);
    }

    #[tokio::test]
    async fn test_connectivity_wait_times_out_when_bounded() {
        let config = base_config()
            .with_orchestration(Orchestration::Marathon)
            .with_connect_timeout(Duration::from_secs(1));
        let h = harness_with_cluster(config, SimCluster::disconnected_for(usize::MAX));

        let err = h.controller.wait_for_connectivity().await.unwrap_err();
        assert!(matches!(err, ControllerError::ConnectivityTimeout(_)));
    }

    #[tokio::test]
    async fn test_begin_running_arms_invariant_and_reports_convergence() {
        let h = harness(base_config());
        h.controller.begin_running().unwrap();

        assert_eq!(h.controller.state(), ControllerState::Running);
        assert!(h
            .tracker
            .progress(TASK_CONVERGENCE)
            .unwrap()
            .contains(&NodeId::from_seed(1000)));

        // Threshold is 100 * 3; the flag flips exactly at the boundary.
        let run_state = h.controller.run_state();
        h.counter.increment(299).unwrap();
        assert!(!run_state.events_generated());
        h.counter.increment(1).unwrap();
        assert!(run_state.events_generated());
    }

    #[tokio::test]
    async fn test_tick_before_any_completion_is_quiet() {
        let h = harness(base_config());
        h.controller.begin_running().unwrap();

        assert!(h.controller.tick().await.unwrap().is_none());

        assert_eq!(h.cluster.sync_calls(), 0);
        assert_eq!(h.platform.total_stops(), 0);
        assert_eq!(h.controller.state(), ControllerState::Running);
    }

    #[tokio::test]
    async fn test_anti_entropy_runs_exactly_once() {
        let h = harness(base_config());
        h.controller.begin_running().unwrap();
        h.report_all(TASK_EVENTS);

        // First tick after events complete triggers the one sync pass.
        assert!(h.controller.tick().await.unwrap().is_none());
        assert_eq!(h.cluster.sync_calls(), 1);
        assert!(h.tracker.completed_by(TASK_ANTI_ENTROPY, 1).unwrap());

        // Ticks keep polling but never sync again.
        for _ in 0..3 {
            assert!(h.controller.tick().await.unwrap().is_none());
        }
        assert_eq!(h.cluster.sync_calls(), 1);

        // Completion does not sneak in an extra pass either.
        h.report_all(TASK_LOGS);
        assert!(h.controller.tick().await.unwrap().is_some());
        assert_eq!(h.cluster.sync_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_sync_is_retried_and_not_marked() {
        let h = harness(base_config());
        h.controller.begin_running().unwrap();
        h.report_all(TASK_EVENTS);
        h.cluster.fail_next_syncs(1);

        // The failed pass must not mark the task, so the guard stays open.
        assert!(h.controller.tick().await.is_err());
        assert_eq!(h.cluster.sync_calls(), 1);
        assert!(!h.tracker.completed_by(TASK_ANTI_ENTROPY, 1).unwrap());

        assert!(h.controller.tick().await.unwrap().is_none());
        assert_eq!(h.cluster.sync_calls(), 2);
        assert!(h.tracker.completed_by(TASK_ANTI_ENTROPY, 1).unwrap());
    }

    #[tokio::test]
    async fn test_completion_measures_emits_and_stops_kubernetes() {
        let config = base_config()
            .with_orchestration(Orchestration::Kubernetes)
            .with_instrumentation(true);
        let h = harness(config);
        h.controller.begin_running().unwrap();

        // 330 observed against 300 expected: the overcount scenario.
        h.counter.increment(330).unwrap();
        h.report_all(TASK_EVENTS);
        h.report_all(TASK_LOGS);

        let report = h.controller.tick().await.unwrap().unwrap();
        assert_eq!(report.expected, 300);
        assert_eq!(report.observed, 330);
        assert_eq!(report.overcount, 30);
        assert_eq!(report.percent, Some(10.0));

        assert_eq!(h.controller.state(), ControllerState::Completed);
        assert!(h.controller.run_state().simulation_ended());
        assert_eq!(h.platform.kubernetes_stops(), 1);
        assert_eq!(h.platform.marathon_stops(), 0);
        assert_eq!(h.sink.reports(), vec![report]);
        assert_eq!(h.sink.stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.sink.pushes.load(Ordering::SeqCst), 1);

        // Terminal state: extra ticks change nothing.
        for _ in 0..3 {
            assert!(h.controller.tick().await.unwrap().is_none());
        }
        assert_eq!(h.cluster.sync_calls(), 1);
        assert_eq!(h.platform.total_stops(), 1);
        assert_eq!(h.sink.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_dispatches_marathon_stop() {
        let config = base_config().with_orchestration(Orchestration::Marathon);
        let h = harness(config);
        h.controller.begin_running().unwrap();
        h.report_all(TASK_EVENTS);
        h.report_all(TASK_LOGS);

        h.controller.tick().await.unwrap().unwrap();

        assert_eq!(h.platform.marathon_stops(), 1);
        assert_eq!(h.platform.kubernetes_stops(), 0);
    }

    #[tokio::test]
    async fn test_local_completion_skips_platform_stop() {
        let h = harness(base_config());
        h.controller.begin_running().unwrap();
        h.report_all(TASK_EVENTS);
        h.report_all(TASK_LOGS);

        h.controller.tick().await.unwrap().unwrap();

        assert_eq!(h.controller.state(), ControllerState::Completed);
        assert_eq!(h.platform.total_stops(), 0);
    }

    #[tokio::test]
    async fn test_disabled_instrumentation_emits_nothing() {
        let h = harness(base_config());
        h.controller.begin_running().unwrap();
        h.counter.increment(310).unwrap();
        h.report_all(TASK_EVENTS);
        h.report_all(TASK_LOGS);

        // The report is still computed and returned, just not emitted.
        let report = h.controller.tick().await.unwrap().unwrap();
        assert_eq!(report.overcount, 10);

        assert!(h.sink.reports().is_empty());
        assert_eq!(h.sink.stops.load(Ordering::SeqCst), 0);
        assert_eq!(h.sink.pushes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_expected_events_reports_undefined_percent() {
        let config = ExperimentConfig::new()
            .with_max_events(100)
            .with_clients(0);
        let h = harness(config);
        h.controller.begin_running().unwrap();
        h.counter.increment(5).unwrap();

        // With no expected clients every task is trivially complete.
        let report = h.controller.tick().await.unwrap().unwrap();
        assert_eq!(report.expected, 0);
        assert_eq!(report.overcount, 5);
        assert_eq!(report.percent, None);
    }

    #[tokio::test]
    async fn test_run_drives_experiment_to_completion() {
        let h = harness(base_config());

        // Everything already finished; run() should complete on its first
        // status check, after exactly one interval of virtual time.
        h.counter.increment(300).unwrap();
        h.report_all(TASK_EVENTS);
        h.report_all(TASK_LOGS);

        let report = h.controller.run().await.unwrap();
        assert_eq!(report.overcount, 0);
        assert_eq!(h.ctx.now(), Duration::from_secs(10));
        assert_eq!(h.cluster.sync_calls(), 1);
        assert_eq!(h.controller.state(), ControllerState::Completed);
    }

    #[tokio::test]
    async fn test_full_experiment_with_live_clients() {
        let h = harness(base_config());
        let run_state = h.controller.run_state();

        for (i, node) in h.clients.iter().enumerate() {
            let client = crate::workload::ClientWorkload::new(
                *node,
                100,
                Arc::clone(&h.ctx),
                Arc::clone(&h.counter) as Arc<dyn SharedCounter>,
                Arc::clone(&h.tracker) as Arc<dyn TaskTracker>,
                run_state.clone(),
                1234 + i as u64,
            )
            .with_mean_delay(Duration::from_millis(1));
            h.ctx.spawn(&format!("client-{}", i), client.run());
        }

        let report = h.controller.run().await.unwrap();

        // No duplicates configured, so the run converges exactly.
        assert_eq!(report.expected, 300);
        assert_eq!(report.observed, 300);
        assert_eq!(report.overcount, 0);
        assert!(run_state.events_generated());
        assert_eq!(h.cluster.sync_calls(), 1);
        assert_eq!(h.controller.state(), ControllerState::Completed);
    }
}
