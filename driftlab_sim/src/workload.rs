//! Client workload - the event generators the controller supervises.
//!
//! Each client bumps the shared counter `max_events` times, with optional
//! exponentially distributed think time between events and an optional
//! duplicate rate that models at-least-once delivery applying an event
//! twice. When a client finishes it reports its events milestone, then its
//! log-push milestone, and exits.

use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};
use tracing::{debug, info, warn};

use driftlab_core::tasks::{TaskTracker, TASK_EVENTS, TASK_LOGS};
use driftlab_core::SharedCounter;
use driftlab_env::{DriftContext, NodeId};

use crate::controller::RunState;

/// One simulated client node.
pub struct ClientWorkload<C: DriftContext> {
    node: NodeId,
    max_events: u64,
    think_time: Option<Exp<f64>>,
    duplicate_rate: f64,
    ctx: Arc<C>,
    counter: Arc<dyn SharedCounter>,
    tracker: Arc<dyn TaskTracker>,
    run_state: RunState,
    rng: ChaCha8Rng,
}

impl<C: DriftContext> ClientWorkload<C> {
    pub fn new(
        node: NodeId,
        max_events: u64,
        ctx: Arc<C>,
        counter: Arc<dyn SharedCounter>,
        tracker: Arc<dyn TaskTracker>,
        run_state: RunState,
        seed: u64,
    ) -> Self {
        Self {
            node,
            max_events,
            think_time: None,
            duplicate_rate: 0.0,
            ctx,
            counter,
            tracker,
            run_state,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Sleeps an exponentially distributed delay with the given mean between
    /// events. Zero disables think time.
    pub fn with_mean_delay(mut self, mean: Duration) -> Self {
        self.think_time = if mean.is_zero() {
            None
        } else {
            Exp::new(1.0 / mean.as_secs_f64()).ok()
        };
        self
    }

    /// Probability that an event is applied twice, clamped to `0.0..=1.0`.
    pub fn with_duplicate_rate(mut self, rate: f64) -> Self {
        self.duplicate_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Generates events until done, then reports both milestones.
    ///
    /// A client that observes the simulation-ended flag exits immediately
    /// without reporting; the run is already over.
    pub async fn run(mut self) {
        info!("Client {} generating {} events", self.node, self.max_events);

        for event in 1..=self.max_events {
            if self.run_state.simulation_ended() {
                debug!("Client {} exiting early at event {}", self.node, event);
                return;
            }

            if let Some(think_time) = self.think_time {
                let delay = Duration::from_secs_f64(think_time.sample(&mut self.rng));
                self.ctx.sleep(delay).await;
            }

            let mut amount = 1;
            if self.duplicate_rate > 0.0 && self.rng.gen_bool(self.duplicate_rate) {
                amount += 1;
            }
            if let Err(e) = self.counter.increment(amount) {
                warn!("Client {} failed to record event {}: {}", self.node, event, e);
            }
        }

        if let Err(e) = self.tracker.report_completion(TASK_EVENTS, self.node) {
            warn!("Client {} could not report events milestone: {}", self.node, e);
        }
        info!("Client {} finished generating events", self.node);

        if let Err(e) = self.tracker.report_completion(TASK_LOGS, self.node) {
            warn!("Client {} could not report logs milestone: {}", self.node, e);
        }
        debug!("Client {} pushed logs", self.node);
    }
}
