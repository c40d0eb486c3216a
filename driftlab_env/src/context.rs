//! The environment seam every Driftlab component runs behind.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// Clock and scheduler, as seen by the controller and its clients.
///
/// Everything time-driven in an experiment goes through this trait: status
/// check intervals, connectivity polls while an orchestrator brings the
/// cluster up, and the think-time pauses between client events. Swapping the
/// implementation swaps the experiment's notion of time without touching
/// any of that logic.
///
/// `TokioContext` binds these to the real runtime. `SimContext` drives a
/// virtual clock instead, so tests cover hours of experiment time in
/// milliseconds and a rerun with the same seed observes the same timeline.
#[async_trait]
pub trait DriftContext: Send + Sync + 'static {
    /// Monotonic time elapsed since this context was created.
    ///
    /// Connectivity deadlines and elapsed-time reports compare against
    /// this, never against the wall clock.
    fn now(&self) -> Duration;

    /// Wall-clock time for timestamps in logs and instrumentation output.
    fn system_time(&self) -> SystemTime;

    /// Pauses the calling task for `duration`.
    ///
    /// The controller paces its status checks with this, and clients use it
    /// for think time between events.
    async fn sleep(&self, duration: Duration);

    /// Hands `future` to the scheduler as a named background task.
    ///
    /// Client workloads run this way. The name only feeds logging; tasks
    /// are detached and signal completion through the task tracker.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// The seed this context was built from, 0 when unseeded.
    ///
    /// Recorded in run summaries so a divergent run can be replayed.
    fn seed(&self) -> u64;
}
