//! Virtual-time `DriftContext` for simulated experiment runs.

use async_trait::async_trait;
use driftlab_env::DriftContext;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Wall-clock value reported for virtual time zero.
const SIM_EPOCH_SECS: u64 = 1735689600; // 2025-01-01 00:00:00 UTC

/// `DriftContext` whose clock only moves when somebody sleeps.
///
/// `sleep` credits the full duration to a shared virtual clock and then
/// yields once, so a controller run that spans minutes of configured
/// intervals completes in wall-clock microseconds while `now()` still
/// reports the exact timeline. The single yield doubles as the scheduling
/// point: on a current-thread runtime, every sleeper gets the executor in
/// turn, which keeps interleavings reproducible.
///
/// Clones share the clock, so the controller and the test body always
/// agree on the current time.
#[derive(Clone)]
pub struct SimContext {
    seed: u64,
    clock_ns: Arc<Mutex<u64>>,
    epoch: SystemTime,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock_ns: Arc::new(Mutex::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(SIM_EPOCH_SECS),
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Moves the clock forward without yielding.
    ///
    /// Tests use this to position the clock between awaits.
    pub fn advance_time(&self, duration: Duration) {
        *self.clock_ns.lock().unwrap() += duration.as_nanos() as u64;
    }
}

#[async_trait]
impl DriftContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(*self.clock_ns.lock().unwrap())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
        // The one suspension point per sleep. Without it, a sleep loop
        // would never let spawned workloads run.
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!("Spawning task '{}'", name);
        tokio::spawn(future);
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
