//! Production `DriftContext` backed by the Tokio runtime.

use crate::DriftContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

/// Runs experiments against real time.
///
/// `sleep` parks the caller on the Tokio timer, `spawn` hands work to the
/// runtime scheduler, and `now` measures from the instant the context was
/// created, so elapsed-time reports start at zero for each run.
pub struct TokioContext {
    origin: Instant,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Arc-wrapped context, ready to hand to controller and clients.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriftContext for TokioContext {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!("Spawning task '{}'", name);
        tokio::spawn(future);
    }

    fn seed(&self) -> u64 {
        // Real runs are not seeded.
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_now_advances_with_real_sleep() {
        let ctx = TokioContext::new();
        let before = ctx.now();
        ctx.sleep(Duration::from_millis(20)).await;
        assert!(ctx.now() - before >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_spawned_task_runs() {
        let ctx = TokioContext::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        ctx.spawn("probe", async move {
            flag.store(true, Ordering::SeqCst);
        });
        ctx.sleep(Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unseeded() {
        assert_eq!(TokioContext::new().seed(), 0);
    }
}
