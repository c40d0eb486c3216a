//! Shared Counters and Threshold Invariants
//!
//! The experiment workload funnels into one well-known counter. A threshold
//! invariant watches that counter and fires its enforcement action exactly
//! once, when the observed value first reaches the configured threshold.
//! After firing it is spent and never re-arms.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::store::{AtomicStore, StoreError};

/// A monitored condition over a shared value with a one-shot side effect.
pub struct ThresholdInvariant {
    threshold: u64,
    fired: AtomicBool,
    action: Box<dyn Fn() + Send + Sync>,
}

impl ThresholdInvariant {
    /// Creates an armed invariant firing `action` once the observed value
    /// reaches `threshold`.
    pub fn new<F>(threshold: u64, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            threshold,
            fired: AtomicBool::new(false),
            action: Box::new(action),
        }
    }

    /// Feeds a counter observation to the invariant.
    ///
    /// Fires the enforcement action at most once across all observations,
    /// even when concurrent callers cross the threshold together.
    pub fn observe(&self, value: u64) {
        if value >= self.threshold && !self.fired.swap(true, Ordering::SeqCst) {
            (self.action)();
        }
    }

    /// True once the enforcement action has run.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// The configured comparison value.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

/// A cluster-shared monotonic counter.
///
/// Production deployments back this with a replicated grow-only counter; this
/// crate ships a process-local and a store-backed implementation. Installed
/// invariants observe the counter after every increment.
pub trait SharedCounter: Send + Sync {
    /// Adds `amount` and returns the new value.
    fn increment(&self, amount: u64) -> Result<u64, StoreError>;

    /// Current counter value.
    fn value(&self) -> Result<u64, StoreError>;

    /// Attaches `invariant` to this counter.
    ///
    /// The invariant immediately observes the current value, so a threshold
    /// that is already crossed fires at install time.
    fn install_invariant(&self, invariant: Arc<ThresholdInvariant>) -> Result<(), StoreError>;
}

/// In-memory counter for single-process runs and tests.
pub struct LocalCounter {
    value: AtomicU64,
    invariants: Mutex<Vec<Arc<ThresholdInvariant>>>,
}

impl LocalCounter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
            invariants: Mutex::new(Vec::new()),
        }
    }

    fn notify(&self, value: u64) {
        for invariant in self.invariants.lock().unwrap().iter() {
            invariant.observe(value);
        }
    }
}

impl Default for LocalCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedCounter for LocalCounter {
    fn increment(&self, amount: u64) -> Result<u64, StoreError> {
        let value = self.value.fetch_add(amount, Ordering::SeqCst) + amount;
        self.notify(value);
        Ok(value)
    }

    fn value(&self) -> Result<u64, StoreError> {
        Ok(self.value.load(Ordering::SeqCst))
    }

    fn install_invariant(&self, invariant: Arc<ThresholdInvariant>) -> Result<(), StoreError> {
        invariant.observe(self.value()?);
        self.invariants.lock().unwrap().push(invariant);
        Ok(())
    }
}

/// Durable counter persisted as one record in an [`AtomicStore`].
///
/// The increment is a store-level atomic update, so concurrent writers never
/// lose a bump. This is the state-holder pattern for any replicated variable
/// that must survive a restart.
pub struct StoreCounter {
    store: Arc<AtomicStore>,
    key: String,
    invariants: Mutex<Vec<Arc<ThresholdInvariant>>>,
}

impl StoreCounter {
    /// Opens the counter record `key` in `store`, creating it at zero if
    /// absent.
    pub fn open(store: Arc<AtomicStore>, key: &str) -> Result<Self, StoreError> {
        match store.get::<u64>(key) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => store.put(key, &0u64)?,
            Err(e) => return Err(e),
        }
        Ok(Self {
            store,
            key: key.to_string(),
            invariants: Mutex::new(Vec::new()),
        })
    }

    fn notify(&self, value: u64) {
        for invariant in self.invariants.lock().unwrap().iter() {
            invariant.observe(value);
        }
    }
}

impl SharedCounter for StoreCounter {
    fn increment(&self, amount: u64) -> Result<u64, StoreError> {
        let value = self
            .store
            .update(&self.key, |v: u64| (v + amount, v + amount))?;
        self.notify(value);
        Ok(value)
    }

    fn value(&self) -> Result<u64, StoreError> {
        self.store.get(&self.key)
    }

    fn install_invariant(&self, invariant: Arc<ThresholdInvariant>) -> Result<(), StoreError> {
        invariant.observe(self.value()?);
        self.invariants.lock().unwrap().push(invariant);
        Ok(())
    }
}
