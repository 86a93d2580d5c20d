//! Keyed registry of window counters.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::counter::{validate_window, WindowCounter};
use crate::error::Result;
use crate::scheduler::{ScheduledTick, Scheduler, TokioScheduler};

/// Function deriving a tracking key from an event.
pub type HashFn<E, K> = Box<dyn Fn(&E) -> K + Send + Sync>;

/// Window settings shared by every counter in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerOptions {
    /// Time covered by one bucket
    pub interval_ms: u64,
    /// Length of the sliding window
    pub ttl_ms: u64,
    /// Idle time before a key is forgotten (defaults to `ttl_ms`)
    #[serde(default)]
    pub cleanup_ms: Option<u64>,
}

impl TrackerOptions {
    /// Create options with the default cleanup period.
    pub fn new(interval_ms: u64, ttl_ms: u64) -> Self {
        Self {
            interval_ms,
            ttl_ms,
            cleanup_ms: None,
        }
    }

    /// Set how long a key may sit idle before it is evicted.
    pub fn with_cleanup_ms(mut self, cleanup_ms: u64) -> Self {
        self.cleanup_ms = Some(cleanup_ms);
        self
    }

    /// Check that the options describe a usable window.
    pub fn validate(&self) -> Result<()> {
        validate_window(self.interval_ms, self.ttl_ms)
    }

    /// Idle period used for eviction.
    ///
    /// An unset or zero `cleanup_ms` falls back to `ttl_ms`.
    pub fn effective_cleanup_ms(&self) -> u64 {
        match self.cleanup_ms {
            Some(ms) if ms > 0 => ms,
            _ => self.ttl_ms,
        }
    }
}

/// Counters plus the settings needed to advance them, shared with the tick driver.
struct Trackers<K> {
    counters: DashMap<K, WindowCounter>,
    /// Empty counter cloned for each new key
    template: WindowCounter,
    cleanup_ms: u64,
}

impl<K: Eq + Hash> Trackers<K> {
    fn tick(&self) {
        let before = self.counters.len();

        self.counters.retain(|_, counter| {
            counter.tick();
            counter.idle_duration_ms() < self.cleanup_ms
        });

        let tracked = self.counters.len();
        let evicted = before.saturating_sub(tracked);
        if evicted > 0 {
            debug!(evicted, tracked, "Evicted idle window counters");
        }
        trace!(tracked, "Advanced window counters");
    }
}

/// Tracks sliding-window event counts for many keys.
///
/// Counters are created on the first event for a key, advanced together on
/// every tick, and dropped once their window has been empty for the cleanup
/// period. Ticks come either from [`tick`](Self::tick) or from the scheduler
/// driven by [`start`](Self::start)/[`stop`](Self::stop).
pub struct TrackerRegistry<E, K> {
    trackers: Arc<Trackers<K>>,
    hash_fn: HashFn<E, K>,
    scheduler: Arc<dyn Scheduler>,
    /// Active tick driver, if started
    driver: Mutex<Option<Box<dyn ScheduledTick>>>,
}

impl<E, K> TrackerRegistry<E, K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    /// Create a registry ticked by tokio.
    ///
    /// The runtime is looked up when [`start`](Self::start) is called.
    pub fn new<F>(options: TrackerOptions, hash_fn: F) -> Result<Self>
    where
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        Self::with_scheduler(options, hash_fn, Arc::new(TokioScheduler::new()))
    }

    /// Create a registry ticked by the given scheduler.
    pub fn with_scheduler<F>(
        options: TrackerOptions,
        hash_fn: F,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self>
    where
        F: Fn(&E) -> K + Send + Sync + 'static,
    {
        let template = WindowCounter::new(options.interval_ms, options.ttl_ms)?;

        let cleanup_ms = options.effective_cleanup_ms();
        debug!(
            interval_ms = options.interval_ms,
            ttl_ms = options.ttl_ms,
            cleanup_ms,
            "Creating tracker registry"
        );

        Ok(Self {
            trackers: Arc::new(Trackers {
                counters: DashMap::new(),
                template,
                cleanup_ms,
            }),
            hash_fn: Box::new(hash_fn),
            scheduler,
            driver: Mutex::new(None),
        })
    }

    /// Record one event under its derived key.
    pub fn add_event(&self, event: &E) {
        self.add_event_n(event, 1);
    }

    /// Record `n` events under the key derived from `event`.
    pub fn add_event_n(&self, event: &E, n: u64) {
        let key = (self.hash_fn)(event);
        let trackers = &self.trackers;

        trackers
            .counters
            .entry(key)
            .or_insert_with(|| {
                trace!(
                    buckets = trackers.template.bucket_count(),
                    "Creating new window counter"
                );
                trackers.template.clone()
            })
            .add_n(n);
    }

    /// Advance every counter by one interval and evict idle keys.
    pub fn tick(&self) {
        self.trackers.tick();
    }

    /// Begin ticking every `interval_ms`.
    ///
    /// A running driver is stopped first, so there is never more than one.
    pub fn start(&self) -> Result<()> {
        let mut driver = self.driver.lock();

        if let Some(mut existing) = driver.take() {
            existing.cancel();
            debug!("Restarting tick driver");
        }

        let trackers = Arc::clone(&self.trackers);
        let period = Duration::from_millis(self.interval_ms());
        let handle = self
            .scheduler
            .schedule(period, Box::new(move || trackers.tick()))?;
        *driver = Some(handle);

        info!(interval_ms = self.interval_ms(), "Tracker registry started");
        Ok(())
    }

    /// Stop ticking. Safe to call when already stopped.
    pub fn stop(&self) {
        if let Some(mut handle) = self.driver.lock().take() {
            handle.cancel();
            info!("Tracker registry stopped");
        }
    }

    /// Whether a tick driver is active.
    pub fn is_running(&self) -> bool {
        self.driver.lock().is_some()
    }

    /// Report every key whose window total is at least `threshold`.
    ///
    /// Visit order is unspecified. The callback must not modify this registry.
    pub fn check_threshold<C>(&self, threshold: u64, mut callback: C)
    where
        C: FnMut(&K, u64),
    {
        for entry in self.trackers.counters.iter() {
            let total = entry.value().total();
            if total >= threshold {
                callback(entry.key(), total);
            }
        }
    }

    /// Collect every key whose window total is at least `threshold`.
    pub fn over_threshold(&self, threshold: u64) -> Vec<(K, u64)>
    where
        K: Clone,
    {
        let mut hits = Vec::new();
        self.check_threshold(threshold, |key, total| hits.push((key.clone(), total)));
        hits
    }

    /// Get the current window total for a key.
    ///
    /// Returns `None` if the key is not tracked.
    pub fn get(&self, key: &K) -> Option<u64> {
        self.trackers.counters.get(key).map(|c| c.total())
    }

    /// Number of keys currently tracked.
    pub fn currently_tracking(&self) -> usize {
        self.trackers.counters.len()
    }

    /// Drop every counter.
    pub fn clear(&self) {
        self.trackers.counters.clear();
    }

    /// Get the bucket interval.
    pub fn interval_ms(&self) -> u64 {
        self.trackers.template.interval_ms()
    }

    /// Get the window length.
    pub fn ttl_ms(&self) -> u64 {
        self.trackers.template.ttl_ms()
    }

    /// Get the idle period after which keys are evicted.
    pub fn cleanup_ms(&self) -> u64 {
        self.trackers.cleanup_ms
    }
}

impl<E, K> Drop for TrackerRegistry<E, K> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.driver.get_mut().take() {
            handle.cancel();
        }
    }
}
