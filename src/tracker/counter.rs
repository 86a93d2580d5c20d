//! Sliding window counter built from fixed-size time buckets.

use std::collections::VecDeque;

use crate::error::{EventalyzerError, Result};

/// Upper bound on buckets per key. One u64 per bucket, so 8 MiB per counter.
pub const MAX_BUCKETS: usize = 1 << 20;

/// Check that an interval/TTL pair describes a usable window.
pub(crate) fn validate_window(interval_ms: u64, ttl_ms: u64) -> Result<()> {
    window_bucket_count(interval_ms, ttl_ms).map(|_| ())
}

/// Number of buckets for an interval/TTL pair, `ceil(ttl_ms / interval_ms)`.
fn window_bucket_count(interval_ms: u64, ttl_ms: u64) -> Result<usize> {
    if interval_ms == 0 {
        return Err(EventalyzerError::InvalidConfiguration(
            "intervalMs must be greater than zero".to_string(),
        ));
    }

    if interval_ms > ttl_ms {
        return Err(EventalyzerError::InvalidConfiguration(format!(
            "ttlMs ({}) must be greater than or equal to intervalMs ({})",
            ttl_ms, interval_ms
        )));
    }

    usize::try_from(ttl_ms.div_ceil(interval_ms))
        .ok()
        .filter(|count| *count <= MAX_BUCKETS)
        .ok_or_else(|| {
            EventalyzerError::InvalidConfiguration(format!(
                "ttlMs ({}) / intervalMs ({}) needs more than {} buckets",
                ttl_ms, interval_ms, MAX_BUCKETS
            ))
        })
}

/// Counts events for a single key over a trailing window.
///
/// The window is split into `ceil(ttl_ms / interval_ms)` buckets. New events
/// land in the newest bucket and every [`tick`](Self::tick) drops the oldest
/// bucket, so an event stays counted for between `ttl_ms` and
/// `ttl_ms + interval_ms` of ticked time.
#[derive(Debug, Clone)]
pub struct WindowCounter {
    /// Time covered by one bucket
    interval_ms: u64,
    /// Length of the window
    ttl_ms: u64,
    /// Per-interval counts, oldest first
    buckets: VecDeque<u64>,
    /// Sum of all buckets, kept incrementally
    running_total: u64,
    /// Ticked time since the total last dropped to zero
    idle_duration_ms: u64,
}

impl WindowCounter {
    /// Create a new window counter.
    ///
    /// Fails with [`EventalyzerError::InvalidConfiguration`] when `interval_ms`
    /// is zero, larger than `ttl_ms`, or the window needs more than
    /// [`MAX_BUCKETS`] buckets.
    pub fn new(interval_ms: u64, ttl_ms: u64) -> Result<Self> {
        let bucket_count = window_bucket_count(interval_ms, ttl_ms)?;

        Ok(Self {
            interval_ms,
            ttl_ms,
            buckets: VecDeque::from(vec![0; bucket_count]),
            running_total: 0,
            idle_duration_ms: 0,
        })
    }

    /// Record one event in the current bucket.
    pub fn add(&mut self) {
        self.add_n(1);
    }

    /// Record `n` events in the current bucket.
    ///
    /// The window total saturates at `u64::MAX`. Events past that point are
    /// not recorded in any bucket, so the total always equals the bucket sum.
    pub fn add_n(&mut self, n: u64) {
        let n = n.min(u64::MAX - self.running_total);
        if let Some(newest) = self.buckets.back_mut() {
            // running_total bounds every bucket, so this cannot overflow
            *newest += n;
            self.running_total += n;
        }
    }

    /// Advance the window by exactly one interval.
    pub fn tick(&mut self) {
        let dropped = self.buckets.pop_front().unwrap_or(0);
        self.buckets.push_back(0);
        self.running_total -= dropped;

        if self.running_total == 0 {
            self.idle_duration_ms = self.idle_duration_ms.saturating_add(self.interval_ms);
        } else {
            self.idle_duration_ms = 0;
        }
    }

    /// Number of events currently inside the window.
    pub fn total(&self) -> u64 {
        self.running_total
    }

    /// Milliseconds of ticked time since the window last held any events.
    pub fn idle_duration_ms(&self) -> u64 {
        self.idle_duration_ms
    }

    /// Number of buckets backing the window.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Get the bucket interval.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Get the window length.
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Bucket values from oldest to newest.
    pub fn buckets(&self) -> impl Iterator<Item = u64> + '_ {
        self.buckets.iter().copied()
    }
}
