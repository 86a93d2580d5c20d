//! Manually advanced fake clock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{check_period, ScheduledTick, Scheduler, TickFn};
use crate::error::Result;

/// A scheduler whose clock only moves when [`advance`](Self::advance) is called.
///
/// Timers fire in deadline order while the clock is advanced, one call per
/// elapsed period, which makes tick-driven behavior fully deterministic.
/// Clones share the same clock.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ClockState>>,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_id: u64,
    timers: Vec<Timer>,
}

struct Timer {
    id: u64,
    period: Duration,
    next_fire: Duration,
    /// Taken out while the callback runs so the clock lock is not held
    tick: Option<TickFn>,
}

impl ManualScheduler {
    /// Create a clock at time zero with no timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on this clock.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of timers that have not been cancelled.
    pub fn active_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Advance the clock, firing every timer deadline that falls within `by`.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;

        loop {
            let (id, mut tick) = {
                let mut state = self.state.lock();

                let due = state
                    .timers
                    .iter_mut()
                    .filter(|t| t.next_fire <= target && t.tick.is_some())
                    .min_by_key(|t| (t.next_fire, t.id));

                let Some(timer) = due else {
                    state.now = target;
                    return;
                };

                let fire_at = timer.next_fire;
                timer.next_fire += timer.period;
                let id = timer.id;
                let tick = timer.tick.take();
                state.now = fire_at;

                match tick {
                    Some(tick) => (id, tick),
                    None => continue,
                }
            };

            tick();

            // The timer may have been cancelled from inside its own callback
            let mut state = self.state.lock();
            if let Some(timer) = state.timers.iter_mut().find(|t| t.id == id) {
                timer.tick = Some(tick);
            }
        }
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("active_timers", &state.timers.len())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, period: Duration, tick: TickFn) -> Result<Box<dyn ScheduledTick>> {
        check_period(period)?;

        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        let next_fire = state.now + period;
        state.timers.push(Timer {
            id,
            period,
            next_fire,
            tick: Some(tick),
        });

        Ok(Box::new(ManualTick {
            id,
            state: Arc::clone(&self.state),
            cancelled: false,
        }))
    }
}

struct ManualTick {
    id: u64,
    state: Arc<Mutex<ClockState>>,
    cancelled: bool,
}

impl ScheduledTick for ManualTick {
    fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.state.lock().timers.retain(|t| t.id != self.id);
    }
}

impl Drop for ManualTick {
    fn drop(&mut self) {
        self.cancel();
    }
}
