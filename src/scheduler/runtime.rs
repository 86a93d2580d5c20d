//! Tokio-backed tick driver.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use super::{check_period, ScheduledTick, Scheduler, TickFn};
use crate::error::{EventalyzerError, Result};

/// Runs ticks on a tokio runtime.
///
/// Missed ticks are delayed rather than replayed, so a stalled runtime shifts
/// the logical window instead of fast-forwarding it.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    /// Runtime to spawn on; resolved from the caller's context when `None`
    handle: Option<Handle>,
}

impl TokioScheduler {
    /// Create a scheduler that spawns onto whichever runtime is current when
    /// [`schedule`](Scheduler::schedule) is called.
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Create a scheduler bound to a specific runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn runtime(&self) -> Result<Handle> {
        match &self.handle {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|e| EventalyzerError::Scheduler(e.to_string())),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, period: Duration, mut tick: TickFn) -> Result<Box<dyn ScheduledTick>> {
        check_period(period)?;
        let runtime = self.runtime()?;

        let task = runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                tick();
            }
        });

        debug!(period_ms = period.as_millis() as u64, "Spawned tick task");

        Ok(Box::new(TokioTick { task: Some(task) }))
    }
}

/// Handle to a spawned tick task.
struct TokioTick {
    task: Option<JoinHandle<()>>,
}

impl ScheduledTick for TokioTick {
    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTick {
    fn drop(&mut self) {
        self.cancel();
    }
}
