//! Periodic tick drivers.
//!
//! A [`TrackerRegistry`](crate::tracker::TrackerRegistry) never reaches for a
//! global timer. It is handed a [`Scheduler`] that knows how to call a
//! function every `period` and how to stop doing so.
//!
//! - [`TokioScheduler`]: spawns a task on a tokio runtime
//! - [`ManualScheduler`]: a fake clock advanced explicitly by the caller

mod manual;
mod runtime;

use std::time::Duration;

use crate::error::Result;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

/// Callback invoked on every tick.
pub type TickFn = Box<dyn FnMut() + Send + 'static>;

/// Trait for repeating-timer implementations.
pub trait Scheduler: Send + Sync {
    /// Invoke `tick` every `period`, starting one period from now.
    ///
    /// The returned handle stops future invocations when cancelled or dropped.
    fn schedule(&self, period: Duration, tick: TickFn) -> Result<Box<dyn ScheduledTick>>;
}

/// Handle to a running repeating timer.
pub trait ScheduledTick: Send {
    /// Stop future invocations. Calling this more than once is a no-op.
    fn cancel(&mut self);
}

fn check_period(period: Duration) -> Result<()> {
    if period.is_zero() {
        return Err(crate::error::EventalyzerError::Scheduler(
            "tick period must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
