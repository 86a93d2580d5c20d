//! Sliding-window event counting and per-key tracking.

mod counter;
mod registry;

pub use counter::{WindowCounter, MAX_BUCKETS};
pub use registry::{HashFn, TrackerOptions, TrackerRegistry};
