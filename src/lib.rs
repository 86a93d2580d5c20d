//! Eventalyzer - Sliding-Window Event Counting
//!
//! This crate counts events per key over a trailing, continuously sliding
//! window and reports keys whose count crosses a threshold. Each key's window
//! is a ring of fixed-interval buckets, so memory per key is bounded by the
//! bucket count regardless of event volume.

pub mod config;
pub mod error;
pub mod scheduler;
pub mod tracker;
