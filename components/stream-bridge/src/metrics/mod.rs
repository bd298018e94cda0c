//! In-process counters for a bridge run.

pub mod metrics;
