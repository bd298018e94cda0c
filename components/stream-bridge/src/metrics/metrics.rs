// External crates
use lazy_static::lazy_static;
use prometheus::{
    Histogram, IntCounter, register_histogram, register_int_counter,
};
use std::time::Instant;

/// Helper to observe histogram duration
pub fn observe_duration(hist: &Histogram, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    hist.observe(elapsed);
}

lazy_static! {
    // ======== Ingestion Metrics ========
    pub static ref LINES_INGESTED_TOTAL: IntCounter = register_int_counter!(
        "streambridge_lines_ingested_total",
        "Total number of input lines appended to the target stream"
    ).expect("metric names are unique");

    pub static ref APPEND_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "streambridge_append_failures_total",
        "Number of appends rejected by the store"
    ).expect("metric names are unique");

    // ======== Tailing Metrics ========
    pub static ref TAIL_POLLS_TOTAL: IntCounter = register_int_counter!(
        "streambridge_tail_polls_total",
        "Number of blocking multi-stream reads that returned"
    ).expect("metric names are unique");

    pub static ref TAIL_POLL_DURATION_SECONDS: Histogram = register_histogram!(
        "streambridge_tail_poll_duration_seconds",
        "Histogram of time spent blocked in a multi-stream read (seconds)",
        vec![0.001, 0.01, 0.1, 1.0, 10.0, 60.0, 600.0]
    ).expect("metric names are unique");

    pub static ref UNITS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        "streambridge_units_delivered_total",
        "Number of (entry, field) lines written to the output"
    ).expect("metric names are unique");

    pub static ref FORMAT_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "streambridge_format_failures_total",
        "Number of units that could not be formatted and fell back to raw output"
    ).expect("metric names are unique");
}

/// One-line summary of the counters, logged when a run ends.
pub fn summary() -> String {
    format!(
        "ingested={} append_failures={} polls={} delivered={} format_failures={}",
        LINES_INGESTED_TOTAL.get(),
        APPEND_FAILURES_TOTAL.get(),
        TAIL_POLLS_TOTAL.get(),
        UNITS_DELIVERED_TOTAL.get(),
        FORMAT_FAILURES_TOTAL.get(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_include_every_counter_in_summary() {
        let before = TAIL_POLLS_TOTAL.get();
        TAIL_POLLS_TOTAL.inc();

        let summary = summary();

        assert!(TAIL_POLLS_TOTAL.get() > before);
        for name in ["ingested=", "append_failures=", "polls=", "delivered=", "format_failures="] {
            assert!(summary.contains(name), "{summary} is missing {name}");
        }
    }
}
