//! Metric instrument factories for growth-engine.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"growth-engine"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for growth-engine instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("growth-engine")
}

/// Counter: growth scores computed.
/// Labels: `level`.
pub fn score_computed() -> Counter<u64> {
    meter()
        .u64_counter("growth.score.computed")
        .with_description("Number of growth scores computed")
        .build()
}

/// Counter: workflow status transitions.
/// Labels: `from`, `to`.
pub fn workflow_transitions() -> Counter<u64> {
    meter()
        .u64_counter("growth.workflow.transitions")
        .with_description("Number of workflow status transitions")
        .build()
}

/// Counter: applied workflow run results.
/// Labels: `result` ("success" | "failure").
pub fn workflow_runs() -> Counter<u64> {
    meter()
        .u64_counter("growth.workflow.runs")
        .with_description("Number of workflow runs with an applied result")
        .build()
}

/// Counter: events appended to the action feed.
/// Labels: `event_type`.
pub fn feed_appends() -> Counter<u64> {
    meter()
        .u64_counter("growth.feed.appends")
        .with_description("Number of action feed appends")
        .build()
}

/// Histogram: workflow run duration in milliseconds.
pub fn run_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("growth.run.duration_ms")
        .with_description("Workflow run duration in milliseconds")
        .with_unit("ms")
        .build()
}
