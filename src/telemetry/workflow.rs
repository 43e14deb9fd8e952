//! Workflow run span helpers.

use tracing::Span;
use uuid::Uuid;

/// Start a span for one workflow attempt.
///
/// The `workflow.status` field is declared empty and can be updated via
/// [`record_transition`].
pub fn start_run_span(workflow: &str, run_id: &Uuid) -> Span {
    tracing::info_span!(
        "workflow.run",
        "workflow.id" = workflow,
        "workflow.run_id" = %run_id,
        "workflow.status" = tracing::field::Empty,
    )
}

/// Record a status transition on the given span.
pub fn record_transition(span: &Span, from: &str, to: &str) {
    span.record("workflow.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
