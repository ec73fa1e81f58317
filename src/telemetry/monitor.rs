//! Span helpers for monitoring runs.

use tracing::Span;
use uuid::Uuid;

/// Start the span wrapping one full monitoring run.
///
/// `monitor.errors` is declared empty and filled in by
/// [`record_run_errors`] once every stage has finished.
pub fn start_run_span(run_id: &Uuid) -> Span {
    tracing::info_span!(
        "fleet.monitor.run",
        "monitor.run_id" = %run_id,
        "monitor.errors" = tracing::field::Empty,
    )
}

/// Start the span for one stage ("tasks", "hosts", "checks", "notify").
pub fn start_stage_span(stage: &str) -> Span {
    tracing::info_span!(
        "fleet.monitor.stage",
        "monitor.stage" = stage,
        "monitor.errors" = tracing::field::Empty,
    )
}

/// Record how many recoverable errors a run or stage collected.
pub fn record_run_errors(span: &Span, errors: usize) {
    span.record("monitor.errors", errors as u64);
}

/// Emit a cleanup event scoped to the given span.
pub fn record_cleanup(span: &Span, resource_id: &str, action: &str) {
    span.in_scope(|| {
        tracing::info!(resource_id, action, "cleanup");
    });
}
