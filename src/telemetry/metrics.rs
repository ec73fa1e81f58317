//! Metric instrument factories for fleet-monitor.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"fleet-monitor"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for fleet-monitor instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("fleet-monitor")
}

/// Counter: hosts selected by a flagging function.
/// Labels: `flag`, `action`.
pub fn hosts_flagged() -> Counter<u64> {
    meter()
        .u64_counter("fleet.hosts.flagged")
        .with_description("Hosts selected for cleanup by a flagging function")
        .build()
}

/// Counter: host cleanup actions carried out.
/// Labels: `action`, `result` ("ok" | "error").
pub fn hosts_cleaned() -> Counter<u64> {
    meter()
        .u64_counter("fleet.hosts.cleaned")
        .with_description("Host cleanup actions attempted")
        .build()
}

/// Counter: task cleanup actions carried out.
/// Labels: `outcome` ("failed" | "reset" | "error").
pub fn tasks_cleaned() -> Counter<u64> {
    meter()
        .u64_counter("fleet.tasks.cleaned")
        .with_description("Task cleanup actions attempted")
        .build()
}

/// Counter: notification deliveries.
/// Labels: `result` ("ok" | "error").
pub fn notifications_sent() -> Counter<u64> {
    meter()
        .u64_counter("fleet.notifications.sent")
        .with_description("Notifications handed to the delivery collaborator")
        .build()
}

/// Counter: audit events appended.
/// Labels: `event_type`.
pub fn events_recorded() -> Counter<u64> {
    meter()
        .u64_counter("fleet.events.recorded")
        .with_description("Audit events appended to the event log")
        .build()
}

/// Counter: per-item errors collected by a monitoring stage.
/// Labels: `stage`.
pub fn stage_errors() -> Counter<u64> {
    meter()
        .u64_counter("fleet.stage.errors")
        .with_description("Recoverable errors collected during a monitoring run")
        .build()
}

/// Histogram: wall time of one monitoring run in milliseconds.
/// Labels: `result` ("ok" | "fatal").
pub fn run_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("fleet.run.duration_ms")
        .with_description("Monitoring run duration in milliseconds")
        .with_unit("ms")
        .build()
}
