use merx_shared::events::TelemetryEvent;

/// Outbound seam to the telemetry collaborator.
///
/// Delivery is best-effort: implementations must never block and never
/// return an error to the caller. A dropped event is an observability gap,
/// not an orchestration failure.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Sink that discards everything. Used by tests and as a safe default.
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn emit(&self, _event: TelemetryEvent) {}
}
