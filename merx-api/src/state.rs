use merx_core::telemetry::TelemetrySink;
use merx_order::orchestrator::OrderPaymentOrchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OrderPaymentOrchestrator>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub auth: AuthConfig,
}
