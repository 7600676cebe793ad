use uuid::Uuid;

/// Telemetry payloads emitted by the orchestration core. Delivery is
/// best-effort: producers must never block or fail on these.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    OrderCreated(OrderCreatedEvent),
    OrderPaid(OrderPaidEvent),
    PaymentFailed(PaymentFailedEvent),
    AmountMismatch(AmountMismatchEvent),
    StockReleased(StockReleasedEvent),
    ClientLog(ClientLogEvent),
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub line_count: usize,
    pub total_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPaidEvent {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub gateway_intent_id: String,
    pub total_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentFailedEvent {
    pub order_id: Uuid,
    pub gateway_intent_id: String,
    pub timestamp: i64,
}

/// Gateway-confirmed amount disagreed with the order total. Flagged for
/// manual review; the payment is never silently accepted.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct AmountMismatchEvent {
    pub order_id: Uuid,
    pub gateway_intent_id: String,
    pub expected_cents: i64,
    pub actual_cents: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct StockReleasedEvent {
    pub order_id: Uuid,
    pub line_count: usize,
    pub reason: String,
    pub timestamp: i64,
}

/// Log entry forwarded from a browser/client session.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ClientLogEvent {
    pub level: String,
    pub message: String,
    pub source: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: i64,
}
