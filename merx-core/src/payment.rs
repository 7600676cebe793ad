use crate::error::OrchestrationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Intent status as reported by the gateway itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayIntentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

impl GatewayIntentStatus {
    /// Terminal failure states collapse to one local outcome.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            GatewayIntentStatus::Canceled | GatewayIntentStatus::Failed
        )
    }
}

/// Gateway-side reservation of an amount, later confirmed or declined by
/// the payer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    /// Provider's opaque id (e.g. pi_123)
    pub intent_id: String,
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: GatewayIntentStatus,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Isolates all knowledge of the external gateway's request/response shapes.
///
/// The gateway is the single source of truth for payment success: a
/// client-reported "succeeded" must be re-verified through
/// `get_intent_status` before any local state is mutated.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent sized to the order total.
    async fn create_intent(
        &self,
        order_id: Uuid,
        amount_cents: i64,
        currency: &str,
    ) -> Result<GatewayIntent, OrchestrationError>;

    /// Retrieve the authoritative status of an intent.
    async fn get_intent_status(
        &self,
        intent_id: &str,
    ) -> Result<GatewayIntent, OrchestrationError>;
}
