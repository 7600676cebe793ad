use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::orders::OrderResponse;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}

/// The body deliberately carries only the intent id. Any client-side claim
/// about the outcome is ignored; the gateway is re-queried instead.
#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/payments/intent
/// Issue a gateway payment intent for a PENDING order.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(req): Json<PaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    let issued = state.orchestrator.issue_payment_intent(req.order_id).await?;

    Ok(Json(PaymentIntentResponse {
        payment_intent_id: issued.payment.gateway_intent_id,
        client_secret: issued.client_secret,
        amount_cents: issued.payment.amount_cents,
        currency: issued.payment.currency,
    }))
}

/// POST /api/payments/confirm
/// Idempotent confirmation: re-verifies the intent with the gateway and
/// applies the success/failure effects at most once.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let outcome = state
        .orchestrator
        .confirm_payment(&req.payment_intent_id)
        .await?;

    Ok(Json(OrderResponse::from_order(
        outcome.order,
        Some(outcome.payment),
    )))
}
