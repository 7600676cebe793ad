use axum::{
    extract::{Path, State},
    Extension, Json,
};
use merx_order::models::{CustomerInfo, LineRequest, Order, Payment};
use merx_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use merx_core::identity::Identity;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_zip_code: String,
    pub shipping_country: String,
    pub items: Vec<CartItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_email: Masked<String>,
    pub customer_phone: Option<Masked<String>>,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_zip_code: String,
    pub shipping_country: String,
    pub total_cents: i64,
    pub currency: String,
    pub status: String,
    pub items: Vec<OrderLineResponse>,
    pub payment: Option<PaymentResponse>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderLineResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub subtotal_cents: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub gateway_intent_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl OrderResponse {
    pub fn from_order(order: Order, payment: Option<Payment>) -> Self {
        Self {
            id: order.id,
            customer_email: order.customer.email,
            customer_phone: order.customer.phone,
            shipping_address: order.customer.shipping_address,
            shipping_city: order.customer.shipping_city,
            shipping_zip_code: order.customer.shipping_zip_code,
            shipping_country: order.customer.shipping_country,
            total_cents: order.total_cents,
            currency: order.currency,
            status: order.status.as_str().to_string(),
            items: order
                .lines
                .into_iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id,
                    product_name: line.product_name,
                    unit_price_cents: line.unit_price_cents,
                    quantity: line.quantity,
                    subtotal_cents: line.subtotal_cents,
                })
                .collect(),
            payment: payment.map(PaymentResponse::from_payment),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

impl PaymentResponse {
    pub fn from_payment(payment: Payment) -> Self {
        Self {
            id: payment.id,
            gateway_intent_id: payment.gateway_intent_id,
            status: payment.status.as_str().to_string(),
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            created_at: payment.created_at,
            completed_at: payment.completed_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/orders
/// Create an order: validates input, reserves stock, freezes totals.
pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let customer = CustomerInfo {
        email: Masked(req.customer_email),
        phone: req.customer_phone.map(Masked),
        shipping_address: req.shipping_address,
        shipping_city: req.shipping_city,
        shipping_zip_code: req.shipping_zip_code,
        shipping_country: req.shipping_country,
    };
    let lines = req
        .items
        .into_iter()
        .map(|item| LineRequest {
            product_id: item.product_id,
            quantity: item.quantity,
        })
        .collect();

    let order = state.orchestrator.create_order(customer, lines).await?;
    Ok(Json(OrderResponse::from_order(order, None)))
}

/// GET /api/orders/{id}
/// Retrieve the full current order/payment representation.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let (order, payment) = state.orchestrator.get_order(order_id).await?;
    Ok(Json(OrderResponse::from_order(order, payment)))
}

/// GET /api/orders/mine
/// Orders belonging to the authenticated customer.
pub async fn list_my_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let Some(email) = identity.email else {
        // Guest sessions have no email to match against.
        return Ok(Json(Vec::new()));
    };

    let orders = state.orchestrator.list_orders_by_email(&email).await?;
    Ok(Json(
        orders
            .into_iter()
            .map(|order| OrderResponse::from_order(order, None))
            .collect(),
    ))
}
