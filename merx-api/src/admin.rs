use axum::{
    extract::{Path, State},
    Extension, Json,
};
use merx_core::error::OrchestrationError;
use merx_core::identity::Identity;
use merx_order::models::OrderStatus;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::orders::OrderResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

/// PUT /api/admin/orders/{id}/status
/// Administrative override: only lifecycle-legal transitions are applied.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Extension(actor): Extension<Identity>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let target = OrderStatus::parse(&req.status.to_uppercase()).ok_or_else(|| {
        OrchestrationError::InvalidInput(format!("unknown order status: {}", req.status))
    })?;

    let order = state
        .orchestrator
        .update_order_status(order_id, target, &actor)
        .await?;
    Ok(Json(OrderResponse::from_order(order, None)))
}

/// GET /api/admin/orders
/// Every order, newest first.
pub async fn list_all_orders(
    State(state): State<AppState>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.orchestrator.list_all_orders().await?;
    Ok(Json(
        orders
            .into_iter()
            .map(|order| OrderResponse::from_order(order, None))
            .collect(),
    ))
}

/// GET /api/admin/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let (order, payment) = state.orchestrator.get_order(order_id).await?;
    Ok(Json(OrderResponse::from_order(order, payment)))
}
