use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use merx_core::error::OrchestrationError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Orchestration(OrchestrationError),
    AuthenticationError(String),
    AuthorizationError(String),
    Internal(anyhow::Error),
}

impl From<OrchestrationError> for AppError {
    fn from(err: OrchestrationError) -> Self {
        Self::Orchestration(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Orchestration(err) => {
                let (status, code) = match &err {
                    OrchestrationError::InvalidInput(_) => {
                        (StatusCode::BAD_REQUEST, "INVALID_INPUT")
                    }
                    OrchestrationError::InsufficientStock { .. } => {
                        (StatusCode::CONFLICT, "INSUFFICIENT_STOCK")
                    }
                    OrchestrationError::OrderNotFound(_) => {
                        (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND")
                    }
                    OrchestrationError::PaymentNotFound(_) => {
                        (StatusCode::NOT_FOUND, "PAYMENT_NOT_FOUND")
                    }
                    OrchestrationError::OrderNotPayable { .. } => {
                        (StatusCode::CONFLICT, "ORDER_NOT_PAYABLE")
                    }
                    OrchestrationError::IllegalTransition { .. } => {
                        (StatusCode::CONFLICT, "ILLEGAL_TRANSITION")
                    }
                    OrchestrationError::GatewayUnavailable(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "GATEWAY_UNAVAILABLE")
                    }
                    OrchestrationError::AmountMismatch { .. } => {
                        (StatusCode::CONFLICT, "AMOUNT_MISMATCH")
                    }
                    OrchestrationError::Store(msg) => {
                        tracing::error!("Store error: {}", msg);
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({
                                "error": "Internal Server Error",
                                "code": "INTERNAL",
                            })),
                        )
                            .into_response();
                    }
                };
                (status, code, err.to_string())
            }
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            AppError::Internal(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_maps_to_status_codes() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (
                OrchestrationError::InvalidInput("x".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                OrchestrationError::OrderNotFound(uuid::Uuid::new_v4()).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                OrchestrationError::GatewayUnavailable("x".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                OrchestrationError::AmountMismatch {
                    expected_cents: 2500,
                    actual_cents: 2000,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
