use uuid::Uuid;

/// Errors surfaced by the order–payment orchestration core.
///
/// Every orchestration failure is returned explicitly to the caller; none
/// are swallowed. State-machine rejections carry both the current and the
/// requested state so callers can see exactly what was refused.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient stock for product: {product_name} (requested: {requested}, available: {available})")]
    InsufficientStock {
        product_name: String,
        requested: u32,
        available: i64,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Payment not found for intent: {0}")]
    PaymentNotFound(String),

    #[error("Order is not payable in status {status}")]
    OrderNotPayable { status: String },

    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment amount mismatch: expected {expected_cents}, gateway reported {actual_cents}")]
    AmountMismatch {
        expected_cents: i64,
        actual_cents: i64,
    },

    #[error("Store error: {0}")]
    Store(String),
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

impl OrchestrationError {
    /// Transient errors are safe to retry; no partial state was committed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestrationError::GatewayUnavailable(_) | OrchestrationError::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_names_both_states() {
        let err = OrchestrationError::IllegalTransition {
            from: "DELIVERED".to_string(),
            to: "PENDING".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DELIVERED"));
        assert!(msg.contains("PENDING"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(OrchestrationError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(!OrchestrationError::InvalidInput("missing email".into()).is_retryable());
    }
}
