use crate::models::OrderStatus;

/// The closed directed graph of legal order-state transitions.
///
/// Forward edges: PENDING → PAID → PROCESSING → SHIPPED → DELIVERED.
/// CANCELLED is reachable from PENDING or PAID only; a shipped or delivered
/// order cannot be cancelled through this path. Everything else, including
/// every backward edge and self-transition, is illegal.
///
/// Pure and stateless; consulted before any persistence write.
pub fn transition_allowed(current: OrderStatus, target: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (current, target),
        (Pending, Paid)
            | (Paid, Processing)
            | (Processing, Shipped)
            | (Shipped, Delivered)
            | (Pending, Cancelled)
            | (Paid, Cancelled)
    )
}
