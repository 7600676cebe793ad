use crate::lifecycle::transition_allowed;
use crate::models::{Order, OrderStatus, Payment, PaymentStatus};
use async_trait::async_trait;
use chrono::Utc;
use merx_core::error::OrchestrationError;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Result of a guarded payment transition. `applied` is true only for the
/// one call that actually moved the payment out of Pending; duplicates and
/// retries observe the already-final state.
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub applied: bool,
    pub order: Order,
    pub payment: Payment,
}

/// Durable record of orders and payments; single source of truth for order
/// state. Every mutating operation is a guarded atomic unit so concurrent
/// confirmations and admin overrides cannot interleave partial writes.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<(), OrchestrationError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, OrchestrationError>;

    async fn list_orders_by_email(&self, email: &str) -> Result<Vec<Order>, OrchestrationError>;

    async fn list_all_orders(&self) -> Result<Vec<Order>, OrchestrationError>;

    /// Persist a new Pending payment. Rejects a duplicate gateway intent id
    /// and a second non-failed payment for the same order.
    async fn insert_payment(&self, payment: &Payment) -> Result<(), OrchestrationError>;

    async fn find_payment_by_intent(
        &self,
        gateway_intent_id: &str,
    ) -> Result<Option<Payment>, OrchestrationError>;

    /// Most recent payment for the order, any status.
    async fn find_payment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, OrchestrationError>;

    /// Atomically set Payment → SUCCEEDED and Order → PAID, keyed by the
    /// gateway intent id. No effect unless the payment is exactly Pending
    /// and the order transition is legal; an already-succeeded payment is
    /// reported as `applied: false` with the current state.
    async fn apply_payment_success(
        &self,
        gateway_intent_id: &str,
    ) -> Result<PaymentTransition, OrchestrationError>;

    /// Guarded Payment PENDING → FAILED. The order is left untouched
    /// (cancellation-eligible).
    async fn apply_payment_failure(
        &self,
        gateway_intent_id: &str,
    ) -> Result<PaymentTransition, OrchestrationError>;

    /// Apply a lifecycle-legal status transition; rejects everything else
    /// with `IllegalTransition` and leaves the order unchanged.
    async fn update_order_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<Order, OrchestrationError>;

    /// Flip the order's stock-released flag false → true. Returns whether
    /// this call acquired it; at most one caller ever does.
    async fn acquire_stock_release(&self, order_id: Uuid) -> Result<bool, OrchestrationError>;
}

#[derive(Default)]
struct MemoryInner {
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    intent_index: HashMap<String, Uuid>,
}

impl MemoryInner {
    fn payment_by_intent(&self, gateway_intent_id: &str) -> Option<&Payment> {
        self.intent_index
            .get(gateway_intent_id)
            .and_then(|id| self.payments.get(id))
    }
}

/// In-memory store used by tests and the development backend. One mutex
/// over orders and payments makes every guarded operation atomic.
pub struct MemoryOrderStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
        }
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<(), OrchestrationError> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, OrchestrationError> {
        let inner = self.inner.lock().expect("order store lock poisoned");
        Ok(inner.orders.get(&order_id).cloned())
    }

    async fn list_orders_by_email(&self, email: &str) -> Result<Vec<Order>, OrchestrationError> {
        let inner = self.inner.lock().expect("order store lock poisoned");
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.customer.email.as_inner() == email)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_all_orders(&self) -> Result<Vec<Order>, OrchestrationError> {
        let inner = self.inner.lock().expect("order store lock poisoned");
        let mut orders: Vec<Order> = inner.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), OrchestrationError> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");

        if inner.intent_index.contains_key(&payment.gateway_intent_id) {
            return Err(OrchestrationError::Store(format!(
                "duplicate gateway intent id: {}",
                payment.gateway_intent_id
            )));
        }

        let open_payment = inner
            .payments
            .values()
            .any(|p| p.order_id == payment.order_id && p.status != PaymentStatus::Failed);
        if open_payment {
            let status = inner
                .orders
                .get(&payment.order_id)
                .map(|o| o.status.as_str())
                .unwrap_or("PENDING");
            return Err(OrchestrationError::OrderNotPayable {
                status: status.to_string(),
            });
        }

        inner
            .intent_index
            .insert(payment.gateway_intent_id.clone(), payment.id);
        inner.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment_by_intent(
        &self,
        gateway_intent_id: &str,
    ) -> Result<Option<Payment>, OrchestrationError> {
        let inner = self.inner.lock().expect("order store lock poisoned");
        Ok(inner.payment_by_intent(gateway_intent_id).cloned())
    }

    async fn find_payment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, OrchestrationError> {
        let inner = self.inner.lock().expect("order store lock poisoned");
        Ok(inner
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn apply_payment_success(
        &self,
        gateway_intent_id: &str,
    ) -> Result<PaymentTransition, OrchestrationError> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");

        let payment_id = *inner
            .intent_index
            .get(gateway_intent_id)
            .ok_or_else(|| OrchestrationError::PaymentNotFound(gateway_intent_id.to_string()))?;
        let payment = inner.payments.get(&payment_id).cloned().expect("indexed");
        let order = inner
            .orders
            .get(&payment.order_id)
            .cloned()
            .ok_or(OrchestrationError::OrderNotFound(payment.order_id))?;

        match payment.status {
            PaymentStatus::Succeeded => {
                // Duplicate confirmation: effects were already applied once.
                return Ok(PaymentTransition {
                    applied: false,
                    order,
                    payment,
                });
            }
            PaymentStatus::Failed => {
                return Err(OrchestrationError::OrderNotPayable {
                    status: order.status.as_str().to_string(),
                });
            }
            PaymentStatus::Pending => {}
        }

        if !transition_allowed(order.status, OrderStatus::Paid) {
            return Err(OrchestrationError::IllegalTransition {
                from: order.status.as_str().to_string(),
                to: OrderStatus::Paid.as_str().to_string(),
            });
        }

        let payment = {
            let p = inner.payments.get_mut(&payment_id).expect("indexed");
            p.status = PaymentStatus::Succeeded;
            p.completed_at = Some(Utc::now());
            p.clone()
        };
        let order = {
            let o = inner.orders.get_mut(&payment.order_id).expect("checked");
            o.update_status(OrderStatus::Paid);
            o.clone()
        };

        Ok(PaymentTransition {
            applied: true,
            order,
            payment,
        })
    }

    async fn apply_payment_failure(
        &self,
        gateway_intent_id: &str,
    ) -> Result<PaymentTransition, OrchestrationError> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");

        let payment_id = *inner
            .intent_index
            .get(gateway_intent_id)
            .ok_or_else(|| OrchestrationError::PaymentNotFound(gateway_intent_id.to_string()))?;
        let payment = inner.payments.get(&payment_id).cloned().expect("indexed");
        let order = inner
            .orders
            .get(&payment.order_id)
            .cloned()
            .ok_or(OrchestrationError::OrderNotFound(payment.order_id))?;

        if payment.status.is_terminal() {
            return Ok(PaymentTransition {
                applied: false,
                order,
                payment,
            });
        }

        let payment = {
            let p = inner.payments.get_mut(&payment_id).expect("indexed");
            p.status = PaymentStatus::Failed;
            p.completed_at = Some(Utc::now());
            p.clone()
        };

        Ok(PaymentTransition {
            applied: true,
            order,
            payment,
        })
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<Order, OrchestrationError> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(OrchestrationError::OrderNotFound(order_id))?;

        if !transition_allowed(order.status, target) {
            return Err(OrchestrationError::IllegalTransition {
                from: order.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        order.update_status(target);
        Ok(order.clone())
    }

    async fn acquire_stock_release(&self, order_id: Uuid) -> Result<bool, OrchestrationError> {
        let mut inner = self.inner.lock().expect("order store lock poisoned");
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(OrchestrationError::OrderNotFound(order_id))?;

        if order.stock_released {
            return Ok(false);
        }
        order.stock_released = true;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerInfo, OrderLine};
    use merx_shared::pii::Masked;

    fn sample_order() -> Order {
        Order::new(
            CustomerInfo {
                email: Masked("buyer@example.com".to_string()),
                phone: None,
                shipping_address: "1 Main St".to_string(),
                shipping_city: "Springfield".to_string(),
                shipping_zip_code: "12345".to_string(),
                shipping_country: "US".to_string(),
            },
            vec![OrderLine::new(
                Uuid::new_v4(),
                "Desk Lamp".to_string(),
                1000,
                2,
            )],
        )
    }

    #[tokio::test]
    async fn test_payment_success_applies_once() {
        let store = MemoryOrderStore::new();
        let order = sample_order();
        store.insert_order(&order).await.unwrap();

        let payment = Payment::new(order.id, "pi_test_1".to_string(), order.total_cents);
        store.insert_payment(&payment).await.unwrap();

        let first = store.apply_payment_success("pi_test_1").await.unwrap();
        assert!(first.applied);
        assert_eq!(first.order.status, OrderStatus::Paid);
        assert_eq!(first.payment.status, PaymentStatus::Succeeded);
        assert!(first.payment.completed_at.is_some());

        let second = store.apply_payment_success("pi_test_1").await.unwrap();
        assert!(!second.applied);
        assert_eq!(second.order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_second_open_payment_is_rejected() {
        let store = MemoryOrderStore::new();
        let order = sample_order();
        store.insert_order(&order).await.unwrap();

        let first = Payment::new(order.id, "pi_a".to_string(), order.total_cents);
        store.insert_payment(&first).await.unwrap();

        let second = Payment::new(order.id, "pi_b".to_string(), order.total_cents);
        let err = store.insert_payment(&second).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::OrderNotPayable { .. }));

        // After the first payment fails, a new attempt is allowed.
        store.apply_payment_failure("pi_a").await.unwrap();
        store.insert_payment(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_status_rejects_illegal_edge() {
        let store = MemoryOrderStore::new();
        let order = sample_order();
        store.insert_order(&order).await.unwrap();

        let err = store
            .update_order_status(order.id, OrderStatus::Shipped)
            .await
            .unwrap_err();
        match err {
            OrchestrationError::IllegalTransition { from, to } => {
                assert_eq!(from, "PENDING");
                assert_eq!(to, "SHIPPED");
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }

        // Unchanged on failure.
        let current = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(current.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_stock_release_acquired_once() {
        let store = MemoryOrderStore::new();
        let order = sample_order();
        store.insert_order(&order).await.unwrap();

        assert!(store.acquire_stock_release(order.id).await.unwrap());
        assert!(!store.acquire_stock_release(order.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_intent_is_payment_not_found() {
        let store = MemoryOrderStore::new();
        let err = store.apply_payment_success("pi_missing").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::PaymentNotFound(_)));
    }
}
