use crate::models::{CustomerInfo, LineRequest, Order, OrderLine, OrderStatus, Payment, PaymentStatus};
use crate::store::OrderStore;
use chrono::Utc;
use merx_catalog::provider::{CatalogProvider, ProductSnapshot};
use merx_catalog::stock::{StockError, StockLedger};
use merx_core::error::OrchestrationError;
use merx_core::identity::Identity;
use merx_core::payment::{GatewayIntent, GatewayIntentStatus, PaymentGateway};
use merx_core::telemetry::TelemetrySink;
use merx_shared::events::{
    AmountMismatchEvent, OrderCreatedEvent, OrderPaidEvent, PaymentFailedEvent,
    StockReleasedEvent, TelemetryEvent,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of issuing a payment intent: the persisted Pending payment plus
/// the client secret the buyer needs to complete the intent with the
/// gateway out-of-band.
#[derive(Debug, Clone)]
pub struct IssuedIntent {
    pub payment: Payment,
    pub client_secret: Option<String>,
}

/// Current order/payment pair after a confirmation call.
#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub order: Order,
    pub payment: Payment,
}

/// Sequences order creation → intent issuance → confirmation → status
/// transition, and exposes the administrative status-update path.
///
/// The gateway is never trusted through the client: confirmation always
/// re-queries the gateway's own status before mutating local state, and the
/// success side effects apply at most once per intent id.
pub struct OrderPaymentOrchestrator {
    catalog: Arc<dyn CatalogProvider>,
    ledger: Arc<dyn StockLedger>,
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    telemetry: Arc<dyn TelemetrySink>,
    gateway_timeout: Duration,
}

impl OrderPaymentOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        ledger: Arc<dyn StockLedger>,
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        telemetry: Arc<dyn TelemetrySink>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            ledger,
            store,
            gateway,
            telemetry,
            gateway_timeout,
        }
    }

    /// Validate input, reserve stock for every line atomically, freeze
    /// price/name snapshots and totals, and persist the order as PENDING.
    /// No side effect survives a failure.
    pub async fn create_order(
        &self,
        customer: CustomerInfo,
        line_requests: Vec<LineRequest>,
    ) -> Result<Order, OrchestrationError> {
        validate_customer(&customer)?;
        if line_requests.is_empty() {
            return Err(OrchestrationError::InvalidInput(
                "order must contain at least one line".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(line_requests.len());
        let mut snapshots: Vec<ProductSnapshot> = Vec::with_capacity(line_requests.len());
        for request in &line_requests {
            if request.quantity == 0 {
                return Err(OrchestrationError::InvalidInput(format!(
                    "quantity must be positive for product {}",
                    request.product_id
                )));
            }
            let snapshot = self
                .catalog
                .lookup(request.product_id)
                .await
                .map_err(|e| OrchestrationError::Store(e.to_string()))?
                .ok_or_else(|| {
                    OrchestrationError::InvalidInput(format!(
                        "unknown product: {}",
                        request.product_id
                    ))
                })?;

            lines.push(OrderLine::new(
                snapshot.product_id,
                snapshot.name.clone(),
                snapshot.unit_price_cents,
                request.quantity,
            ));
            snapshots.push(snapshot);
        }

        let order = Order::new(customer, lines);
        let reservation = order.reservation_lines();

        self.ledger
            .reserve(&reservation)
            .await
            .map_err(|e| self.stock_error(e, &snapshots))?;

        if let Err(e) = self.store.insert_order(&order).await {
            // Undo the reservation so a failed persist leaves no trace.
            if let Err(release_err) = self.ledger.release(&reservation).await {
                tracing::error!(
                    order_id = %order.id,
                    error = %release_err,
                    "failed to release reservation after store error"
                );
            }
            return Err(e);
        }

        tracing::info!(order_id = %order.id, total_cents = order.total_cents, "order created");
        self.telemetry
            .emit(TelemetryEvent::OrderCreated(OrderCreatedEvent {
                order_id: order.id,
                line_count: order.lines.len(),
                total_cents: order.total_cents,
                timestamp: Utc::now().timestamp(),
            }));

        Ok(order)
    }

    /// Obtain a gateway intent sized to the order total and persist a
    /// Pending payment bound to it. A timed-out gateway call commits
    /// nothing; the order stays PENDING and the call is retryable.
    pub async fn issue_payment_intent(
        &self,
        order_id: Uuid,
    ) -> Result<IssuedIntent, OrchestrationError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrchestrationError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Pending {
            return Err(OrchestrationError::OrderNotPayable {
                status: order.status.as_str().to_string(),
            });
        }

        if let Some(existing) = self.store.find_payment_by_order(order_id).await? {
            if existing.status != PaymentStatus::Failed {
                return Err(OrchestrationError::OrderNotPayable {
                    status: order.status.as_str().to_string(),
                });
            }
        }

        let intent = self
            .gateway_call(self.gateway.create_intent(
                order_id,
                order.total_cents,
                &order.currency,
            ))
            .await?;

        let payment = Payment::new(order_id, intent.intent_id.clone(), intent.amount_cents);
        self.store.insert_payment(&payment).await?;

        tracing::info!(
            order_id = %order_id,
            intent_id = %intent.intent_id,
            amount_cents = intent.amount_cents,
            "payment intent issued"
        );

        Ok(IssuedIntent {
            payment,
            client_secret: intent.client_secret,
        })
    }

    /// Idempotent confirmation keyed by the gateway intent id.
    ///
    /// The gateway's own status endpoint is the only input trusted here; a
    /// client-reported outcome never reaches this path. Calling twice for
    /// the same intent never double-transitions the order.
    pub async fn confirm_payment(
        &self,
        gateway_intent_id: &str,
    ) -> Result<ConfirmOutcome, OrchestrationError> {
        let payment = self
            .store
            .find_payment_by_intent(gateway_intent_id)
            .await?
            .ok_or_else(|| OrchestrationError::PaymentNotFound(gateway_intent_id.to_string()))?;

        // Already applied: report the final state without new effects.
        if payment.status == PaymentStatus::Succeeded {
            let order = self
                .store
                .get_order(payment.order_id)
                .await?
                .ok_or(OrchestrationError::OrderNotFound(payment.order_id))?;
            return Ok(ConfirmOutcome { order, payment });
        }

        let intent = self
            .gateway_call(self.gateway.get_intent_status(gateway_intent_id))
            .await?;

        match intent.status {
            GatewayIntentStatus::Succeeded => {
                self.apply_confirmed_success(gateway_intent_id, &intent).await
            }
            status if status.is_failure() => {
                self.apply_confirmed_failure(gateway_intent_id).await
            }
            _ => {
                // Gateway still mid-flight; nothing to apply yet.
                let order = self
                    .store
                    .get_order(payment.order_id)
                    .await?
                    .ok_or(OrchestrationError::OrderNotFound(payment.order_id))?;
                Ok(ConfirmOutcome { order, payment })
            }
        }
    }

    async fn apply_confirmed_success(
        &self,
        gateway_intent_id: &str,
        intent: &GatewayIntent,
    ) -> Result<ConfirmOutcome, OrchestrationError> {
        let order = self
            .store
            .get_order(intent.order_id)
            .await?
            .ok_or(OrchestrationError::OrderNotFound(intent.order_id))?;

        if intent.amount_cents != order.total_cents {
            tracing::warn!(
                order_id = %order.id,
                intent_id = %gateway_intent_id,
                expected = order.total_cents,
                actual = intent.amount_cents,
                "gateway-confirmed amount disagrees with order total"
            );
            self.telemetry
                .emit(TelemetryEvent::AmountMismatch(AmountMismatchEvent {
                    order_id: order.id,
                    gateway_intent_id: gateway_intent_id.to_string(),
                    expected_cents: order.total_cents,
                    actual_cents: intent.amount_cents,
                    timestamp: Utc::now().timestamp(),
                }));
            return Err(OrchestrationError::AmountMismatch {
                expected_cents: order.total_cents,
                actual_cents: intent.amount_cents,
            });
        }

        let transition = self.store.apply_payment_success(gateway_intent_id).await?;
        if transition.applied {
            tracing::info!(
                order_id = %transition.order.id,
                intent_id = %gateway_intent_id,
                "payment confirmed, order paid"
            );
            self.telemetry.emit(TelemetryEvent::OrderPaid(OrderPaidEvent {
                order_id: transition.order.id,
                payment_id: transition.payment.id,
                gateway_intent_id: gateway_intent_id.to_string(),
                total_cents: transition.order.total_cents,
                timestamp: Utc::now().timestamp(),
            }));
        }

        Ok(ConfirmOutcome {
            order: transition.order,
            payment: transition.payment,
        })
    }

    async fn apply_confirmed_failure(
        &self,
        gateway_intent_id: &str,
    ) -> Result<ConfirmOutcome, OrchestrationError> {
        let transition = self.store.apply_payment_failure(gateway_intent_id).await?;

        if transition.applied {
            tracing::warn!(
                order_id = %transition.order.id,
                intent_id = %gateway_intent_id,
                "gateway reported payment failure"
            );
            self.telemetry
                .emit(TelemetryEvent::PaymentFailed(PaymentFailedEvent {
                    order_id: transition.order.id,
                    gateway_intent_id: gateway_intent_id.to_string(),
                    timestamp: Utc::now().timestamp(),
                }));
            self.release_stock(&transition.order, "payment failure").await?;
        }

        // Re-read so the caller sees bookkeeping done above.
        let order = self
            .store
            .get_order(transition.order.id)
            .await?
            .unwrap_or(transition.order);

        Ok(ConfirmOutcome {
            order,
            payment: transition.payment,
        })
    }

    /// Administrative path, reached only through the admin-authenticated
    /// route. Only lifecycle-legal transitions are applied; a legal move to
    /// CANCELLED also restores the order's reserved stock.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Identity,
    ) -> Result<Order, OrchestrationError> {
        let order = self.store.update_order_status(order_id, target).await?;
        tracing::info!(
            order_id = %order_id,
            status = target.as_str(),
            actor = %actor.subject,
            "order status updated"
        );

        if target == OrderStatus::Cancelled {
            self.release_stock(&order, "cancellation").await?;
            let order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or(OrchestrationError::OrderNotFound(order_id))?;
            return Ok(order);
        }

        Ok(order)
    }

    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<(Order, Option<Payment>), OrchestrationError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrchestrationError::OrderNotFound(order_id))?;
        let payment = self.store.find_payment_by_order(order_id).await?;
        Ok((order, payment))
    }

    pub async fn list_orders_by_email(
        &self,
        email: &str,
    ) -> Result<Vec<Order>, OrchestrationError> {
        self.store.list_orders_by_email(email).await
    }

    pub async fn list_all_orders(&self) -> Result<Vec<Order>, OrchestrationError> {
        self.store.list_all_orders().await
    }

    /// Restore the order's reservation exactly once, guarded by the store's
    /// stock-released flag.
    async fn release_stock(
        &self,
        order: &Order,
        reason: &str,
    ) -> Result<(), OrchestrationError> {
        if !self.store.acquire_stock_release(order.id).await? {
            return Ok(());
        }

        let reservation = order.reservation_lines();
        self.ledger
            .release(&reservation)
            .await
            .map_err(|e| OrchestrationError::Store(e.to_string()))?;

        tracing::info!(order_id = %order.id, reason, "stock reservation restored");
        self.telemetry
            .emit(TelemetryEvent::StockReleased(StockReleasedEvent {
                order_id: order.id,
                line_count: reservation.len(),
                reason: reason.to_string(),
                timestamp: Utc::now().timestamp(),
            }));
        Ok(())
    }

    /// Every gateway call is bounded; a timeout surfaces as
    /// GatewayUnavailable with no partial commit.
    async fn gateway_call<F>(&self, fut: F) -> Result<GatewayIntent, OrchestrationError>
    where
        F: Future<Output = Result<GatewayIntent, OrchestrationError>>,
    {
        match tokio::time::timeout(self.gateway_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(OrchestrationError::GatewayUnavailable(format!(
                "gateway call exceeded {}ms",
                self.gateway_timeout.as_millis()
            ))),
        }
    }

    fn stock_error(
        &self,
        error: StockError,
        snapshots: &[ProductSnapshot],
    ) -> OrchestrationError {
        let name_of = |product_id: Uuid| {
            snapshots
                .iter()
                .find(|s| s.product_id == product_id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| product_id.to_string())
        };
        match error {
            StockError::Insufficient {
                product_id,
                requested,
                available,
            } => OrchestrationError::InsufficientStock {
                product_name: name_of(product_id),
                requested,
                available,
            },
            StockError::NotFound(product_id) => OrchestrationError::InsufficientStock {
                product_name: name_of(product_id),
                requested: 0,
                available: 0,
            },
            StockError::Unavailable(msg) => OrchestrationError::Store(msg),
        }
    }
}

fn validate_customer(customer: &CustomerInfo) -> Result<(), OrchestrationError> {
    let email = customer.email.as_inner();
    if email.trim().is_empty() || !email.contains('@') {
        return Err(OrchestrationError::InvalidInput(
            "customer email is required".to_string(),
        ));
    }
    let required = [
        ("shipping_address", &customer.shipping_address),
        ("shipping_city", &customer.shipping_city),
        ("shipping_zip_code", &customer.shipping_zip_code),
        ("shipping_country", &customer.shipping_country),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(OrchestrationError::InvalidInput(format!(
                "{field} is required"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SimulatedGateway;
    use crate::models::PaymentStatus;
    use crate::store::MemoryOrderStore;
    use merx_catalog::provider::MemoryCatalog;
    use merx_catalog::stock::MemoryStockLedger;
    use merx_core::telemetry::NullTelemetry;
    use merx_shared::pii::Masked;

    struct Fixture {
        orchestrator: OrderPaymentOrchestrator,
        gateway: Arc<SimulatedGateway>,
        ledger: Arc<MemoryStockLedger>,
        product_a: Uuid,
        product_b: Uuid,
    }

    /// productA: $10.00, 10 in stock. productB: $5.00, 5 in stock.
    async fn fixture() -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        let ledger = Arc::new(MemoryStockLedger::new());
        let store = Arc::new(MemoryOrderStore::new());
        let gateway = Arc::new(SimulatedGateway::new());

        let product_a = Uuid::new_v4();
        let product_b = Uuid::new_v4();
        catalog.insert(ProductSnapshot {
            product_id: product_a,
            name: "Desk Lamp".to_string(),
            unit_price_cents: 1000,
            available_hint: 10,
        });
        catalog.insert(ProductSnapshot {
            product_id: product_b,
            name: "Notebook".to_string(),
            unit_price_cents: 500,
            available_hint: 5,
        });
        ledger.set_available(product_a, 10).await.unwrap();
        ledger.set_available(product_b, 5).await.unwrap();

        let orchestrator = OrderPaymentOrchestrator::new(
            catalog,
            ledger.clone(),
            store,
            gateway.clone(),
            Arc::new(NullTelemetry),
            Duration::from_secs(5),
        );

        Fixture {
            orchestrator,
            gateway,
            ledger,
            product_a,
            product_b,
        }
    }

    fn admin() -> Identity {
        Identity {
            subject: "admin-1".to_string(),
            email: Some("ops@example.com".to_string()),
            role: merx_core::identity::Role::Admin,
        }
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            email: Masked("buyer@example.com".to_string()),
            phone: Some(Masked("+1-555-0100".to_string())),
            shipping_address: "1 Main St".to_string(),
            shipping_city: "Springfield".to_string(),
            shipping_zip_code: "12345".to_string(),
            shipping_country: "US".to_string(),
        }
    }

    fn lines(product_a: Uuid, product_b: Uuid) -> Vec<LineRequest> {
        vec![
            LineRequest {
                product_id: product_a,
                quantity: 2,
            },
            LineRequest {
                product_id: product_b,
                quantity: 1,
            },
        ]
    }

    #[tokio::test]
    async fn test_create_order_freezes_total_and_decrements_stock() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();

        assert_eq!(order.total_cents, 2500);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(f.ledger.available(f.product_a).await.unwrap(), 8);
        assert_eq!(f.ledger.available(f.product_b).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_create_order_rejects_missing_shipping_fields() {
        let f = fixture().await;
        let mut bad = customer();
        bad.shipping_city = "".to_string();

        let err = f
            .orchestrator
            .create_order(bad, lines(f.product_a, f.product_b))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidInput(_)));

        // No side effects on failure.
        assert_eq!(f.ledger.available(f.product_a).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_insufficient_stock_names_product_and_leaves_no_trace() {
        let f = fixture().await;
        let requests = vec![
            LineRequest {
                product_id: f.product_a,
                quantity: 1,
            },
            LineRequest {
                product_id: f.product_b,
                quantity: 6,
            },
        ];

        let err = f
            .orchestrator
            .create_order(customer(), requests)
            .await
            .unwrap_err();
        match err {
            OrchestrationError::InsufficientStock {
                product_name,
                requested,
                available,
            } => {
                assert_eq!(product_name, "Notebook");
                assert_eq!(requested, 6);
                assert_eq!(available, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // The first line must not have been decremented.
        assert_eq!(f.ledger.available(f.product_a).await.unwrap(), 10);
        assert_eq!(f.ledger.available(f.product_b).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unknown_product_is_invalid_input() {
        let f = fixture().await;
        let err = f
            .orchestrator
            .create_order(
                customer(),
                vec![LineRequest {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_concurrent_create_for_last_unit() {
        let f = fixture().await;
        let last_unit = Uuid::new_v4();
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert(ProductSnapshot {
            product_id: last_unit,
            name: "Final Print".to_string(),
            unit_price_cents: 9900,
            available_hint: 1,
        });
        let ledger = Arc::new(MemoryStockLedger::new());
        ledger.set_available(last_unit, 1).await.unwrap();
        let orchestrator = Arc::new(OrderPaymentOrchestrator::new(
            catalog,
            ledger.clone(),
            Arc::new(MemoryOrderStore::new()),
            f.gateway.clone(),
            Arc::new(NullTelemetry),
            Duration::from_secs(5),
        ));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let orchestrator = orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .create_order(
                        customer(),
                        vec![LineRequest {
                            product_id: last_unit,
                            quantity: 1,
                        }],
                    )
                    .await
            }));
        }

        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(OrchestrationError::InsufficientStock { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(insufficient, 1);
        assert_eq!(ledger.available(last_unit).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_issue_intent_binds_pending_payment() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();

        let issued = f.orchestrator.issue_payment_intent(order.id).await.unwrap();
        assert_eq!(issued.payment.order_id, order.id);
        assert_eq!(issued.payment.amount_cents, 2500);
        assert_eq!(issued.payment.status, PaymentStatus::Pending);
        assert!(issued.client_secret.is_some());

        // Second attempt while the first intent is open is rejected.
        let err = f
            .orchestrator
            .issue_payment_intent(order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::OrderNotPayable { .. }));
    }

    #[tokio::test]
    async fn test_issue_intent_on_unknown_order() {
        let f = fixture().await;
        let err = f
            .orchestrator
            .issue_payment_intent(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_gateway_outage_leaves_order_retryable() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();

        f.gateway.set_offline(true);
        let err = f
            .orchestrator
            .issue_payment_intent(order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::GatewayUnavailable(_)));

        // Nothing was committed; a retry after recovery succeeds.
        f.gateway.set_offline(false);
        f.orchestrator.issue_payment_intent(order.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();
        let issued = f.orchestrator.issue_payment_intent(order.id).await.unwrap();
        let intent_id = issued.payment.gateway_intent_id.clone();

        f.gateway
            .complete_intent(&intent_id, GatewayIntentStatus::Succeeded);

        let first = f.orchestrator.confirm_payment(&intent_id).await.unwrap();
        assert_eq!(first.order.status, OrderStatus::Paid);
        assert_eq!(first.payment.status, PaymentStatus::Succeeded);

        let second = f.orchestrator.confirm_payment(&intent_id).await.unwrap();
        assert_eq!(second.order.status, OrderStatus::Paid);
        assert_eq!(second.payment.id, first.payment.id);

        // A paid order cannot be paid again.
        let err = f
            .orchestrator
            .issue_payment_intent(order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::OrderNotPayable { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_confirms_apply_once() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();
        let issued = f.orchestrator.issue_payment_intent(order.id).await.unwrap();
        let intent_id = issued.payment.gateway_intent_id.clone();
        f.gateway
            .complete_intent(&intent_id, GatewayIntentStatus::Succeeded);

        let orchestrator = Arc::new(f.orchestrator);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let orchestrator = orchestrator.clone();
            let intent_id = intent_id.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.confirm_payment(&intent_id).await
            }));
        }

        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.order.status, OrderStatus::Paid);
        }
    }

    #[tokio::test]
    async fn test_client_cannot_confirm_unpaid_intent() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();
        let issued = f.orchestrator.issue_payment_intent(order.id).await.unwrap();

        // The payer never completed the intent with the gateway; a bare
        // client assertion of success must not transition anything.
        let outcome = f
            .orchestrator
            .confirm_payment(&issued.payment.gateway_intent_id)
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Pending);
        assert_eq!(outcome.payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_fatal_for_the_payment() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();
        let issued = f.orchestrator.issue_payment_intent(order.id).await.unwrap();
        let intent_id = issued.payment.gateway_intent_id.clone();

        f.gateway.set_intent_amount(&intent_id, 2000);
        f.gateway
            .complete_intent(&intent_id, GatewayIntentStatus::Succeeded);

        let err = f.orchestrator.confirm_payment(&intent_id).await.unwrap_err();
        match err {
            OrchestrationError::AmountMismatch {
                expected_cents,
                actual_cents,
            } => {
                assert_eq!(expected_cents, 2500);
                assert_eq!(actual_cents, 2000);
            }
            other => panic!("expected AmountMismatch, got {other:?}"),
        }

        // Order remains PENDING, payment remains Pending, for manual review.
        let (order, payment) = f.orchestrator.get_order(order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(payment.unwrap().status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_gateway_failure_restores_stock_once() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();
        assert_eq!(f.ledger.available(f.product_a).await.unwrap(), 8);

        let issued = f.orchestrator.issue_payment_intent(order.id).await.unwrap();
        let intent_id = issued.payment.gateway_intent_id.clone();
        f.gateway
            .complete_intent(&intent_id, GatewayIntentStatus::Failed);

        let outcome = f.orchestrator.confirm_payment(&intent_id).await.unwrap();
        assert_eq!(outcome.payment.status, PaymentStatus::Failed);
        assert_eq!(outcome.order.status, OrderStatus::Pending);
        assert_eq!(f.ledger.available(f.product_a).await.unwrap(), 10);
        assert_eq!(f.ledger.available(f.product_b).await.unwrap(), 5);

        // Cancelling afterwards must not release a second time.
        f.orchestrator
            .update_order_status(order.id, OrderStatus::Cancelled, &admin())
            .await
            .unwrap();
        assert_eq!(f.ledger.available(f.product_a).await.unwrap(), 10);

        // A failed payment frees the order for a fresh intent... but only
        // while it is still PENDING; here it was cancelled.
        let err = f
            .orchestrator
            .issue_payment_intent(order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::OrderNotPayable { .. }));
    }

    #[tokio::test]
    async fn test_admin_walk_through_the_lifecycle() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();

        for target in [
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let updated = f
                .orchestrator
                .update_order_status(order.id, target, &admin())
                .await
                .unwrap();
            assert_eq!(updated.status, target);
        }

        let err = f
            .orchestrator
            .update_order_status(order.id, OrderStatus::Cancelled, &admin())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_cancel_from_paid_restores_stock() {
        let f = fixture().await;
        let order = f
            .orchestrator
            .create_order(customer(), lines(f.product_a, f.product_b))
            .await
            .unwrap();
        f.orchestrator
            .update_order_status(order.id, OrderStatus::Paid, &admin())
            .await
            .unwrap();

        let cancelled = f
            .orchestrator
            .update_order_status(order.id, OrderStatus::Cancelled, &admin())
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(f.ledger.available(f.product_a).await.unwrap(), 10);
        assert_eq!(f.ledger.available(f.product_b).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_confirm_unknown_intent() {
        let f = fixture().await;
        let err = f
            .orchestrator
            .confirm_payment("pi_does_not_exist")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::PaymentNotFound(_)));
    }
}
