use async_trait::async_trait;
use chrono::{DateTime, Utc};
use merx_core::error::OrchestrationError;
use merx_order::lifecycle::transition_allowed;
use merx_order::models::{CustomerInfo, Order, OrderLine, OrderStatus, Payment, PaymentStatus};
use merx_order::store::{OrderStore, PaymentTransition};
use merx_shared::pii::Masked;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

/// Postgres-backed order store. Guarded transitions are expressed as
/// row-locked reads plus conditional UPDATEs inside one transaction, so a
/// duplicate confirmation or a concurrent admin override can never apply a
/// half-written state.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: Pool<Postgres>,
}

impl PgOrderStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, OrchestrationError> {
        let rows = sqlx::query(
            "SELECT product_id, product_name, unit_price_cents, quantity, subtotal_cents
             FROM order_lines WHERE order_id = $1 ORDER BY line_index",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(line_from_row).collect()
    }

    async fn order_with_lines(&self, row: &PgRow) -> Result<Order, OrchestrationError> {
        let order_id: Uuid = row.try_get("id").map_err(store_err)?;
        let lines = self.fetch_lines(order_id).await?;
        order_from_row(row, lines)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<(), OrchestrationError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query(
            "INSERT INTO orders (id, customer_email, customer_phone, shipping_address,
                 shipping_city, shipping_zip_code, shipping_country, total_cents, currency,
                 status, stock_released, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(order.id)
        .bind(order.customer.email.as_inner())
        .bind(order.customer.phone.as_ref().map(|p| p.as_inner().clone()))
        .bind(&order.customer.shipping_address)
        .bind(&order.customer.shipping_city)
        .bind(&order.customer.shipping_zip_code)
        .bind(&order.customer.shipping_country)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.stock_released)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        for (index, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_lines (id, order_id, line_index, product_id, product_name,
                     unit_price_cents, quantity, subtotal_cents)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(index as i32)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(line.unit_price_cents)
            .bind(line.quantity as i32)
            .bind(line.subtotal_cents)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, OrchestrationError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some(row) => Ok(Some(self.order_with_lines(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders_by_email(&self, email: &str) -> Result<Vec<Order>, OrchestrationError> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE customer_email = $1 ORDER BY created_at DESC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(self.order_with_lines(row).await?);
        }
        Ok(orders)
    }

    async fn list_all_orders(&self) -> Result<Vec<Order>, OrchestrationError> {
        let rows = sqlx::query("SELECT * FROM orders ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(self.order_with_lines(row).await?);
        }
        Ok(orders)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), OrchestrationError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let open = sqlx::query(
            "SELECT status FROM payments WHERE order_id = $1 AND status <> 'FAILED' FOR UPDATE",
        )
        .bind(payment.order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;

        if open.is_some() {
            let status: Option<String> =
                sqlx::query("SELECT status FROM orders WHERE id = $1")
                    .bind(payment.order_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(store_err)?
                    .map(|r| r.try_get("status"))
                    .transpose()
                    .map_err(store_err)?;
            return Err(OrchestrationError::OrderNotPayable {
                status: status.unwrap_or_else(|| "PENDING".to_string()),
            });
        }

        sqlx::query(
            "INSERT INTO payments (id, order_id, gateway_intent_id, amount_cents, currency,
                 status, created_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.gateway_intent_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)
    }

    async fn find_payment_by_intent(
        &self,
        gateway_intent_id: &str,
    ) -> Result<Option<Payment>, OrchestrationError> {
        let row = sqlx::query("SELECT * FROM payments WHERE gateway_intent_id = $1")
            .bind(gateway_intent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_payment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, OrchestrationError> {
        let row = sqlx::query(
            "SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn apply_payment_success(
        &self,
        gateway_intent_id: &str,
    ) -> Result<PaymentTransition, OrchestrationError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let payment_row =
            sqlx::query("SELECT * FROM payments WHERE gateway_intent_id = $1 FOR UPDATE")
                .bind(gateway_intent_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?
                .ok_or_else(|| {
                    OrchestrationError::PaymentNotFound(gateway_intent_id.to_string())
                })?;
        let mut payment = payment_from_row(&payment_row)?;

        let order_row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(payment.order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or(OrchestrationError::OrderNotFound(payment.order_id))?;
        let lines = {
            let rows = sqlx::query(
                "SELECT product_id, product_name, unit_price_cents, quantity, subtotal_cents
                 FROM order_lines WHERE order_id = $1 ORDER BY line_index",
            )
            .bind(payment.order_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(store_err)?;
            rows.iter()
                .map(line_from_row)
                .collect::<Result<Vec<_>, _>>()?
        };
        let mut order = order_from_row(&order_row, lines)?;

        match payment.status {
            PaymentStatus::Succeeded => {
                // Already applied by an earlier confirmation.
                tx.rollback().await.map_err(store_err)?;
                return Ok(PaymentTransition {
                    applied: false,
                    order,
                    payment,
                });
            }
            PaymentStatus::Failed => {
                tx.rollback().await.map_err(store_err)?;
                return Err(OrchestrationError::OrderNotPayable {
                    status: order.status.as_str().to_string(),
                });
            }
            PaymentStatus::Pending => {}
        }

        if !transition_allowed(order.status, OrderStatus::Paid) {
            tx.rollback().await.map_err(store_err)?;
            return Err(OrchestrationError::IllegalTransition {
                from: order.status.as_str().to_string(),
                to: OrderStatus::Paid.as_str().to_string(),
            });
        }

        let completed_at = Utc::now();
        sqlx::query(
            "UPDATE payments SET status = 'SUCCEEDED', completed_at = $2
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(payment.id)
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        sqlx::query("UPDATE orders SET status = 'PAID', updated_at = $2 WHERE id = $1")
            .bind(order.id)
            .bind(completed_at)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        payment.status = PaymentStatus::Succeeded;
        payment.completed_at = Some(completed_at);
        order.status = OrderStatus::Paid;
        order.updated_at = completed_at;

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
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let payment_row =
            sqlx::query("SELECT * FROM payments WHERE gateway_intent_id = $1 FOR UPDATE")
                .bind(gateway_intent_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?
                .ok_or_else(|| {
                    OrchestrationError::PaymentNotFound(gateway_intent_id.to_string())
                })?;
        let mut payment = payment_from_row(&payment_row)?;

        let order_row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(payment.order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or(OrchestrationError::OrderNotFound(payment.order_id))?;
        let lines = {
            let rows = sqlx::query(
                "SELECT product_id, product_name, unit_price_cents, quantity, subtotal_cents
                 FROM order_lines WHERE order_id = $1 ORDER BY line_index",
            )
            .bind(payment.order_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(store_err)?;
            rows.iter()
                .map(line_from_row)
                .collect::<Result<Vec<_>, _>>()?
        };
        let order = order_from_row(&order_row, lines)?;

        if payment.status.is_terminal() {
            tx.rollback().await.map_err(store_err)?;
            return Ok(PaymentTransition {
                applied: false,
                order,
                payment,
            });
        }

        let completed_at = Utc::now();
        sqlx::query(
            "UPDATE payments SET status = 'FAILED', completed_at = $2
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(payment.id)
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        payment.status = PaymentStatus::Failed;
        payment.completed_at = Some(completed_at);

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
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let row = sqlx::query("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or(OrchestrationError::OrderNotFound(order_id))?;
        let current_str: String = row.try_get("status").map_err(store_err)?;
        let current = OrderStatus::parse(&current_str)
            .ok_or_else(|| OrchestrationError::Store(format!("bad status: {current_str}")))?;

        if !transition_allowed(current, target) {
            tx.rollback().await.map_err(store_err)?;
            return Err(OrchestrationError::IllegalTransition {
                from: current.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id)
            .bind(target.as_str())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        self.get_order(order_id)
            .await?
            .ok_or(OrchestrationError::OrderNotFound(order_id))
    }

    async fn acquire_stock_release(&self, order_id: Uuid) -> Result<bool, OrchestrationError> {
        let result = sqlx::query(
            "UPDATE orders SET stock_released = TRUE
             WHERE id = $1 AND stock_released = FALSE",
        )
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Distinguish "already released" from "no such order".
        let exists = sqlx::query("SELECT 1 AS one FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        if exists.is_none() {
            return Err(OrchestrationError::OrderNotFound(order_id));
        }
        Ok(false)
    }
}

fn store_err(e: impl std::fmt::Display) -> OrchestrationError {
    OrchestrationError::Store(e.to_string())
}

fn line_from_row(row: &PgRow) -> Result<OrderLine, OrchestrationError> {
    let quantity: i32 = row.try_get("quantity").map_err(store_err)?;
    Ok(OrderLine {
        product_id: row.try_get("product_id").map_err(store_err)?,
        product_name: row.try_get("product_name").map_err(store_err)?,
        unit_price_cents: row.try_get("unit_price_cents").map_err(store_err)?,
        quantity: quantity as u32,
        subtotal_cents: row.try_get("subtotal_cents").map_err(store_err)?,
    })
}

fn order_from_row(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order, OrchestrationError> {
    let status_str: String = row.try_get("status").map_err(store_err)?;
    let status = OrderStatus::parse(&status_str)
        .ok_or_else(|| OrchestrationError::Store(format!("bad order status: {status_str}")))?;
    let email: String = row.try_get("customer_email").map_err(store_err)?;
    let phone: Option<String> = row.try_get("customer_phone").map_err(store_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store_err)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(store_err)?;

    Ok(Order {
        id: row.try_get("id").map_err(store_err)?,
        customer: CustomerInfo {
            email: Masked(email),
            phone: phone.map(Masked),
            shipping_address: row.try_get("shipping_address").map_err(store_err)?,
            shipping_city: row.try_get("shipping_city").map_err(store_err)?,
            shipping_zip_code: row.try_get("shipping_zip_code").map_err(store_err)?,
            shipping_country: row.try_get("shipping_country").map_err(store_err)?,
        },
        lines,
        total_cents: row.try_get("total_cents").map_err(store_err)?,
        currency: row.try_get("currency").map_err(store_err)?,
        status,
        stock_released: row.try_get("stock_released").map_err(store_err)?,
        created_at,
        updated_at,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, OrchestrationError> {
    let status_str: String = row.try_get("status").map_err(store_err)?;
    let status = PaymentStatus::parse(&status_str)
        .ok_or_else(|| OrchestrationError::Store(format!("bad payment status: {status_str}")))?;

    Ok(Payment {
        id: row.try_get("id").map_err(store_err)?,
        order_id: row.try_get("order_id").map_err(store_err)?,
        gateway_intent_id: row.try_get("gateway_intent_id").map_err(store_err)?,
        amount_cents: row.try_get("amount_cents").map_err(store_err)?,
        currency: row.try_get("currency").map_err(store_err)?,
        status,
        created_at: row.try_get("created_at").map_err(store_err)?,
        completed_at: row.try_get("completed_at").map_err(store_err)?,
    })
}
