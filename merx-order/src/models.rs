use chrono::{DateTime, Utc};
use merx_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<OrderStatus> {
        Self::ALL.iter().copied().find(|v| v.as_str() == s)
    }
}

/// Payment status: created Pending, terminal at Succeeded or Failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "SUCCEEDED" => Some(PaymentStatus::Succeeded),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// Contact and shipping snapshot captured at creation time. Not a live
/// reference to a customer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub email: Masked<String>,
    pub phone: Option<Masked<String>>,
    pub shipping_address: String,
    pub shipping_city: String,
    pub shipping_zip_code: String,
    pub shipping_country: String,
}

/// A single line in a create-order request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// An individual product within an order. Name and price are snapshots,
/// decoupled from the catalog so later edits never alter historical orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub subtotal_cents: i64,
}

impl OrderLine {
    pub fn new(product_id: Uuid, product_name: String, unit_price_cents: i64, quantity: u32) -> Self {
        Self {
            product_id,
            product_name,
            unit_price_cents,
            quantity,
            subtotal_cents: unit_price_cents * i64::from(quantity),
        }
    }
}

/// The single source of truth for a buyer's purchase. Lines and total are
/// immutable once the order exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer: CustomerInfo,
    pub lines: Vec<OrderLine>,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    /// Set once when reserved stock has been restored, so a payment failure
    /// followed by a cancellation cannot release twice.
    pub stock_released: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(customer: CustomerInfo, lines: Vec<OrderLine>) -> Self {
        let now = Utc::now();
        let total_cents = lines.iter().map(|l| l.subtotal_cents).sum();
        Self {
            id: Uuid::new_v4(),
            customer,
            lines,
            total_cents,
            currency: "usd".to_string(),
            status: OrderStatus::Pending,
            stock_released: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Reservation units per product, aggregated across lines.
    pub fn reservation_lines(&self) -> Vec<(Uuid, u32)> {
        let mut aggregated: Vec<(Uuid, u32)> = Vec::new();
        for line in &self.lines {
            match aggregated.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, qty)) => *qty += line.quantity,
                None => aggregated.push((line.product_id, line.quantity)),
            }
        }
        aggregated
    }
}

/// One payment attempt against an order, bound to a gateway-side intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway_intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(order_id: Uuid, gateway_intent_id: String, amount_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            gateway_intent_id,
            amount_cents,
            currency: "usd".to_string(),
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> CustomerInfo {
        CustomerInfo {
            email: Masked("buyer@example.com".to_string()),
            phone: None,
            shipping_address: "1 Main St".to_string(),
            shipping_city: "Springfield".to_string(),
            shipping_zip_code: "12345".to_string(),
            shipping_country: "US".to_string(),
        }
    }

    #[test]
    fn test_total_is_sum_of_line_subtotals() {
        let product_a = Uuid::new_v4();
        let product_b = Uuid::new_v4();
        let order = Order::new(
            customer(),
            vec![
                OrderLine::new(product_a, "Desk Lamp".to_string(), 1000, 2),
                OrderLine::new(product_b, "Notebook".to_string(), 500, 1),
            ],
        );
        assert_eq!(order.total_cents, 2500);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.lines[0].subtotal_cents, 2000);
    }

    #[test]
    fn test_reservation_lines_aggregate_per_product() {
        let product = Uuid::new_v4();
        let order = Order::new(
            customer(),
            vec![
                OrderLine::new(product, "Desk Lamp".to_string(), 1000, 1),
                OrderLine::new(product, "Desk Lamp".to_string(), 1000, 2),
            ],
        );
        assert_eq!(order.reservation_lines(), vec![(product, 3)]);
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("SHIPPED"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("UNKNOWN"), None);
    }
}
