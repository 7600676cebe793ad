use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// A single line of a reservation request: (product, quantity).
pub type StockLine = (Uuid, u32);

#[derive(Debug, thiserror::Error)]
pub enum StockError {
    #[error("Stock entry not found: {0}")]
    NotFound(Uuid),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    Insufficient {
        product_id: Uuid,
        requested: u32,
        available: i64,
    },

    #[error("Stock ledger unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative counter of sellable units per product.
///
/// `reserve` must check and decrement every line as one atomic unit: either
/// all lines succeed or none do, and no counter ever goes negative.
#[async_trait]
pub trait StockLedger: Send + Sync {
    async fn reserve(&self, lines: &[StockLine]) -> Result<(), StockError>;

    /// Restore previously reserved units (cancellation / payment failure).
    async fn release(&self, lines: &[StockLine]) -> Result<(), StockError>;

    async fn available(&self, product_id: Uuid) -> Result<i64, StockError>;

    /// Seed or reset a counter. Used by provisioning and tests.
    async fn set_available(&self, product_id: Uuid, quantity: i64) -> Result<(), StockError>;
}

/// In-memory ledger: one mutex over the counter map makes a multi-line
/// reserve a single atomic check-and-decrement.
pub struct MemoryStockLedger {
    counters: Mutex<HashMap<Uuid, i64>>,
}

impl MemoryStockLedger {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StockLedger for MemoryStockLedger {
    async fn reserve(&self, lines: &[StockLine]) -> Result<(), StockError> {
        let mut counters = self.counters.lock().expect("stock lock poisoned");

        // Validate every line before touching any counter.
        for (product_id, quantity) in lines {
            let available = *counters
                .get(product_id)
                .ok_or(StockError::NotFound(*product_id))?;
            if available < i64::from(*quantity) {
                return Err(StockError::Insufficient {
                    product_id: *product_id,
                    requested: *quantity,
                    available,
                });
            }
        }

        for (product_id, quantity) in lines {
            *counters.get_mut(product_id).expect("validated above") -= i64::from(*quantity);
        }

        Ok(())
    }

    async fn release(&self, lines: &[StockLine]) -> Result<(), StockError> {
        let mut counters = self.counters.lock().expect("stock lock poisoned");
        for (product_id, quantity) in lines {
            let counter = counters
                .get_mut(product_id)
                .ok_or(StockError::NotFound(*product_id))?;
            *counter += i64::from(*quantity);
        }
        Ok(())
    }

    async fn available(&self, product_id: Uuid) -> Result<i64, StockError> {
        let counters = self.counters.lock().expect("stock lock poisoned");
        counters
            .get(&product_id)
            .copied()
            .ok_or(StockError::NotFound(product_id))
    }

    async fn set_available(&self, product_id: Uuid, quantity: i64) -> Result<(), StockError> {
        let mut counters = self.counters.lock().expect("stock lock poisoned");
        counters.insert(product_id, quantity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reserve_and_release() {
        let ledger = MemoryStockLedger::new();
        let product_id = Uuid::new_v4();
        ledger.set_available(product_id, 10).await.unwrap();

        ledger.reserve(&[(product_id, 3)]).await.unwrap();
        assert_eq!(ledger.available(product_id).await.unwrap(), 7);

        ledger.release(&[(product_id, 3)]).await.unwrap();
        assert_eq!(ledger.available(product_id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_multi_line_reserve_is_all_or_nothing() {
        let ledger = MemoryStockLedger::new();
        let product_a = Uuid::new_v4();
        let product_b = Uuid::new_v4();
        ledger.set_available(product_a, 5).await.unwrap();
        ledger.set_available(product_b, 1).await.unwrap();

        let err = ledger
            .reserve(&[(product_a, 2), (product_b, 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::Insufficient { .. }));

        // First line must not have been decremented.
        assert_eq!(ledger.available(product_a).await.unwrap(), 5);
        assert_eq!(ledger.available(product_b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reserve_of_last_unit() {
        let ledger = Arc::new(MemoryStockLedger::new());
        let product_id = Uuid::new_v4();
        ledger.set_available(product_id, 1).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(&[(product_id, 1)]).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(ledger.available(product_id).await.unwrap(), 0);
    }
}
