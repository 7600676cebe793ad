use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Point-in-time view of a product at order-creation time. Price and name
/// are frozen into the order line so later catalog edits never alter
/// historical orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price_cents: i64,
    /// Advisory only; the stock ledger is authoritative.
    pub available_hint: i64,
}

/// Read-only view onto the catalog collaborator.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn lookup(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// In-memory catalog used by tests and the development backend.
pub struct MemoryCatalog {
    products: Mutex<HashMap<Uuid, ProductSnapshot>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            products: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, snapshot: ProductSnapshot) {
        self.products
            .lock()
            .expect("catalog lock poisoned")
            .insert(snapshot.product_id, snapshot);
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogProvider for MemoryCatalog {
    async fn lookup(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, CatalogError> {
        let products = self.products.lock().expect("catalog lock poisoned");
        Ok(products.get(&product_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_returns_snapshot() {
        let catalog = MemoryCatalog::new();
        let product_id = Uuid::new_v4();
        catalog.insert(ProductSnapshot {
            product_id,
            name: "Walnut Desk".to_string(),
            unit_price_cents: 24_900,
            available_hint: 4,
        });

        let found = catalog.lookup(product_id).await.unwrap().unwrap();
        assert_eq!(found.name, "Walnut Desk");
        assert_eq!(found.unit_price_cents, 24_900);

        let missing = catalog.lookup(Uuid::new_v4()).await.unwrap();
        assert!(missing.is_none());
    }
}
