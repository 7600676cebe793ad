use async_trait::async_trait;
use merx_catalog::provider::{CatalogError, CatalogProvider, ProductSnapshot};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

/// Postgres-backed catalog snapshot provider. Read-only to the core; only
/// active products are visible at order-creation time.
#[derive(Clone)]
pub struct PgCatalog {
    pool: Pool<Postgres>,
}

impl PgCatalog {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogProvider for PgCatalog {
    async fn lookup(&self, product_id: Uuid) -> Result<Option<ProductSnapshot>, CatalogError> {
        let row = sqlx::query(
            "SELECT id, name, unit_price_cents, available_hint
             FROM products WHERE id = $1 AND is_active",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        row.map(|row| {
            Ok(ProductSnapshot {
                product_id: row
                    .try_get("id")
                    .map_err(|e: sqlx::Error| CatalogError::Unavailable(e.to_string()))?,
                name: row
                    .try_get("name")
                    .map_err(|e: sqlx::Error| CatalogError::Unavailable(e.to_string()))?,
                unit_price_cents: row
                    .try_get("unit_price_cents")
                    .map_err(|e: sqlx::Error| CatalogError::Unavailable(e.to_string()))?,
                available_hint: row
                    .try_get("available_hint")
                    .map_err(|e: sqlx::Error| CatalogError::Unavailable(e.to_string()))?,
            })
        })
        .transpose()
    }
}
