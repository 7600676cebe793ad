use async_trait::async_trait;
use merx_catalog::stock::{StockError, StockLedger, StockLine};
use uuid::Uuid;

/// Redis-backed stock ledger. The multi-line reserve is one Lua script:
/// every key is checked before any is decremented, and Redis executes the
/// script atomically, so concurrent checkouts can never oversubscribe a
/// counter or observe a partial decrement.
#[derive(Clone)]
pub struct RedisStockLedger {
    client: redis::Client,
}

const RESERVE_SCRIPT: &str = r#"
    for i = 1, #KEYS do
        local avail = redis.call("GET", KEYS[i])
        if not avail or tonumber(avail) < tonumber(ARGV[i]) then
            return {i, avail or "-1"}
        end
    end
    for i = 1, #KEYS do
        redis.call("DECRBY", KEYS[i], ARGV[i])
    end
    return {0, "0"}
"#;

const RELEASE_SCRIPT: &str = r#"
    for i = 1, #KEYS do
        if redis.call("EXISTS", KEYS[i]) == 0 then
            return i
        end
    end
    for i = 1, #KEYS do
        redis.call("INCRBY", KEYS[i], ARGV[i])
    end
    return 0
"#;

impl RedisStockLedger {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    fn key(product_id: Uuid) -> String {
        format!("stock:{}:available", product_id)
    }

    async fn connection(
        &self,
    ) -> Result<redis::aio::MultiplexedConnection, StockError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StockError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl StockLedger for RedisStockLedger {
    async fn reserve(&self, lines: &[StockLine]) -> Result<(), StockError> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;

        let script = redis::Script::new(RESERVE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        for (product_id, quantity) in lines {
            invocation.key(Self::key(*product_id));
            invocation.arg(i64::from(*quantity));
        }

        let (failed_index, available): (i64, String) = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StockError::Unavailable(e.to_string()))?;

        if failed_index == 0 {
            return Ok(());
        }

        let (product_id, requested) = lines[(failed_index - 1) as usize];
        let available: i64 = available.parse().unwrap_or(-1);
        if available < 0 {
            return Err(StockError::NotFound(product_id));
        }
        Err(StockError::Insufficient {
            product_id,
            requested,
            available,
        })
    }

    async fn release(&self, lines: &[StockLine]) -> Result<(), StockError> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;

        let script = redis::Script::new(RELEASE_SCRIPT);
        let mut invocation = script.prepare_invoke();
        for (product_id, quantity) in lines {
            invocation.key(Self::key(*product_id));
            invocation.arg(i64::from(*quantity));
        }

        let failed_index: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StockError::Unavailable(e.to_string()))?;

        if failed_index == 0 {
            return Ok(());
        }
        Err(StockError::NotFound(lines[(failed_index - 1) as usize].0))
    }

    async fn available(&self, product_id: Uuid) -> Result<i64, StockError> {
        let mut conn = self.connection().await?;
        let value: Option<i64> = redis::cmd("GET")
            .arg(Self::key(product_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| StockError::Unavailable(e.to_string()))?;
        value.ok_or(StockError::NotFound(product_id))
    }

    async fn set_available(&self, product_id: Uuid, quantity: i64) -> Result<(), StockError> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(Self::key(product_id))
            .arg(quantity)
            .query_async(&mut conn)
            .await
            .map_err(|e| StockError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
