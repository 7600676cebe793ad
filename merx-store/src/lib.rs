pub mod app_config;
pub mod catalog_repo;
pub mod database;
pub mod order_repo;
pub mod stock_repo;
pub mod telemetry;

pub use catalog_repo::PgCatalog;
pub use database::DbClient;
pub use order_repo::PgOrderStore;
pub use stock_repo::RedisStockLedger;
pub use telemetry::Telemetry;
