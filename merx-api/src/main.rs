use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use merx_api::{
    app,
    state::{AppState, AuthConfig},
};
use merx_catalog::provider::{CatalogProvider, MemoryCatalog};
use merx_catalog::stock::{MemoryStockLedger, StockLedger};
use merx_order::gateway::SimulatedGateway;
use merx_order::orchestrator::OrderPaymentOrchestrator;
use merx_order::store::{MemoryOrderStore, OrderStore};
use merx_store::app_config::{Config, StoreBackend};
use merx_store::{DbClient, PgCatalog, PgOrderStore, RedisStockLedger, Telemetry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "merx_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting Merx API on port {}", config.server.port);

    let telemetry = Arc::new(Telemetry::new(
        config.telemetry.queue_capacity,
        config.telemetry.batch_size,
        Duration::from_secs(config.telemetry.flush_interval_seconds),
    ));

    let (catalog, ledger, store): (
        Arc<dyn CatalogProvider>,
        Arc<dyn StockLedger>,
        Arc<dyn OrderStore>,
    ) = match config.store.backend {
        StoreBackend::Memory => {
            let catalog = Arc::new(MemoryCatalog::new());
            let ledger = Arc::new(MemoryStockLedger::new());
            for product in &config.catalog.seed {
                catalog.insert(merx_catalog::provider::ProductSnapshot {
                    product_id: product.id,
                    name: product.name.clone(),
                    unit_price_cents: product.unit_price_cents,
                    available_hint: product.stock,
                });
                ledger
                    .set_available(product.id, product.stock)
                    .await
                    .expect("Failed to seed stock");
            }
            tracing::info!(
                "Memory backend ready with {} seeded products",
                config.catalog.seed.len()
            );
            (catalog, ledger, Arc::new(MemoryOrderStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .store
                .database_url
                .as_deref()
                .expect("store.database_url is required for the postgres backend");
            let redis_url = config
                .store
                .redis_url
                .as_deref()
                .expect("store.redis_url is required for the postgres backend");

            let db = DbClient::new(database_url, config.store.max_connections)
                .await
                .expect("Failed to connect to Postgres");
            db.migrate().await.expect("Failed to run migrations");

            let ledger = RedisStockLedger::new(redis_url)
                .await
                .expect("Failed to connect to Redis");

            (
                Arc::new(PgCatalog::new(db.pool.clone())),
                Arc::new(ledger),
                Arc::new(PgOrderStore::new(db.pool.clone())),
            )
        }
    };

    let gateway = Arc::new(SimulatedGateway::new());
    let orchestrator = Arc::new(OrderPaymentOrchestrator::new(
        catalog,
        ledger,
        store,
        gateway,
        telemetry.clone(),
        Duration::from_millis(config.gateway.request_timeout_ms),
    ));

    let app_state = AppState {
        orchestrator,
        telemetry: telemetry.clone(),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Drain whatever telemetry is still buffered before the process exits.
    telemetry.shutdown().await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
