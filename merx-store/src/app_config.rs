use serde::Deserialize;
use std::env;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process maps; state lives and dies with the server.
    Memory,
    /// Postgres order store + Redis stock counters.
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Upper bound on any single gateway call; a timeout surfaces as
    /// GatewayUnavailable with nothing committed.
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval_seconds: u64,
}

/// Products seeded into the in-memory catalog and stock ledger when the
/// memory backend is selected. Ignored by the postgres backend.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub seed: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedProduct {
    pub id: Uuid,
    pub name: String,
    pub unit_price_cents: i64,
    pub stock: i64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Overlay for the current environment; the file is optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Environment takes precedence, e.g. MERX__SERVER__PORT=9000
            .add_source(config::Environment::with_prefix("MERX").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
