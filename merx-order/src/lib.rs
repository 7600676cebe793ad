pub mod gateway;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod store;

pub use gateway::SimulatedGateway;
pub use models::{CustomerInfo, LineRequest, Order, OrderLine, OrderStatus, Payment, PaymentStatus};
pub use orchestrator::OrderPaymentOrchestrator;
pub use store::{MemoryOrderStore, OrderStore};
