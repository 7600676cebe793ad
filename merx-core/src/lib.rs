pub mod error;
pub mod identity;
pub mod payment;
pub mod telemetry;

pub use error::{OrchestrationError, OrchestrationResult};
