use async_trait::async_trait;
use chrono::Utc;
use merx_core::error::OrchestrationError;
use merx_core::payment::{GatewayIntent, GatewayIntentStatus, PaymentGateway};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// In-process stand-in for the external payment provider.
///
/// Remembers every intent it issues so `get_intent_status` is authoritative:
/// the payer "completes" an intent out-of-band through `complete_intent`,
/// and only then does a status query report success. The orchestrator never
/// sees anything the gateway itself has not recorded.
pub struct SimulatedGateway {
    intents: Mutex<HashMap<String, GatewayIntent>>,
    offline: AtomicBool,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            intents: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate a gateway outage; every call fails until restored.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Out-of-band payer action: move an intent to a terminal status.
    pub fn complete_intent(&self, intent_id: &str, status: GatewayIntentStatus) -> bool {
        let mut intents = self.intents.lock().expect("gateway lock poisoned");
        match intents.get_mut(intent_id) {
            Some(intent) => {
                intent.status = status;
                true
            }
            None => false,
        }
    }

    /// Overwrite the gateway-side amount. Exists to exercise the
    /// amount-verification path against a disagreeing provider.
    pub fn set_intent_amount(&self, intent_id: &str, amount_cents: i64) -> bool {
        let mut intents = self.intents.lock().expect("gateway lock poisoned");
        match intents.get_mut(intent_id) {
            Some(intent) => {
                intent.amount_cents = amount_cents;
                true
            }
            None => false,
        }
    }

    fn check_online(&self) -> Result<(), OrchestrationError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(OrchestrationError::GatewayUnavailable(
                "simulated gateway offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        order_id: Uuid,
        amount_cents: i64,
        currency: &str,
    ) -> Result<GatewayIntent, OrchestrationError> {
        self.check_online()?;

        let intent_id = format!("sim_pi_{}", Uuid::new_v4().simple());
        let intent = GatewayIntent {
            intent_id: intent_id.clone(),
            order_id,
            amount_cents,
            currency: currency.to_string(),
            status: GatewayIntentStatus::RequiresPaymentMethod,
            client_secret: Some(format!("sim_secret_{}", Uuid::new_v4().simple())),
            created_at: Utc::now(),
        };

        let mut intents = self.intents.lock().expect("gateway lock poisoned");
        intents.insert(intent_id, intent.clone());
        Ok(intent)
    }

    async fn get_intent_status(
        &self,
        intent_id: &str,
    ) -> Result<GatewayIntent, OrchestrationError> {
        self.check_online()?;

        let intents = self.intents.lock().expect("gateway lock poisoned");
        intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| OrchestrationError::PaymentNotFound(intent_id.to_string()))
    }
}
