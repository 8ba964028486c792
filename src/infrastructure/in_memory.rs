use crate::domain::ports::{BillingGateway, GatewayEvent};
use crate::domain::purchase::{ProductClass, Purchase, PurchaseToken};
use crate::error::{GatewayError, ResponseCode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio::time::Instant;

#[derive(Default)]
struct GatewayState {
    purchases: Vec<Purchase>,
    connected: bool,
    connect_failure: Option<GatewayError>,
    query_failure: Option<GatewayError>,
    /// Remaining scripted acknowledgement failures per token.
    ack_failures: HashMap<String, u32>,
    connect_calls: u32,
    query_calls: u32,
    ack_calls: HashMap<String, u32>,
    ack_call_times: HashMap<String, Vec<Instant>>,
}

/// An in-memory billing backend.
///
/// Serves the demo binary and the test suite: purchases are seeded up
/// front, failures are scripted per call site, and every backend call is
/// counted and timestamped so tests can assert what the engine actually
/// sent. `Clone`s share the underlying state.
#[derive(Clone)]
pub struct InMemoryGateway {
    state: Arc<RwLock<GatewayState>>,
    events: broadcast::Sender<GatewayEvent>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: Arc::new(RwLock::new(GatewayState::default())),
            events,
        }
    }

    pub async fn seed_purchase(&self, purchase: Purchase) {
        self.state.write().await.purchases.push(purchase);
    }

    /// Makes every subsequent connect attempt fail with `err`.
    pub async fn fail_connect(&self, err: GatewayError) {
        self.state.write().await.connect_failure = Some(err);
    }

    /// Makes every subsequent purchase query fail with `err`.
    pub async fn fail_query(&self, err: GatewayError) {
        self.state.write().await.query_failure = Some(err);
    }

    /// Scripts the next `times` acknowledgement calls for `token` to fail.
    /// Pass `u32::MAX` to fail them all.
    pub async fn fail_acknowledgements(&self, token: &str, times: u32) {
        self.state
            .write()
            .await
            .ack_failures
            .insert(token.to_string(), times);
    }

    /// Drops the session from the backend side and notifies subscribers.
    pub async fn emit_disconnect(&self) {
        self.state.write().await.connected = false;
        let _ = self.events.send(GatewayEvent::Disconnected);
    }

    /// Pushes a purchase-update notification to subscribers.
    pub fn push_update(&self, update: Result<Vec<Purchase>, GatewayError>) {
        let _ = self.events.send(GatewayEvent::PurchasesUpdated(update));
    }

    pub async fn connect_calls(&self) -> u32 {
        self.state.read().await.connect_calls
    }

    pub async fn query_calls(&self) -> u32 {
        self.state.read().await.query_calls
    }

    pub async fn ack_calls(&self, token: &str) -> u32 {
        self.state
            .read()
            .await
            .ack_calls
            .get(token)
            .copied()
            .unwrap_or(0)
    }

    /// Instants at which acknowledgement calls for `token` arrived.
    pub async fn ack_call_times(&self, token: &str) -> Vec<Instant> {
        self.state
            .read()
            .await
            .ack_call_times
            .get(token)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn purchase(&self, order_id: &str) -> Option<Purchase> {
        self.state
            .read()
            .await
            .purchases
            .iter()
            .find(|p| p.order_id == order_id)
            .cloned()
    }
}

#[async_trait]
impl BillingGateway for InMemoryGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        state.connect_calls += 1;
        if let Some(err) = state.connect_failure.clone() {
            return Err(err);
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.write().await.connected = false;
    }

    async fn query_purchases(&self, product: ProductClass) -> Result<Vec<Purchase>, GatewayError> {
        let mut state = self.state.write().await;
        state.query_calls += 1;
        if !state.connected {
            return Err(GatewayError::new(
                ResponseCode::ServiceUnavailable,
                "no active session",
            ));
        }
        if let Some(err) = state.query_failure.clone() {
            return Err(err);
        }
        Ok(state
            .purchases
            .iter()
            .filter(|p| p.product == product)
            .cloned()
            .collect())
    }

    async fn acknowledge(&self, token: &PurchaseToken) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        *state.ack_calls.entry(token.as_str().to_string()).or_insert(0) += 1;
        state
            .ack_call_times
            .entry(token.as_str().to_string())
            .or_default()
            .push(Instant::now());

        if !state.connected {
            return Err(GatewayError::new(
                ResponseCode::ServiceUnavailable,
                "no active session",
            ));
        }
        if let Some(remaining) = state.ack_failures.get_mut(token.as_str())
            && *remaining > 0
        {
            *remaining = remaining.saturating_sub(1);
            return Err(GatewayError::new(
                ResponseCode::ServiceUnavailable,
                "scripted acknowledgement failure",
            ));
        }

        match state
            .purchases
            .iter_mut()
            .find(|p| p.token.as_str() == token.as_str())
        {
            Some(purchase) => {
                purchase.acknowledged = true;
                Ok(())
            }
            None => Err(GatewayError::new(
                ResponseCode::DeveloperError,
                "unknown purchase token",
            )),
        }
    }

    fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }
}
