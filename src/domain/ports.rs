use super::purchase::{ProductClass, Purchase, PurchaseToken};
use crate::error::GatewayError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Backend-initiated notifications, delivered out-of-band from any call.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// The backend dropped the session. No further calls will succeed until
    /// a fresh connect.
    Disconnected,
    /// The backend's purchase-update channel reported a change to the
    /// caller's purchases (for example a purchase completed out-of-band).
    PurchasesUpdated(Result<Vec<Purchase>, GatewayError>),
}

/// The billing backend as seen by the engine.
///
/// All calls are asynchronous and resolve exactly once. Session lifecycle
/// (`connect`/`disconnect`) is driven only by the connection manager; the
/// other components treat the gateway as a capability they call through.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Establishes a session with the backend. Resolves with `Ok` once the
    /// session is usable, or with the backend's failure code.
    async fn connect(&self) -> Result<(), GatewayError>;

    /// Releases the session. Safe to call when no session is established.
    async fn disconnect(&self);

    /// Lists the caller's current purchases of the given product class.
    async fn query_purchases(&self, product: ProductClass) -> Result<Vec<Purchase>, GatewayError>;

    /// Tells the backend the purchase behind `token` has been delivered.
    async fn acknowledge(&self, token: &PurchaseToken) -> Result<(), GatewayError>;

    /// Subscribes to backend-initiated events. Each receiver observes every
    /// event sent after subscription.
    fn events(&self) -> broadcast::Receiver<GatewayEvent>;
}

pub type BillingGatewayRef = Arc<dyn BillingGateway>;
