use serde::Deserialize;

/// Lifecycle state of a purchase as reported by the billing backend.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseState {
    Purchased,
    Pending,
    Canceled,
}

/// Product class an entitlement belongs to.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ProductClass {
    Subscription,
    OneTime,
}

/// Opaque confirmation token issued by the backend per purchase.
///
/// The token is only ever handed back to the backend on acknowledgement;
/// it carries no client-side meaning and is kept out of log output.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(transparent)]
pub struct PurchaseToken(String);

impl PurchaseToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A unit of purchased access as reported by the billing backend.
///
/// Supplied by the backend on every query; the engine only reads it. The
/// backend remains the authority on state and acknowledgement.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Purchase {
    pub order_id: String,
    pub token: PurchaseToken,
    pub state: PurchaseState,
    pub acknowledged: bool,
    pub product: ProductClass,
}

impl Purchase {
    /// True when the purchase completed but the backend has not yet been
    /// told the entitlement was delivered.
    pub fn needs_acknowledgement(&self) -> bool {
        self.state == PurchaseState::Purchased && !self.acknowledged
    }
}
