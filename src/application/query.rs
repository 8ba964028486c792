use super::connection::ConnectionManager;
use crate::domain::ports::BillingGatewayRef;
use crate::domain::purchase::{ProductClass, Purchase};
use crate::error::{BillingError, Result};
use std::sync::Arc;
use tracing::{error, info};

/// Lists the caller's current purchases of one product class.
///
/// Readiness is checked locally before the backend is called; a query
/// failure is terminal for the cycle and retried only by the next trigger.
pub struct PurchaseQuery {
    gateway: BillingGatewayRef,
    connection: Arc<ConnectionManager>,
}

impl PurchaseQuery {
    pub fn new(gateway: BillingGatewayRef, connection: Arc<ConnectionManager>) -> Self {
        Self {
            gateway,
            connection,
        }
    }

    pub async fn active_purchases(&self, product: ProductClass) -> Result<Vec<Purchase>> {
        if !self.connection.is_ready() {
            error!("billing connection not ready, skipping purchase query");
            return Err(BillingError::NotReady);
        }

        match self.gateway.query_purchases(product).await {
            Ok(purchases) => {
                info!(count = purchases.len(), "purchase query finished");
                Ok(purchases)
            }
            Err(err) => {
                error!(code = ?err.code, msg = %err.message, "purchase query failed");
                Err(err.into())
            }
        }
    }
}
