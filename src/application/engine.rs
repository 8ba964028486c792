use super::connection::ConnectionManager;
use super::filter;
use super::query::PurchaseQuery;
use super::retrier::{AckOutcome, AckRetrier, RetryPolicy};
use crate::domain::ports::{BillingGatewayRef, GatewayEvent};
use crate::domain::purchase::{ProductClass, Purchase};
use crate::error::{BillingError, GatewayError, ResponseCode};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Product class reconciled on each cycle.
    pub product: ProductClass,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            product: ProductClass::Subscription,
            retry: RetryPolicy::default(),
        }
    }
}

/// What one reconciliation cycle did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub confirmed: Vec<String>,
    /// Orders whose acknowledgement exhausted all retries, with the last
    /// backend failure.
    pub abandoned: Vec<(String, GatewayError)>,
    pub already_acknowledged: Vec<String>,
    pub pending: Vec<String>,
}

/// Result of one `check_payment_status` trigger. Failures are data, not
/// errors: the engine never propagates a cycle failure as `Err`.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The backend refused the connection; no query was attempted.
    ConnectFailed(GatewayError),
    /// The entitlement listing failed; nothing was confirmed.
    QueryFailed(BillingError),
    Completed(CycleReport),
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

struct Reconciler {
    connection: Arc<ConnectionManager>,
    query: PurchaseQuery,
    retrier: Arc<AckRetrier>,
    product: ProductClass,
}

impl Reconciler {
    /// Filter-and-confirm step shared by the query path and the
    /// purchase-update listener. Confirmations run concurrently; no order
    /// is guaranteed across purchases.
    async fn handle_purchases(&self, purchases: Vec<Purchase>) -> CycleReport {
        let partition = filter::partition(purchases);

        for purchase in &partition.already_acknowledged {
            info!(order_id = %purchase.order_id, "purchase already acknowledged");
        }
        for purchase in &partition.pending {
            info!(order_id = %purchase.order_id, "purchase pending, no action taken");
        }

        let mut report = CycleReport {
            already_acknowledged: order_ids(&partition.already_acknowledged),
            pending: order_ids(&partition.pending),
            ..CycleReport::default()
        };

        let mut confirmations = JoinSet::new();
        for purchase in partition.to_confirm {
            info!(order_id = %purchase.order_id, "found unacknowledged purchase");
            let retrier = Arc::clone(&self.retrier);
            confirmations.spawn(async move {
                let outcome = retrier.confirm(&purchase).await;
                (purchase.order_id, outcome)
            });
        }

        while let Some(joined) = confirmations.join_next().await {
            match joined {
                Ok((order_id, AckOutcome::Confirmed)) => report.confirmed.push(order_id),
                Ok((order_id, AckOutcome::Abandoned(err))) => {
                    report.abandoned.push((order_id, err))
                }
                Ok((_, _)) => {}
                Err(err) => error!(error = %err, "confirmation task failed"),
            }
        }
        report
    }
}

fn order_ids(purchases: &[Purchase]) -> Vec<String> {
    purchases.iter().map(|p| p.order_id.clone()).collect()
}

/// The purchase-acknowledgment reconciliation engine.
///
/// The host invokes [`check_payment_status`](Self::check_payment_status) on
/// every occasion the caller's entitlements may have changed out-of-band
/// (startup, foreground resume) and [`cleanup`](Self::cleanup) once when it
/// shuts down. The engine keeps no state between triggers: every cycle
/// reconnects and re-derives its worklist from the backend.
///
/// Must be created inside a Tokio runtime; construction spawns the listener
/// for the backend's purchase-update channel.
pub struct ReconcileEngine {
    inner: Arc<Reconciler>,
    updates: Mutex<Option<JoinHandle<()>>>,
}

impl ReconcileEngine {
    pub fn new(gateway: BillingGatewayRef, config: EngineConfig) -> Self {
        let connection = Arc::new(ConnectionManager::new(Arc::clone(&gateway)));
        let retrier = Arc::new(AckRetrier::new(
            Arc::clone(&gateway),
            Arc::clone(&connection),
            config.retry,
        ));
        let query = PurchaseQuery::new(Arc::clone(&gateway), Arc::clone(&connection));
        let inner = Arc::new(Reconciler {
            connection,
            query,
            retrier,
            product: config.product,
        });
        let updates = spawn_update_listener(Arc::clone(&inner), gateway.events());
        Self {
            inner,
            updates: Mutex::new(Some(updates)),
        }
    }

    /// Runs one full reconciliation cycle: connect, query, filter, confirm.
    ///
    /// Idempotent and safe to call repeatedly; each call is a fresh cycle
    /// against the backend's authoritative state.
    pub async fn check_payment_status(&self) -> CycleOutcome {
        if let Err(err) = self.inner.connection.connect().await {
            return CycleOutcome::ConnectFailed(err);
        }

        let purchases = match self.inner.query.active_purchases(self.inner.product).await {
            Ok(purchases) => purchases,
            Err(err) => return CycleOutcome::QueryFailed(err),
        };

        CycleOutcome::Completed(self.inner.handle_purchases(purchases).await)
    }

    /// Releases the connection and stops the purchase-update listener.
    /// Idempotent; safe to call even if the engine never connected.
    pub async fn cleanup(&self) {
        if let Some(listener) = self.updates.lock().await.take() {
            listener.abort();
        }
        self.inner.connection.disconnect().await;
    }
}

fn spawn_update_listener(
    inner: Arc<Reconciler>,
    mut events: broadcast::Receiver<GatewayEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(GatewayEvent::PurchasesUpdated(Ok(purchases))) => {
                    info!(count = purchases.len(), "purchase update received");
                    inner.handle_purchases(purchases).await;
                }
                Ok(GatewayEvent::PurchasesUpdated(Err(err))) => match err.code {
                    ResponseCode::UserCanceled => info!("user canceled purchase"),
                    ResponseCode::ItemAlreadyOwned => info!("item already owned"),
                    _ => {
                        error!(code = ?err.code, msg = %err.message, "purchase update failed")
                    }
                },
                Ok(GatewayEvent::Disconnected) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
