use super::connection::ConnectionManager;
use crate::domain::ports::BillingGatewayRef;
use crate::domain::purchase::{Purchase, PurchaseToken};
use crate::error::GatewayError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Bounded linear backoff for acknowledgement calls.
///
/// A failed attempt `n` (0-based) schedules a retry after
/// `(n + 1) * base_interval`, up to `max_retries` retries. With the
/// defaults that is at most four calls per purchase, delayed by 1s, 2s
/// and 3s between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_interval: Duration::from_secs(1),
        }
    }
}

/// Terminal result of one confirmation submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The backend accepted the acknowledgement.
    Confirmed,
    /// All retries exhausted; carries the last backend failure.
    Abandoned(GatewayError),
    /// Readiness was lost before a scheduled retry fired. No terminal
    /// failure is reported; the next cycle rediscovers the purchase.
    ConnectionLost,
    /// The connection was not Ready at submission; nothing was sent.
    NotReady,
    /// An acknowledgement for the same order is already running.
    AlreadyInFlight,
}

/// One in-flight confirmation: the token being acknowledged and how many
/// attempts have failed so far.
struct RetryAttempt {
    token: PurchaseToken,
    attempts: u32,
}

/// Issues acknowledgement calls and drives their retry state machine:
/// Idle → Attempting → {Confirmed | Attempting(n+1) | Abandoned}.
pub struct AckRetrier {
    gateway: BillingGatewayRef,
    connection: Arc<ConnectionManager>,
    policy: RetryPolicy,
    /// Order ids with a live attempt. Guards against duplicate concurrent
    /// retries for the same order.
    in_flight: Mutex<HashSet<String>>,
}

impl AckRetrier {
    pub fn new(
        gateway: BillingGatewayRef,
        connection: Arc<ConnectionManager>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            connection,
            policy,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Confirms one purchase, retrying per the policy. Resolves exactly
    /// once with the terminal outcome for this submission.
    pub async fn confirm(&self, purchase: &Purchase) -> AckOutcome {
        if !self.connection.is_ready() {
            error!(order_id = %purchase.order_id, "billing connection not ready, cannot acknowledge");
            return AckOutcome::NotReady;
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(purchase.order_id.clone()) {
                info!(order_id = %purchase.order_id, "acknowledgement already in flight");
                return AckOutcome::AlreadyInFlight;
            }
        }

        let outcome = self.run_attempts(purchase).await;
        self.in_flight.lock().await.remove(&purchase.order_id);
        outcome
    }

    async fn run_attempts(&self, purchase: &Purchase) -> AckOutcome {
        let mut attempt = RetryAttempt {
            token: purchase.token.clone(),
            attempts: 0,
        };

        loop {
            let err = match self.gateway.acknowledge(&attempt.token).await {
                Ok(()) => {
                    info!(order_id = %purchase.order_id, "purchase acknowledged");
                    return AckOutcome::Confirmed;
                }
                Err(err) => err,
            };
            error!(
                order_id = %purchase.order_id,
                code = ?err.code,
                msg = %err.message,
                "failed to acknowledge purchase"
            );

            if attempt.attempts >= self.policy.max_retries {
                error!(order_id = %purchase.order_id, code = ?err.code, "acknowledgement abandoned");
                return AckOutcome::Abandoned(err);
            }

            attempt.attempts += 1;
            let delay = self.policy.base_interval * attempt.attempts;
            info!(
                order_id = %purchase.order_id,
                attempt = attempt.attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying acknowledgement"
            );
            tokio::time::sleep(delay).await;

            // The fire-time readiness check is the authoritative gate: a
            // retry scheduled before a disconnect must not hit the dead
            // session.
            if !self.connection.is_ready() {
                debug!(order_id = %purchase.order_id, "connection no longer ready, dropping scheduled retry");
                return AckOutcome::ConnectionLost;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::purchase::{ProductClass, PurchaseState};
    use crate::infrastructure::in_memory::InMemoryGateway;

    fn unacknowledged(order_id: &str, token: &str) -> Purchase {
        Purchase {
            order_id: order_id.to_string(),
            token: PurchaseToken::new(token),
            state: PurchaseState::Purchased,
            acknowledged: false,
            product: ProductClass::Subscription,
        }
    }

    fn retrier_with(
        gateway: &Arc<InMemoryGateway>,
        policy: RetryPolicy,
    ) -> (Arc<ConnectionManager>, Arc<AckRetrier>) {
        let connection = Arc::new(ConnectionManager::new(gateway.clone()));
        let retrier = Arc::new(AckRetrier::new(gateway.clone(), connection.clone(), policy));
        (connection, retrier)
    }

    #[tokio::test]
    async fn test_confirm_requires_readiness() {
        let gateway = Arc::new(InMemoryGateway::new());
        let (_, retrier) = retrier_with(&gateway, RetryPolicy::default());

        let outcome = retrier.confirm(&unacknowledged("ORD-1", "tok-1")).await;
        assert_eq!(outcome, AckOutcome::NotReady);
        assert_eq!(gateway.ack_calls("tok-1").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_confirm_is_rejected() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.seed_purchase(unacknowledged("ORD-1", "tok-1")).await;
        gateway.fail_acknowledgements("tok-1", u32::MAX).await;

        let (connection, retrier) = retrier_with(&gateway, RetryPolicy::default());
        connection.connect().await.unwrap();

        let first = {
            let retrier = retrier.clone();
            tokio::spawn(async move { retrier.confirm(&unacknowledged("ORD-1", "tok-1")).await })
        };
        // Let the first submission fail once and enter its retry sleep.
        while gateway.ack_calls("tok-1").await == 0 {
            tokio::task::yield_now().await;
        }

        let second = retrier.confirm(&unacknowledged("ORD-1", "tok-1")).await;
        assert_eq!(second, AckOutcome::AlreadyInFlight);

        let first = first.await.unwrap();
        assert!(matches!(first, AckOutcome::Abandoned(_)));
        assert_eq!(gateway.ack_calls("tok-1").await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_dropped_when_readiness_lost() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.seed_purchase(unacknowledged("ORD-1", "tok-1")).await;
        gateway.fail_acknowledgements("tok-1", u32::MAX).await;

        let (connection, retrier) = retrier_with(&gateway, RetryPolicy::default());
        connection.connect().await.unwrap();

        let task = {
            let retrier = retrier.clone();
            tokio::spawn(async move { retrier.confirm(&unacknowledged("ORD-1", "tok-1")).await })
        };
        while gateway.ack_calls("tok-1").await == 0 {
            tokio::task::yield_now().await;
        }

        // Tear the connection down while the retry is scheduled; the
        // fire-time gate must drop it without another backend call.
        connection.disconnect().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let outcome = task.await.unwrap();
        assert_eq!(outcome, AckOutcome::ConnectionLost);
        assert_eq!(gateway.ack_calls("tok-1").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_can_be_resubmitted_after_abandon() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.seed_purchase(unacknowledged("ORD-1", "tok-1")).await;
        gateway.fail_acknowledgements("tok-1", 4).await;

        let (connection, retrier) = retrier_with(&gateway, RetryPolicy::default());
        connection.connect().await.unwrap();

        let purchase = unacknowledged("ORD-1", "tok-1");
        let first = retrier.confirm(&purchase).await;
        assert!(matches!(first, AckOutcome::Abandoned(_)));

        // A fresh submission starts from attempt 0 and succeeds now that
        // the scripted failures are used up.
        let second = retrier.confirm(&purchase).await;
        assert_eq!(second, AckOutcome::Confirmed);
        assert_eq!(gateway.ack_calls("tok-1").await, 5);
    }
}
