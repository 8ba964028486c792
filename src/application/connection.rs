use crate::domain::ports::{BillingGatewayRef, GatewayEvent};
use crate::error::GatewayError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Lifecycle of the session with the billing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    /// The backend dropped the session after it was Ready. No automatic
    /// reconnect happens; the next trigger cycle connects from scratch.
    Lost,
}

/// Owns the session with the billing backend.
///
/// All other components read the state through [`is_ready`](Self::is_ready)
/// before issuing calls; only the manager ever transitions it. A monitor
/// task watches the gateway event stream for backend-initiated disconnects
/// while the session is up.
pub struct ConnectionManager {
    gateway: BillingGatewayRef,
    state: watch::Sender<ConnectionState>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(gateway: BillingGatewayRef) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            gateway,
            state,
            monitor: Mutex::new(None),
        }
    }

    /// Establishes a session with the backend.
    ///
    /// Resolves exactly once: `Ok` when the session reached Ready, or the
    /// backend's failure code. A connect failure is terminal for the current
    /// trigger cycle; no retry happens here.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        self.stop_monitor().await;
        let events = self.gateway.events();
        self.state.send_replace(ConnectionState::Connecting);

        match self.gateway.connect().await {
            Ok(()) => {
                self.state.send_replace(ConnectionState::Ready);
                info!("billing setup finished");
                self.start_monitor(events).await;
                Ok(())
            }
            Err(err) => {
                self.state.send_replace(ConnectionState::Disconnected);
                error!(code = ?err.code, msg = %err.message, "billing setup failed");
                Err(err)
            }
        }
    }

    /// Current readiness, read synchronously.
    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == ConnectionState::Ready
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to state transitions.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Releases the session. No-op when already disconnected.
    pub async fn disconnect(&self) {
        self.stop_monitor().await;
        if *self.state.borrow() == ConnectionState::Ready {
            self.gateway.disconnect().await;
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    async fn start_monitor(&self, mut events: broadcast::Receiver<GatewayEvent>) {
        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GatewayEvent::Disconnected) => {
                        error!("billing service disconnected");
                        state.send_replace(ConnectionState::Lost);
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.monitor.lock().await = Some(handle);
    }

    async fn stop_monitor(&self) {
        if let Some(handle) = self.monitor.lock().await.take() {
            handle.abort();
        }
    }
}
