use billing_reconciler::application::engine::{EngineConfig, ReconcileEngine};
use billing_reconciler::domain::purchase::{ProductClass, Purchase, PurchaseState, PurchaseToken};
use billing_reconciler::infrastructure::in_memory::InMemoryGateway;
use std::sync::Arc;

pub fn subscription(order_id: &str, token: &str, state: PurchaseState, acknowledged: bool) -> Purchase {
    Purchase {
        order_id: order_id.to_string(),
        token: PurchaseToken::new(token),
        state,
        acknowledged,
        product: ProductClass::Subscription,
    }
}

pub fn engine_over(gateway: &Arc<InMemoryGateway>) -> ReconcileEngine {
    ReconcileEngine::new(
        gateway.clone(),
        EngineConfig {
            product: ProductClass::Subscription,
            ..EngineConfig::default()
        },
    )
}
