use crate::domain::purchase::{Purchase, PurchaseState};

/// Disjoint classification of a queried purchase list.
///
/// Canceled purchases are dropped; everything else lands in exactly one
/// list. Input order is preserved within each list but carries no meaning.
#[derive(Debug, Default, PartialEq)]
pub struct Partition {
    /// Purchased and not yet acknowledged: these require action.
    pub to_confirm: Vec<Purchase>,
    /// Purchased and already acknowledged: reported, never re-confirmed.
    pub already_acknowledged: Vec<Purchase>,
    /// Pending (for example awaiting carrier billing): reported, never
    /// confirmed until the backend moves them to Purchased.
    pub pending: Vec<Purchase>,
}

/// Pure partition step of the reconciliation cycle.
pub fn partition(purchases: Vec<Purchase>) -> Partition {
    let mut result = Partition::default();
    for purchase in purchases {
        match purchase.state {
            PurchaseState::Purchased if purchase.acknowledged => {
                result.already_acknowledged.push(purchase)
            }
            PurchaseState::Purchased => result.to_confirm.push(purchase),
            PurchaseState::Pending => result.pending.push(purchase),
            PurchaseState::Canceled => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::purchase::{ProductClass, PurchaseToken};
    use rand::Rng;

    fn purchase(order_id: &str, state: PurchaseState, acknowledged: bool) -> Purchase {
        Purchase {
            order_id: order_id.to_string(),
            token: PurchaseToken::new(format!("tok-{order_id}")),
            state,
            acknowledged,
            product: ProductClass::Subscription,
        }
    }

    #[test]
    fn test_partition_classification() {
        let input = vec![
            purchase("ORD-1", PurchaseState::Purchased, false),
            purchase("ORD-2", PurchaseState::Purchased, true),
            purchase("ORD-3", PurchaseState::Pending, false),
            purchase("ORD-4", PurchaseState::Canceled, false),
        ];

        let result = partition(input);
        assert_eq!(result.to_confirm.len(), 1);
        assert_eq!(result.to_confirm[0].order_id, "ORD-1");
        assert_eq!(result.already_acknowledged.len(), 1);
        assert_eq!(result.already_acknowledged[0].order_id, "ORD-2");
        assert_eq!(result.pending.len(), 1);
        assert_eq!(result.pending[0].order_id, "ORD-3");
    }

    #[test]
    fn test_partition_empty_input() {
        assert_eq!(partition(Vec::new()), Partition::default());
    }

    #[test]
    fn test_to_confirm_entries_all_need_acknowledgement() {
        let input = vec![
            purchase("ORD-1", PurchaseState::Purchased, false),
            purchase("ORD-2", PurchaseState::Pending, false),
        ];
        for p in partition(input).to_confirm {
            assert!(p.needs_acknowledgement());
        }
    }

    // Partition lists must be disjoint and, ignoring canceled entries,
    // cover the input exactly.
    #[test]
    fn test_partition_is_a_partition() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let len = rng.gen_range(0..50);
            let input: Vec<Purchase> = (0..len)
                .map(|i| {
                    let state = match rng.gen_range(0..3) {
                        0 => PurchaseState::Purchased,
                        1 => PurchaseState::Pending,
                        _ => PurchaseState::Canceled,
                    };
                    purchase(&format!("ORD-{i}"), state, rng.r#gen())
                })
                .collect();

            let surviving = input
                .iter()
                .filter(|p| p.state != PurchaseState::Canceled)
                .count();
            let result = partition(input);

            let total = result.to_confirm.len()
                + result.already_acknowledged.len()
                + result.pending.len();
            assert_eq!(total, surviving);

            let mut ids: Vec<&str> = result
                .to_confirm
                .iter()
                .chain(&result.already_acknowledged)
                .chain(&result.pending)
                .map(|p| p.order_id.as_str())
                .collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), total);

            assert!(
                result
                    .to_confirm
                    .iter()
                    .chain(&result.already_acknowledged)
                    .all(|p| p.state == PurchaseState::Purchased)
            );
            assert!(result.pending.iter().all(|p| p.state == PurchaseState::Pending));
        }
    }
}
