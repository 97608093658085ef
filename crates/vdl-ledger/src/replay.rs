use crate::error::{LedgerError, ReplayError};
use crate::events::{Event, EventPayload};
use crate::projection::Projection;
use crate::traits::LedgerReader;

/// Deterministic replay of event sequences into a [`Projection`].
pub struct ReplayEngine;

impl ReplayEngine {
    /// Fold a sequence that starts at genesis. Dangling references are
    /// recorded as anomalies.
    pub fn replay(events: &[Event]) -> Projection {
        let mut projection = Projection::new();
        for event in events {
            projection.apply(event);
        }
        projection
    }

    pub fn replay_from_genesis<R: LedgerReader + ?Sized>(
        reader: &R,
    ) -> Result<Projection, LedgerError> {
        let events = reader.read_all()?;
        Ok(Self::replay(&events))
    }

    /// Fold a bounded window of events that does not start at genesis.
    ///
    /// Fails if any event references a prerequisite (order, procurement,
    /// corrected event, or disclosure) that is not itself inside the window.
    pub fn replay_window(events: &[Event]) -> Result<Projection, ReplayError> {
        let mut projection = Projection::new();
        for event in events {
            if let Some(missing) = missing_prerequisite(&projection, event) {
                tracing::debug!(
                    seq = event.seq,
                    missing = %missing,
                    "window replay hit incomplete history"
                );
                return Err(ReplayError::IncompleteHistory {
                    event_id: event.event_id,
                    missing,
                });
            }
            projection.apply(event);
        }
        Ok(projection)
    }
}

fn missing_prerequisite(projection: &Projection, event: &Event) -> Option<String> {
    if let Some(original) = &event.corrects {
        if !projection.has_seen(original) {
            return Some(format!("event {original}"));
        }
    }
    if let Some(order_id) = event.payload.order_reference() {
        if !projection.order(order_id).is_some_and(|o| o.is_placed()) {
            return Some(format!("order {order_id}"));
        }
    }
    match &event.payload {
        EventPayload::GoodsReceived(g)
            if !projection.inventory.procurements.contains_key(&g.procurement_id) =>
        {
            Some(format!("procurement {}", g.procurement_id))
        }
        EventPayload::SelectiveDisclosureRevealed(s)
            if !projection.disclosures.contains(&s.disclosure_id) =>
        {
            Some(format!("disclosure {}", s.disclosure_id))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vdl_crypto::{ActorSigner, InMemoryKeyRing};
    use vdl_types::{ActorId, Money, Timestamp};

    use super::*;
    use crate::events::{EventDraft, OrderItem, OrderPlaced, PaymentCaptured};
    use crate::memory::InMemoryLedger;
    use crate::traits::LedgerWriter;

    fn ledger_with_sale() -> InMemoryLedger {
        let ring = Arc::new(InMemoryKeyRing::new());
        let signer = ActorSigner::generate(ActorId::agent("ops"));
        signer.register_with(&ring).unwrap();
        let ledger = InMemoryLedger::new(ring);
        let t0 = Timestamp::from_unix_secs(1_700_000_000).unwrap();

        ledger
            .append(
                EventDraft::new(EventPayload::OrderPlaced(OrderPlaced {
                    order_id: "o-1".into(),
                    customer_ref: "c".into(),
                    items: vec![OrderItem {
                        sku: "tea".into(),
                        qty: 1,
                        unit_price: Money::from_minor(900),
                    }],
                    channel: "web".into(),
                    region: None,
                }))
                .at(t0),
                &signer,
            )
            .unwrap();
        ledger
            .append(
                EventDraft::new(EventPayload::PaymentCaptured(PaymentCaptured {
                    order_id: "o-1".into(),
                    amount: Money::from_minor(900),
                    method: "card".into(),
                    receipt_hash: "r".into(),
                }))
                .at(t0),
                &signer,
            )
            .unwrap();
        ledger
    }

    #[test]
    fn genesis_replay_matches_direct_fold() {
        let ledger = ledger_with_sale();
        let from_reader = ReplayEngine::replay_from_genesis(&ledger).unwrap();
        let direct = ReplayEngine::replay(&ledger.read_all().unwrap());
        assert_eq!(from_reader, direct);
        assert_eq!(from_reader.applied, 2);
        assert_eq!(from_reader.order("o-1").unwrap().paid, Money::from_minor(900));
    }

    #[test]
    fn full_window_equals_genesis_replay() {
        let ledger = ledger_with_sale();
        let events = ledger.read_all().unwrap();
        assert_eq!(
            ReplayEngine::replay_window(&events).unwrap(),
            ReplayEngine::replay(&events)
        );
    }

    #[test]
    fn window_missing_order_is_incomplete() {
        let ledger = ledger_with_sale();
        let events = ledger.read_all().unwrap();
        let err = ReplayEngine::replay_window(&events[1..]).unwrap_err();
        assert_eq!(
            err,
            ReplayError::IncompleteHistory {
                event_id: events[1].event_id,
                missing: "order o-1".into(),
            }
        );
    }

    #[test]
    fn empty_replay() {
        let projection = ReplayEngine::replay(&[]);
        assert_eq!(projection.applied, 0);
        assert!(projection.orders.is_empty());
        assert!(projection.head.is_none());
    }
}
