use vdl_crypto::{HashChainVerifier, KeyResolver};
use vdl_types::Digest;

use crate::error::LedgerError;
use crate::events::Event;

/// Verify hash linkage, sequence numbering and signatures of a full ledger
/// sequence starting at genesis.
///
/// The earliest offending event is reported. When linkage and signature both
/// fail at the same event, the linkage failure wins.
pub fn verify_chain(events: &[Event], keys: &dyn KeyResolver) -> Result<(), LedgerError> {
    let numbering_break = events
        .iter()
        .enumerate()
        .position(|(index, event)| event.seq != index as u64 + 1);
    let link_break = HashChainVerifier::verify_chain(events, Digest::ZERO)
        .err()
        .map(|e| e.index());
    let chain_break = match (numbering_break, link_break) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    let checked = chain_break.unwrap_or(events.len());
    for event in &events[..checked] {
        if keys
            .verify(&event.actor, event.event_hash.as_bytes(), &event.signature)
            .is_err()
        {
            return Err(LedgerError::SignatureInvalid { at: event.seq });
        }
    }

    match chain_break {
        Some(index) => Err(LedgerError::ChainBroken {
            at: events[index].seq,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vdl_crypto::{ActorSigner, InMemoryKeyRing};
    use vdl_types::{ActorId, Money, Timestamp};

    use super::*;
    use crate::events::{EventDraft, EventPayload, PaymentCaptured};
    use crate::memory::InMemoryLedger;
    use crate::traits::{LedgerReader, LedgerWriter};

    fn payment(order: &str, amount: i64) -> EventDraft {
        EventDraft::new(EventPayload::PaymentCaptured(PaymentCaptured {
            order_id: order.into(),
            amount: Money::from_minor(amount),
            method: "card".into(),
            receipt_hash: format!("rcpt-{order}"),
        }))
    }

    fn seeded(count: usize) -> (Arc<InMemoryKeyRing>, Vec<Event>) {
        let ring = Arc::new(InMemoryKeyRing::new());
        let signer = ActorSigner::generate(ActorId::agent("ops"));
        signer.register_with(&ring).unwrap();
        let ledger = InMemoryLedger::new(ring.clone());
        let base = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        for i in 0..count {
            let draft = payment(&format!("o-{i}"), 100 + i as i64)
                .at(base.plus(chrono::Duration::seconds(i as i64)));
            ledger.append(draft, &signer).unwrap();
        }
        (ring, ledger.read_all().unwrap())
    }

    #[test]
    fn intact_chain_verifies() {
        let (ring, events) = seeded(4);
        assert_eq!(verify_chain(&events, ring.as_ref()), Ok(()));
        assert_eq!(verify_chain(&[], ring.as_ref()), Ok(()));
    }

    #[test]
    fn tampered_payload_breaks_chain_at_that_event() {
        let (ring, mut events) = seeded(4);
        if let EventPayload::PaymentCaptured(p) = &mut events[2].payload {
            p.amount = Money::from_minor(1);
        }
        assert_eq!(
            verify_chain(&events, ring.as_ref()),
            Err(LedgerError::ChainBroken { at: 3 })
        );
    }

    #[test]
    fn removed_event_breaks_chain() {
        let (ring, mut events) = seeded(4);
        events.remove(1);
        assert_eq!(
            verify_chain(&events, ring.as_ref()),
            Err(LedgerError::ChainBroken { at: 3 })
        );
    }

    #[test]
    fn forged_signature_is_reported() {
        let (ring, mut events) = seeded(3);
        let mallory = ActorSigner::generate(ActorId::agent("ops"));
        events[1].signature = mallory.sign(events[1].event_hash.as_bytes());
        assert_eq!(
            verify_chain(&events, ring.as_ref()),
            Err(LedgerError::SignatureInvalid { at: 2 })
        );
    }

    #[test]
    fn earliest_failure_wins() {
        let (ring, mut events) = seeded(4);
        let mallory = ActorSigner::generate(ActorId::agent("ops"));
        events[0].signature = mallory.sign(events[0].event_hash.as_bytes());
        events[3].prev_hash = Digest::of(b"fork");
        assert_eq!(
            verify_chain(&events, ring.as_ref()),
            Err(LedgerError::SignatureInvalid { at: 1 })
        );
    }
}
