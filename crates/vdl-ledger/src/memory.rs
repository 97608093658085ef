use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use vdl_crypto::{ActorSigner, KeyResolver, Signature};
use vdl_types::{Clock, Digest, EventId, SystemClock, Timestamp};

use crate::error::LedgerError;
use crate::events::{Event, EventDraft, HashInput, SCHEMA_VERSION};
use crate::traits::{AppendGuard, EventRef, LedgerReader, LedgerWriter};
use crate::validation::verify_chain;

/// In-memory ledger for tests, local demos, and embedding.
///
/// A single write lock covers reading the head, hashing, signing and pushing
/// the new event, so two appends can never observe the same head.
pub struct InMemoryLedger {
    keys: Arc<dyn KeyResolver>,
    guard: Option<Arc<dyn AppendGuard>>,
    clock: Arc<dyn Clock>,
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    events: Vec<Event>,
    by_id: HashMap<EventId, usize>,
    by_hash: HashMap<Digest, usize>,
}

impl InMemoryLedger {
    pub fn new(keys: Arc<dyn KeyResolver>) -> Self {
        Self {
            keys,
            guard: None,
            clock: Arc::new(SystemClock),
            inner: RwLock::new(LedgerState::default()),
        }
    }

    /// Install the pre-commit guard every append must pass.
    pub fn with_guard(mut self, guard: Arc<dyn AppendGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn keys(&self) -> &Arc<dyn KeyResolver> {
        &self.keys
    }

    /// Verify the whole stored chain against the registered keys.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let events = self.read_all()?;
        verify_chain(&events, self.keys.as_ref())
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, LedgerState>, LedgerError> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl LedgerWriter for InMemoryLedger {
    fn append(&self, draft: EventDraft, signer: &ActorSigner) -> Result<Event, LedgerError> {
        draft.payload.validate()?;

        let actor = signer.actor().clone();
        let registered = self.keys.resolve(&actor)?;
        if registered != signer.verifying_key() {
            return Err(LedgerError::SignerMismatch {
                actor: actor.to_string(),
            });
        }

        if let Some(guard) = &self.guard {
            if let Err(denial) = guard.check(&draft, &actor, &registered) {
                tracing::warn!(
                    event_type = draft.payload.event_type(),
                    actor = %actor,
                    stage = %denial.stage,
                    reason = %denial.reason,
                    "append denied"
                );
                return Err(LedgerError::GovernanceDenied {
                    stage: denial.stage,
                    reason: denial.reason,
                });
            }
        }

        let mut state = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;

        let head = state.events.last().map(EventRef::from);
        let occurred_at = match (draft.occurred_at, head) {
            (Some(ts), Some(head)) if ts < head.occurred_at => {
                return Err(LedgerError::NonMonotonicTimestamp {
                    occurred_at: ts.to_rfc3339(),
                    head: head.occurred_at.to_rfc3339(),
                });
            }
            (Some(ts), _) => ts,
            (None, Some(head)) => self.clock.now().max(head.occurred_at),
            (None, None) => self.clock.now(),
        };

        if let Some(original) = &draft.corrects {
            if !state.by_id.contains_key(original) {
                return Err(LedgerError::UnknownCorrection(*original));
            }
        }

        let event_id = EventId::new();
        let seq = head.map(|h| h.seq + 1).unwrap_or(1);
        let prev_hash = head.map(|h| h.event_hash).unwrap_or(Digest::ZERO);
        let event_hash = HashInput {
            event_id: &event_id,
            seq,
            schema_version: SCHEMA_VERSION,
            payload: &draft.payload,
            occurred_at: &occurred_at,
            actor: &actor,
            corrects: &draft.corrects,
            prev_hash: &prev_hash,
        }
        .digest()?;
        let signature: Signature = signer.sign(event_hash.as_bytes());

        let event = Event {
            event_id,
            seq,
            schema_version: SCHEMA_VERSION,
            payload: draft.payload,
            occurred_at,
            actor,
            corrects: draft.corrects,
            prev_hash,
            event_hash,
            signature,
        };

        let index = state.events.len();
        state.by_id.insert(event.event_id, index);
        state.by_hash.insert(event.event_hash, index);
        state.events.push(event.clone());

        tracing::info!(
            seq,
            event_type = event.event_type(),
            event_hash = %event.event_hash.short_hex(),
            actor = %event.actor,
            "event appended"
        );
        Ok(event)
    }
}

impl LedgerReader for InMemoryLedger {
    fn head(&self) -> Result<Option<EventRef>, LedgerError> {
        Ok(self.read_state()?.events.last().map(EventRef::from))
    }

    fn read_all(&self) -> Result<Vec<Event>, LedgerError> {
        Ok(self.read_state()?.events.clone())
    }

    fn read_range(&self, from_seq: u64, to_seq: u64) -> Result<Vec<Event>, LedgerError> {
        if from_seq == 0 || to_seq == 0 || from_seq > to_seq {
            return Err(LedgerError::InvalidRange {
                from: from_seq,
                to: to_seq,
            });
        }

        let state = self.read_state()?;
        let start = (from_seq - 1) as usize;
        if start >= state.events.len() {
            return Ok(vec![]);
        }
        let end_exclusive = to_seq.min(state.events.len() as u64) as usize;
        Ok(state.events[start..end_exclusive].to_vec())
    }

    fn read_until(&self, end: &Timestamp) -> Result<Vec<Event>, LedgerError> {
        let state = self.read_state()?;
        let cut = state.events.partition_point(|e| e.occurred_at < *end);
        Ok(state.events[..cut].to_vec())
    }

    fn get(&self, id: &EventId) -> Result<Option<Event>, LedgerError> {
        let state = self.read_state()?;
        Ok(state.by_id.get(id).and_then(|&i| state.events.get(i)).cloned())
    }

    fn get_by_hash(&self, hash: &Digest) -> Result<Option<Event>, LedgerError> {
        let state = self.read_state()?;
        Ok(state
            .by_hash
            .get(hash)
            .and_then(|&i| state.events.get(i))
            .cloned())
    }

    fn len(&self) -> Result<u64, LedgerError> {
        Ok(self.read_state()?.events.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use vdl_crypto::{InMemoryKeyRing, VerifyingKey};
    use vdl_types::{ActorId, FixedClock, Money};

    use super::*;
    use crate::events::{EventPayload, InventoryAdjusted, AdjustmentItem, RefundIssued};
    use crate::traits::GuardDenial;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(1_700_000_000 + secs).unwrap()
    }

    fn refund(order: &str) -> EventDraft {
        EventDraft::new(EventPayload::RefundIssued(RefundIssued {
            order_id: order.into(),
            amount: Money::from_minor(250),
            receipt_hash: "r".into(),
        }))
    }

    fn setup() -> (InMemoryLedger, ActorSigner) {
        let ring = Arc::new(InMemoryKeyRing::new());
        let signer = ActorSigner::generate(ActorId::agent("ops"));
        signer.register_with(&ring).unwrap();
        (InMemoryLedger::new(ring), signer)
    }

    #[test]
    fn append_links_to_previous_head() {
        let (ledger, signer) = setup();
        let first = ledger.append(refund("o-1").at(ts(0)), &signer).unwrap();
        let second = ledger.append(refund("o-2").at(ts(1)), &signer).unwrap();

        assert_eq!(first.seq, 1);
        assert_eq!(first.prev_hash, Digest::ZERO);
        assert_eq!(second.seq, 2);
        assert_eq!(second.prev_hash, first.event_hash);
        assert_eq!(second.compute_hash().unwrap(), second.event_hash);
        assert!(signer
            .verifying_key()
            .verify(second.event_hash.as_bytes(), &second.signature)
            .is_ok());
        ledger.verify().unwrap();
    }

    #[test]
    fn earlier_timestamp_is_rejected() {
        let (ledger, signer) = setup();
        ledger.append(refund("o-1").at(ts(10)), &signer).unwrap();
        let err = ledger.append(refund("o-2").at(ts(5)), &signer).unwrap_err();
        assert!(matches!(err, LedgerError::NonMonotonicTimestamp { .. }));
        // equal timestamps are fine
        ledger.append(refund("o-3").at(ts(10)), &signer).unwrap();
    }

    #[test]
    fn clock_time_never_goes_backwards() {
        let ring = Arc::new(InMemoryKeyRing::new());
        let signer = ActorSigner::generate(ActorId::agent("ops"));
        signer.register_with(&ring).unwrap();
        let clock = Arc::new(FixedClock::new(ts(0)));
        let ledger = InMemoryLedger::new(ring).with_clock(clock);

        ledger.append(refund("o-1").at(ts(100)), &signer).unwrap();
        let e = ledger.append(refund("o-2"), &signer).unwrap();
        assert_eq!(e.occurred_at, ts(100));
    }

    #[test]
    fn unregistered_or_wrong_key_is_rejected() {
        let (ledger, _) = setup();
        let stranger = ActorSigner::generate(ActorId::human("eve"));
        assert!(matches!(
            ledger.append(refund("o-1"), &stranger),
            Err(LedgerError::Key(_))
        ));

        let impostor = ActorSigner::generate(ActorId::agent("ops"));
        assert_eq!(
            ledger.append(refund("o-1"), &impostor).unwrap_err(),
            LedgerError::SignerMismatch {
                actor: "agent:ops".into()
            }
        );
        assert_eq!(ledger.len().unwrap(), 0);
    }

    #[test]
    fn invalid_payload_is_rejected_before_hashing() {
        let (ledger, signer) = setup();
        let draft = EventDraft::new(EventPayload::InventoryAdjusted(InventoryAdjusted {
            reason: "count".into(),
            items: vec![AdjustmentItem {
                sku: "tea".into(),
                qty_delta: 0,
                batch_id: None,
            }],
        }));
        assert!(matches!(
            ledger.append(draft, &signer),
            Err(LedgerError::InvalidPayload { .. })
        ));
        assert!(ledger.head().unwrap().is_none());
    }

    #[test]
    fn correction_must_reference_existing_event() {
        let (ledger, signer) = setup();
        let original = ledger.append(refund("o-1").at(ts(0)), &signer).unwrap();
        let fix = ledger
            .append(refund("o-1").at(ts(1)).correcting(original.event_id), &signer)
            .unwrap();
        assert_eq!(fix.corrects, Some(original.event_id));

        let missing = EventId::new();
        assert_eq!(
            ledger
                .append(refund("o-1").at(ts(2)).correcting(missing), &signer)
                .unwrap_err(),
            LedgerError::UnknownCorrection(missing)
        );
    }

    struct DenyAll;

    impl AppendGuard for DenyAll {
        fn check(
            &self,
            _draft: &EventDraft,
            _actor: &ActorId,
            _key: &VerifyingKey,
        ) -> Result<(), GuardDenial> {
            Err(GuardDenial {
                stage: "governance".into(),
                reason: "no rule".into(),
            })
        }
    }

    #[test]
    fn guard_denial_blocks_append() {
        let (ledger, signer) = setup();
        let ledger = ledger.with_guard(Arc::new(DenyAll));
        assert_eq!(
            ledger.append(refund("o-1"), &signer).unwrap_err(),
            LedgerError::GovernanceDenied {
                stage: "governance".into(),
                reason: "no rule".into()
            }
        );
    }

    #[test]
    fn concurrent_appends_never_fork() {
        let (ledger, signer) = setup();
        let ledger = Arc::new(ledger);
        let signer = Arc::new(signer);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                let signer = Arc::clone(&signer);
                thread::spawn(move || {
                    for i in 0..25 {
                        ledger
                            .append(refund(&format!("o-{t}-{i}")), &signer)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len().unwrap(), 200);
        ledger.verify().unwrap();
    }

    #[test]
    fn reads_by_range_time_id_and_hash() {
        let (ledger, signer) = setup();
        let a = ledger.append(refund("o-1").at(ts(0)), &signer).unwrap();
        let b = ledger.append(refund("o-2").at(ts(10)), &signer).unwrap();
        ledger.append(refund("o-3").at(ts(20)), &signer).unwrap();

        assert_eq!(ledger.read_range(1, 2).unwrap().len(), 2);
        assert_eq!(ledger.read_range(3, 99).unwrap().len(), 1);
        assert_eq!(
            ledger.read_range(2, 1).unwrap_err(),
            LedgerError::InvalidRange { from: 2, to: 1 }
        );
        assert_eq!(ledger.read_until(&ts(10)).unwrap().len(), 1);
        assert_eq!(ledger.get(&b.event_id).unwrap().unwrap().seq, 2);
        assert_eq!(ledger.get_by_hash(&a.event_hash).unwrap().unwrap().seq, 1);
        assert!(ledger.get_by_hash(&Digest::of(b"x")).unwrap().is_none());
        assert_eq!(ledger.head().unwrap().unwrap().seq, 3);
    }
}
