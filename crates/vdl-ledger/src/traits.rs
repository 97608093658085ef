use vdl_crypto::{ActorSigner, VerifyingKey};
use vdl_types::{ActorId, Digest, EventId, Timestamp};

use crate::error::LedgerError;
use crate::events::{Event, EventDraft};

/// Position of the ledger head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventRef {
    pub seq: u64,
    pub event_hash: Digest,
    pub occurred_at: Timestamp,
}

impl From<&Event> for EventRef {
    fn from(event: &Event) -> Self {
        Self {
            seq: event.seq,
            event_hash: event.event_hash,
            occurred_at: event.occurred_at,
        }
    }
}

/// Write boundary of the ledger. There is no update or delete.
pub trait LedgerWriter: Send + Sync {
    fn append(&self, draft: EventDraft, signer: &ActorSigner) -> Result<Event, LedgerError>;
}

/// Read boundary of the ledger.
pub trait LedgerReader: Send + Sync {
    fn head(&self) -> Result<Option<EventRef>, LedgerError>;

    fn read_all(&self) -> Result<Vec<Event>, LedgerError>;

    /// Inclusive, 1-based sequence range.
    fn read_range(&self, from_seq: u64, to_seq: u64) -> Result<Vec<Event>, LedgerError>;

    /// Every event with `occurred_at < end`.
    fn read_until(&self, end: &Timestamp) -> Result<Vec<Event>, LedgerError>;

    fn get(&self, id: &EventId) -> Result<Option<Event>, LedgerError>;

    fn get_by_hash(&self, hash: &Digest) -> Result<Option<Event>, LedgerError>;

    fn len(&self) -> Result<u64, LedgerError>;

    fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}

/// Rejection from an [`AppendGuard`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardDenial {
    pub stage: String,
    pub reason: String,
}

/// Pre-commit check run on every append, after the signer has been resolved
/// and before the chain head is read.
pub trait AppendGuard: Send + Sync {
    fn check(
        &self,
        draft: &EventDraft,
        actor: &ActorId,
        key: &VerifyingKey,
    ) -> Result<(), GuardDenial>;
}

/// A ledger that can be both written and read.
pub trait Ledger: LedgerWriter + LedgerReader {}

impl<T: LedgerWriter + LedgerReader + ?Sized> Ledger for T {}
