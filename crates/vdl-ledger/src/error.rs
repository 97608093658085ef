use vdl_crypto::{EncodingError, KeyError};
use vdl_types::EventId;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("hash chain broken at seq {at}")]
    ChainBroken { at: u64 },

    #[error("signature invalid at seq {at}")]
    SignatureInvalid { at: u64 },

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("invalid {event_type} payload: {reason}")]
    InvalidPayload {
        event_type: &'static str,
        reason: String,
    },

    #[error("timestamp {occurred_at} precedes ledger head at {head}")]
    NonMonotonicTimestamp { occurred_at: String, head: String },

    #[error("correction references unknown event {0}")]
    UnknownCorrection(EventId),

    #[error("signing key does not match the key registered for {actor}")]
    SignerMismatch { actor: String },

    #[error("key resolution failed: {0}")]
    Key(#[from] KeyError),

    #[error("append denied by {stage}: {reason}")]
    GovernanceDenied { stage: String, reason: String },

    #[error("invalid sequence range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

/// Errors produced by bounded-window replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("incomplete history: event {event_id} references {missing} outside the replay window")]
    IncompleteHistory { event_id: EventId, missing: String },
}
