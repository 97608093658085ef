use vdl_crypto::{EncodingError, KeyError};
use vdl_ledger::LedgerError;
use vdl_reconcile::ReconciliationReport;
use vdl_types::Digest;

use crate::selective::GrantState;

/// Errors from disclosure policy handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The stored policy hash no longer matches the policy content.
    #[error("policy {policy_id} has drifted: stored hash {stored}, computed {computed}")]
    Drift {
        policy_id: String,
        stored: Digest,
        computed: Digest,
    },

    #[error("unknown policy: {0}")]
    Unknown(String),

    #[error("policy encoding failed: {0}")]
    Encoding(#[from] EncodingError),
}

/// Errors from the anchoring collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnchorError {
    #[error("anchor write to {key} failed: {reason}")]
    Write { key: String, reason: String },

    #[error("anchor write to {key} timed out after {timeout_ms}ms")]
    Timeout { key: String, timeout_ms: u64 },

    #[error("anchor key not found: {0}")]
    NotFound(String),
}

/// Errors from the disclosure store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A compare-and-set lost the race.
    #[error("conflicting update: {0}")]
    Conflict(String),

    #[error("disclosure store lock poisoned")]
    LockPoisoned,
}

/// Errors from the publication pipeline and the proof interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("reconciliation failed for {}: {} discrepancies", .0.period, .0.discrepancies.len())]
    ReconciliationFailed(Box<ReconciliationReport>),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The policy requires at least one metric and none survived.
    #[error("policy {policy_id} requires at least one metric, none were computed")]
    EmptyDisclosure { policy_id: String },

    #[error("anchoring disclosure {disclosure_id} failed: {source}")]
    AnchorWrite {
        disclosure_id: Digest,
        #[source]
        source: AnchorError,
    },

    /// Proof requested from a run whose policy only commits the root.
    #[error("disclosure {0} is root_only; proofs are not served")]
    ProofDenied(Digest),

    #[error("disclosure not found: {0}")]
    DisclosureNotFound(Digest),

    #[error("metric {metric_key} not committed in disclosure {disclosure_id}")]
    MetricNotFound {
        disclosure_id: Digest,
        metric_key: String,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// Errors from independent verification of a proof bundle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("leaf hash does not match leaf payload")]
    LeafHashMismatch,

    #[error("inclusion path does not lead to the stated root")]
    PathInvalid,

    #[error("proof root does not match the signed statement")]
    RootMismatch,

    #[error("leaf policy does not match the signed statement")]
    PolicyMismatch,

    /// Disclosure id or period differs from the signed statement.
    #[error("{0} does not match the signed statement")]
    StatementMismatch(&'static str),

    #[error("statement commits detail roots but no details proof was given")]
    MissingDetailsProof,

    #[error("statement signature invalid: {0}")]
    Signature(#[from] KeyError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// Errors from the selective-disclosure workflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrantError {
    #[error("grant expired")]
    Expired,

    #[error("grant already used")]
    AlreadyUsed,

    #[error("grant denied")]
    Denied,

    #[error("grant not found")]
    NotFound,

    /// Actor kind or identity may not perform this step.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("invalid transition from {from:?} via {action}")]
    InvalidTransition { from: GrantState, action: &'static str },

    #[error("{metric_key} is outside the grant scope")]
    OutOfScope { metric_key: String },

    #[error("disclosure {0} has no detail commitment for this metric")]
    NoDetail(Digest),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from loading engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
