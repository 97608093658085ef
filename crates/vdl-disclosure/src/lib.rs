//! Disclosure engine for the Verifiable Disclosure Ledger.
//!
//! Turns a reconciled reporting period into a signed, anchored commitment
//! over policy-filtered metrics, and serves inclusion proofs and
//! single-use selective reveals against it:
//! - `DisclosurePolicy`: versioned, hash-sealed audience rules
//! - `compute_metrics`: deterministic metric records with source event hashes
//! - `Commitment`: Merkle summary tree with per-metric detail sub-trees
//! - `Publisher`: idempotent publish, anchoring, and proof serving
//! - `SelectiveDisclosure`: request / approve / reveal grant workflow
//! - `verify_proof_bundle` / `verify_reveal_bundle`: independent checks

pub mod anchor;
pub mod commitment;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod publisher;
pub mod selective;
pub mod statement;
pub mod store;
pub mod verify;

pub use anchor::{
    AnchorConfig, AnchorMode, AnchorReceipt, AnchorStatus, AnchorStore, Anchorer,
    InMemoryAnchorStore, ReceiptBody,
};
pub use commitment::{Commitment, CommittedMetric, LeafPayload};
pub use config::{EngineConfig, KeySeed, SelectiveConfig};
pub use engine::DisclosureEngine;
pub use error::{
    AnchorError, ConfigError, GrantError, PolicyError, PublishError, StoreError, VerifyError,
};
pub use metrics::{compute_metrics, dimension, metric, sort_records, Group, MetricRecord};
pub use policy::{builtin_policies, Audience, DisclosurePolicy, ProofLevel, Redaction};
pub use publisher::{DisclosureRun, ProofBundle, Publisher};
pub use selective::{
    GrantScope, GrantState, GrantToken, RevealBundle, SelectiveDisclosure, SelectiveGrant,
    DEFAULT_GRANT_TTL_SECS,
};
pub use statement::{disclosure_id, SignedStatement, Statement};
pub use store::{DisclosureStore, InMemoryDisclosureStore};
pub use verify::{verify_proof_bundle, verify_reveal_bundle};
