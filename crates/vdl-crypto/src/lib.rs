//! Cryptographic primitives for the Verifiable Disclosure Ledger.
//!
//! Provides the canonical encoder every hash and signature is computed over,
//! domain-separated BLAKE3 hashing, binary Merkle trees with inclusion proofs,
//! Ed25519 signing/verification with an actor key ring, and hash-chain link
//! verification.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod canonical;
pub mod chain;
pub mod hasher;
pub mod keys;
pub mod merkle;
pub mod signer;

pub use canonical::{canonical_bytes, canonical_hash, canonical_string, EncodingError};
pub use chain::{ChainError, ChainLink, HashChainVerifier};
pub use hasher::ContentHasher;
pub use keys::{ActorSigner, InMemoryKeyRing, KeyError, KeyResolver};
pub use merkle::{empty_root, verify_proof, MerkleProof, MerkleTree, ProofStep, Side};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
