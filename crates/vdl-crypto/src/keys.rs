//! Actor key management.
//!
//! The ledger verifies signatures against the key registered for the signing
//! actor, never against a key supplied alongside the signature.

use std::collections::HashMap;
use std::sync::RwLock;

use vdl_types::ActorId;

use crate::signer::{Signature, SignatureError, SigningKey, VerifyingKey};

/// Resolves an actor to its registered public key.
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, actor: &ActorId) -> Result<VerifyingKey, KeyError>;

    /// Verify `signature` over `message` with the key registered for `actor`.
    fn verify(
        &self,
        actor: &ActorId,
        message: &[u8],
        signature: &Signature,
    ) -> Result<(), KeyError> {
        self.resolve(actor)?.verify(message, signature)?;
        Ok(())
    }
}

/// Errors from key resolution.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("no key registered for actor {0}")]
    UnknownActor(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("key ring lock poisoned")]
    LockPoisoned,
}

/// In-memory actor → public key registry.
#[derive(Debug, Default)]
pub struct InMemoryKeyRing {
    keys: RwLock<HashMap<ActorId, VerifyingKey>>,
}

impl InMemoryKeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the public key for an actor.
    pub fn register(&self, actor: ActorId, key: VerifyingKey) -> Result<(), KeyError> {
        let mut keys = self.keys.write().map_err(|_| KeyError::LockPoisoned)?;
        keys.insert(actor, key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.read().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyResolver for InMemoryKeyRing {
    fn resolve(&self, actor: &ActorId) -> Result<VerifyingKey, KeyError> {
        let keys = self.keys.read().map_err(|_| KeyError::LockPoisoned)?;
        keys.get(actor)
            .cloned()
            .ok_or_else(|| KeyError::UnknownActor(actor.to_string()))
    }
}

/// An actor together with its private signing key.
///
/// Passed to every operation that writes to the ledger on behalf of someone.
pub struct ActorSigner {
    actor: ActorId,
    key: SigningKey,
}

impl ActorSigner {
    pub fn new(actor: ActorId, key: SigningKey) -> Self {
        Self { actor, key }
    }

    /// A signer with a fresh random key.
    pub fn generate(actor: ActorId) -> Self {
        Self::new(actor, SigningKey::generate())
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }

    /// Register this signer's public key with a key ring.
    pub fn register_with(&self, ring: &InMemoryKeyRing) -> Result<(), KeyError> {
        ring.register(self.actor.clone(), self.verifying_key())
    }
}

impl std::fmt::Debug for ActorSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSigner")
            .field("actor", &self.actor)
            .field("key", &self.key)
            .finish()
    }
}
