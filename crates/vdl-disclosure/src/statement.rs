use serde::{Deserialize, Serialize};
use vdl_crypto::{
    canonical_bytes, ActorSigner, ContentHasher, EncodingError, KeyResolver, Signature,
};
use vdl_types::{ActorId, Digest, Period, Timestamp};

use crate::error::VerifyError;
use crate::policy::ProofLevel;

/// Deterministic id of a (policy, period) publication.
///
/// Identical inputs always map to the same id, which is what makes publish
/// idempotent.
pub fn disclosure_id(
    policy_id: &str,
    period: &Period,
    policy_hash: &Digest,
) -> Result<Digest, EncodingError> {
    #[derive(Serialize)]
    struct IdInput<'a> {
        policy_id: &'a str,
        period: &'a Period,
        policy_hash: &'a Digest,
    }
    ContentHasher::DISCLOSURE_ID.hash_canonical(&IdInput {
        policy_id,
        period,
        policy_hash,
    })
}

/// The public claim a disclosure makes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub disclosure_id: Digest,
    pub policy_id: String,
    pub policy_hash: Digest,
    pub period: Period,
    pub root_summary: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_details: Option<Digest>,
    pub proof_level: ProofLevel,
    pub issued_at: Timestamp,
}

impl Statement {
    /// The bytes that are signed.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        canonical_bytes(self)
    }
}

/// A statement with the issuer's signature over its canonical bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedStatement {
    pub statement: Statement,
    pub signer: ActorId,
    pub signature: Signature,
}

impl SignedStatement {
    pub fn sign(statement: Statement, signer: &ActorSigner) -> Result<Self, EncodingError> {
        let signature = signer.sign(&statement.signing_bytes()?);
        Ok(Self {
            statement,
            signer: signer.actor().clone(),
            signature,
        })
    }

    /// Check the signature against the key registered for the signer.
    pub fn verify(&self, keys: &dyn KeyResolver) -> Result<(), VerifyError> {
        let bytes = self.statement.signing_bytes()?;
        keys.verify(&self.signer, &bytes, &self.signature)?;
        Ok(())
    }

    /// Hash of the signature, recorded on the ledger.
    pub fn sig_hash(&self) -> Digest {
        ContentHasher::STATEMENT_SIG.hash(&self.signature.to_bytes())
    }
}
