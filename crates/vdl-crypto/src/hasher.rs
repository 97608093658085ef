use serde::Serialize;
use vdl_types::Digest;

use crate::canonical::{canonical_bytes, EncodingError};

/// BLAKE3 with a domain prefix.
///
/// Used for identifiers that are internal to this engine (disclosure ids,
/// anchor receipts, statement signature hashes). Hashes that external
/// verifiers must reproduce (events, leaves, Merkle nodes, policies) are
/// plain BLAKE3 over canonical bytes and do not go through here.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for deterministic disclosure identifiers.
    pub const DISCLOSURE_ID: Self = Self {
        domain: "vdl-disclosure-id-v1",
    };
    /// Hasher for anchor receipts.
    pub const ANCHOR_RECEIPT: Self = Self {
        domain: "vdl-anchor-receipt-v1",
    };
    /// Hasher for statement signatures recorded on the ledger.
    pub const STATEMENT_SIG: Self = Self {
        domain: "vdl-statement-sig-v1",
    };

    /// BLAKE3 over `domain ":" data`.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let digest = blake3::Hasher::new()
            .update(self.domain.as_bytes())
            .update(b":")
            .update(data)
            .finalize();
        Digest::from_hash(digest.into())
    }

    /// Hash of the canonical encoding of `value`.
    pub fn hash_canonical<T: Serialize + ?Sized>(&self, value: &T) -> Result<Digest, EncodingError> {
        canonical_bytes(value).map(|bytes| self.hash(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn domains_separate_identical_input() {
        let data = b"policy_public_v1|2024-01";
        let id = ContentHasher::DISCLOSURE_ID.hash(data);
        let receipt = ContentHasher::ANCHOR_RECEIPT.hash(data);
        let sig = ContentHasher::STATEMENT_SIG.hash(data);
        assert_ne!(id, receipt);
        assert_ne!(id, sig);
        assert_ne!(receipt, sig);
    }

    #[test]
    fn domain_hash_differs_from_plain_hash() {
        assert_ne!(ContentHasher::ANCHOR_RECEIPT.hash(b"x"), Digest::of(b"x"));
    }

    #[test]
    fn hash_canonical_ignores_key_order() {
        let a = ContentHasher::DISCLOSURE_ID
            .hash_canonical(&json!({"policy_id": "p", "version": 1}))
            .unwrap();
        let b = ContentHasher::DISCLOSURE_ID
            .hash_canonical(&json!({"version": 1, "policy_id": "p"}))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn prefix_is_part_of_the_input() {
        let manual = Digest::of(b"vdl-statement-sig-v1:abc");
        assert_eq!(ContentHasher::STATEMENT_SIG.hash(b"abc"), manual);
    }
}
