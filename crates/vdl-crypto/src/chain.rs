use vdl_types::Digest;

use crate::canonical::EncodingError;

/// Trait for records that participate in a hash chain.
pub trait ChainLink {
    /// The record's own stored hash.
    fn link_hash(&self) -> Digest;
    /// The stored hash of the predecessor (the genesis sentinel for the first).
    fn prev_link(&self) -> Digest;
    /// Recompute the record's hash from its content.
    fn recompute_hash(&self) -> Result<Digest, EncodingError>;
}

/// Hash chain integrity verifier.
///
/// Verifies that a sequence of records forms a valid hash chain: the first
/// record links to the genesis sentinel, each subsequent record links to the
/// previous record's hash, and each record's hash is correct for its content.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a chain of records starting from `genesis`.
    pub fn verify_chain<L: ChainLink>(links: &[L], genesis: Digest) -> Result<(), ChainError> {
        let mut expected_prev = genesis;
        for (index, link) in links.iter().enumerate() {
            if link.prev_link() != expected_prev {
                return Err(ChainError::BrokenLink { index });
            }
            let computed = link
                .recompute_hash()
                .map_err(|source| ChainError::Encoding { index, source })?;
            if computed != link.link_hash() {
                return Err(ChainError::HashMismatch { index });
            }
            expected_prev = computed;
        }
        Ok(())
    }
}

/// Errors from chain verification.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("broken link at index {index}: prev_hash does not match")]
    BrokenLink { index: usize },

    #[error("hash mismatch at index {index}: computed hash differs from stored")]
    HashMismatch { index: usize },

    #[error("cannot re-encode record at index {index}: {source}")]
    Encoding {
        index: usize,
        #[source]
        source: EncodingError,
    },
}

impl ChainError {
    /// Index of the first offending record.
    pub fn index(&self) -> usize {
        match self {
            Self::BrokenLink { index }
            | Self::HashMismatch { index }
            | Self::Encoding { index, .. } => *index,
        }
    }
}
