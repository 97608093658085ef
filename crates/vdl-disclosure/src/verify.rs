//! Independent verification of served proofs.
//!
//! These functions need nothing but the bundle and the issuer's public key:
//! they recompute the leaf hash from the leaf payload, walk the path, and
//! compare the result with the signed statement.

use vdl_crypto::{verify_proof, KeyResolver};

use crate::error::VerifyError;
use crate::publisher::ProofBundle;
use crate::selective::RevealBundle;
use crate::statement::SignedStatement;

/// Check a proof bundle end to end.
pub fn verify_proof_bundle(bundle: &ProofBundle, keys: &dyn KeyResolver) -> Result<(), VerifyError> {
    if bundle.leaf.leaf_hash()? != bundle.leaf_hash {
        return Err(VerifyError::LeafHashMismatch);
    }
    let statement = &bundle.statement.statement;
    if bundle.disclosure_id != statement.disclosure_id {
        return Err(VerifyError::StatementMismatch("disclosure id"));
    }
    if bundle.leaf.period != statement.period {
        return Err(VerifyError::StatementMismatch("leaf period"));
    }
    if bundle.leaf.policy_id != statement.policy_id || bundle.leaf.policy_hash != statement.policy_hash {
        return Err(VerifyError::PolicyMismatch);
    }
    if bundle.root != statement.root_summary {
        return Err(VerifyError::RootMismatch);
    }
    if !verify_proof(&bundle.leaf_hash, &bundle.path, &bundle.root) {
        return Err(VerifyError::PathInvalid);
    }
    bundle.statement.verify(keys)
}

/// Check a reveal against the signed statement of its disclosure.
pub fn verify_reveal_bundle(
    reveal: &RevealBundle,
    statement: &SignedStatement,
    keys: &dyn KeyResolver,
) -> Result<(), VerifyError> {
    statement.verify(keys)?;
    let signed = &statement.statement;
    if reveal.disclosure_id != signed.disclosure_id {
        return Err(VerifyError::StatementMismatch("disclosure id"));
    }
    if reveal.leaf.period != signed.period {
        return Err(VerifyError::StatementMismatch("leaf period"));
    }

    let leaf_hash = reveal.leaf.leaf_hash()?;
    if leaf_hash != reveal.summary_proof.leaf_hash {
        return Err(VerifyError::LeafHashMismatch);
    }
    if reveal.leaf.policy_hash != signed.policy_hash {
        return Err(VerifyError::PolicyMismatch);
    }
    if reveal.summary_proof.root != signed.root_summary {
        return Err(VerifyError::RootMismatch);
    }
    if !reveal.summary_proof.verify() {
        return Err(VerifyError::PathInvalid);
    }

    if reveal.leaf.detail_root != Some(reveal.detail_root) {
        return Err(VerifyError::RootMismatch);
    }
    if reveal.detail_proofs.len() != reveal.event_hashes.len() {
        return Err(VerifyError::PathInvalid);
    }
    for (hash, proof) in reveal.event_hashes.iter().zip(&reveal.detail_proofs) {
        if proof.leaf_hash != *hash || !verify_proof(hash, &proof.path, &reveal.detail_root) {
            return Err(VerifyError::PathInvalid);
        }
    }

    match (&reveal.details_proof, signed.root_details) {
        (None, None) => {}
        (None, Some(_)) => return Err(VerifyError::MissingDetailsProof),
        (Some(_), None) => return Err(VerifyError::RootMismatch),
        (Some(details), Some(root_details)) => {
            if details.root != root_details || details.leaf_hash != reveal.detail_root {
                return Err(VerifyError::RootMismatch);
            }
            if !details.verify() {
                return Err(VerifyError::PathInvalid);
            }
        }
    }
    Ok(())
}
