//! Disclosure policies.
//!
//! A policy is an explicit value handed to every metrics and publication
//! call. Its hash is recomputed and compared before each use; a mismatch is
//! fatal for that policy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vdl_crypto::canonical_hash;
use vdl_types::Digest;

use crate::error::PolicyError;
use crate::metrics::{dimension, metric};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Public,
    Investor,
    Auditor,
}

/// How much of a commitment the proof interface may serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofLevel {
    RootOnly,
    RootAndPaths,
}

impl ProofLevel {
    pub fn serves_paths(&self) -> bool {
        matches!(self, Self::RootAndPaths)
    }
}

/// Audience-specific redaction. A record grouped by any listed dimension is
/// dropped whole.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redaction {
    #[serde(default)]
    pub dimensions: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisclosurePolicy {
    pub id: String,
    pub version: u32,
    pub audience: Audience,
    /// Metric keys that may be published. Anything else is dropped.
    pub allowed_metrics: BTreeSet<String>,
    /// Grouping dimensions that may be published. Anything else is dropped.
    #[serde(default)]
    pub allowed_dimensions: BTreeSet<String>,
    pub proof_level: ProofLevel,
    #[serde(default)]
    pub redaction: Redaction,
    /// Publishing with no surviving metric is an error.
    #[serde(default)]
    pub require_metrics: bool,
    /// Commit a second root over the per-record detail sub-trees.
    #[serde(default)]
    pub detail_commitments: bool,
    /// Hash of every other field. [`Digest::ZERO`] until sealed.
    #[serde(default)]
    pub policy_hash: Digest,
}

/// Every policy field except the stored hash.
#[derive(Serialize)]
struct PolicyBody<'a> {
    id: &'a str,
    version: u32,
    audience: Audience,
    allowed_metrics: &'a BTreeSet<String>,
    allowed_dimensions: &'a BTreeSet<String>,
    proof_level: ProofLevel,
    redaction: &'a Redaction,
    require_metrics: bool,
    detail_commitments: bool,
}

impl DisclosurePolicy {
    /// Canonical hash of the policy content.
    pub fn compute_hash(&self) -> Result<Digest, PolicyError> {
        let body = PolicyBody {
            id: &self.id,
            version: self.version,
            audience: self.audience,
            allowed_metrics: &self.allowed_metrics,
            allowed_dimensions: &self.allowed_dimensions,
            proof_level: self.proof_level,
            redaction: &self.redaction,
            require_metrics: self.require_metrics,
            detail_commitments: self.detail_commitments,
        };
        Ok(canonical_hash(&body)?)
    }

    /// Store the freshly computed hash.
    pub fn seal(mut self) -> Result<Self, PolicyError> {
        self.policy_hash = self.compute_hash()?;
        Ok(self)
    }

    /// Recompute the hash and compare it to the stored one.
    pub fn verify_hash(&self) -> Result<Digest, PolicyError> {
        let computed = self.compute_hash()?;
        if computed != self.policy_hash {
            tracing::warn!(
                policy_id = %self.id,
                stored = %self.policy_hash.short_hex(),
                computed = %computed.short_hex(),
                "policy hash drift"
            );
            return Err(PolicyError::Drift {
                policy_id: self.id.clone(),
                stored: self.policy_hash,
                computed,
            });
        }
        Ok(computed)
    }

    pub fn allows_metric(&self, metric_key: &str) -> bool {
        self.allowed_metrics.contains(metric_key)
    }

    /// A dimension is publishable when allow-listed and not redacted.
    pub fn allows_dimension(&self, dimension: &str) -> bool {
        self.allowed_dimensions.contains(dimension) && !self.redaction.dimensions.contains(dimension)
    }

    /// Look up a built-in policy by id.
    pub fn builtin(id: &str) -> Result<Self, PolicyError> {
        builtin_policies()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| PolicyError::Unknown(id.to_string()))
    }
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The built-in policies, sealed.
pub fn builtin_policies() -> Result<Vec<DisclosurePolicy>, PolicyError> {
    let public_metrics = set(&[
        metric::REVENUE,
        metric::REFUNDS,
        metric::NET_REVENUE,
        metric::ORDERS_COUNT,
        metric::SHIPMENT_QTY,
        metric::REFUND_RATE_BPS,
    ]);
    let all_metrics = set(metric::ALL);
    let all_dimensions = set(&[dimension::CHANNEL, dimension::REGION, dimension::SKU]);

    let public = DisclosurePolicy {
        id: "policy_public_v1".into(),
        version: 1,
        audience: Audience::Public,
        allowed_metrics: public_metrics.clone(),
        allowed_dimensions: all_dimensions.clone(),
        proof_level: ProofLevel::RootAndPaths,
        redaction: Redaction {
            dimensions: set(&[dimension::SKU, dimension::CUSTOMER]),
        },
        require_metrics: true,
        detail_commitments: false,
        policy_hash: Digest::ZERO,
    };
    let public_root_only = DisclosurePolicy {
        id: "policy_public_root_only_v1".into(),
        proof_level: ProofLevel::RootOnly,
        ..public.clone()
    };
    let investor = DisclosurePolicy {
        id: "policy_investor_v1".into(),
        audience: Audience::Investor,
        allowed_metrics: all_metrics.clone(),
        redaction: Redaction {
            dimensions: set(&[dimension::CUSTOMER]),
        },
        ..public.clone()
    };
    let auditor = DisclosurePolicy {
        id: "policy_auditor_v1".into(),
        audience: Audience::Auditor,
        allowed_metrics: all_metrics,
        allowed_dimensions: all_dimensions,
        redaction: Redaction::default(),
        detail_commitments: true,
        ..public.clone()
    };

    [public, public_root_only, investor, auditor]
        .into_iter()
        .map(DisclosurePolicy::seal)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_sealed_and_distinct() {
        let policies = builtin_policies().unwrap();
        assert_eq!(policies.len(), 4);
        let hashes: BTreeSet<Digest> = policies.iter().map(|p| p.policy_hash).collect();
        assert_eq!(hashes.len(), 4);
        for p in &policies {
            assert_eq!(p.verify_hash().unwrap(), p.policy_hash);
        }
    }

    #[test]
    fn any_field_change_is_drift() {
        let mut policy = DisclosurePolicy::builtin("policy_public_v1").unwrap();
        policy.allowed_metrics.insert(metric::COGS.into());
        assert!(matches!(
            policy.verify_hash(),
            Err(PolicyError::Drift { ref policy_id, .. }) if policy_id == "policy_public_v1"
        ));

        let mut policy = DisclosurePolicy::builtin("policy_public_v1").unwrap();
        policy.proof_level = ProofLevel::RootOnly;
        assert!(policy.verify_hash().is_err());
    }

    #[test]
    fn unsealed_policy_fails_verification() {
        let mut policy = DisclosurePolicy::builtin("policy_investor_v1").unwrap();
        policy.policy_hash = Digest::ZERO;
        assert!(policy.verify_hash().is_err());
    }

    #[test]
    fn hash_excludes_stored_hash() {
        let policy = DisclosurePolicy::builtin("policy_auditor_v1").unwrap();
        let mut other = policy.clone();
        other.policy_hash = Digest::of(b"anything");
        assert_eq!(policy.compute_hash().unwrap(), other.compute_hash().unwrap());
    }

    #[test]
    fn redaction_overrides_allow_list() {
        let public = DisclosurePolicy::builtin("policy_public_v1").unwrap();
        assert!(public.allows_dimension(dimension::CHANNEL));
        assert!(!public.allows_dimension(dimension::SKU));
        assert!(!public.allows_dimension("warehouse"));
        assert!(!public.allows_metric(metric::COGS));

        let auditor = DisclosurePolicy::builtin("policy_auditor_v1").unwrap();
        assert!(auditor.allows_dimension(dimension::SKU));
        assert!(auditor.detail_commitments);
    }

    #[test]
    fn unknown_builtin() {
        assert_eq!(
            DisclosurePolicy::builtin("policy_nope"),
            Err(PolicyError::Unknown("policy_nope".into()))
        );
    }

    #[test]
    fn deserializes_without_hash() {
        let raw = r#"{
            "id": "p", "version": 1, "audience": "investor",
            "allowed_metrics": ["revenue_cents"], "proof_level": "root_only"
        }"#;
        let policy: DisclosurePolicy = serde_json::from_str(raw).unwrap();
        assert_eq!(policy.policy_hash, Digest::ZERO);
        let sealed = policy.seal().unwrap();
        assert!(sealed.verify_hash().is_ok());
    }
}
