//! Merkle commitments over metric records.
//!
//! Each record becomes a leaf whose payload embeds the root of a detail
//! sub-tree built over the record's contributing event hashes. The summary
//! root commits the leaves; when the policy asks for detail commitments a
//! second root commits the detail roots in leaf order.

use serde::{Deserialize, Serialize};
use vdl_crypto::{canonical_hash, EncodingError, MerkleProof, MerkleTree};
use vdl_types::{Digest, Period};

use crate::metrics::{sort_records, Group, MetricRecord};
use crate::policy::DisclosurePolicy;

/// The exact value a verifier hashes to obtain a leaf hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafPayload {
    pub metric_key: String,
    pub group: Group,
    pub period: Period,
    pub value: i64,
    pub policy_id: String,
    pub policy_hash: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_root: Option<Digest>,
}

impl LeafPayload {
    pub fn leaf_hash(&self) -> Result<Digest, EncodingError> {
        canonical_hash(self)
    }
}

/// A record together with the leaf that commits it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedMetric {
    pub record: MetricRecord,
    pub leaf: LeafPayload,
}

impl CommittedMetric {
    pub fn leaf_hash(&self) -> Digest {
        self.record.leaf_hash.unwrap_or_default()
    }

    /// Sub-tree over the contributing event hashes.
    pub fn detail_tree(&self) -> MerkleTree {
        MerkleTree::from_leaves(self.record.event_hashes.clone())
    }
}

/// Summary tree, optional detail tree, and the committed records in leaf
/// order.
#[derive(Clone, Debug)]
pub struct Commitment {
    metrics: Vec<CommittedMetric>,
    summary: MerkleTree,
    details: Option<MerkleTree>,
}

impl Commitment {
    /// Commit `records` under `policy`. Input order does not matter.
    pub fn build(policy: &DisclosurePolicy, mut records: Vec<MetricRecord>) -> Result<Self, EncodingError> {
        sort_records(&mut records)?;

        let mut metrics = Vec::with_capacity(records.len());
        for mut record in records {
            let detail_root = MerkleTree::from_leaves(record.event_hashes.clone()).root();
            let leaf = LeafPayload {
                metric_key: record.metric_key.clone(),
                group: record.group.clone(),
                period: record.period,
                value: record.value,
                policy_id: policy.id.clone(),
                policy_hash: policy.policy_hash,
                detail_root: Some(detail_root),
            };
            record.leaf_hash = Some(leaf.leaf_hash()?);
            metrics.push(CommittedMetric { record, leaf });
        }
        Ok(Self::assemble(metrics, policy.detail_commitments))
    }

    /// Rebuild the trees from previously committed records.
    pub fn restore(metrics: Vec<CommittedMetric>, detail_commitments: bool) -> Self {
        Self::assemble(metrics, detail_commitments)
    }

    fn assemble(metrics: Vec<CommittedMetric>, detail_commitments: bool) -> Self {
        let summary = MerkleTree::from_leaves(metrics.iter().map(CommittedMetric::leaf_hash).collect());
        let details = detail_commitments.then(|| {
            MerkleTree::from_leaves(
                metrics
                    .iter()
                    .map(|m| m.leaf.detail_root.unwrap_or_default())
                    .collect(),
            )
        });
        Self {
            metrics,
            summary,
            details,
        }
    }

    pub fn root_summary(&self) -> Digest {
        self.summary.root()
    }

    pub fn root_details(&self) -> Option<Digest> {
        self.details.as_ref().map(MerkleTree::root)
    }

    pub fn metrics(&self) -> &[CommittedMetric] {
        &self.metrics
    }

    pub fn into_metrics(self) -> Vec<CommittedMetric> {
        self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Leaf index and record for `(metric_key, group)`.
    pub fn find(&self, metric_key: &str, group: &Group) -> Option<(usize, &CommittedMetric)> {
        self.metrics
            .iter()
            .enumerate()
            .find(|(_, m)| m.record.metric_key == metric_key && m.record.is_group(group))
    }

    /// Inclusion proof of leaf `index` under the summary root.
    pub fn summary_proof(&self, index: usize) -> Option<MerkleProof> {
        self.summary.proof(index)
    }

    /// Inclusion proof of leaf `index`'s detail root under the details root.
    pub fn details_proof(&self, index: usize) -> Option<MerkleProof> {
        self.details.as_ref().and_then(|t| t.proof(index))
    }

    /// One proof per contributing event hash under the record's detail root.
    pub fn detail_proofs(&self, index: usize) -> Vec<MerkleProof> {
        let Some(metric) = self.metrics.get(index) else {
            return Vec::new();
        };
        let tree = metric.detail_tree();
        (0..tree.leaf_count()).filter_map(|i| tree.proof(i)).collect()
    }
}
