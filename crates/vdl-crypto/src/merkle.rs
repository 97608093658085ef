use serde::{Deserialize, Serialize};
use vdl_types::Digest;

/// Which side of the running hash a sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One sibling on the way from a leaf to the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: Digest,
    pub side: Side,
}

/// Root of a tree with no leaves: `blake3("")`.
pub fn empty_root() -> Digest {
    Digest::of(b"")
}

/// Merkle tree over 32-byte leaf digests.
///
/// Leaves are taken in the order given; callers that need a canonical shape
/// sort them first. On a level with an odd node count the last node is
/// hashed with itself.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    root: Digest,
    /// `levels[0]` holds the leaves, the last level holds only the root.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Zero leaves give [`empty_root`]; one leaf is its own root.
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let parents = level
                .chunks(2)
                .filter_map(|pair| Some(hash_pair(pair.first()?, pair.last()?)))
                .collect();
            levels.push(parents);
        }
        let root = match levels.last().and_then(|l| l.first()) {
            Some(root) => *root,
            None => {
                levels.clear();
                empty_root()
            }
        };
        Self { root, levels }
    }

    pub fn root(&self) -> Digest {
        self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    pub fn leaves(&self) -> &[Digest] {
        self.levels.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// Index of the first leaf equal to `leaf`.
    pub fn position(&self, leaf: &Digest) -> Option<usize> {
        self.leaves().iter().position(|l| l == leaf)
    }

    /// Sibling path for the leaf at `index`, or `None` past the end.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf_hash = *self.leaves().get(index)?;
        let below_root = &self.levels[..self.levels.len() - 1];
        let mut at = index;
        let path = below_root
            .iter()
            .map(|level| {
                let (sibling, side) = if at % 2 == 1 {
                    (at - 1, Side::Left)
                } else {
                    (at + 1, Side::Right)
                };
                let hash = level.get(sibling).copied().unwrap_or(level[at]);
                at /= 2;
                ProofStep { hash, side }
            })
            .collect();
        Some(MerkleProof {
            leaf_hash,
            path,
            root: self.root,
        })
    }
}

/// Self-contained inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_hash: Digest,
    /// Siblings ordered from the leaf level upward.
    pub path: Vec<ProofStep>,
    pub root: Digest,
}

impl MerkleProof {
    pub fn verify(&self) -> bool {
        verify_proof(&self.leaf_hash, &self.path, &self.root)
    }
}

/// Fold `path` over `leaf_hash` and compare with `root`. Needs nothing
/// beyond the arguments.
pub fn verify_proof(leaf_hash: &Digest, path: &[ProofStep], root: &Digest) -> bool {
    let computed = path.iter().fold(*leaf_hash, |node, step| match step.side {
        Side::Left => hash_pair(&step.hash, &node),
        Side::Right => hash_pair(&node, &step.hash),
    });
    computed == *root
}

/// Parent of two nodes: BLAKE3 over the 64 raw bytes, no framing.
fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    Digest::of(&buf)
}
