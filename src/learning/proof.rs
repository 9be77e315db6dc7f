//! Merkle membership proofs over sorted-pair SHA-256 hashing.
//!
//! Each pair of nodes is sorted before it is hashed, so a proof is just the
//! ordered list of sibling hashes from leaf to root; no left/right flags are
//! carried. [`verify`] is the only thing the engine needs at runtime.
//! [`MerkleTree`] builds trees with the same combiner so clients (and tests)
//! can produce proofs the verifier accepts.

use super::H256;

use sha2::{Digest as _, Sha256};

/// Hash one piece of learning content into a leaf.
pub fn hash_leaf(data: &[u8]) -> H256 {
    H256(Sha256::digest(data).into())
}

/// Combine two nodes. Commutative: `hash_pair(a, b) == hash_pair(b, a)`.
pub fn hash_pair(a: &H256, b: &H256) -> H256 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(low.as_bytes());
    hasher.update(high.as_bytes());
    H256(hasher.finalize().into())
}

/// Recompute the root from `leaf` and its sibling path and compare it with
/// `root`.
pub fn verify(root: &H256, leaf: &H256, proof: &[H256]) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |node, sibling| hash_pair(&node, sibling));
    computed == *root
}

/// An in-memory Merkle tree over a fixed list of leaves.
///
/// Levels are built bottom-up; an unpaired last node is promoted to the next
/// level unchanged, so it contributes no sibling to its proof at that level.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<H256>>,
}

impl MerkleTree {
    /// Build a tree. Returns `None` for an empty leaf list.
    pub fn from_leaves(leaves: Vec<H256>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => *single,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        Some(Self { levels })
    }

    /// Hash every item with [`hash_leaf`] and build a tree over the results.
    pub fn from_contents<T: AsRef<[u8]>>(contents: &[T]) -> Option<Self> {
        Self::from_leaves(contents.iter().map(|item| hash_leaf(item.as_ref())).collect())
    }

    pub fn root(&self) -> H256 {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(H256::ZERO)
    }

    pub fn leaves(&self) -> &[H256] {
        &self.levels[0]
    }

    /// Number of leaves; at least one.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Sibling path for the leaf at `index`, or `None` if out of range.
    pub fn proof(&self, index: usize) -> Option<Vec<H256>> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut proof = Vec::with_capacity(self.levels.len());
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            if let Some(sibling) = level.get(position ^ 1) {
                proof.push(*sibling);
            }
            position /= 2;
        }
        Some(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(count: usize) -> Vec<String> {
        (0..count).map(|index| format!("branch:{index}")).collect()
    }

    fn flip(hash: &H256, byte: usize) -> H256 {
        let mut bytes = hash.0;
        bytes[byte] ^= 0x01;
        H256(bytes)
    }

    #[test]
    fn pair_hash_is_order_independent() {
        let a = hash_leaf(b"a");
        let b = hash_leaf(b"b");
        assert_eq!(hash_pair(&a, &b), hash_pair(&b, &a));
        assert_ne!(hash_pair(&a, &b), hash_pair(&a, &a));
    }

    #[test]
    fn every_leaf_verifies_for_several_tree_sizes() {
        for size in 1..=17 {
            let tree = MerkleTree::from_contents(&contents(size)).unwrap();
            assert_eq!(tree.leaf_count(), size);
            assert!(tree.proof(size).is_none());
            let root = tree.root();
            for (index, leaf) in tree.leaves().iter().enumerate() {
                let proof = tree.proof(index).unwrap();
                assert!(verify(&root, leaf, &proof), "size {size}, leaf {index}");
            }
        }
    }

    #[test]
    fn single_leaf_tree_has_empty_proof() {
        let tree = MerkleTree::from_contents(&["only"]).unwrap();
        assert_eq!(tree.root(), hash_leaf(b"only"));
        assert!(tree.proof(0).unwrap().is_empty());
        assert!(verify(&tree.root(), &hash_leaf(b"only"), &[]));
    }

    #[test]
    fn empty_tree_is_rejected() {
        assert!(MerkleTree::from_leaves(Vec::new()).is_none());
    }

    #[test]
    fn out_of_range_index_has_no_proof() {
        let tree = MerkleTree::from_contents(&contents(4)).unwrap();
        assert!(tree.proof(4).is_none());
    }

    #[test]
    fn flipping_any_byte_breaks_verification() {
        let tree = MerkleTree::from_contents(&contents(6)).unwrap();
        let root = tree.root();
        let leaf = tree.leaves()[3];
        let proof = tree.proof(3).unwrap();
        assert!(!proof.is_empty());

        for byte in 0..32 {
            assert!(!verify(&root, &flip(&leaf, byte), &proof));
            assert!(!verify(&flip(&root, byte), &leaf, &proof));
            for sibling in 0..proof.len() {
                let mut tampered = proof.clone();
                tampered[sibling] = flip(&tampered[sibling], byte);
                assert!(!verify(&root, &leaf, &tampered));
            }
        }
    }

    #[test]
    fn proof_for_one_leaf_does_not_prove_another() {
        let tree = MerkleTree::from_contents(&contents(8)).unwrap();
        let proof = tree.proof(2).unwrap();
        assert!(!verify(&tree.root(), &tree.leaves()[5], &proof));
        assert!(!verify(&tree.root(), &hash_leaf(b"branch:99"), &proof));
    }

    #[test]
    fn truncated_or_extended_proofs_fail() {
        let tree = MerkleTree::from_contents(&contents(8)).unwrap();
        let leaf = tree.leaves()[1];
        let mut proof = tree.proof(1).unwrap();

        let mut extended = proof.clone();
        extended.push(hash_leaf(b"extra"));
        assert!(!verify(&tree.root(), &leaf, &extended));

        proof.pop();
        assert!(!verify(&tree.root(), &leaf, &proof));
    }
}
