//! Pluggable learning modules.
//!
//! An agent picks a module when learning is enabled. The module decides how
//! claims and updates are checked against the agent's root; the coordinator
//! owns everything else (authorization, staleness, rate limits, commits).
//! Modules are registered under an account address, and that address is also
//! an authorized caller for every agent that selected the module.

use super::{Account, H256, LearningUpdate, proof};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub trait LearningModule: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs and API responses.
    fn name(&self) -> &'static str;

    /// Whether `leaf` is part of the learning tree summarized by `root`.
    fn verify_claim(&self, root: &H256, leaf: &H256, proof: &[H256]) -> bool;

    /// Structural check on an update request, run after the staleness and
    /// rate-limit checks pass.
    fn validate_update(&self, update: &LearningUpdate) -> bool;
}

/// Merkle-tree learning: claims and updates are sorted-pair membership proofs.
///
/// An update is accepted when its proof shows the metadata leaf is a member
/// of the new root. This is a membership check on the new tree, not a proof
/// that the new tree was derived from the previous one; the previous root is
/// guarded by the coordinator's staleness check.
#[derive(Debug, Default, Clone, Copy)]
pub struct MerkleTreeLearning;

impl MerkleTreeLearning {
    pub const NAME: &'static str = "merkle_tree";
}

impl LearningModule for MerkleTreeLearning {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn verify_claim(&self, root: &H256, leaf: &H256, proof: &[H256]) -> bool {
        proof::verify(root, leaf, proof)
    }

    fn validate_update(&self, update: &LearningUpdate) -> bool {
        proof::verify(&update.new_root, &update.metadata_leaf(), &update.proof)
    }
}

/// Module implementations by address.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<HashMap<Account, Arc<dyn LearningModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the module at `address`.
    pub fn register(&self, address: Account, module: Arc<dyn LearningModule>) {
        tracing::debug!(%address, module = module.name(), "learning module registered");
        self.modules
            .write()
            .expect("module registry lock poisoned")
            .insert(address, module);
    }

    pub fn get(&self, address: &Account) -> Option<Arc<dyn LearningModule>> {
        self.modules
            .read()
            .expect("module registry lock poisoned")
            .get(address)
            .cloned()
    }

    pub fn contains(&self, address: &Account) -> bool {
        self.modules
            .read()
            .expect("module registry lock poisoned")
            .contains_key(address)
    }
}
