//! Shared fixtures for learning tests.

use super::proof::{MerkleTree, hash_leaf};
use super::{
    Account, AgentId, H256, InMemoryDirectory, LearningConfig, LearningCoordinator, LearningEvent,
    LearningRecord, LearningStore, LearningUpdate, ManualClock, MerkleTreeLearning, Milestone,
    ModuleRegistry,
};

use chrono::{TimeZone as _, Utc};
use tokio::sync::broadcast;

use std::sync::Arc;

pub const OWNER: &str = "0xowner";
pub const MODULE: &str = "0xmerkle";
pub const AGENT: AgentId = AgentId(7);

/// A deterministic non-zero hash.
pub fn payload(index: u64) -> H256 {
    hash_leaf(format!("payload-{index}").as_bytes())
}

/// An update that moves `previous_root` to a fresh tree containing `label`
/// as metadata, with a valid membership proof.
pub fn chained_update(previous_root: H256, label: &str) -> LearningUpdate {
    let metadata = format!("{{\"label\":\"{label}\"}}").into_bytes();
    let sibling = format!("{}:{label}", previous_root.to_hex()).into_bytes();
    let tree = MerkleTree::from_contents(&[metadata.clone(), sibling])
        .expect("two leaves always build a tree");
    LearningUpdate {
        previous_root,
        new_root: tree.root(),
        proof: tree.proof(0).expect("leaf 0 exists"),
        metadata,
    }
}

/// Pull every pending milestone event off a receiver.
pub fn drain_milestones(receiver: &mut broadcast::Receiver<LearningEvent>) -> Vec<Milestone> {
    let mut milestones = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(LearningEvent::MilestoneAchieved { milestone, .. }) => milestones.push(milestone),
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    milestones
}

/// A coordinator over a temporary learning.db with one agent owned by [`OWNER`] and
/// the Merkle module registered at [`MODULE`].
pub struct Harness {
    pub coordinator: Arc<LearningCoordinator>,
    pub directory: Arc<InMemoryDirectory>,
    pub clock: Arc<ManualClock>,
    pub agent: AgentId,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(LearningConfig::default()).await
    }

    pub async fn with_config(config: LearningConfig) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LearningStore::connect_in(dir.path())
            .await
            .expect("test database opens");

        let directory = Arc::new(InMemoryDirectory::new());
        directory.set_owner(AGENT, Account::from(OWNER));

        let modules = Arc::new(ModuleRegistry::new());
        modules.register(Account::from(MODULE), Arc::new(MerkleTreeLearning));

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let coordinator =
            LearningCoordinator::new(store, directory.clone(), modules, config)
                .with_clock(clock.clone());

        Self {
            coordinator: Arc::new(coordinator),
            directory,
            clock,
            agent: AGENT,
            _dir: dir,
        }
    }

    pub fn owner(&self) -> Account {
        Account::from(OWNER)
    }

    /// Enable learning with the Merkle module and return the initial root.
    pub async fn enable(&self) -> H256 {
        let root = hash_leaf(b"genesis");
        self.coordinator
            .enable_learning(&self.owner(), self.agent, Account::from(MODULE), root)
            .await
            .unwrap();
        root
    }

    pub async fn record(&self) -> LearningRecord {
        self.coordinator
            .get_record(self.agent)
            .await
            .unwrap()
            .expect("record exists")
    }
}
