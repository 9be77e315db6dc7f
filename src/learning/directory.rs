//! Agent ownership lookups.
//!
//! Ownership and delegation belong to the token contract, not to this engine.
//! The coordinator only asks two questions through [`AgentDirectory`]: who
//! owns an agent, and whether an account is one of its delegates.

use super::{Account, AgentId};

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Read access to agent ownership and delegation.
pub trait AgentDirectory: Send + Sync {
    /// The current owner, or `None` if the agent does not exist.
    fn owner_of(&self, agent_id: AgentId) -> Option<Account>;

    /// Whether `account` may act on the agent on the owner's behalf.
    fn is_delegate(&self, agent_id: AgentId, account: &Account) -> bool;
}

/// Directory held in memory, seeded from configuration or by an embedding
/// application that mirrors the token contract.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    owners: RwLock<HashMap<AgentId, Account>>,
    delegates: RwLock<HashMap<AgentId, HashSet<Account>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owner. A change of owner drops every delegate of the agent,
    /// the same way a token transfer clears approvals.
    pub fn set_owner(&self, agent_id: AgentId, owner: Account) {
        let previous = self
            .owners
            .write()
            .expect("owners lock poisoned")
            .insert(agent_id, owner.clone());

        if previous.is_some_and(|previous| previous != owner) {
            self.delegates
                .write()
                .expect("delegates lock poisoned")
                .remove(&agent_id);
        }
    }

    pub fn add_delegate(&self, agent_id: AgentId, delegate: Account) {
        self.delegates
            .write()
            .expect("delegates lock poisoned")
            .entry(agent_id)
            .or_default()
            .insert(delegate);
    }

    pub fn remove_delegate(&self, agent_id: AgentId, delegate: &Account) {
        if let Some(delegates) = self
            .delegates
            .write()
            .expect("delegates lock poisoned")
            .get_mut(&agent_id)
        {
            delegates.remove(delegate);
        }
    }
}

impl AgentDirectory for InMemoryDirectory {
    fn owner_of(&self, agent_id: AgentId) -> Option<Account> {
        self.owners
            .read()
            .expect("owners lock poisoned")
            .get(&agent_id)
            .cloned()
    }

    fn is_delegate(&self, agent_id: AgentId, account: &Account) -> bool {
        self.delegates
            .read()
            .expect("delegates lock poisoned")
            .get(&agent_id)
            .is_some_and(|delegates| delegates.contains(account))
    }
}
