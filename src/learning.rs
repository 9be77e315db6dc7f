//! Learning verification and update engine.
//!
//! Each agent's accumulated learning lives off-line in a Merkle tree; this
//! module keeps only the tree's root plus counters, and guards how that root
//! moves. Updates are serialized per agent, must present the root they were
//! computed against, are rate limited per day, and must carry a membership
//! proof for their metadata. Velocity, confidence and milestones are derived
//! after every accepted mutation and broadcast as [`LearningEvent`]s.

mod clock;
mod config;
mod coordinator;
mod directory;
mod events;
mod metrics;
mod milestones;
mod module;
pub mod proof;
mod rate_limit;
mod store;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfidenceConfig, LearningConfig};
pub use coordinator::LearningCoordinator;
pub use directory::{AgentDirectory, InMemoryDirectory};
pub use events::{LearningEvent, StoredEvent};
pub use metrics::{MetricsEngine, confidence_score, learning_velocity};
pub use milestones::MilestoneDetector;
pub use module::{LearningModule, MerkleTreeLearning, ModuleRegistry};
pub use rate_limit::{DailyWindow, RateLimitPolicy, RateLimited};
pub use store::{LearningStore, RecordCommit};
pub use types::*;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Learning engine errors.
///
/// Every variant is returned before any state changes; a failed call leaves
/// the record exactly as it was.
#[derive(Debug, Error)]
pub enum LearningError {
    #[error("learning is not enabled for agent {agent_id}")]
    LearningNotEnabled { agent_id: AgentId },

    #[error("{caller} is not authorized to act on agent {agent_id}")]
    Unauthorized { agent_id: AgentId, caller: Account },

    #[error("agent {agent_id} used all {limit} learning updates for this window; it resets at {resets_at}")]
    RateLimitExceeded {
        agent_id: AgentId,
        limit: u32,
        resets_at: DateTime<Utc>,
    },

    #[error("stale root for agent {agent_id}: presented {presented}, current is {current} at version {version}")]
    StaleRoot {
        agent_id: AgentId,
        presented: H256,
        current: H256,
        version: u64,
    },

    #[error("learning proof rejected for agent {agent_id}")]
    InvalidProof { agent_id: AgentId },

    #[error("learning is already enabled for agent {agent_id}")]
    AlreadyEnabled { agent_id: AgentId },

    #[error("agent {agent_id} not found")]
    AgentNotFound { agent_id: AgentId },

    #[error("learning module {module} is not registered")]
    UnknownModule { module: Account },

    #[error("the zero hash is not a valid learning root")]
    InvalidRoot,

    #[error("invalid learning config: {reason}")]
    InvalidConfig { reason: String },

    #[error("learning database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LearningError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LearningNotEnabled { .. } => "learning_not_enabled",
            Self::Unauthorized { .. } => "unauthorized",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::StaleRoot { .. } => "stale_root",
            Self::InvalidProof { .. } => "invalid_proof",
            Self::AlreadyEnabled { .. } => "already_enabled",
            Self::AgentNotFound { .. } => "agent_not_found",
            Self::UnknownModule { .. } => "unknown_module",
            Self::InvalidRoot => "invalid_root",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Database(_) => "database",
            Self::Other(_) => "internal",
        }
    }

    /// Whether the caller may resubmit: after the rate window reopens, or
    /// with a previous root re-read from the record. The engine itself never
    /// retries.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. } | Self::StaleRoot { .. })
    }
}
