//! Learning events: broadcast to subscribers and persisted to the audit log.

use super::{Account, AgentId, H256, Milestone};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something that happened to an agent's learning record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LearningEvent {
    LearningEnabled {
        agent_id: AgentId,
        module: Account,
        initial_root: H256,
        at: DateTime<Utc>,
    },
    LearningDisabled {
        agent_id: AgentId,
        at: DateTime<Utc>,
    },
    InteractionRecorded {
        agent_id: AgentId,
        payload_hash: H256,
        total_interactions: u64,
        at: DateTime<Utc>,
    },
    LearningUpdated {
        agent_id: AgentId,
        previous_root: H256,
        new_root: H256,
        version: u64,
        at: DateTime<Utc>,
    },
    MilestoneAchieved {
        agent_id: AgentId,
        milestone: Milestone,
        value: u64,
        at: DateTime<Utc>,
    },
}

impl LearningEvent {
    pub fn agent_id(&self) -> AgentId {
        match self {
            Self::LearningEnabled { agent_id, .. }
            | Self::LearningDisabled { agent_id, .. }
            | Self::InteractionRecorded { agent_id, .. }
            | Self::LearningUpdated { agent_id, .. }
            | Self::MilestoneAchieved { agent_id, .. } => *agent_id,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::LearningEnabled { at, .. }
            | Self::LearningDisabled { at, .. }
            | Self::InteractionRecorded { at, .. }
            | Self::LearningUpdated { at, .. }
            | Self::MilestoneAchieved { at, .. } => *at,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LearningEnabled { .. } => "learning_enabled",
            Self::LearningDisabled { .. } => "learning_disabled",
            Self::InteractionRecorded { .. } => "interaction_recorded",
            Self::LearningUpdated { .. } => "learning_updated",
            Self::MilestoneAchieved { .. } => "milestone_achieved",
        }
    }

    /// One-line description for the audit log.
    pub fn summary(&self) -> String {
        match self {
            Self::LearningEnabled {
                module,
                initial_root,
                ..
            } => format!("learning enabled with module {module} at root {initial_root}"),
            Self::LearningDisabled { .. } => "learning disabled".to_string(),
            Self::InteractionRecorded {
                total_interactions, ..
            } => format!("interaction #{total_interactions} recorded"),
            Self::LearningUpdated {
                new_root, version, ..
            } => format!("root moved to {new_root} (version {version})"),
            Self::MilestoneAchieved {
                milestone, value, ..
            } => format!("milestone {milestone} reached at {value}"),
        }
    }
}

/// An event as read back from the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEvent {
    pub id: String,
    pub agent_id: AgentId,
    pub event_type: String,
    pub summary: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = LearningEvent::MilestoneAchieved {
            agent_id: AgentId(4),
            milestone: Milestone::Interactions(100),
            value: 100,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "milestone_achieved");
        assert_eq!(json["agent_id"], 4);
        assert_eq!(json["milestone"]["kind"], "interactions");
        assert_eq!(json["milestone"]["threshold"], 100);
        assert_eq!(event.event_type(), "milestone_achieved");
        assert_eq!(event.summary(), "milestone interactions:100 reached at 100");
    }
}
