//! Data types for the learning engine.

use super::rate_limit::DailyWindow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Hashes
// ---------------------------------------------------------------------------

/// A 32-byte SHA-256 digest: learning roots, leaves and proof siblings.
///
/// Ordering is lexicographic over the raw bytes, which is what the sorted-pair
/// combiner in [`super::proof`] relies on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct H256(#[serde(with = "hex::serde")] pub [u8; 32]);

impl H256 {
    /// The all-zero hash. Never a valid learning root.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl FromStr for H256 {
    type Err = hex::FromHexError;

    /// Parse 64 hex characters, with or without a `0x` prefix.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.strip_prefix("0x").unwrap_or(value);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = hex::encode(self.0);
        write!(f, "H256({}..{})", &encoded[..8], &encoded[56..])
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Token identifier of a non-fungible agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AgentId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.parse().map(Self)
    }
}

/// An account acting on the engine: an agent owner, a delegate, or the
/// address a learning module is registered under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(pub String);

impl Account {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Account {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Account {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Fixed point
// ---------------------------------------------------------------------------

/// Unsigned fixed-point number with six decimal places (`1.0 == 1_000_000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedPoint(pub u64);

impl FixedPoint {
    pub const SCALE: u64 = 1_000_000;
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(Self::SCALE);

    /// Convert a float, rounding to the nearest millionth. Negative and NaN
    /// inputs map to zero.
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() || value <= 0.0 {
            return Self::ZERO;
        }
        let scaled = (value * Self::SCALE as f64).round();
        if scaled >= u64::MAX as f64 {
            Self(u64::MAX)
        } else {
            Self(scaled as u64)
        }
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }
}

// ---------------------------------------------------------------------------
// Milestones
// ---------------------------------------------------------------------------

/// A one-time threshold on one of the record's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "threshold", rename_all = "snake_case")]
pub enum Milestone {
    /// `total_interactions` reached the threshold.
    Interactions(u64),
    /// `learning_events` reached the threshold.
    LearningEvents(u64),
    /// `confidence_score` reached the threshold.
    Confidence(FixedPoint),
}

impl Milestone {
    /// Whether the record currently satisfies this milestone's condition.
    pub fn is_satisfied_by(&self, record: &LearningRecord) -> bool {
        match self {
            Self::Interactions(threshold) => record.total_interactions >= *threshold,
            Self::LearningEvents(threshold) => record.learning_events >= *threshold,
            Self::Confidence(threshold) => record.confidence_score >= *threshold,
        }
    }

    /// The metric value this milestone is measured against.
    pub fn observed_value(&self, record: &LearningRecord) -> u64 {
        match self {
            Self::Interactions(_) => record.total_interactions,
            Self::LearningEvents(_) => record.learning_events,
            Self::Confidence(_) => record.confidence_score.raw(),
        }
    }

    /// Storage key, e.g. `interactions:100`.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Parse a storage key produced by [`Milestone::key`].
    pub fn from_key(key: &str) -> Option<Self> {
        let (kind, threshold) = key.split_once(':')?;
        let threshold: u64 = threshold.parse().ok()?;
        match kind {
            "interactions" => Some(Self::Interactions(threshold)),
            "learning_events" => Some(Self::LearningEvents(threshold)),
            "confidence" => Some(Self::Confidence(FixedPoint(threshold))),
            _ => None,
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactions(threshold) => write!(f, "interactions:{threshold}"),
            Self::LearningEvents(threshold) => write!(f, "learning_events:{threshold}"),
            Self::Confidence(threshold) => write!(f, "confidence:{}", threshold.raw()),
        }
    }
}

// ---------------------------------------------------------------------------
// Learning record
// ---------------------------------------------------------------------------

/// Per-agent learning state anchored by a Merkle root.
///
/// Created when learning is enabled, mutated only by the coordinator, never
/// deleted. A disabled record is read-only history until the owner enables
/// learning again, which replaces it with a fresh record.
///
/// Timestamps carry millisecond precision, the precision learning.db stores.
/// `rate_window.count` is the count as of the last update; ask the coordinator
/// for the count in the window current now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub agent_id: AgentId,
    /// Address of the learning module selected when learning was enabled.
    pub module: Account,
    pub root: H256,
    /// 1 on enable, +1 per accepted update.
    pub version: u64,
    pub total_interactions: u64,
    /// Accepted root updates.
    pub learning_events: u64,
    /// Start of this record's lifetime; the origin of the velocity clock.
    pub created_at: DateTime<Utc>,
    pub last_update_timestamp: DateTime<Utc>,
    /// Learning events per day.
    pub learning_velocity: FixedPoint,
    pub confidence_score: FixedPoint,
    pub rate_window: DailyWindow,
    pub learning_enabled: bool,
    pub milestones_reached: BTreeSet<Milestone>,
}

impl LearningRecord {
    /// A fresh record at version 1 with zeroed counters.
    pub fn new(agent_id: AgentId, module: Account, root: H256, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            module,
            root,
            version: 1,
            total_interactions: 0,
            learning_events: 0,
            created_at: now,
            last_update_timestamp: now,
            learning_velocity: FixedPoint::ZERO,
            confidence_score: FixedPoint::ZERO,
            rate_window: DailyWindow::new(now),
            learning_enabled: true,
            milestones_reached: BTreeSet::new(),
        }
    }

    pub fn metrics(&self) -> LearningMetrics {
        LearningMetrics {
            total_interactions: self.total_interactions,
            learning_events: self.learning_events,
            last_update_timestamp: self.last_update_timestamp,
            learning_velocity: self.learning_velocity,
            confidence_score: self.confidence_score,
        }
    }
}

/// Public view of a record's counters and derived metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub total_interactions: u64,
    pub learning_events: u64,
    pub last_update_timestamp: DateTime<Utc>,
    pub learning_velocity: FixedPoint,
    pub confidence_score: FixedPoint,
}

// ---------------------------------------------------------------------------
// Update requests
// ---------------------------------------------------------------------------

/// A request to move an agent's learning root forward.
///
/// `proof` shows that the metadata leaf (`hash_leaf(metadata)`) is a member of
/// `new_root`. An empty proof means the metadata leaf is the new root itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningUpdate {
    /// The root the caller believes is current.
    pub previous_root: H256,
    pub new_root: H256,
    #[serde(default)]
    pub proof: Vec<H256>,
    #[serde(with = "hex::serde", default)]
    pub metadata: Vec<u8>,
}

impl LearningUpdate {
    /// The leaf this update's proof is anchored on.
    pub fn metadata_leaf(&self) -> H256 {
        super::proof::hash_leaf(&self.metadata)
    }
}

/// Result of an accepted mutation.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// The record as committed.
    pub record: LearningRecord,
    /// Milestones first reached by this mutation.
    pub milestones: Vec<Milestone>,
}
