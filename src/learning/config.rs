//! Learning engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the learning engine.
///
/// Loaded from `[learning]` in the config file. Everything except
/// `confidence` can be swapped at runtime through
/// [`super::LearningCoordinator::reload_config`]. Defaults: 50 updates per
/// day, milestones at 100/1000 interactions, 10/100 learning events and
/// 80%/95% confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LearningConfig {
    /// Maximum accepted `update_learning` calls per agent per window.
    pub max_updates_per_day: u32,
    /// Length of the rate-limit window in seconds.
    pub rate_window_secs: u64,
    /// Floor on the elapsed time used for learning velocity, in seconds.
    pub velocity_min_elapsed_secs: u64,
    /// `total_interactions` thresholds that fire a milestone.
    pub interaction_milestones: Vec<u64>,
    /// `learning_events` thresholds that fire a milestone.
    pub learning_event_milestones: Vec<u64>,
    /// `confidence_score` thresholds in `(0, 1]`.
    pub confidence_milestones: Vec<f64>,
    /// Confidence model constants.
    pub confidence: ConfidenceConfig,
    /// Capacity of the broadcast channel carrying learning events.
    pub event_channel_capacity: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_updates_per_day: 50,
            rate_window_secs: 86_400,
            velocity_min_elapsed_secs: 86_400,
            interaction_milestones: vec![100, 1000],
            learning_event_milestones: vec![10, 100],
            confidence_milestones: vec![0.80, 0.95],
            confidence: ConfidenceConfig::default(),
            event_channel_capacity: 256,
        }
    }
}

impl LearningConfig {
    /// Check value ranges. Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.rate_window_secs == 0 {
            return Err("learning.rate_window_secs must be at least 1".into());
        }
        if self.rate_window_secs > i64::MAX as u64 / 1000 {
            return Err("learning.rate_window_secs is out of range".into());
        }
        if self.event_channel_capacity == 0 {
            return Err("learning.event_channel_capacity must be at least 1".into());
        }
        if let Some(threshold) = self
            .confidence_milestones
            .iter()
            .find(|threshold| !(**threshold > 0.0 && **threshold <= 1.0))
        {
            return Err(format!(
                "learning.confidence_milestones entry {threshold} is outside (0, 1]"
            ));
        }
        Ok(())
    }
}

/// Constants of the confidence model.
///
/// Each counter contributes `count / (count + saturation)`; the saturation
/// value is the count at which that counter alone gives 50% confidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConfidenceConfig {
    pub interaction_saturation: u64,
    pub event_saturation: u64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            interaction_saturation: 100,
            event_saturation: 10,
        }
    }
}
