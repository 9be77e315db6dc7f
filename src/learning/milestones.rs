//! One-time milestone notifications.
//!
//! After every recomputation the detector walks its thresholds and reports
//! each one that the record now satisfies and has not reported before. The
//! reported milestone is added to `milestones_reached`, so a threshold fires at
//! most once per record lifetime. Re-enabling learning creates a fresh record
//! with an empty set.

use super::{FixedPoint, LearningConfig, LearningRecord, Milestone};

/// Fixed thresholds on interactions, learning events and confidence.
#[derive(Debug, Clone, Default)]
pub struct MilestoneDetector {
    thresholds: Vec<Milestone>,
}

impl MilestoneDetector {
    pub fn new(thresholds: impl IntoIterator<Item = Milestone>) -> Self {
        let mut thresholds: Vec<Milestone> = thresholds.into_iter().collect();
        thresholds.sort();
        thresholds.dedup();
        Self { thresholds }
    }

    pub fn from_config(config: &LearningConfig) -> Self {
        let interactions = config
            .interaction_milestones
            .iter()
            .map(|threshold| Milestone::Interactions(*threshold));
        let events = config
            .learning_event_milestones
            .iter()
            .map(|threshold| Milestone::LearningEvents(*threshold));
        let confidence = config
            .confidence_milestones
            .iter()
            .map(|threshold| Milestone::Confidence(FixedPoint::from_f64(*threshold)));
        Self::new(interactions.chain(events).chain(confidence))
    }

    pub fn thresholds(&self) -> &[Milestone] {
        &self.thresholds
    }

    /// Mark and return every threshold newly satisfied by `record`.
    pub fn detect(&self, record: &mut LearningRecord) -> Vec<Milestone> {
        let mut reached = Vec::new();
        for milestone in &self.thresholds {
            if record.milestones_reached.contains(milestone) || !milestone.is_satisfied_by(record) {
                continue;
            }
            record.milestones_reached.insert(*milestone);
            reached.push(*milestone);
        }
        reached
    }
}
