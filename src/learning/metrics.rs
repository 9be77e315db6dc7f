//! Derived learning metrics: velocity and confidence.
//!
//! Both values are pure functions of a record's counters and timestamps and
//! are recomputed after every accepted mutation; nothing else writes them.
//!
//! - **Velocity** is learning events per day since the record was created:
//!   `events * 86400 / max(elapsed_secs, floor)`. The floor keeps a young
//!   record from reporting an enormous rate after its first update.
//! - **Confidence** combines two saturating terms,
//!   `a = I / (I + Ki)` for interactions and `b = E / (E + Ke)` for learning
//!   events, as `1 - (1 - a)(1 - b)`. Each term is non-decreasing in its
//!   counter and below 1, so the score is monotonic, bounded to `[0, 1]` and
//!   approaches 1 only as both counters grow.

use super::{ConfidenceConfig, FixedPoint, LearningConfig, LearningRecord};

use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: u128 = 86_400;

/// Recomputes derived metrics on a learning record.
#[derive(Debug, Clone)]
pub struct MetricsEngine {
    velocity_min_elapsed_secs: u64,
    confidence: ConfidenceConfig,
}

impl MetricsEngine {
    pub fn from_config(config: &LearningConfig) -> Self {
        Self {
            velocity_min_elapsed_secs: config.velocity_min_elapsed_secs,
            confidence: config.confidence.clone(),
        }
    }

    /// Overwrite `learning_velocity` and `confidence_score` from the record's
    /// counters as of `now`.
    pub fn recompute(&self, record: &mut LearningRecord, now: DateTime<Utc>) {
        record.learning_velocity = learning_velocity(
            record.learning_events,
            record.created_at,
            now,
            self.velocity_min_elapsed_secs,
        );
        record.confidence_score = confidence_score(
            record.total_interactions,
            record.learning_events,
            &self.confidence,
        );
    }
}

/// Learning events per day, in fixed point. Saturates at `u64::MAX`.
pub fn learning_velocity(
    learning_events: u64,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    min_elapsed_secs: u64,
) -> FixedPoint {
    let elapsed = u64::try_from((now - created_at).num_seconds()).unwrap_or(0);
    let elapsed = elapsed.max(min_elapsed_secs).max(1);

    let scaled = u128::from(learning_events) * SECONDS_PER_DAY * u128::from(FixedPoint::SCALE)
        / u128::from(elapsed);
    FixedPoint(u64::try_from(scaled).unwrap_or(u64::MAX))
}

/// Confidence in `[0, 1]`, in fixed point.
pub fn confidence_score(
    total_interactions: u64,
    learning_events: u64,
    config: &ConfidenceConfig,
) -> FixedPoint {
    let scale = u128::from(FixedPoint::SCALE);
    let interaction_term = saturating_ratio(total_interactions, config.interaction_saturation);
    let event_term = saturating_ratio(learning_events, config.event_saturation);

    let residual = (scale - interaction_term) * (scale - event_term) / scale;
    let score = (scale - residual).min(scale);
    FixedPoint(score as u64)
}

/// `count / (count + saturation)` scaled to fixed point, rounded down.
fn saturating_ratio(count: u64, saturation: u64) -> u128 {
    let count = u128::from(count);
    let denominator = count + u128::from(saturation);
    if denominator == 0 {
        return 0;
    }
    count * u128::from(FixedPoint::SCALE) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::{Account, AgentId, H256};
    use chrono::{Duration, TimeZone as _};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn confidence_is_zero_without_activity() {
        let score = confidence_score(0, 0, &ConfidenceConfig::default());
        assert_eq!(score, FixedPoint::ZERO);
    }

    #[test]
    fn confidence_at_saturation_points() {
        let config = ConfidenceConfig::default();
        assert_eq!(confidence_score(100, 0, &config), FixedPoint(500_000));
        assert_eq!(confidence_score(0, 10, &config), FixedPoint(500_000));
        assert_eq!(confidence_score(100, 10, &config), FixedPoint(750_000));
    }

    #[test]
    fn confidence_is_monotonic_and_bounded() {
        let config = ConfidenceConfig::default();
        let mut previous = FixedPoint::ZERO;
        let mut interactions = 0u64;
        let mut events = 0u64;
        for step in 0..5_000u64 {
            if step % 3 == 0 {
                events += 1;
            } else {
                interactions += 7;
            }
            let score = confidence_score(interactions, events, &config);
            assert!(score >= previous, "score dropped at step {step}");
            assert!(score <= FixedPoint::ONE);
            previous = score;
        }
        assert!(previous > FixedPoint(990_000));
    }

    #[test]
    fn confidence_saturates_for_huge_counters() {
        let score = confidence_score(u64::MAX, u64::MAX, &ConfidenceConfig::default());
        assert!(score <= FixedPoint::ONE);
        assert!(score >= FixedPoint(999_999));
    }

    #[test]
    fn zero_saturation_counts_any_activity_as_full() {
        let config = ConfidenceConfig {
            interaction_saturation: 0,
            event_saturation: 0,
        };
        assert_eq!(confidence_score(0, 0, &config), FixedPoint::ZERO);
        assert_eq!(confidence_score(1, 0, &config), FixedPoint::ONE);
    }

    #[test]
    fn velocity_uses_elapsed_floor() {
        let velocity = learning_velocity(5, start(), start() + Duration::minutes(5), 86_400);
        assert_eq!(velocity, FixedPoint(5 * FixedPoint::SCALE));
    }

    #[test]
    fn velocity_averages_over_record_lifetime() {
        let velocity = learning_velocity(30, start(), start() + Duration::days(10), 86_400);
        assert_eq!(velocity, FixedPoint(3 * FixedPoint::SCALE));
    }

    #[test]
    fn velocity_tolerates_clock_going_backwards() {
        let velocity = learning_velocity(2, start(), start() - Duration::hours(1), 0);
        // Elapsed clamps to one second.
        assert_eq!(velocity, FixedPoint(2 * 86_400 * FixedPoint::SCALE));
    }

    #[test]
    fn recompute_overwrites_derived_fields() {
        let engine = MetricsEngine::from_config(&LearningConfig::default());
        let mut record = LearningRecord::new(AgentId(1), Account::from("m"), H256([9; 32]), start());
        record.total_interactions = 100;
        record.learning_events = 10;
        record.confidence_score = FixedPoint(42);

        engine.recompute(&mut record, start() + Duration::days(2));
        assert_eq!(record.confidence_score, FixedPoint(750_000));
        assert_eq!(record.learning_velocity, FixedPoint(5 * FixedPoint::SCALE));
    }
}
