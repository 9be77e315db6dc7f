//! Fixed-window limiter for root-changing learning updates.
//!
//! Each record carries a [`DailyWindow`]: a counter and the instant the
//! current window opened. When a request arrives at or after
//! `started_at + window`, the window reopens at the request time with a zero
//! count before the limit is checked. Interactions are never counted here;
//! only `update_learning` consumes budget.

use super::LearningConfig;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Rate-limit bookkeeping stored on every learning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWindow {
    /// Updates accepted in the current window.
    pub count: u32,
    /// When the current window opened.
    pub started_at: DateTime<Utc>,
}

impl DailyWindow {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            started_at: now,
        }
    }

    /// The window as seen at `now`: reopened with a zero count if `now` is at
    /// or past the end of the current one.
    pub fn rolled(&self, now: DateTime<Utc>, length: Duration) -> Self {
        if now >= self.resets_at(length) {
            Self::new(now)
        } else {
            *self
        }
    }

    pub fn resets_at(&self, length: Duration) -> DateTime<Utc> {
        self.started_at
            .checked_add_signed(length)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Rejection details when the window's budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub limit: u32,
    pub resets_at: DateTime<Utc>,
}

/// Limit and window length for learning updates.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_updates: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn from_config(config: &LearningConfig) -> Self {
        let window_secs = i64::try_from(config.rate_window_secs).unwrap_or(i64::MAX);
        Self {
            max_updates: config.max_updates_per_day,
            window: Duration::try_seconds(window_secs).unwrap_or(Duration::MAX),
        }
    }

    /// Consume one update from `window` at `now`.
    ///
    /// On rejection `window` is left exactly as it was, rollover included.
    pub fn acquire(&self, window: &mut DailyWindow, now: DateTime<Utc>) -> Result<(), RateLimited> {
        let current = window.rolled(now, self.window);
        if current.count >= self.max_updates {
            return Err(RateLimited {
                limit: self.max_updates,
                resets_at: current.resets_at(self.window),
            });
        }

        *window = DailyWindow {
            count: current.count + 1,
            started_at: current.started_at,
        };
        Ok(())
    }

    /// Updates already spent in the window current at `now`.
    pub fn used(&self, window: &DailyWindow, now: DateTime<Utc>) -> u32 {
        window.rolled(now, self.window).count
    }

    /// Updates still available at `now`.
    pub fn remaining(&self, window: &DailyWindow, now: DateTime<Utc>) -> u32 {
        self.max_updates.saturating_sub(self.used(window, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn policy(max_updates: u32) -> RateLimitPolicy {
        RateLimitPolicy {
            max_updates,
            window: Duration::days(1),
        }
    }

    #[test]
    fn fresh_window_accepts_up_to_the_limit() {
        let policy = policy(50);
        let mut window = DailyWindow::new(start());

        for expected in 1..=50 {
            policy.acquire(&mut window, start()).unwrap();
            assert_eq!(window.count, expected);
        }

        let rejected = policy.acquire(&mut window, start()).unwrap_err();
        assert_eq!(rejected.limit, 50);
        assert_eq!(rejected.resets_at, start() + Duration::days(1));
        assert_eq!(window.count, 50);
    }

    #[test]
    fn window_reopens_after_its_length() {
        let policy = policy(2);
        let mut window = DailyWindow::new(start());
        policy.acquire(&mut window, start()).unwrap();
        policy.acquire(&mut window, start()).unwrap();

        let almost = start() + Duration::days(1) - Duration::seconds(1);
        assert!(policy.acquire(&mut window, almost).is_err());

        let later = start() + Duration::days(1);
        policy.acquire(&mut window, later).unwrap();
        assert_eq!(window.count, 1);
        assert_eq!(window.started_at, later);
    }

    #[test]
    fn reopened_window_is_anchored_at_the_request_time() {
        let policy = policy(1);
        let mut window = DailyWindow::new(start());
        policy.acquire(&mut window, start()).unwrap();

        let late = start() + Duration::hours(30);
        policy.acquire(&mut window, late).unwrap();
        // The next window ends a day after `late`, not at the next calendar boundary.
        let rejected = policy.acquire(&mut window, late + Duration::hours(23)).unwrap_err();
        assert_eq!(rejected.resets_at, late + Duration::days(1));
    }

    #[test]
    fn rejection_leaves_window_untouched() {
        let policy = policy(0);
        let mut window = DailyWindow::new(start());
        let before = window;
        assert!(policy.acquire(&mut window, start() + Duration::days(3)).is_err());
        assert_eq!(window, before);
    }

    #[test]
    fn remaining_accounts_for_rollover() {
        let policy = policy(3);
        let mut window = DailyWindow::new(start());
        policy.acquire(&mut window, start()).unwrap();
        assert_eq!(policy.remaining(&window, start()), 2);
        assert_eq!(policy.used(&window, start()), 1);

        let lapsed = start() + Duration::days(2);
        assert_eq!(policy.remaining(&window, lapsed), 3);
        assert_eq!(policy.used(&window, lapsed), 0);
        // Reading never rolls the stored window.
        assert_eq!(window.count, 1);
    }
}
