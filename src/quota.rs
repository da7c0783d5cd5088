//! Daily free-request accounting.
//!
//! A profile stores how many free requests it used and when its current
//! window started. Windows are UTC calendar days. The stored counter is
//! never trusted as-is: a window that began before today's UTC midnight
//! means the counter belongs to an earlier day and is effectively zero.

use chrono::{DateTime, Days, NaiveTime, Utc};

pub const DEFAULT_FREE_REQUESTS_PER_DAY: u32 = 5;

/// The stored part of a profile that the window rule cares about.
pub trait Usage {
    fn used(&self) -> u32;
    fn window_start(&self) -> DateTime<Utc>;
}

#[must_use]
pub fn current_window_start() -> DateTime<Utc> {
    current_window_start_at(Utc::now())
}

#[must_use]
pub fn current_window_start_at(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// When the window containing `now` ends.
#[must_use]
pub fn next_window_start_at(now: DateTime<Utc>) -> DateTime<Utc> {
    let start = current_window_start_at(now);
    start.checked_add_days(Days::new(1)).unwrap_or(start)
}

#[must_use]
pub fn is_window_stale(window_start: DateTime<Utc>) -> bool {
    is_window_stale_at(window_start, Utc::now())
}

/// Compared against the midnight of `now`, not of `window_start`.
#[must_use]
pub fn is_window_stale_at(
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    window_start < current_window_start_at(now)
}

#[must_use]
pub fn effective_usage<U: Usage>(profile: &U) -> u32 {
    effective_usage_at(profile, Utc::now())
}

#[must_use]
pub fn effective_usage_at<U: Usage>(profile: &U, now: DateTime<Utc>) -> u32 {
    if is_window_stale_at(profile.window_start(), now) {
        0
    } else {
        profile.used()
    }
}

#[must_use]
pub fn remaining(effective_usage: u32, limit: u32) -> u32 {
    limit.saturating_sub(effective_usage)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;

    struct Stored {
        used: u32,
        window_start: DateTime<Utc>,
    }

    impl Usage for Stored {
        fn used(&self) -> u32 {
            self.used
        }

        fn window_start(&self) -> DateTime<Utc> {
            self.window_start
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap()
    }

    fn today() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap()
    }

    #[test]
    fn window_start_is_utc_midnight() {
        assert_eq!(current_window_start_at(now()), today());
        assert_eq!(current_window_start_at(today()), today());
        let last_instant = today() + Duration::days(1) - Duration::nanoseconds(1);
        assert_eq!(current_window_start_at(last_instant), today());
    }

    #[test]
    fn window_start_is_idempotent_within_a_day() {
        let a = current_window_start_at(now());
        let b = current_window_start_at(now() + Duration::hours(8));
        assert_eq!(a, b);
        assert_eq!(current_window_start_at(a), a);
    }

    #[test]
    fn next_window_is_tomorrow() {
        assert_eq!(next_window_start_at(now()), today() + Duration::days(1));
    }

    #[test]
    fn stale_only_strictly_before_todays_midnight() {
        assert!(is_window_stale_at(today() - Duration::seconds(1), now()));
        assert!(is_window_stale_at(today() - Duration::days(30), now()));
        assert!(!is_window_stale_at(today(), now()));
        assert!(!is_window_stale_at(now(), now()));
        // A window from the future (clock skew) is not stale either.
        assert!(!is_window_stale_at(now() + Duration::days(2), now()));
    }

    #[test]
    fn stale_window_means_zero_usage() {
        for used in 0..=DEFAULT_FREE_REQUESTS_PER_DAY {
            for days_ago in 1..4 {
                let profile = Stored {
                    used,
                    window_start: today() - Duration::days(days_ago),
                };
                assert_eq!(effective_usage_at(&profile, now()), 0);
            }
        }
    }

    #[test]
    fn current_window_keeps_stored_usage() {
        for used in 0..=DEFAULT_FREE_REQUESTS_PER_DAY {
            for window_start in [today(), today() + Duration::hours(3)] {
                let profile = Stored { used, window_start };
                assert_eq!(effective_usage_at(&profile, now()), used);
            }
        }
    }

    #[test]
    fn remaining_is_bounded() {
        let limit = DEFAULT_FREE_REQUESTS_PER_DAY;
        for used in 0..=limit + 3 {
            let r = remaining(used, limit);
            assert!(r <= limit);
            assert_eq!(r, limit.saturating_sub(used));
        }
        assert_eq!(remaining(3, limit), 2);
        assert_eq!(remaining(5, limit), 0);
        assert_eq!(remaining(9, limit), 0);
    }

    #[test]
    fn wall_clock_variants_agree() {
        let profile = Stored {
            used: 2,
            window_start: current_window_start(),
        };
        assert!(!is_window_stale(profile.window_start));
        assert_eq!(effective_usage(&profile), 2);
    }
}
