//! Cadence window arithmetic
//!
//! Quota windows are anchored to the calendar, not to the redemption
//! times: weekly windows run Monday 00:00 to Monday 00:00 (ISO week),
//! monthly and yearly follow the calendar. All boundaries are UTC
//! midnights.
//!
//! Quarterly shares the monthly bucket - the source system consumes
//! quarterly quota per calendar month, and that rule is preserved here
//! rather than silently widened to a three-month window.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};

use super::Cadence;

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// First instant of the window containing `now`
pub fn window_start(cadence: Cadence, now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let start = match cadence {
        Cadence::Weekly => {
            date - Days::new(u64::from(date.weekday().num_days_from_monday()))
        }
        Cadence::Monthly | Cadence::Quarterly => date.with_day(1).unwrap_or(date),
        Cadence::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
    };
    midnight(start)
}

/// First instant after `now` at which the window resets
pub fn next_boundary(cadence: Cadence, now: DateTime<Utc>) -> DateTime<Utc> {
    let start = window_start(cadence, now).date_naive();
    let next = match cadence {
        Cadence::Weekly => start + Days::new(7),
        Cadence::Monthly | Cadence::Quarterly => {
            start.checked_add_months(Months::new(1)).unwrap_or(start + Days::new(31))
        }
        Cadence::Yearly => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
            .unwrap_or(start + Days::new(366)),
    };
    midnight(next)
}

/// Whether `ts` falls inside the window containing `now`
pub fn in_current_window(cadence: Cadence, now: DateTime<Utc>, ts: DateTime<Utc>) -> bool {
    ts >= window_start(cadence, now) && ts < next_boundary(cadence, now)
}

/// Calendar days from `now` until `boundary`
pub fn days_until(boundary: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (boundary.date_naive() - now.date_naive()).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_weekly_window_is_iso_week() {
        // 2025-06-11 is a Wednesday; its ISO week runs Mon 06-09 .. Mon 06-16
        let now = at("2025-06-11T15:30:00Z");
        assert_eq!(window_start(Cadence::Weekly, now), at("2025-06-09T00:00:00Z"));
        assert_eq!(next_boundary(Cadence::Weekly, now), at("2025-06-16T00:00:00Z"));
    }

    #[test]
    fn test_weekly_window_on_monday_starts_same_day() {
        let monday = at("2025-06-09T08:00:00Z");
        assert_eq!(window_start(Cadence::Weekly, monday), at("2025-06-09T00:00:00Z"));
    }

    #[test]
    fn test_monthly_window() {
        let now = at("2025-02-10T12:00:00Z");
        assert_eq!(window_start(Cadence::Monthly, now), at("2025-02-01T00:00:00Z"));
        assert_eq!(next_boundary(Cadence::Monthly, now), at("2025-03-01T00:00:00Z"));
    }

    #[test]
    fn test_monthly_boundary_wraps_year() {
        let now = at("2025-12-15T00:00:00Z");
        assert_eq!(next_boundary(Cadence::Monthly, now), at("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_quarterly_aliases_monthly_bucket() {
        let now = at("2025-05-20T00:00:00Z");
        assert_eq!(
            window_start(Cadence::Quarterly, now),
            window_start(Cadence::Monthly, now)
        );
        assert_eq!(
            next_boundary(Cadence::Quarterly, now),
            next_boundary(Cadence::Monthly, now)
        );
    }

    #[test]
    fn test_yearly_window() {
        let now = at("2025-06-01T09:00:00Z");
        assert_eq!(window_start(Cadence::Yearly, now), at("2025-01-01T00:00:00Z"));
        assert_eq!(next_boundary(Cadence::Yearly, now), at("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn test_in_current_window() {
        let now = at("2025-06-11T12:00:00Z");
        assert!(in_current_window(Cadence::Weekly, now, at("2025-06-09T00:00:00Z")));
        assert!(in_current_window(Cadence::Weekly, now, at("2025-06-15T23:59:59Z")));
        assert!(!in_current_window(Cadence::Weekly, now, at("2025-06-08T23:59:59Z")));
        assert!(!in_current_window(Cadence::Weekly, now, at("2025-06-16T00:00:00Z")));
    }

    #[test]
    fn test_days_until_counts_calendar_days() {
        // Saturday afternoon, boundary Monday midnight: two calendar days
        let now = at("2025-06-14T16:45:00Z");
        let boundary = next_boundary(Cadence::Weekly, now);
        assert_eq!(boundary, at("2025-06-16T00:00:00Z"));
        assert_eq!(days_until(boundary, now), 2);
    }
}
