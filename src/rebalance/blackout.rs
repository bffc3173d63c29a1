//! Blackout period filtering for venue eligibility.

use crate::config::BlackoutPeriod;
use chrono::{DateTime, Utc};
use tracing::warn;

/// Check whether `now` falls outside every configured blackout period.
///
/// An empty list means the venue is always eligible. A period that fails to
/// parse is treated as inactive with a warning: invalid configuration never
/// suppresses trading.
pub fn outside_blackouts(venue: &str, periods: &[BlackoutPeriod], now: DateTime<Utc>) -> bool {
    periods.iter().all(|period| match parse_period(period) {
        Some((start, end)) => !(start <= now && now < end),
        None => {
            warn!(
                venue,
                start = %period.start,
                end = %period.end,
                "Invalid blackout period. Ignoring the config."
            );
            true
        }
    })
}

fn parse_period(period: &BlackoutPeriod) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = DateTime::parse_from_rfc3339(&period.start)
        .ok()?
        .with_timezone(&Utc);
    let end = DateTime::parse_from_rfc3339(&period.end)
        .ok()?
        .with_timezone(&Utc);
    (start < end).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn period(start: DateTime<Utc>, end: DateTime<Utc>) -> BlackoutPeriod {
        BlackoutPeriod {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        }
    }

    #[test]
    fn test_empty_list_is_always_eligible() {
        assert!(outside_blackouts("bitbank", &[], Utc::now()));
    }

    #[test]
    fn test_inside_blackout_blocks() {
        let now = Utc::now();
        let periods = [period(now - Duration::minutes(5), now + Duration::minutes(5))];
        assert!(!outside_blackouts("bitbank", &periods, now));
    }

    #[test]
    fn test_outside_blackout_allows() {
        let now = Utc::now();
        let periods = [period(now + Duration::hours(1), now + Duration::hours(2))];
        assert!(outside_blackouts("bitbank", &periods, now));
    }

    #[test]
    fn test_invalid_period_never_blocks() {
        let now = Utc::now();
        let garbage = BlackoutPeriod {
            start: "not-a-timestamp".to_string(),
            end: "also-bad".to_string(),
        };
        assert!(outside_blackouts("bitbank", &[garbage], now));

        // Reversed boundaries are invalid too
        let reversed = period(now + Duration::hours(1), now - Duration::hours(1));
        assert!(outside_blackouts("bitbank", &[reversed], now));
    }

    #[test]
    fn test_any_active_period_blocks() {
        let now = Utc::now();
        let periods = [
            period(now + Duration::hours(1), now + Duration::hours(2)),
            period(now - Duration::minutes(1), now + Duration::minutes(1)),
        ];
        assert!(!outside_blackouts("bitbank", &periods, now));
    }
}
