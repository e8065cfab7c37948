//! Time formatting utilities.

use chrono::{DateTime, Utc};

/// Largest unit first; the first one that fits at least once wins.
const UNITS: [(i64, &str); 3] = [(86_400, "day"), (3_600, "hour"), (60, "minute")];

/// Describe `target` relative to `now`, e.g. `3 hours ago` or `1 day from now`.
///
/// Offsets under a minute in either direction read as `just now`.
#[must_use]
pub fn format_relative_time_at(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let offset = now.signed_duration_since(target).num_seconds();
    let (secs, direction) = if offset >= 0 {
        (offset, "ago")
    } else {
        (offset.saturating_neg(), "from now")
    };

    UNITS
        .iter()
        .find_map(|&(size, unit)| {
            let count = secs / size;
            (count > 0).then(|| {
                let plural = if count == 1 { "" } else { "s" };
                format!("{count} {unit}{plural} {direction}")
            })
        })
        .unwrap_or_else(|| "just now".to_string())
}

/// Format a relative time (past or future).
#[must_use]
pub fn format_relative_time(target: DateTime<Utc>) -> String {
    format_relative_time_at(target, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn recent_is_just_now() {
        let now = Utc::now();
        assert_eq!(format_relative_time_at(now - Duration::seconds(10), now), "just now");
    }

    #[test]
    fn past_and_future() {
        let now = Utc::now();
        assert_eq!(
            format_relative_time_at(now - Duration::hours(3), now),
            "3 hours ago"
        );
        assert_eq!(
            format_relative_time_at(now + Duration::days(1) + Duration::minutes(5), now),
            "1 day from now"
        );
        assert_eq!(
            format_relative_time_at(now - Duration::minutes(1), now),
            "1 minute ago"
        );
        assert_eq!(
            format_relative_time_at(now + Duration::seconds(59), now),
            "just now"
        );
        assert_eq!(
            format_relative_time_at(now - Duration::days(3) - Duration::hours(20), now),
            "3 days ago"
        );
    }
}
