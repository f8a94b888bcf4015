//! Wall-clock helpers. Everything is stored as Unix seconds; the configured
//! UTC offset decides what "today" and `HH:MM` mean for the user.

use std::time::{SystemTime, UNIX_EPOCH};

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Time, UtcOffset};

const TZ_OFFSET_MINUTES_MIN: i32 = -14 * 60;
const TZ_OFFSET_MINUTES_MAX: i32 = 14 * 60;

// One day inside the years -9999..=9999, so shifting by any offset stays representable.
const MIN_RENDERABLE_TS: i64 = -377_705_116_800 + 86_400;
const MAX_RENDERABLE_TS: i64 = 253_402_300_799 - 86_400;

pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub fn tz_offset_from_minutes(minutes: i32) -> UtcOffset {
    let minutes = minutes.clamp(TZ_OFFSET_MINUTES_MIN, TZ_OFFSET_MINUTES_MAX);
    UtcOffset::from_whole_seconds(minutes.saturating_mul(60)).unwrap_or(UtcOffset::UTC)
}

fn to_local(ts: i64, offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(ts.clamp(MIN_RENDERABLE_TS, MAX_RENDERABLE_TS))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset)
}

pub fn format_hhmm(ts: i64, offset: UtcOffset) -> String {
    let local = to_local(ts, offset);
    format!("{:02}:{:02}", local.hour(), local.minute())
}

pub fn local_date(ts: i64, offset: UtcOffset) -> Date {
    to_local(ts, offset).date()
}

/// Unix timestamp of local midnight for the day containing `ts`.
pub fn start_of_day(ts: i64, offset: UtcOffset) -> i64 {
    to_local(ts, offset)
        .replace_time(Time::MIDNIGHT)
        .unix_timestamp()
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    let day = raw.get(0..10).unwrap_or(raw);
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

pub fn parse_rfc3339(raw: &str) -> Option<i64> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_boundaries_follow_offset() {
        let tz = tz_offset_from_minutes(8 * 60);
        // 2025-03-01T20:30:00Z is 04:30 on the 2nd at +08:00.
        let ts = 1_740_861_000;
        assert_eq!(format_hhmm(ts, tz), "04:30");
        assert_eq!(format_date(local_date(ts, tz)), "2025-03-02");
        assert_eq!(start_of_day(ts, tz), 1_740_844_800);
        assert_eq!(format_hhmm(ts, UtcOffset::UTC), "20:30");
    }

    #[test]
    fn offsets_are_clamped() {
        assert_eq!(tz_offset_from_minutes(99_999).whole_hours(), 14);
        assert_eq!(tz_offset_from_minutes(-99_999).whole_hours(), -14);
    }

    #[test]
    fn parses_dates_and_rfc3339() {
        assert_eq!(
            parse_date("2025-03-02").map(format_date).as_deref(),
            Some("2025-03-02")
        );
        assert_eq!(
            parse_date("2025-03-02T10:00:00Z").map(format_date).as_deref(),
            Some("2025-03-02")
        );
        assert!(parse_date("yesterday").is_none());
        assert_eq!(parse_rfc3339("1970-01-01T00:01:00Z"), Some(60));
    }
}
