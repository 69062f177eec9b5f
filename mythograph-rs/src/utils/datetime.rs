//! Creation timestamps as stored in Neo4j.

use chrono::{DateTime, Duration, Utc};

/// Format a [`DateTime<Utc>`] the way node timestamps are stored.
///
/// Output format: `"2024-01-15T10:30:00.000000000Z"` (ISO 8601, nanosecond
/// precision, UTC). Fixed width, so lexicographic order equals time order.
pub fn format_neo4j_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

/// Parse a timestamp written by [`format_neo4j_datetime`] (or any RFC 3339 value).
pub fn parse_flexible_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Current time, bumped past `last` so successive calls are strictly increasing.
pub fn strictly_after(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(last) if now <= last => last + Duration::nanoseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_neo4j() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format_neo4j_datetime(&dt), "2024-01-15T10:30:00.000000000Z");
    }

    #[test]
    fn test_format_roundtrip_keeps_nanoseconds() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let dt = base + Duration::nanoseconds(500_000_001);
        let parsed = parse_flexible_datetime(&format_neo4j_datetime(&dt)).expect("should parse");
        assert_eq!(parsed, dt);
    }

    #[test]
    fn test_parse_with_offset() {
        let dt = parse_flexible_datetime("2024-01-15T10:30:00+05:00").expect("should parse");
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_flexible_datetime("").is_none());
        assert!(parse_flexible_datetime("not a date").is_none());
    }

    #[test]
    fn test_lexicographic_order_matches_time_order() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 9).unwrap();
        let b = a + Duration::seconds(1);
        assert!(format_neo4j_datetime(&a) < format_neo4j_datetime(&b));
    }

    #[test]
    fn test_strictly_after() {
        let future = Utc::now() + Duration::hours(1);
        let next = strictly_after(Some(future));
        assert_eq!(next, future + Duration::nanoseconds(1));
        assert!(strictly_after(None) <= Utc::now());
    }
}
