//! Date/time utilities for Gator.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Storage format for timestamps.
///
/// Fixed width with a trailing `Z`, so lexical order in SQL matches
/// chronological order.
const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Zone-less layouts accepted for publication dates, interpreted as UTC.
const NAIVE_PUBLISHED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
];

/// Format a timestamp for storage.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format(STORAGE_FORMAT).to_string()
}

/// Parse a stored timestamp.
///
/// Accepts the storage format, any RFC3339 string and the SQLite
/// `YYYY-MM-DD HH:MM:SS` format.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Parse the raw publication date of a feed item.
///
/// Tries, in order:
/// - RFC 1123 with a numeric zone (`Mon, 02 Jan 2006 15:04:05 -0700`)
/// - RFC 1123 with a named zone (`Mon, 02 Jan 2006 15:04:05 GMT`)
/// - RFC 3339 / ISO-8601 with an offset
/// - ISO-8601 and SQLite layouts without a zone, read as UTC
///
/// Returns `None` when nothing matches; callers store the post without a
/// publication date in that case.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Covers both RFC 1123 variants, including obsolete named zones.
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_PUBLISHED_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
