//! Timestamp parsing and rendering for temporal extents
//!
//! Source timestamps must carry a fractional second and an offset
//! (`2019-06-12T15:04:05.123Z`). UTC renders with milliseconds and a `Z`;
//! other offsets render with microseconds and `+HHMM`.

use chrono::{DateTime, FixedOffset};

use super::types::{DatedText, EndDate, RecordDates, TemporalExtent};
use crate::stac::ItemProperties;

/// Start used when an item timestamp cannot be parsed.
pub const SENTINEL_START: &str = "1900-01-01T00:00:00.000000";

/// Begin of an extent with no known start.
pub const OPEN_BEGIN: &str = "0001-01-01";

fn has_fraction(raw: &str) -> bool {
    let Some(fraction) = raw.get(19..).and_then(|rest| rest.strip_prefix('.')) else {
        return false;
    };
    let digits = fraction.chars().take_while(char::is_ascii_digit).count();
    (1..=6).contains(&digits)
}

fn parse_with_separator(raw: &str, separator: char) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    let normalized = match raw.strip_suffix('Z') {
        Some(head) => format!("{}+0000", head),
        None => raw.to_string(),
    };
    if !has_fraction(&normalized) {
        return None;
    }
    let format = format!("%Y-%m-%d{}%H:%M:%S%.f%z", separator);
    DateTime::parse_from_str(&normalized, &format).ok()
}

/// Parse an ISO 8601 timestamp with `T` separator, fraction and offset
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    parse_with_separator(raw, 'T')
}

pub fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    if timestamp.offset().local_minus_utc() == 0 {
        timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    } else {
        timestamp.format("%Y-%m-%dT%H:%M:%S%.6f%z").to_string()
    }
}

/// Render a timestamp that may also use a space separator; unparsable input
/// yields [`SENTINEL_START`]
pub fn format_or_sentinel(raw: &str) -> String {
    parse_with_separator(raw, 'T')
        .or_else(|| parse_with_separator(raw, ' '))
        .map(|ts| format_timestamp(&ts))
        .unwrap_or_else(|| SENTINEL_START.to_string())
}

/// Acquisition interval of an item. A missing or unparsable start falls back
/// to the sentinel date, a missing or unparsable end to `Present`.
pub fn item_extent(properties: &ItemProperties) -> TemporalExtent {
    let begin = properties
        .datetime
        .as_deref()
        .and_then(parse_timestamp)
        .map(|ts| format_timestamp(&ts))
        .unwrap_or_else(|| SENTINEL_START.to_string());

    let end = properties
        .end_datetime
        .as_deref()
        .and_then(parse_timestamp)
        .map(|ts| EndDate::Date(format_timestamp(&ts)))
        .unwrap_or(EndDate::Present);

    TemporalExtent { begin, end }
}

/// Extent of a collection from its first temporal interval
pub fn collection_extent(begin: Option<&str>, end: Option<&str>) -> TemporalExtent {
    TemporalExtent {
        begin: begin
            .map(format_or_sentinel)
            .unwrap_or_else(|| OPEN_BEGIN.to_string()),
        end: end
            .map(|raw| EndDate::Date(format_or_sentinel(raw)))
            .unwrap_or(EndDate::Present),
    }
}

pub fn root_extent() -> TemporalExtent {
    TemporalExtent {
        begin: OPEN_BEGIN.to_string(),
        end: EndDate::Present,
    }
}

/// Publication and creation dates from an item's `created` property
pub fn item_dates(properties: &ItemProperties) -> RecordDates {
    match properties.created.as_deref() {
        Some(created) => {
            let date = format_or_sentinel(created);
            RecordDates {
                published: DatedText {
                    text: Some("publication; publication".to_string()),
                    date: Some(date.clone()),
                },
                created: DatedText {
                    text: Some("creation; création".to_string()),
                    date: Some(date),
                },
            }
        },
        None => RecordDates::default(),
    }
}
