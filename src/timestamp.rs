//! Data-clock timestamp normalization.
//!
//! The telemetry export writes timestamps either as elapsed-duration text
//! (`"0 days 00:43:21.500000"`) or as plain seconds. Everything downstream
//! works in f64 seconds, with a parallel i64 nanosecond key for searching.

use crate::types::FieldValue;

const SECONDS_PER_DAY: f64 = 86_400.0;
const SECONDS_PER_HOUR: f64 = 3_600.0;
const SECONDS_PER_MINUTE: f64 = 60.0;
const NANOS_PER_SECOND: f64 = 1e9;

/// Magnitude past which the nanosecond key no longer fits in an i64
/// (about 292 years).
pub const MAX_TIMESTAMP_SECONDS: f64 = i64::MAX as f64 / NANOS_PER_SECOND;

/// Parse `"<days> day(s) <hours>:<minutes>:<seconds>"`.
///
/// Returns `None` when the text does not have the duration shape at all.
/// Individual components that fail to parse count as 0.
pub fn parse_duration_text(raw: &str) -> Option<f64> {
    let mut parts = raw.split_whitespace();
    let days_tok = parts.next()?;
    let unit_tok = parts.next()?;
    let clock_tok = parts.next()?;
    if parts.next().is_some() || !matches!(unit_tok, "day" | "days") {
        return None;
    }

    let days = component(days_tok);
    // negative durations are printed as "-1 days +23:59:59"
    let clock_tok = clock_tok.strip_prefix('+').unwrap_or(clock_tok);
    let mut clock = clock_tok.splitn(3, ':');
    let hours = clock.next().map(component).unwrap_or(0.0);
    let minutes = clock.next().map(component).unwrap_or(0.0);
    let seconds = clock.next().map(component).unwrap_or(0.0);

    Some(
        days * SECONDS_PER_DAY
            + hours * SECONDS_PER_HOUR
            + minutes * SECONDS_PER_MINUTE
            + seconds,
    )
}

fn component(tok: &str) -> f64 {
    match tok.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Normalize a raw timestamp cell to seconds.
///
/// Duration text first, then a direct numeric parse, then 0.
pub fn parse_timestamp_text(raw: &str) -> f64 {
    if let Some(seconds) = parse_duration_text(raw) {
        return seconds;
    }
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Normalize an optional decoded timestamp to seconds.
pub fn timestamp_seconds(value: Option<&FieldValue>) -> f64 {
    match value {
        Some(FieldValue::Text(raw)) => parse_timestamp_text(raw),
        Some(FieldValue::Number(v)) if v.is_finite() => *v,
        _ => 0.0,
    }
}

/// Whether `seconds` has a distinct nanosecond key.
pub fn is_searchable(seconds: f64) -> bool {
    seconds.is_finite() && seconds.abs() < MAX_TIMESTAMP_SECONDS
}

/// Seconds to the nanosecond search key.
///
/// Saturates at `i64::MIN`/`i64::MAX` outside [`MAX_TIMESTAMP_SECONDS`];
/// the loader and the cache reject such rows, so only query targets clamp.
pub fn seconds_to_nanos(seconds: f64) -> i64 {
    (seconds * NANOS_PER_SECOND).round() as i64
}
