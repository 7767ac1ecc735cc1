//! Timestamp parsing for highlight ranges.
//!
//! Highlights carry human-entered timestamps in `HH:MM:SS`, `HH:MM:SS.mmm`,
//! `MM:SS` or plain seconds. Everything downstream works in seconds.

use thiserror::Error;

/// Longest range we accept for a single highlight (24 hours).
pub const MAX_RANGE_SECS: f64 = 86400.0;

/// Timestamp parsing/validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, HH:MM:SS.mmm, MM:SS, or SS")]
    InvalidFormat(String),

    #[error("Start time must be before end time")]
    StartNotBeforeEnd,

    #[error("Range exceeds maximum allowed length ({max} hours)", max = MAX_RANGE_SECS / 3600.0)]
    ExceedsMaxRange,
}

fn parse_component(name: &'static str, raw: &str) -> Result<f64, TimestampError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, raw.to_string()))?;
    if !value.is_finite() {
        return Err(TimestampError::InvalidValue(name, raw.to_string()));
    }
    if value < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(value)
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use hlx_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    match parts.as_slice() {
        [secs] => parse_component("seconds", secs),
        [mins, secs] => {
            Ok(parse_component("minutes", mins)? * 60.0 + parse_component("seconds", secs)?)
        }
        [hours, mins, secs] => Ok(parse_component("hours", hours)? * 3600.0
            + parse_component("minutes", mins)? * 60.0
            + parse_component("seconds", secs)?),
        _ => Err(TimestampError::InvalidFormat(ts.to_string())),
    }
}

/// A parsed start/end pair, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TimeRange {
    /// Length of the range in seconds.
    pub fn duration(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// True when the ranges overlap or share an endpoint.
    pub fn touches(&self, other: &TimeRange) -> bool {
        other.start_secs <= self.end_secs && other.end_secs >= self.start_secs
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start_secs: self.start_secs.min(other.start_secs),
            end_secs: self.end_secs.max(other.end_secs),
        }
    }
}

/// Parse and validate a start/end pair.
pub fn parse_range(start: &str, end: &str) -> Result<TimeRange, TimestampError> {
    let start_secs = parse_timestamp(start)?;
    let end_secs = parse_timestamp(end)?;

    if start_secs >= end_secs {
        return Err(TimestampError::StartNotBeforeEnd);
    }
    if end_secs - start_secs > MAX_RANGE_SECS {
        return Err(TimestampError::ExceedsMaxRange);
    }

    Ok(TimeRange {
        start_secs,
        end_secs,
    })
}
