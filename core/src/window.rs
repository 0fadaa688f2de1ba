use crate::prelude::{PipelineError, StageResult};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Timestamp = DateTime<Utc>;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses an origin time such as `2020-01-07T08:24:26`. Strings without an
/// offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> StageResult<Timestamp> {
    let trimmed = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = trimmed.trim_end_matches('Z');
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|parsed| Utc.from_utc_datetime(&parsed))
        .ok_or_else(|| PipelineError::InvalidWindow(format!("unparseable time {trimmed:?}")))
}

/// Moves `time` by a signed number of seconds, rounded to the nanosecond.
pub fn shift(time: Timestamp, seconds: f64) -> Timestamp {
    time + Duration::nanoseconds((seconds * 1e9).round() as i64)
}

/// `later - earlier` in seconds.
pub fn seconds_between(later: Timestamp, earlier: Timestamp) -> f64 {
    let delta = later - earlier;
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 * 1e-9,
        None => delta.num_milliseconds() as f64 * 1e-3,
    }
}

pub fn format_timestamp(time: &Timestamp) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Absolute time span requested from the waveform service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionWindow {
    pub origin: Timestamp,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl AcquisitionWindow {
    /// Builds `[origin - pre, origin + post]`.
    pub fn resolve(origin: Timestamp, pre_seconds: f64, post_seconds: f64) -> StageResult<Self> {
        for (name, value) in [("pre", pre_seconds), ("post", post_seconds)] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::InvalidWindow(format!(
                    "{name} offset must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        let start = shift(origin, -pre_seconds);
        let end = shift(origin, post_seconds);
        if start >= end {
            return Err(PipelineError::InvalidWindow(format!(
                "window {} .. {} has no duration",
                format_timestamp(&start),
                format_timestamp(&end)
            )));
        }
        Ok(Self { origin, start, end })
    }

    pub fn duration_seconds(&self) -> f64 {
        seconds_between(self.end, self.start)
    }

    pub fn contains(&self, time: Timestamp) -> bool {
        self.start <= time && time <= self.end
    }
}

impl fmt::Display for AcquisitionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} and {}",
            format_timestamp(&self.start),
            format_timestamp(&self.end)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Timestamp {
        parse_timestamp("2020-01-07T08:24:26").unwrap()
    }

    #[test]
    fn window_duration_matches_offsets() {
        for (pre, post) in [(0.0, 1250.0), (30.0, 0.5), (12.25, 600.0)] {
            let window = AcquisitionWindow::resolve(origin(), pre, post).unwrap();
            assert!((window.duration_seconds() - (pre + post)).abs() < 1e-6);
            assert!(window.contains(origin()));
        }
    }

    #[test]
    fn negative_offsets_are_rejected() {
        let err = AcquisitionWindow::resolve(origin(), -1.0, 10.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidWindow(_)));
        let err = AcquisitionWindow::resolve(origin(), 0.0, f64::NAN).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidWindow(_)));
    }

    #[test]
    fn empty_window_is_rejected() {
        let err = AcquisitionWindow::resolve(origin(), 0.0, 0.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidWindow(_)));
    }

    #[test]
    fn timestamps_parse_with_and_without_offsets() {
        let plain = parse_timestamp("2020-01-07T08:24:26").unwrap();
        let zulu = parse_timestamp("2020-01-07T08:24:26Z").unwrap();
        let fractional = parse_timestamp("2020-01-07T08:24:26.500").unwrap();
        assert_eq!(plain, zulu);
        assert!((seconds_between(fractional, plain) - 0.5).abs() < 1e-9);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
