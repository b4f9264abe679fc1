//! Human-readable duration strings such as `1h30m`, `2d` or `250ms`.

use std::fmt;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::{self, Deserializer, Visitor};
use thiserror::Error;

lazy_static! {
    static ref SEGMENT_REGEX: Regex =
        Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h|d|w)").unwrap();
}

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("Duration string is empty")]
    Empty,

    #[error("Invalid duration: {0}")]
    Invalid(String),
}

fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "ns" => 1.0,
        "us" | "µs" => 1_000.0,
        "ms" => 1_000_000.0,
        "s" => NANOS_PER_SEC,
        "m" => 60.0 * NANOS_PER_SEC,
        "h" => 3_600.0 * NANOS_PER_SEC,
        "d" => 86_400.0 * NANOS_PER_SEC,
        _ => 604_800.0 * NANOS_PER_SEC, // w
    }
}

/// Parses a sequence of `<number><unit>` segments.
///
/// Units: `w d h m s ms us µs ns`. A bare `0` is accepted as zero.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut pos = 0;
    let mut total = 0.0_f64;
    for caps in SEGMENT_REGEX.captures_iter(s) {
        let segment = caps.get(0).map_or(0..0, |m| m.range());
        if segment.start != pos {
            return Err(DurationError::Invalid(input.to_string()));
        }
        pos = segment.end;

        let value: f64 = caps[1]
            .parse()
            .map_err(|_| DurationError::Invalid(input.to_string()))?;
        total += value * unit_nanos(&caps[2]);
    }

    if pos != s.len() || !total.is_finite() || total > u64::MAX as f64 {
        return Err(DurationError::Invalid(input.to_string()));
    }

    Ok(Duration::from_nanos(total.round() as u64))
}

/// Serde helper for `#[serde(deserialize_with = "bootstrap::duration::deserialize")]`.
///
/// Accepts a duration string or a non-negative number of seconds.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a duration string like \"1h30m\" or a number of seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
        parse_duration(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
        u64::try_from(v)
            .map(Duration::from_secs)
            .map_err(|_| E::custom(format!("negative duration: {}", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Duration, E> {
        Duration::try_from_secs_f64(v).map_err(E::custom)
    }
}
