//! SMIL clock values.

use std::time::Duration;

use crate::error::{Error, Result};

/// Parse a SMIL clock value into a duration.
///
/// Accepts the forms found in DAISY 2.02 and 3 timing documents:
/// `npt=12.5s`, `12.5s`, `500ms`, `2min`, `1.5h`, `0:01:02.5`, `01:02.5`
/// and bare seconds (`12.5`).
pub fn parse_clock_value(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    let body = trimmed.strip_prefix("npt=").unwrap_or(trimmed);

    let secs = if body.contains(':') {
        parse_clock_parts(body)
    } else if let Some(ms) = body.strip_suffix("ms") {
        parse_number(ms).map(|v| v / 1000.0)
    } else if let Some(min) = body.strip_suffix("min") {
        parse_number(min).map(|v| v * 60.0)
    } else if let Some(h) = body.strip_suffix('h') {
        parse_number(h).map(|v| v * 3600.0)
    } else if let Some(s) = body.strip_suffix('s') {
        parse_number(s)
    } else {
        parse_number(body)
    };

    // Clip boundaries are kept at millisecond resolution.
    secs.map(|s| Duration::from_millis((s * 1000.0).round() as u64))
        .ok_or_else(|| Error::InvalidTiming(value.to_string()))
}

/// `HH:MM:SS(.f)` or `MM:SS(.f)`.
fn parse_clock_parts(body: &str) -> Option<f64> {
    let parts: Vec<&str> = body.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (parse_number(h)?, parse_number(m)?, parse_number(s)?),
        [m, s] => (0.0, parse_number(m)?, parse_number(s)?),
        _ => return None,
    };
    if minutes >= 60.0 || seconds >= 60.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_number(s: &str) -> Option<f64> {
    let v: f64 = s.trim().parse().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_full_and_partial_clock() {
        assert_eq!(parse_clock_value("0:00:04.512").unwrap(), ms(4512));
        assert_eq!(parse_clock_value("1:02:03").unwrap(), ms(3_723_000));
        assert_eq!(parse_clock_value("01:02.5").unwrap(), ms(62_500));
    }

    #[test]
    fn test_timecount_values() {
        assert_eq!(parse_clock_value("npt=2.25s").unwrap(), ms(2250));
        assert_eq!(parse_clock_value("2.25s").unwrap(), ms(2250));
        assert_eq!(parse_clock_value("750ms").unwrap(), ms(750));
        assert_eq!(parse_clock_value("2min").unwrap(), ms(120_000));
        assert_eq!(parse_clock_value("0.5h").unwrap(), ms(1_800_000));
        assert_eq!(parse_clock_value(" 3 ").unwrap(), ms(3000));
    }

    #[test]
    fn test_invalid_values() {
        for bad in ["", "abc", "-1s", "1:2:3:4", "0:75:00", "NaN"] {
            assert!(parse_clock_value(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
