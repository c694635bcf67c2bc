use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("duration is empty")]
    Empty,
    #[error("invalid number `{number}` in duration")]
    InvalidNumber { number: String },
    #[error("unknown duration unit `{unit}` (expected ms, s, m or h)")]
    UnknownUnit { unit: String },
    #[error("duration `{raw}` is too large")]
    Overflow { raw: String },
}

/// Parses Go-style durations such as `10s`, `1m30s`, `250ms` or `2h`.
/// A bare integer is read as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, DurationParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = raw;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let value = number
            .parse::<f64>()
            .map_err(|_| DurationParseError::InvalidNumber {
                number: number.to_owned(),
            })?;
        let unit_secs = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => {
                return Err(DurationParseError::UnknownUnit {
                    unit: other.to_owned(),
                });
            }
        };
        total = Duration::try_from_secs_f64(value * unit_secs)
            .ok()
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| DurationParseError::Overflow {
                raw: raw.to_owned(),
            })?;
        rest = next;
    }

    Ok(total)
}
