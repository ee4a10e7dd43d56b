//! Manifest duration syntax: `17h`, `1h30m`, `10s`, `3d`, `250ms`

use chrono::Duration;

use crate::{PodError, Result};

const UNITS: [(&str, i64); 5] = [
    ("ms", 1),
    ("s", 1_000),
    ("m", 60_000),
    ("h", 3_600_000),
    ("d", 86_400_000),
];

/// Parse a duration such as `1h30m`
///
/// Zero is accepted here; callers decide whether it is meaningful.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PodError::config("empty duration"));
    }

    let invalid = || PodError::config(format!("invalid duration '{text}'"));
    let mut total_ms: i64 = 0;
    let mut rest = text;

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let amount: i64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(invalid)?;
        rest = &rest[unit_len..];

        total_ms = amount
            .checked_mul(scale)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(invalid)?;
    }

    Ok(Duration::milliseconds(total_ms))
}

/// Render a duration in the same syntax, largest unit first, up to hours
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let mut ms = duration.num_milliseconds();
    if ms == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    if ms < 0 {
        out.push('-');
        ms = -ms;
    }
    for (name, scale) in UNITS[..4].iter().rev() {
        let amount = ms / scale;
        if amount > 0 {
            out.push_str(&format!("{amount}{name}"));
            ms -= amount * scale;
        }
    }
    out
}
