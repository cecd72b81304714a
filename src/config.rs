//! Parsing of command line values that need more than clap's built-in parsers.

use std::time::Duration;

use crate::error::{BenchError, Result};

fn invalid(input: &str, reason: &str) -> BenchError {
    BenchError::Config(format!("invalid duration {input:?}: {reason}"))
}

/// Parses a pause such as `500ms`, `1.5s` or `1m30s`.
///
/// Accepted units are `ns`, `us` (also `µs`/`μs`), `ms`, `s`, `m` and `h`.
/// A bare `0` means no pause; any other number needs a unit.
pub fn parse_pause(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid(input, "empty"));
    }
    if s.starts_with('-') {
        return Err(invalid(input, "negative"));
    }

    let mut rest = s.strip_prefix('+').unwrap_or(s);
    let mut total_ns = 0f64;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(invalid(input, "expected a number"));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| invalid(input, "bad number"))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3_600e9,
            "" => return Err(invalid(input, "missing unit")),
            other => return Err(invalid(input, &format!("unknown unit {other:?}"))),
        };
        total_ns += value * scale;
        rest = &rest[unit_len..];
    }

    if total_ns > u64::MAX as f64 {
        return Err(invalid(input, "overflow"));
    }
    Ok(Duration::from_nanos(total_ns.round() as u64))
}
