//! Defensive parsing for string signal values.
//!
//! Signals arrive as free-form strings from the desktop core. Malformed
//! values are never errors: parsers return `None` and callers keep their
//! defaults, so gating behaves identically across policies.

/// Parses the boolean signal vocabulary.
///
/// Truthy: `1`, `true`, `yes`, `on`. Falsy: `0`, `false`, `no`, `off`.
/// Anything else (including empty) is `None`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_f64(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_i64(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}
