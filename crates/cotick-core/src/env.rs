//! Environment variable helpers
//!
//! Every runtime knob can be overridden from the environment with a
//! `COT_` prefixed variable. Parsing failures fall back to the default.
//!
//! ```ignore
//! use cotick_core::env::{env_get, env_get_bool};
//!
//! let tick_ms: u64 = env_get("COT_TICK_INTERVAL_MS", 1000);
//! let debug = env_get_bool("COT_DEBUG", false);
//! ```

use std::str::FromStr;

/// Parse a boolean switch value
///
/// `1/true/yes/on` is true, `0/false/no/off` is false (case-insensitive).
/// Anything else is `None`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get `key` parsed as `T`, or `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get `key` as a boolean switch, or `default` when unset or unrecognized
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

/// Get `key` parsed as `T` if set and valid
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
