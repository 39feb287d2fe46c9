//! Environment variable parsing utilities.

use std::str::FromStr;
use std::time::Duration;

use super::ConfigError;

/// Get environment variable with default value.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get optional environment variable (None if empty or missing).
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

/// Parse environment variable as boolean.
/// Treats "1", "true", "yes" and "on" (case-insensitive) as true.
pub fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

/// Parse environment variable with type conversion.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
            key: key.into(),
            value: v,
            error: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse environment variable as a duration in seconds. A unit suffix
/// ("90s", "2m") is accepted too; "off" and "0" yield zero.
pub fn env_seconds(key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    match env_opt(key) {
        Some(value) => parse_duration(&value)
            .map(Option::unwrap_or_default)
            .map_err(|error| ConfigError::Parse {
                key: key.into(),
                value,
                error,
            }),
        None => Ok(Duration::from_secs(default_secs)),
    }
}

/// Parse duration string (e.g., "30s", "2m", "1h", "1d").
/// Returns None for "off" or "0".
pub fn parse_duration(s: &str) -> Result<Option<Duration>, String> {
    const UNITS: [(char, u64); 4] = [('s', 1), ('m', 60), ('h', 3600), ('d', 86400)];

    let s = s.trim().to_ascii_lowercase();
    if s == "off" || s == "0" || s.is_empty() {
        return Ok(None);
    }

    let (digits, scale) = UNITS
        .iter()
        .find_map(|&(unit, scale)| s.strip_suffix(unit).map(|d| (d, scale)))
        .unwrap_or((s.as_str(), 1));

    let num: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {}", s))?;
    let secs = num
        .checked_mul(scale)
        .ok_or_else(|| format!("duration out of range: {}", s))?;

    Ok(Some(Duration::from_secs(secs)))
}
