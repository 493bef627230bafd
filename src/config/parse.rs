//! Environment variable parsing utilities.
//!
//! Every helper reads through a [`Source`] so configuration can be loaded
//! from the process environment or from a fixed map in tests.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use super::ConfigError;

/// Where configuration values come from.
pub trait Source {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct Environment;

impl Source for Environment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Source for HashMap<&str, &str> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).map(|v| v.to_string())
    }
}

/// Get variable with default value.
pub fn env_or(src: &dyn Source, key: &str, default: &str) -> String {
    src.get(key).unwrap_or_else(|| default.to_string())
}

/// Get optional variable (None if empty or missing).
pub fn env_opt(src: &dyn Source, key: &str) -> Option<String> {
    src.get(key).filter(|s| !s.is_empty())
}

/// Parse variable as boolean.
/// Treats "1", "true", "yes", "on" (case-insensitive) as true.
pub fn env_bool(src: &dyn Source, key: &str, default: bool) -> bool {
    match env_opt(src, key) {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

/// Parse variable with type conversion.
pub fn env_parse<T: FromStr>(src: &dyn Source, key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_opt(src, key) {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
            key: key.into(),
            value: v,
            error: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Parse duration string (e.g., "30s", "2m", "1h").
/// Plain numbers are seconds. Returns None for "off" or "0".
pub fn parse_duration(s: &str) -> Result<Option<Duration>, String> {
    let s = s.trim().to_lowercase();

    if s == "off" || s == "0" || s.is_empty() {
        return Ok(None);
    }

    let (num_str, multiplier) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 3600),
        _ => (s.as_str(), 1),
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("invalid duration: {}", s))?;

    Ok(Some(Duration::from_secs(num * multiplier)))
}

/// Parse variable as duration. "off" and "0" become zero.
pub fn env_duration(src: &dyn Source, key: &str, default: &str) -> Result<Duration, ConfigError> {
    let value = env_or(src, key, default);
    parse_duration(&value)
        .map(Option::unwrap_or_default)
        .map_err(|e| ConfigError::Parse {
            key: key.into(),
            value,
            error: e,
        })
}
