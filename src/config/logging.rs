//! Logging configuration.

use std::str::FromStr;

use super::parse::{env_opt, env_or, Source};
use super::ConfigError;

/// Default filter when neither LOG_LEVEL nor RUST_LOG is set.
pub const DEFAULT_FILTER: &str = "tokio_appserver=info";

/// Output format of log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}' (expected text or json)", other)),
        }
    }
}

/// Logging configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log level filter (from LOG_LEVEL or RUST_LOG).
    pub filter: String,
    /// Line format.
    pub format: LogFormat,
    /// Service name for structured logging.
    pub service_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Text,
            service_name: "tokio_appserver".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Load configuration from `src`.
    pub fn load(src: &dyn Source) -> Result<Self, ConfigError> {
        let format = match env_opt(src, "LOG_FORMAT") {
            Some(value) => value.parse().map_err(|error| ConfigError::Parse {
                key: "LOG_FORMAT".into(),
                value,
                error,
            })?,
            None => LogFormat::Text,
        };

        Ok(Self {
            filter: resolve_log_filter(src)?,
            format,
            service_name: env_or(src, "SERVICE_NAME", "tokio_appserver"),
        })
    }
}

/// Resolve the log filter.
///
/// Priority: LOG_LEVEL > RUST_LOG > default (info)
///
/// LOG_LEVEL accepts simple values: trace, debug, info, warn, error
/// RUST_LOG accepts full tracing filter syntax: tokio_appserver=debug,hyper=warn
fn resolve_log_filter(src: &dyn Source) -> Result<String, ConfigError> {
    if let Some(level) = env_opt(src, "LOG_LEVEL") {
        let level = level.to_lowercase();
        return match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(format!("tokio_appserver={}", level)),
            _ => Err(ConfigError::Invalid {
                key: "LOG_LEVEL".into(),
                message: format!(
                    "'{}', expected: trace, debug, info, warn, error",
                    level
                ),
            }),
        };
    }

    if let Some(filter) = env_opt(src, "RUST_LOG") {
        return Ok(filter);
    }

    Ok(DEFAULT_FILTER.to_string())
}
