//! Configuration module for tokio_appserver.
//!
//! This module provides centralized configuration loading from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_appserver::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen: {}:{}", config.server.host, config.server.port);
//! ```

mod error;
mod logging;
mod parse;
mod response;
mod security;
mod server;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig, DEFAULT_FILTER};
pub use parse::{Environment, Source};
pub use response::ResponseConfig;
pub use security::SecurityHeaders;
pub use server::ServerConfig;

/// Complete application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Listener, protocol and lifecycle settings.
    pub server: ServerConfig,
    /// Content-type defaults.
    pub response: ResponseConfig,
    /// Headers set on every response.
    pub security: SecurityHeaders,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&Environment)
    }

    /// Load configuration from any source.
    pub fn load(src: &dyn Source) -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::load(src)?,
            response: ResponseConfig::load(src)?,
            security: SecurityHeaders::load(src)?,
            logging: LoggingConfig::load(src)?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Listen: {}:{}", self.server.host, self.server.port);
        info!("  HTTP version: {:?}", self.server.generation);
        info!("  Workers: {}", self.server.worker_count());
        info!("  Drain timeout: {}s", self.server.drain_timeout.as_secs());
        info!(
            "  Default type: {} (charset {})",
            self.response.default_type, self.response.encoding
        );

        if let Some(ref tls) = self.server.tls {
            info!("  TLS: enabled ({})", tls.cert_path);
        }

        if self.server.debug {
            info!("  Debug: plugin errors are exposed to clients");
        }

        if self.server.access_log {
            info!("  Access log: enabled");
        }
    }
}
