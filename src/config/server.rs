//! Server configuration.

use std::time::Duration;

use super::parse::{env_bool, env_duration, env_opt, env_or, env_parse, Source};
use super::ConfigError;
use crate::listener::TlsConfig;
use crate::transport::Generation;

/// Server configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind host, resolved at open (default: 0.0.0.0).
    pub host: String,
    /// Bind port; 0 picks a free port (default: 8080).
    pub port: u16,
    /// Protocol generation (default: HTTP/1.1).
    pub generation: Generation,
    /// Certificate and key; TLS is on when set.
    pub tls: Option<TlsConfig>,
    /// How long `close` waits for connections before aborting them.
    pub drain_timeout: Duration,
    /// Expose plugin error messages to clients.
    pub debug: bool,
    /// Emit one access log event per response.
    pub access_log: bool,
    /// Runtime worker threads (0 = CPU count).
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            generation: Generation::Http1,
            tls: None,
            drain_timeout: Duration::from_secs(30),
            debug: false,
            access_log: false,
            workers: 0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `src`.
    pub fn load(src: &dyn Source) -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or(src, "LISTEN_HOST", "0.0.0.0"),
            port: env_parse(src, "LISTEN_PORT", 8080)?,
            generation: env_parse(src, "HTTP_VERSION", Generation::Http1)?,
            tls: load_tls(src)?,
            drain_timeout: env_duration(src, "DRAIN_TIMEOUT_SECS", "30")?,
            debug: env_bool(src, "DEBUG", false),
            access_log: env_bool(src, "ACCESS_LOG", false),
            workers: env_parse(src, "WORKERS", 0)?,
        })
    }

    /// Check if TLS is configured.
    #[inline]
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Worker thread count with auto-detection applied.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Both paths must be set, and readable, for TLS to be on.
fn load_tls(src: &dyn Source) -> Result<Option<TlsConfig>, ConfigError> {
    let cert = env_opt(src, "TLS_CERT");
    let key = env_opt(src, "TLS_KEY");

    let (cert_path, key_path) = match (cert, key) {
        (None, None) => return Ok(None),
        (Some(_), None) => return Err(ConfigError::Missing { key: "TLS_KEY".into() }),
        (None, Some(_)) => return Err(ConfigError::Missing { key: "TLS_CERT".into() }),
        (Some(cert), Some(key)) => (cert, key),
    };

    for path in [&cert_path, &key_path] {
        std::fs::metadata(path).map_err(|error| ConfigError::Io {
            path: path.clone(),
            error,
        })?;
    }

    Ok(Some(TlsConfig::new(cert_path, key_path)))
}
