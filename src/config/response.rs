//! Response defaults.

use super::parse::{env_or, Source};
use super::ConfigError;
use crate::tables::DEFAULT_KEY;

/// Content-type defaults applied at finalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseConfig {
    /// MIME table key used when nothing else matches.
    pub default_type: String,
    /// Charset parameter on content types; empty omits it.
    pub encoding: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            default_type: DEFAULT_KEY.to_string(),
            encoding: "utf-8".to_string(),
        }
    }
}

impl ResponseConfig {
    /// Load from `src`.
    pub fn load(src: &dyn Source) -> Result<Self, ConfigError> {
        let default_type = env_or(src, "DEFAULT_TYPE", DEFAULT_KEY).trim().to_ascii_lowercase();
        if default_type.is_empty() {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_TYPE".into(),
                message: "must name a content type key".into(),
            });
        }

        let encoding = env_or(src, "ENCODING", "utf-8").trim().to_string();
        if !encoding
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            return Err(ConfigError::Invalid {
                key: "ENCODING".into(),
                message: format!("'{}' is not a charset name", encoding),
            });
        }

        Ok(Self {
            default_type,
            encoding,
        })
    }
}
