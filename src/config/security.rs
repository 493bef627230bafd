//! Security response headers.

use http::header::{HeaderName, HeaderValue};

use super::parse::{env_or, Source};
use super::ConfigError;

const XSS_PROTECTION: &str = "1; mode=block";
const FRAME_OPTIONS: &str = "SAMEORIGIN";
const CONTENT_TYPE_OPTIONS: &str = "nosniff";
const DOWNLOAD_OPTIONS: &str = "noopen";
const HSTS: &str = "max-age=31536000; includeSubDomains; preload";

/// Headers set on every response before any plugin runs.
///
/// `None` disables a header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityHeaders {
    pub xss_protection: Option<String>,
    pub frame_options: Option<String>,
    pub content_type_options: Option<String>,
    pub download_options: Option<String>,
    pub hsts: Option<String>,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self {
            xss_protection: Some(XSS_PROTECTION.to_string()),
            frame_options: Some(FRAME_OPTIONS.to_string()),
            content_type_options: Some(CONTENT_TYPE_OPTIONS.to_string()),
            download_options: Some(DOWNLOAD_OPTIONS.to_string()),
            hsts: Some(HSTS.to_string()),
        }
    }
}

impl SecurityHeaders {
    /// No security headers at all.
    pub fn disabled() -> Self {
        Self {
            xss_protection: None,
            frame_options: None,
            content_type_options: None,
            download_options: None,
            hsts: None,
        }
    }

    /// Load from `src`. Empty, `off` and `false` disable a header.
    pub fn load(src: &dyn Source) -> Result<Self, ConfigError> {
        let headers = Self {
            xss_protection: header_value(src, "XSS_PROTECTION", XSS_PROTECTION),
            frame_options: header_value(src, "FRAME_OPTIONS", FRAME_OPTIONS),
            content_type_options: header_value(src, "CONTENT_TYPE_OPTIONS", CONTENT_TYPE_OPTIONS),
            download_options: header_value(src, "DOWNLOAD_OPTIONS", DOWNLOAD_OPTIONS),
            hsts: header_value(src, "HSTS", HSTS),
        };

        // Reject values that cannot go on the wire
        for (key, value) in headers.entries() {
            if let Some(value) = value {
                HeaderValue::try_from(value).map_err(|e| ConfigError::Invalid {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
            }
        }

        Ok(headers)
    }

    fn entries(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("XSS_PROTECTION", self.xss_protection.as_deref()),
            ("FRAME_OPTIONS", self.frame_options.as_deref()),
            ("CONTENT_TYPE_OPTIONS", self.content_type_options.as_deref()),
            ("DOWNLOAD_OPTIONS", self.download_options.as_deref()),
            ("HSTS", self.hsts.as_deref()),
        ]
    }

    /// Enabled headers as wire pairs. Invalid values are skipped.
    pub fn to_headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let names = [
            HeaderName::from_static("x-xss-protection"),
            http::header::X_FRAME_OPTIONS,
            http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderName::from_static("x-download-options"),
            http::header::STRICT_TRANSPORT_SECURITY,
        ];

        names
            .into_iter()
            .zip(self.entries())
            .filter_map(|(name, (_, value))| {
                let value = HeaderValue::try_from(value?).ok()?;
                Some((name, value))
            })
            .collect()
    }
}

fn header_value(src: &dyn Source, key: &str, default: &str) -> Option<String> {
    let value = env_or(src, key, default);
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "off" | "false" => None,
        _ => Some(value.trim().to_string()),
    }
}
