//! Lookup tables for content types and status reason phrases.
//!
//! Both tables are built once at startup and shared read-only across all
//! requests (`Arc<MimeTable>`, `Arc<StatusTable>`).

use std::collections::HashMap;

use http::StatusCode;

/// Key of the fallback content type.
pub const DEFAULT_KEY: &str = "default";

/// Key of the structured (JSON) content type.
pub const JSON_KEY: &str = "json";

/// Built-in aliases checked before falling back to `mime_guess`.
const BUILTIN: &[(&str, &str)] = &[
    (DEFAULT_KEY, "text/plain"),
    (JSON_KEY, "application/json"),
    ("text", "text/plain"),
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("xml", "application/xml"),
    ("svg", "image/svg+xml"),
    ("wasm", "application/wasm"),
    ("binary", "application/octet-stream"),
    ("stream", "application/octet-stream"),
    ("form", "application/x-www-form-urlencoded"),
];

/// Maps lowercase extensions or aliases to content types.
///
/// Always contains the [`DEFAULT_KEY`] and [`JSON_KEY`] entries. Keys missing
/// from the table are resolved through `mime_guess` as file extensions.
#[derive(Clone, Debug)]
pub struct MimeTable {
    entries: HashMap<String, String>,
}

impl MimeTable {
    /// Create a table holding only the built-in aliases.
    pub fn new() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self { entries }
    }

    /// Add or replace an entry. Keys are stored lowercase.
    pub fn with_entry(mut self, key: impl AsRef<str>, content_type: impl Into<String>) -> Self {
        self.insert(key, content_type);
        self
    }

    /// Add or replace an entry. Keys are stored lowercase.
    pub fn insert(&mut self, key: impl AsRef<str>, content_type: impl Into<String>) {
        self.entries
            .insert(key.as_ref().to_ascii_lowercase(), content_type.into());
    }

    /// Look up a content type by alias or extension.
    pub fn get(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }

        let key = key.to_ascii_lowercase();
        if let Some(value) = self.entries.get(&key) {
            return Some(value.as_str());
        }

        mime_guess::from_ext(&key).first_raw()
    }

    /// Look up `key`, falling back to `default_key`, then to [`DEFAULT_KEY`].
    pub fn resolve(&self, key: &str, default_key: &str) -> &str {
        self.get(key)
            .or_else(|| self.get(default_key))
            .unwrap_or_else(|| self.default_type())
    }

    /// The fallback content type.
    pub fn default_type(&self) -> &str {
        self.entries
            .get(DEFAULT_KEY)
            .map(String::as_str)
            .unwrap_or("text/plain")
    }

    /// The JSON content type.
    pub fn json(&self) -> &str {
        self.entries
            .get(JSON_KEY)
            .map(String::as_str)
            .unwrap_or("application/json")
    }
}

impl Default for MimeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps status codes to reason phrases.
///
/// Overrides take precedence over the canonical reason phrases from `http`.
#[derive(Clone, Debug, Default)]
pub struct StatusTable {
    overrides: HashMap<u16, String>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the reason phrase of a status code.
    pub fn with_reason(mut self, code: StatusCode, reason: impl Into<String>) -> Self {
        self.overrides.insert(code.as_u16(), reason.into());
        self
    }

    /// Reason phrase for `code`, if one is known.
    pub fn reason(&self, code: StatusCode) -> Option<&str> {
        self.overrides
            .get(&code.as_u16())
            .map(String::as_str)
            .or_else(|| code.canonical_reason())
    }
}
