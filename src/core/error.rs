//! Core error types.

use std::fmt;

/// Error type returned by plugin handlers.
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// Core errors for request handling.
#[derive(Debug)]
pub enum Error {
    /// A context name is already bound (or is a reserved core name).
    DuplicateBinding(String),

    /// A plugin handler failed.
    Plugin { plugin: String, message: String },

    /// A response body could not be serialized or streamed.
    Serialization(String),

    /// The response was already ended or aborted.
    ResponseFinished,

    /// The response was abandoned without being written.
    Aborted,

    /// No usable plugin name could be derived.
    InvalidPluginName(String),

    /// Invalid header name or value.
    InvalidHeader(String),

    /// Plugins cannot be registered once the server is listening.
    AlreadyListening,

    /// I/O error.
    Io(std::io::Error),

    /// HTTP error.
    Http(http::Error),

    /// Custom error with message.
    Custom(String),
}

impl Error {
    /// Wrap a plugin failure.
    pub fn plugin(plugin: impl Into<String>, error: PluginError) -> Self {
        Error::Plugin {
            plugin: plugin.into(),
            message: error.to_string(),
        }
    }

    /// Message exposed to clients in debug mode.
    pub fn client_message(&self) -> String {
        match self {
            Error::Plugin { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateBinding(name) => write!(f, "context property already defined: {}", name),
            Error::Plugin { plugin, message } => write!(f, "plugin {} failed: {}", plugin, message),
            Error::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Error::ResponseFinished => write!(f, "response already finished"),
            Error::Aborted => write!(f, "response aborted"),
            Error::InvalidPluginName(name) => write!(f, "plugin name required (got '{}')", name),
            Error::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
            Error::AlreadyListening => write!(f, "server is already listening"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Error::Http(e)
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        Error::InvalidHeader(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Error::InvalidHeader(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Custom(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Custom(msg.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
