//! Per-request context shared by the plugin chain.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{HeaderMap, StatusCode, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::body::Body;
use super::error::{Error, Result};
use super::finalize;
use super::response::{BoxError, Completion, ResponseHandle};
use crate::tables::{MimeTable, StatusTable, DEFAULT_KEY};

/// Raw request body handed to plugins.
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// Names that can never be bound by plugins.
pub const RESERVED_NAMES: &[&str] = &[
    "request",
    "response",
    "instance",
    "headers",
    "path",
    "scheme",
    "method",
    "authority",
    "mime",
    "status",
    "url",
    "set",
    "type",
    "head",
    "message",
    "code",
    "body",
    "end",
];

/// Server-wide settings every context reads from.
#[derive(Clone, Debug)]
pub struct ContextSettings {
    /// Whether the transport is TLS-wrapped (scheme fallback).
    pub secure: bool,
    /// Authority fallback when the request carries none.
    pub host: String,
    /// MIME table key used when nothing else matches.
    pub default_type: String,
    /// Charset parameter on content types.
    pub encoding: String,
    pub mime: Arc<MimeTable>,
    pub status: Arc<StatusTable>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            secure: false,
            host: "localhost".to_string(),
            default_type: DEFAULT_KEY.to_string(),
            encoding: "utf-8".to_string(),
            mime: Arc::new(MimeTable::default()),
            status: Arc::new(StatusTable::default()),
        }
    }
}

/// Peer information attached to requests by the transport.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,
    /// Negotiated ALPN protocol on TLS connections.
    pub alpn: Option<String>,
}

/// Value bound on a context by a plugin.
#[derive(Clone, Default)]
pub enum Binding {
    /// The plugin produced nothing.
    #[default]
    Empty,
    /// A structured value.
    Value(Value),
    /// Any shared Rust value.
    Shared(Arc<dyn Any + Send + Sync>),
}

impl Binding {
    /// Bind an arbitrary value.
    pub fn shared<T: Any + Send + Sync>(value: T) -> Self {
        Binding::Shared(Arc::new(value))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Binding::Empty)
    }

    /// Structured value, if this binding holds one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Binding::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Shared value of type `T`, if this binding holds one.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Binding::Shared(value) => Arc::clone(value).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Empty => f.write_str("Empty"),
            Binding::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Binding::Shared(_) => f.write_str("Shared(..)"),
        }
    }
}

impl From<()> for Binding {
    fn from(_: ()) -> Self {
        Binding::Empty
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Value(value)
    }
}

impl From<String> for Binding {
    fn from(value: String) -> Self {
        Binding::Value(Value::String(value))
    }
}

impl From<&str> for Binding {
    fn from(value: &str) -> Self {
        Binding::Value(Value::String(value.to_string()))
    }
}

/// Request context passed through the plugin chain.
///
/// Carries the normalized request identity (identical for HTTP/1 and
/// HTTP/2), the staged response and the values bound by earlier plugins.
///
/// Setters return `&mut Self` so calls can be chained:
///
/// ```rust,ignore
/// ctx.set_code(StatusCode::NOT_FOUND)
///     .set_message("no such user")
///     .end(None)?;
/// ```
pub struct RequestContext {
    method: String,
    path: String,
    scheme: String,
    authority: String,
    headers: HeaderMap,
    url: Uri,
    version: http::Version,
    remote_addr: Option<SocketAddr>,
    request_body: Option<RequestBody>,

    response: ResponseHandle,
    message: Option<String>,
    body: Body,

    bindings: HashMap<String, Binding>,
    settings: Arc<ContextSettings>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Build a context from an inbound request and its response handle.
    pub fn new(
        request: http::Request<RequestBody>,
        response: ResponseHandle,
        settings: Arc<ContextSettings>,
    ) -> Self {
        let (parts, body) = request.into_parts();

        // HTTP/2 pseudo-headers land in the URI; HTTP/1 only has the
        // request-line path and the host header.
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let scheme = match parts.uri.scheme_str() {
            Some(scheme) => scheme.to_string(),
            None if settings.secure => "https".to_string(),
            None => "http".to_string(),
        };

        let method = parts.method.as_str().to_ascii_lowercase();

        let authority = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| settings.host.clone());

        let url = Uri::builder()
            .scheme(scheme.as_str())
            .authority(authority.as_str())
            .path_and_query(path.as_str())
            .build()
            .unwrap_or_else(|_| parts.uri.clone());

        let remote_addr = parts
            .extensions
            .get::<ConnectionInfo>()
            .map(|info| info.remote_addr);

        Self {
            method,
            path,
            scheme,
            authority,
            headers: parts.headers,
            url,
            version: parts.version,
            remote_addr,
            request_body: Some(body),
            response,
            message: None,
            body: Body::Empty,
            bindings: HashMap::new(),
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` as this request's cancellation signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    // Identity

    /// Lowercase request method.
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path and query as received.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[inline]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Request headers (read-only).
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Absolute request URL.
    #[inline]
    pub fn url(&self) -> &Uri {
        &self.url
    }

    #[inline]
    pub fn version(&self) -> http::Version {
        self.version
    }

    #[inline]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Take the raw request body. Returns `None` once taken.
    pub fn take_request_body(&mut self) -> Option<RequestBody> {
        self.request_body.take()
    }

    #[inline]
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    // Bindings

    /// Bind `value` under `name`.
    ///
    /// Each name can be bound once; core names are reserved.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Binding>) -> Result<()> {
        let name = name.into();
        if self.is_bound(&name) {
            return Err(Error::DuplicateBinding(name));
        }
        self.bindings.insert(name, value.into());
        Ok(())
    }

    /// Check whether `name` is bound or reserved.
    pub fn is_bound(&self, name: &str) -> bool {
        RESERVED_NAMES.contains(&name) || self.bindings.contains_key(name)
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    /// Structured value bound under `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(Binding::as_value)
    }

    /// Shared value of type `T` bound under `name`.
    pub fn shared<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).and_then(Binding::downcast::<T>)
    }

    // Response staging

    /// Set the content type from a MIME table key (`"json"`, `"html"`, ...).
    ///
    /// Unknown keys fall back to the configured default type.
    pub fn set_type(&mut self, key: &str) -> Result<&mut Self> {
        let mime = self.settings.mime.resolve(key, &self.settings.default_type);
        let value = finalize::content_type_value(mime, &self.settings.encoding)?;
        self.response.set_header_value(header::CONTENT_TYPE, value);
        Ok(self)
    }

    /// Current `content-type` response header.
    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.response.header(header::CONTENT_TYPE.as_str())
    }

    /// Set a response header. An empty value removes it.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        if value.is_empty() {
            self.response.remove_header(name);
        } else {
            self.response.set_header(name, value)?;
        }
        Ok(self)
    }

    /// Set a response header from typed parts.
    pub fn set_header_value(&mut self, name: header::HeaderName, value: HeaderValue) -> &mut Self {
        self.response.set_header_value(name, value);
        self
    }

    /// Current value of a response header.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.response.remove_header(name);
        self
    }

    /// Override the reason message used in the default body.
    pub fn set_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_code(&mut self, code: StatusCode) -> &mut Self {
        self.response.set_status(code);
        self
    }

    #[inline]
    pub fn code(&self) -> StatusCode {
        self.response.status()
    }

    pub fn set_body(&mut self, body: impl Into<Body>) -> &mut Self {
        self.body = body.into();
        self
    }

    #[inline]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Take the staged body, leaving nothing staged.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    // Finalization

    /// Finalize the response.
    ///
    /// `body` takes precedence over the staged body. Fails with
    /// [`Error::ResponseFinished`] if the response was already ended or
    /// aborted.
    pub fn end(&mut self, body: Option<Body>) -> Result<Completion> {
        let body = match body {
            Some(body) => body,
            None => self.take_body(),
        };
        finalize::finalize(
            &mut self.response,
            &self.settings,
            self.url.path(),
            self.message.as_deref(),
            body,
        )
    }

    /// Drop the connection without writing a response.
    pub fn abort(&mut self) {
        self.response.abort();
    }

    /// Check whether the response was ended or aborted.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.response.is_finished()
    }

    /// Cancelled when the request is abandoned or the server force-stops.
    #[inline]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[inline]
    pub fn response(&self) -> &ResponseHandle {
        &self.response
    }

    #[inline]
    pub(crate) fn response_mut(&mut self) -> &mut ResponseHandle {
        &mut self.response
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("status", &self.response.status())
            .field("state", &self.response.state())
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}
