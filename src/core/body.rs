//! Staged response bodies.
//!
//! A [`Body`] is what plugins stage on the context. Its variant decides how
//! the body is serialized at finalization time.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_appserver::core::Body;
//!
//! let (tx, body) = Body::channel(16);
//!
//! tokio::spawn(async move {
//!     tx.send(Ok("data: hello\n\n".into())).await.ok();
//! });
//!
//! ctx.set_body(body);
//! ```

use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;

use super::error::Result;

/// Lazily produced body bytes.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Response payload, one variant per wire shape.
#[derive(Default)]
pub enum Body {
    /// Nothing staged.
    #[default]
    Empty,
    /// Raw bytes, written verbatim.
    Binary(Bytes),
    /// Structured value, serialized as JSON.
    Json(Value),
    /// Text, written verbatim.
    Text(String),
    /// Byte stream, piped to the client as it is produced.
    Stream(BodyStream),
}

impl Body {
    /// Serialize any value into a structured body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }

    /// Wrap a byte stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Body::Stream(Box::pin(stream))
    }

    /// Stream everything read from `reader` (files, pipes, sockets).
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Body::stream(ReaderStream::new(reader))
    }

    /// Create a streaming body fed through a channel.
    ///
    /// The body ends when every sender is dropped. Sending an `Err` aborts
    /// the transfer.
    pub fn channel(capacity: usize) -> (mpsc::Sender<io::Result<Bytes>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Body::stream(ReceiverStream::new(rx)))
    }

    /// Check whether nothing is staged.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// Shape name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Empty => "empty",
            Body::Binary(_) => "binary",
            Body::Json(_) => "json",
            Body::Text(_) => "text",
            Body::Stream(_) => "stream",
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Binary(bytes) => f.debug_tuple("Binary").field(&bytes.len()).finish(),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Binary(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Binary(Bytes::from(bytes))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}
