//! Transport-level response handle and wire body.
//!
//! [`ResponseHandle`] collects status and headers while plugins run. Ending
//! it freezes an `http::Response<ResponseBody>` for hyper to write and hands
//! out a [`Completion`] that resolves once the body has been fully consumed.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::{Either, Full, StreamBody};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tokio::sync::watch;
use tokio_stream::Stream;

use super::body::BodyStream;
use super::error::{Error, Result};

/// Boxed error used on the wire body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Wrapper stream that converts body chunks to `Frame<Bytes>`.
pub struct FrameStream {
    inner: BodyStream,
}

impl FrameStream {
    pub fn new(inner: BodyStream) -> Self {
        Self { inner }
    }
}

impl Stream for FrameStream {
    type Item = std::result::Result<Frame<Bytes>, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Streaming body using our frame stream.
pub type StreamingBody = StreamBody<FrameStream>;

/// Body that is either buffered or streamed.
pub type FlexibleBody = Either<Full<Bytes>, StreamingBody>;

/// Buffered body from bytes.
#[inline]
pub fn full_body(bytes: impl Into<Bytes>) -> FlexibleBody {
    Either::Left(Full::new(bytes.into()))
}

/// Streamed body from a byte stream.
#[inline]
pub fn streaming_body(stream: BodyStream) -> FlexibleBody {
    Either::Right(StreamBody::new(FrameStream::new(stream)))
}

/// Outcome of writing a response body.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Outcome {
    Pending,
    Done(u64),
    Failed(String),
    Aborted,
}

/// Resolves once the transport has consumed the response body.
#[derive(Clone, Debug)]
pub struct Completion {
    rx: watch::Receiver<Outcome>,
}

impl Completion {
    /// Wait for the body to be written.
    ///
    /// Returns the number of body bytes handed to the transport.
    pub async fn wait(mut self) -> Result<u64> {
        let outcome = match self.rx.wait_for(|o| *o != Outcome::Pending).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => Outcome::Aborted,
        };

        match outcome {
            Outcome::Done(bytes) => Ok(bytes),
            Outcome::Failed(message) => Err(Error::Serialization(message)),
            Outcome::Aborted | Outcome::Pending => Err(Error::Aborted),
        }
    }
}

/// Response body handed to hyper.
///
/// Tracks the bytes written and reports the outcome to its [`Completion`].
pub struct ResponseBody {
    inner: FlexibleBody,
    sent: u64,
    done: Option<watch::Sender<Outcome>>,
}

impl ResponseBody {
    fn new(inner: FlexibleBody) -> (Self, Completion) {
        let (tx, rx) = watch::channel(Outcome::Pending);
        let body = Self {
            inner,
            sent: 0,
            done: Some(tx),
        };
        (body, Completion { rx })
    }

    /// Empty body without completion tracking.
    pub fn empty() -> Self {
        Self {
            inner: full_body(Bytes::new()),
            sent: 0,
            done: None,
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        if let Some(tx) = self.done.take() {
            tx.send_replace(outcome);
        }
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.sent += data.len() as u64;
                }
                if this.inner.is_end_stream() {
                    let sent = this.sent;
                    this.finish(Outcome::Done(sent));
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::error!(error = %e, bytes = this.sent, "response body stream failed");
                this.finish(Outcome::Failed(e.to_string()));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                let sent = this.sent;
                this.finish(Outcome::Done(sent));
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        let outcome = if self.inner.is_end_stream() {
            Outcome::Done(self.sent)
        } else {
            Outcome::Aborted
        };
        self.finish(outcome);
    }
}

/// Lifecycle of a response handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseState {
    /// Still accepting status, headers and a body.
    Open,
    /// Fully staged for the transport.
    Ended,
    /// Abandoned; the transport drops the connection.
    Aborted,
}

/// Outgoing response for one request.
#[derive(Debug)]
pub struct ResponseHandle {
    status: StatusCode,
    headers: HeaderMap,
    state: ResponseState,
    body_suppressed: bool,
    response: Option<http::Response<ResponseBody>>,
    completion: Option<Completion>,
}

impl ResponseHandle {
    /// Create an open response with status 200 and no headers.
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            state: ResponseState::Open,
            body_suppressed: false,
            response: None,
            completion: None,
        }
    }

    /// Mark a response whose body the transport never writes (HEAD).
    ///
    /// Its [`Completion`] resolves as soon as the response is ended.
    pub fn with_body_suppressed(mut self, suppressed: bool) -> Self {
        self.body_suppressed = suppressed;
        self
    }

    #[inline]
    pub fn is_body_suppressed(&self) -> bool {
        self.body_suppressed
    }

    // Status

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    // Headers

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value by name.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[inline]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// Set a header (fast path with HeaderName + HeaderValue).
    #[inline]
    pub fn set_header_value(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Set a header by string name and value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    #[inline]
    pub fn remove_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    // State

    #[inline]
    pub fn state(&self) -> ResponseState {
        self.state
    }

    /// Check whether the response was ended or aborted.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state != ResponseState::Open
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state == ResponseState::Aborted
    }

    /// Freeze status, headers and `body` into the outgoing response.
    pub fn end(&mut self, body: FlexibleBody) -> Result<Completion> {
        if self.is_finished() {
            return Err(Error::ResponseFinished);
        }

        let (mut body, completion) = ResponseBody::new(body);
        if self.body_suppressed {
            body.finish(Outcome::Done(0));
        }
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);

        self.response = Some(response);
        self.completion = Some(completion.clone());
        self.state = ResponseState::Ended;
        Ok(completion)
    }

    /// Abandon the response; nothing is written.
    pub fn abort(&mut self) {
        if self.state == ResponseState::Open {
            self.state = ResponseState::Aborted;
        }
    }

    /// Take the finished response for the transport.
    pub fn take_response(&mut self) -> Option<http::Response<ResponseBody>> {
        self.response.take()
    }

    /// Completion of the ended response.
    pub fn completion(&self) -> Option<Completion> {
        self.completion.clone()
    }
}

impl Default for ResponseHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("sent", &self.sent)
            .field("end_stream", &self.inner.is_end_stream())
            .finish()
    }
}
