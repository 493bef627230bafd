//! Response finalization.
//!
//! Turns the staged status, message and [`Body`] into the wire response:
//! defaulted body, resolved content type and framing headers.

use std::path::Path;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use serde_json::json;

use super::body::Body;
use super::context::ContextSettings;
use super::error::{Error, Result};
use super::response::{full_body, streaming_body, Completion, FlexibleBody, ResponseHandle};

/// Format a `content-type` value with its charset parameter.
pub fn content_type_value(mime: &str, encoding: &str) -> Result<HeaderValue> {
    let value = if encoding.is_empty() {
        HeaderValue::try_from(mime)?
    } else {
        HeaderValue::try_from(format!("{}; charset={}", mime, encoding))?
    };
    Ok(value)
}

/// Extension of the last path segment, without the dot.
pub fn extension(path: &str) -> &str {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
}

/// Finalize `response` with `body`.
///
/// An empty body becomes `{"code", "message"}` where the message is the
/// staged one, else the reason phrase for the status, else `""`. Without an
/// explicit content type one is derived from the URL path extension.
pub(crate) fn finalize(
    response: &mut ResponseHandle,
    settings: &ContextSettings,
    url_path: &str,
    message: Option<&str>,
    body: Body,
) -> Result<Completion> {
    if response.is_finished() {
        return Err(Error::ResponseFinished);
    }

    let code = response.status();
    let body = match body {
        Body::Empty => {
            let message = message
                .or_else(|| settings.status.reason(code))
                .unwrap_or("");
            Body::Json(json!({ "code": code.as_u16(), "message": message }))
        }
        body => body,
    };

    if !response.has_header(header::CONTENT_TYPE.as_str()) {
        let mime = settings
            .mime
            .resolve(extension(url_path), &settings.default_type);
        response.set_header_value(
            header::CONTENT_TYPE,
            content_type_value(mime, &settings.encoding)?,
        );
    }

    let wire = encode(response, settings, body)?;
    response.end(wire)
}

fn encode(
    response: &mut ResponseHandle,
    settings: &ContextSettings,
    body: Body,
) -> Result<FlexibleBody> {
    let bytes = match body {
        // Chunked: no content-length
        Body::Stream(stream) => {
            response.remove_header(header::CONTENT_LENGTH.as_str());
            return Ok(streaming_body(stream));
        }
        Body::Json(value) => {
            response.set_header_value(
                header::CONTENT_TYPE,
                content_type_value(settings.mime.json(), &settings.encoding)?,
            );
            Bytes::from(serde_json::to_vec(&value)?)
        }
        Body::Binary(bytes) => bytes,
        Body::Text(text) => Bytes::from(text),
        Body::Empty => Bytes::new(),
    };

    response.set_header_value(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    Ok(full_body(bytes))
}
