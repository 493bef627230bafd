//! Core types for request handling.
//!
//! This module provides the types every plugin works with:
//!
//! - [`RequestContext`] - normalized request identity, bindings and the staged response
//! - [`Body`] - response payload shapes
//! - [`ResponseHandle`] - transport-level response and its [`Completion`]
//! - [`Error`] - core error types
//!
//! # Example
//!
//! ```rust,ignore
//! use http::StatusCode;
//! use tokio_appserver::core::{Binding, RequestContext};
//! use tokio_appserver::plugin::PluginResult;
//!
//! async fn lookup(ctx: &mut RequestContext) -> PluginResult {
//!     if ctx.path() != "/users/1" {
//!         ctx.set_code(StatusCode::NOT_FOUND).end(None)?;
//!         return Ok(Binding::Empty);
//!     }
//!     ctx.set_body(serde_json::json!({ "id": 1 }));
//!     Ok(Binding::Empty)
//! }
//! ```

mod body;
mod context;
mod error;
mod finalize;
mod response;

pub use body::{Body, BodyStream};
pub use context::{
    Binding, ConnectionInfo, ContextSettings, RequestBody, RequestContext, RESERVED_NAMES,
};
pub use error::{Error, PluginError, Result};
pub use finalize::{content_type_value, extension};
pub use response::{
    full_body, streaming_body, BoxError, Completion, FlexibleBody, ResponseBody, ResponseHandle,
    ResponseState,
};

#[cfg(test)]
pub(crate) use context::tests::context_for;
