//! Request ID plugin.
//!
//! Binds a request identifier (bound as `requestId`) and echoes it in the
//! `x-request-id` response header. A well-formed incoming `x-request-id` is
//! reused; otherwise a random UUID is generated.

use async_trait::async_trait;
use uuid::Uuid;

use super::{Plugin, PluginResult};
use crate::core::{Binding, RequestContext};

/// Header carrying the request ID in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest incoming ID that is reused.
const MAX_INCOMING_LEN: usize = 128;

/// Assigns each request an identifier.
#[derive(Clone, Debug)]
pub struct RequestId {
    trust_incoming: bool,
}

impl RequestId {
    pub fn new() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    /// Always generate a fresh ID, ignoring the client's header.
    pub fn generate_only() -> Self {
        Self {
            trust_incoming: false,
        }
    }

    fn incoming(&self, ctx: &RequestContext) -> Option<String> {
        if !self.trust_incoming {
            return None;
        }

        let value = ctx.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?;
        let valid = !value.is_empty()
            && value.len() <= MAX_INCOMING_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        valid.then(|| value.to_string())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for RequestId {
    async fn handle(&self, ctx: &mut RequestContext) -> PluginResult {
        let id = self
            .incoming(ctx)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        ctx.set_header(REQUEST_ID_HEADER, &id)?;
        Ok(Binding::from(id))
    }
}
