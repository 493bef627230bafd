//! Plugin chain for request processing.
//!
//! A plugin is an async handler that receives the [`RequestContext`], may
//! mutate it or finish the response, and returns a [`Binding`] that is stored
//! on the context under the plugin's name for later plugins to read.
//!
//! Plugins run strictly in registration order. As soon as one of them
//! finishes the response (`ctx.end(..)` or `ctx.abort()`), the remaining
//! plugins are skipped.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use tokio_appserver::core::{Binding, RequestContext};
//! use tokio_appserver::plugin::{Plugin, PluginRegistry, PluginResult};
//!
//! struct Session;
//!
//! #[async_trait]
//! impl Plugin for Session {
//!     async fn handle(&self, ctx: &mut RequestContext) -> PluginResult {
//!         let token = ctx.headers().get("authorization").cloned();
//!         Ok(Binding::shared(token))
//!     }
//! }
//!
//! let mut registry = PluginRegistry::new();
//! registry.register(Session)?; // bound as "session"
//! ```

mod registry;
pub mod request_id;

pub use registry::{PluginChain, PluginEntry, PluginRegistry};
pub use request_id::RequestId;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::core::{Binding, PluginError, RequestContext};

/// Result returned by plugin handlers.
pub type PluginResult = std::result::Result<Binding, PluginError>;

/// Trait for implementing plugins.
///
/// # Ordering
///
/// Plugins execute in the order they were registered, one at a time:
///
/// ```text
/// Request → P1.handle → bind "p1" → P2.handle → bind "p2" → ... → end
///              │
///              └─ ctx.end(..) → remaining plugins skipped
/// ```
///
/// An `Err` aborts the chain and produces a 500 response unless the response
/// was already finished.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name the result is bound under.
    ///
    /// Empty by default, in which case the implementing type's name is used.
    fn name(&self) -> &str {
        ""
    }

    /// Process the request.
    async fn handle(&self, ctx: &mut RequestContext) -> PluginResult;
}

/// Adapter running a bare handler function as a plugin.
pub(crate) struct FnPlugin<F> {
    handler: F,
}

impl<F> FnPlugin<F> {
    pub(crate) fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> Plugin for FnPlugin<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, PluginResult> + Send + Sync,
{
    async fn handle(&self, ctx: &mut RequestContext) -> PluginResult {
        (self.handler)(ctx).await
    }
}
