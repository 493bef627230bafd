//! tokio_appserver - Pluggable async HTTP application server powered by Rust and Tokio.
//!
//! Every request runs through an ordered chain of plugins that share one
//! [`RequestContext`](core::RequestContext). A plugin can inspect the request,
//! bind a value for later plugins, stage a body or finish the response. When
//! nothing finishes it, the server writes the staged body, or a
//! `{"code","message"}` document for the status.
//!
//! # Features
//!
//! - **HTTP/1.1 and HTTP/2**: cleartext h2c or ALPN-negotiated h2 over TLS
//! - **TLS**: rustls with certificate and key loaded from PEM files
//! - **Graceful Shutdown**: connection draining with a configurable timeout
//! - **Security Headers**: set on every response, individually configurable
//! - **Access Logging**: structured JSON logging with tracing
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_appserver::config::Config;
//! use tokio_appserver::core::{Binding, RequestContext};
//! use tokio_appserver::plugin::PluginResult;
//! use tokio_appserver::Server;
//!
//! fn hello(ctx: &mut RequestContext) -> BoxFuture<'_, PluginResult> {
//!     Box::pin(async move {
//!         ctx.set_body(serde_json::json!({ "hello": "world" }));
//!         Ok(Binding::Empty)
//!     })
//! }
//!
//! let mut server = Server::new(Config::from_env()?);
//! server.plugin_fn(hello)?;
//! server.open().await?;
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod core;
pub mod listener;
pub mod logging;
pub mod plugin;
pub mod server;
pub mod tables;
pub mod transport;

// Re-exports for convenience
pub use config::Config;
pub use server::{ListenInfo, Server};
