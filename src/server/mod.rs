//! Application server lifecycle.
//!
//! A [`Server`] collects plugins during setup, then [`open`](Server::open)s a
//! single transport chosen from the configuration and serves every request
//! through the frozen plugin chain.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_appserver::config::Config;
//! use tokio_appserver::plugin::RequestId;
//! use tokio_appserver::server::Server;
//!
//! let mut server = Server::new(Config::from_env()?);
//! server.plugin(RequestId::new())?;
//!
//! let info = server.open().await?;
//! println!("listening on {}:{} ({})", info.address, info.port, info.family);
//!
//! tokio::signal::ctrl_c().await?;
//! server.close().await?;
//! ```
//!
//! # Graceful Shutdown
//!
//! [`Server::close`] stops accepting, asks every connection to finish its
//! in-flight requests, and waits up to the drain timeout. Requests still
//! running after that are cancelled.

mod dispatcher;

pub use dispatcher::Dispatcher;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::{ContextSettings, Error, RequestContext, Result};
use crate::plugin::{Plugin, PluginRegistry, PluginResult};
use crate::tables::{MimeTable, StatusTable};
use crate::transport::{self, ServeContext, Transport, TransportKind};

/// Where an opened server listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenInfo {
    pub address: IpAddr,
    pub port: u16,
    /// `"IPv4"` or `"IPv6"`.
    pub family: &'static str,
}

impl ListenInfo {
    fn from_addr(addr: SocketAddr) -> Self {
        Self {
            address: addr.ip(),
            port: addr.port(),
            family: if addr.is_ipv4() { "IPv4" } else { "IPv6" },
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for ListenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.socket_addr(), self.family)
    }
}

/// State of an opened server.
struct Running {
    transport: Arc<dyn Transport>,
    info: ListenInfo,
    shutdown: CancellationToken,
    abort: CancellationToken,
    active: Arc<AtomicUsize>,
    accept_loop: JoinHandle<()>,
}

/// HTTP application server.
pub struct Server {
    config: Config,
    registry: PluginRegistry,
    mime: MimeTable,
    status: StatusTable,
    opened: bool,
    running: Option<Running>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: PluginRegistry::new(),
            mime: MimeTable::default(),
            status: StatusTable::default(),
            opened: false,
            running: None,
        }
    }

    /// Replace the content type table.
    pub fn with_mime_table(mut self, mime: MimeTable) -> Self {
        self.mime = mime;
        self
    }

    /// Replace the reason phrase table.
    pub fn with_status_table(mut self, status: StatusTable) -> Self {
        self.status = status;
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Append a plugin to the chain. See [`PluginRegistry::register`].
    pub fn plugin<P: Plugin + 'static>(&mut self, plugin: P) -> Result<&mut Self> {
        self.ensure_setup()?;
        self.registry.register(plugin)?;
        Ok(self)
    }

    /// Append a bare handler function. See [`PluginRegistry::register_fn`].
    pub fn plugin_fn<F>(&mut self, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, PluginResult>
            + Send
            + Sync
            + 'static,
    {
        self.ensure_setup()?;
        self.registry.register_fn(handler)?;
        Ok(self)
    }

    /// Append a plugin under an explicit name.
    pub fn plugin_named<P: Plugin + 'static>(&mut self, name: &str, plugin: P) -> Result<&mut Self> {
        self.ensure_setup()?;
        self.registry.register_named(name, plugin)?;
        Ok(self)
    }

    fn ensure_setup(&self) -> Result<()> {
        if self.opened {
            return Err(Error::AlreadyListening);
        }
        Ok(())
    }

    /// Bind the configured address and start serving.
    ///
    /// The plugin chain is frozen here; later registrations fail.
    pub async fn open(&mut self) -> Result<ListenInfo> {
        self.ensure_setup()?;

        let server = &self.config.server;
        let addr = transport::resolve(&server.host, server.port).await?;
        let transport = transport::bind(addr, server.generation, server.tls.as_ref()).await?;
        let local_addr = transport.local_addr()?;
        self.opened = true;

        let settings = Arc::new(ContextSettings {
            secure: server.is_tls(),
            host: authority(&server.host, local_addr.port(), server.is_tls()),
            default_type: self.config.response.default_type.clone(),
            encoding: self.config.response.encoding.clone(),
            mime: Arc::new(self.mime.clone()),
            status: Arc::new(self.status.clone()),
        });

        let chain = self.registry.freeze();
        let abort = CancellationToken::new();
        let dispatcher = Dispatcher::new(chain, settings, self.config.security.to_headers())
            .with_debug(server.debug)
            .with_access_log(server.access_log)
            .with_abort(abort.clone());

        let shutdown = CancellationToken::new();
        let active = Arc::new(AtomicUsize::new(0));
        let ctx = ServeContext {
            dispatcher: Arc::new(dispatcher),
            shutdown: shutdown.clone(),
            active: Arc::clone(&active),
        };

        let accept_loop = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move { transport.serve(ctx).await }
        });

        let info = ListenInfo::from_addr(local_addr);
        info!(
            address = %info.socket_addr(),
            family = info.family,
            transport = %transport.kind(),
            plugins = ?self.registry.names(),
            "Server listening"
        );

        self.running = Some(Running {
            transport,
            info: info.clone(),
            shutdown,
            abort,
            active,
            accept_loop,
        });

        Ok(info)
    }

    /// Stop accepting and drain open connections.
    ///
    /// Requests still running after the drain timeout are cancelled. Does
    /// nothing if the server is not open.
    pub async fn close(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        info!(address = %running.info.socket_addr(), "Shutting down");
        running.shutdown.cancel();

        let drain_timeout = self.config.server.drain_timeout;
        if !wait_for_drain(&running.active, drain_timeout).await {
            warn!(
                active = running.active.load(Ordering::Relaxed),
                timeout_secs = drain_timeout.as_secs(),
                "Drain timeout reached, cancelling remaining requests"
            );
            running.abort.cancel();
        }

        if let Err(e) = running.accept_loop.await {
            return Err(Error::Custom(format!("accept loop failed: {}", e)));
        }

        info!("Server closed");
        Ok(())
    }

    /// Where the server listens, once open.
    pub fn listen_info(&self) -> Option<&ListenInfo> {
        self.running.as_ref().map(|r| &r.info)
    }

    /// Transport serving connections, once open.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.running.as_ref().map(|r| r.transport.kind())
    }

    /// Number of open connections.
    pub fn active_connections(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |r| r.active.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_listening(&self) -> bool {
        self.running.is_some()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("plugins", &self.registry.names())
            .field("listen", &self.listen_info())
            .finish()
    }
}

/// Fallback authority for requests without one.
fn authority(host: &str, port: u16, tls: bool) -> String {
    let default_port = if tls { 443 } else { 80 };
    if port == default_port {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}

/// Wait for all active connections to drain.
/// Returns true if drained, false if the timeout was reached.
async fn wait_for_drain(active: &AtomicUsize, timeout: Duration) -> bool {
    let start = tokio::time::Instant::now();
    let check_interval = Duration::from_millis(50);

    loop {
        let count = active.load(Ordering::Relaxed);
        if count == 0 {
            return true;
        }

        if start.elapsed() >= timeout {
            return false;
        }

        debug!("Waiting for {} connections to drain...", count);
        tokio::time::sleep(check_interval).await;
    }
}
