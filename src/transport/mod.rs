//! HTTP transports.
//!
//! One transport is chosen per server from the configured protocol
//! generation and whether TLS is on:
//!
//! | Generation | TLS | Kind | Protocols |
//! |------------|-----|------|-----------|
//! | 1 | off | [`TransportKind::Plain`] | HTTP/1.1 |
//! | 1 | on  | [`TransportKind::Tls`] | HTTP/1.1 (ALPN `http/1.1`) |
//! | 2 | off | [`TransportKind::Multiplexed`] | h2c + HTTP/1.1 |
//! | 2 | on  | [`TransportKind::TlsMultiplexed`] | h2 + HTTP/1.1 (ALPN) |
//!
//! Every kind is served by the same [`HttpTransport`] over a different
//! [`Listener`].

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::core::{BoxError, ConnectionInfo};
use crate::listener::{load_server_config, Connection, Listener, TcpListener, TlsConfig, TlsListener};
use crate::server::Dispatcher;

/// HTTP protocol generation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Generation {
    /// HTTP/1.1 only.
    #[default]
    Http1,
    /// HTTP/2, keeping HTTP/1.1 compatibility.
    Http2,
}

impl FromStr for Generation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "1.1" | "http1" | "http/1.1" => Ok(Generation::Http1),
            "2" | "h2" | "http2" | "http/2" => Ok(Generation::Http2),
            other => Err(format!("unknown HTTP version '{}' (expected 1 or 2)", other)),
        }
    }
}

/// Concrete transport variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Plain,
    Tls,
    Multiplexed,
    TlsMultiplexed,
}

impl TransportKind {
    /// Pick the transport for a generation and TLS setting.
    pub fn select(generation: Generation, tls: bool) -> Self {
        match (generation, tls) {
            (Generation::Http1, false) => TransportKind::Plain,
            (Generation::Http1, true) => TransportKind::Tls,
            (Generation::Http2, false) => TransportKind::Multiplexed,
            (Generation::Http2, true) => TransportKind::TlsMultiplexed,
        }
    }

    pub fn generation(self) -> Generation {
        match self {
            TransportKind::Plain | TransportKind::Tls => Generation::Http1,
            TransportKind::Multiplexed | TransportKind::TlsMultiplexed => Generation::Http2,
        }
    }

    pub fn is_tls(self) -> bool {
        matches!(self, TransportKind::Tls | TransportKind::TlsMultiplexed)
    }

    /// Protocols offered through ALPN, most preferred first.
    pub fn alpn_protocols(self) -> &'static [&'static [u8]] {
        match self.generation() {
            Generation::Http1 => &[b"http/1.1"],
            Generation::Http2 => &[b"h2", b"http/1.1"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Plain => "plain",
            TransportKind::Tls => "tls",
            TransportKind::Multiplexed => "multiplexed",
            TransportKind::TlsMultiplexed => "tls-multiplexed",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State shared by the accept loop and every connection task.
#[derive(Clone)]
pub struct ServeContext {
    pub dispatcher: Arc<Dispatcher>,
    /// Stop accepting; ask connections to close gracefully.
    pub shutdown: CancellationToken,
    /// Number of open connections.
    pub active: Arc<AtomicUsize>,
}

/// Decrements the active-connection count when dropped.
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A bound transport ready to serve.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Run the accept loop until `ctx.shutdown` is cancelled.
    ///
    /// Each connection runs on its own task and is tracked in `ctx.active`
    /// until it closes.
    async fn serve(&self, ctx: ServeContext);
}

/// Transport serving HTTP over any [`Listener`].
pub struct HttpTransport<L> {
    listener: L,
    kind: TransportKind,
}

impl<L: Listener> HttpTransport<L> {
    pub fn new(listener: L, kind: TransportKind) -> Self {
        Self { listener, kind }
    }
}

#[async_trait]
impl<L: Listener> Transport for HttpTransport<L> {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn serve(&self, ctx: ServeContext) {
        debug!(transport = %self.kind, listener = self.listener.name(), "accept loop started");

        loop {
            tokio::select! {
                biased;

                _ = ctx.shutdown.cancelled() => {
                    debug!("shutdown requested, stopping accept loop");
                    break;
                }
                result = self.listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!(error = %e, "accept error");
                            continue;
                        }
                    };

                    let establishing = self.listener.establish(stream, remote_addr);
                    let guard = ConnectionGuard::new(&ctx.active);
                    let ctx = ctx.clone();
                    let kind = self.kind;

                    tokio::spawn(async move {
                        let _guard = guard;
                        match establishing.await {
                            Ok(conn) => serve_connection(conn, remote_addr, kind, ctx).await,
                            Err(e) => debug!(remote = %remote_addr, error = %e, "connection setup failed"),
                        }
                    });
                }
            }
        }
    }
}

/// Serve one connection until it closes.
///
/// On shutdown the connection finishes in-flight requests and closes
/// (HTTP/1 disables keep-alive, HTTP/2 sends GOAWAY).
async fn serve_connection<C: Connection>(
    conn: C,
    remote_addr: SocketAddr,
    kind: TransportKind,
    ctx: ServeContext,
) {
    let info = ConnectionInfo {
        remote_addr,
        alpn: conn.tls_info().and_then(|tls| tls.alpn),
    };

    let dispatcher = Arc::clone(&ctx.dispatcher);
    let service = service_fn(move |mut req: http::Request<Incoming>| {
        req.extensions_mut().insert(info.clone());
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.dispatch(req).await }
    });

    let io = TokioIo::new(conn);
    let shutdown = ctx.shutdown;

    let result: Result<(), BoxError> = match kind.generation() {
        Generation::Http1 => {
            let conn = hyper::server::conn::http1::Builder::new()
                .timer(TokioTimer::new())
                .keep_alive(true)
                .serve_connection(io, service);
            tokio::pin!(conn);

            tokio::select! {
                res = conn.as_mut() => res.map_err(Into::into),
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await.map_err(Into::into)
                }
            }
        }
        Generation::Http2 => {
            let mut builder = auto::Builder::new(TokioExecutor::new());
            builder.http1().timer(TokioTimer::new()).keep_alive(true);
            builder.http2().timer(TokioTimer::new());

            let conn = builder.serve_connection(io, service);
            tokio::pin!(conn);

            tokio::select! {
                res = conn.as_mut() => res,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            }
        }
    };

    if let Err(e) = result {
        debug!(remote = %remote_addr, error = %e, "connection closed with error");
    }
}

/// Resolve a host and port to the first matching socket address.
pub async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address found for {}", host),
            )
        })
}

/// Bind the transport for `generation`, TLS-wrapped when `tls` is set.
pub async fn bind(
    addr: SocketAddr,
    generation: Generation,
    tls: Option<&TlsConfig>,
) -> io::Result<Arc<dyn Transport>> {
    let kind = TransportKind::select(generation, tls.is_some());

    let transport: Arc<dyn Transport> = match tls {
        None => Arc::new(HttpTransport::new(TcpListener::bind(addr).await?, kind)),
        Some(tls) => {
            let server_config = load_server_config(tls, kind.alpn_protocols())?;
            let listener = TlsListener::bind(addr, server_config).await?;
            Arc::new(HttpTransport::new(listener, kind))
        }
    };

    Ok(transport)
}
