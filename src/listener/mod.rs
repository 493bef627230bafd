//! Listener abstractions for accepting connections.
//!
//! Accepting is split in two steps so the accept loop never waits on a
//! client:
//!
//! 1. [`Listener::accept`] returns the raw TCP stream (runs on the accept loop).
//! 2. [`Listener::establish`] turns it into a [`Connection`] (runs on the
//!    connection's own task; this is where the TLS handshake happens).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Listener trait                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐    ┌─────────────┐                         │
//! │  │ TcpListener │    │ TlsListener │                         │
//! │  │   (tcp.rs)  │    │   (tls.rs)  │                         │
//! │  └──────┬──────┘    └──────┬──────┘                         │
//! │         └─────────┬────────┘                                │
//! │           ┌───────▼───────┐                                 │
//! │           │   Connection  │                                 │
//! │           └───────────────┘                                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod tcp;
mod tls;

pub use tcp::{TcpConnection, TcpListener};
pub use tls::{load_server_config, TlsConnection, TlsListener, HANDSHAKE_TIMEOUT};

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Future returned by [`Listener::establish`].
pub type EstablishFuture<C> = Pin<Box<dyn Future<Output = io::Result<C>> + Send + 'static>>;

/// A connection accepted by a listener.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Get the remote address of the connection.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Get TLS information if this is a TLS connection.
    fn tls_info(&self) -> Option<TlsInfo> {
        None
    }
}

/// TLS connection information.
#[derive(Debug, Clone)]
pub struct TlsInfo {
    /// TLS protocol version (e.g., "TLSv1.3").
    pub protocol: String,
    /// ALPN negotiated protocol (e.g., "h2", "http/1.1").
    pub alpn: Option<String>,
    /// TLS handshake duration.
    pub handshake_duration: Duration,
}

/// Trait for listening and accepting connections.
pub trait Listener: Send + Sync + 'static {
    /// The connection type produced by this listener.
    type Conn: Connection;

    /// Accept the next TCP stream.
    fn accept(&self) -> Pin<Box<dyn Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + '_>>;

    /// Finish setting up an accepted stream.
    fn establish(&self, stream: TcpStream, remote_addr: SocketAddr) -> EstablishFuture<Self::Conn>;

    /// Get the local address this listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Get the listener name for logging.
    fn name(&self) -> &'static str;

    /// Check if this listener uses TLS.
    fn is_tls(&self) -> bool {
        false
    }
}

/// Certificate and key locations for TLS listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format).
    pub cert_path: String,
    /// Path to private key file (PEM format).
    pub key_path: String,
}

impl TlsConfig {
    pub fn new(cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}
