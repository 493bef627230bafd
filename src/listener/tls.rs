//! TLS listener implementation using rustls.

use std::fs::File;
use std::future::Future;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::ServerConfig as RustlsConfig;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use super::tcp::TcpListener;
use super::{Connection, EstablishFuture, Listener, TlsConfig, TlsInfo};

/// Upper bound on a client's TLS handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A TLS connection.
pub struct TlsConnection {
    stream: TlsStream<TcpStream>,
    remote_addr: SocketAddr,
    tls_info: TlsInfo,
}

impl TlsConnection {
    pub fn new(stream: TlsStream<TcpStream>, remote_addr: SocketAddr, tls_info: TlsInfo) -> Self {
        Self {
            stream,
            remote_addr,
            tls_info,
        }
    }
}

impl Connection for TlsConnection {
    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.remote_addr)
    }

    fn tls_info(&self) -> Option<TlsInfo> {
        Some(self.tls_info.clone())
    }
}

impl tokio::io::AsyncRead for TlsConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for TlsConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Load a rustls server configuration from PEM files.
///
/// `alpn` lists the protocols offered during the handshake, most preferred
/// first.
pub fn load_server_config(config: &TlsConfig, alpn: &[&[u8]]) -> io::Result<RustlsConfig> {
    let cert_file = File::open(&config.cert_path)?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut cert_reader).collect::<io::Result<_>>()?;

    if certs.is_empty() {
        return Err(invalid_input(format!(
            "no certificates found in {}",
            config.cert_path
        )));
    }

    let key_file = File::open(&config.key_path)?;
    let mut key_reader = BufReader::new(key_file);
    let key = rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| invalid_input(format!("no private key found in {}", config.key_path)))?;

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let mut tls_config = RustlsConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(invalid_input)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(invalid_input)?;

    tls_config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    Ok(tls_config)
}

fn invalid_input(e: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
}

/// A TLS listener that accepts encrypted connections.
pub struct TlsListener {
    tcp: TcpListener,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
}

impl TlsListener {
    /// Create a new TLS listener bound to the given address.
    pub async fn bind(addr: SocketAddr, tls_config: RustlsConfig) -> io::Result<Self> {
        let tcp = TcpListener::bind(addr).await?;
        Ok(Self {
            tcp,
            acceptor: TlsAcceptor::from(Arc::new(tls_config)),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        })
    }

    /// Override the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    fn protocol_version(conn: &TlsStream<TcpStream>) -> String {
        let (_, server_conn) = conn.get_ref();
        match server_conn.protocol_version() {
            Some(tokio_rustls::rustls::ProtocolVersion::TLSv1_2) => "TLSv1.2".to_string(),
            Some(tokio_rustls::rustls::ProtocolVersion::TLSv1_3) => "TLSv1.3".to_string(),
            _ => "unknown".to_string(),
        }
    }

    fn alpn_protocol(conn: &TlsStream<TcpStream>) -> Option<String> {
        let (_, server_conn) = conn.get_ref();
        server_conn
            .alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).to_string())
    }
}

impl Listener for TlsListener {
    type Conn = TlsConnection;

    fn accept(&self) -> Pin<Box<dyn Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + '_>> {
        Box::pin(self.tcp.accept_stream())
    }

    fn establish(&self, stream: TcpStream, remote_addr: SocketAddr) -> EstablishFuture<Self::Conn> {
        let acceptor = self.acceptor.clone();
        let timeout = self.handshake_timeout;

        Box::pin(async move {
            let handshake_start = Instant::now();
            let tls_stream = tokio::time::timeout(timeout, acceptor.accept(stream))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"))?
                .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e))?;

            let tls_info = TlsInfo {
                protocol: Self::protocol_version(&tls_stream),
                alpn: Self::alpn_protocol(&tls_stream),
                handshake_duration: handshake_start.elapsed(),
            };

            Ok(TlsConnection::new(tls_stream, remote_addr, tls_info))
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    fn name(&self) -> &'static str {
        "tls"
    }

    fn is_tls(&self) -> bool {
        true
    }
}
