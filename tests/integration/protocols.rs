//! Transport tests: HTTP/2 cleartext and TLS.

use crate::helpers::*;
use reqwest::{Client, StatusCode, Version};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use tokio_appserver::transport::{Generation, TransportKind};

fn tls_connector(cert: CertificateDer<'static>, alpn: &[&[u8]]) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.add(cert).unwrap();

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    TlsConnector::from(Arc::new(config))
}

/// Read until the peer closes, tolerating a missing close_notify.
async fn read_all<R: AsyncReadExt + Unpin>(stream: &mut R) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Generation 2 speaks h2c with prior knowledge
#[tokio::test]
async fn test_http2_prior_knowledge() {
    let mut config = test_config();
    config.server.generation = Generation::Http2;

    let server = TestServer::start(config, |s| {
        s.plugin(Hello).unwrap();
        s.plugin(Inspect).unwrap();
    })
    .await;
    assert_eq!(server.server.transport_kind(), Some(TransportKind::Multiplexed));

    let client = Client::builder().http2_prior_knowledge().build().unwrap();
    let resp = client.get(server.url("/h2?x=1")).send().await.unwrap();

    assert_eq!(resp.version(), Version::HTTP_2);
    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "x-frame-options", "SAMEORIGIN");

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["path"], "/h2?x=1");
    assert_eq!(body["scheme"], "http");
    assert_eq!(body["authority"], format!("127.0.0.1:{}", server.info.port));

    server.close().await;
}

/// Generation 2 keeps HTTP/1.1 clients working
#[tokio::test]
async fn test_http2_keeps_http1() {
    let mut config = test_config();
    config.server.generation = Generation::Http2;

    let server = TestServer::start(config, |_| {}).await;

    let resp = server.get("/").await;
    assert_eq!(resp.version(), Version::HTTP_11);
    assert_status(&resp, StatusCode::OK);

    server.close().await;
}

/// Generation 1 does not accept h2c
#[tokio::test]
async fn test_http1_rejects_h2c() {
    let server = TestServer::with_plugins(|_| {}).await;

    let client = Client::builder().http2_prior_knowledge().build().unwrap();
    assert!(client.get(server.url("/")).send().await.is_err());

    server.close().await;
}

/// HTTP/1.1 over TLS
#[tokio::test]
async fn test_tls_http1() {
    let cert = test_cert();
    let mut config = test_config();
    config.server.tls = Some(cert.config.clone());

    let server = TestServer::start(config, |s| {
        s.plugin(Inspect).unwrap();
    })
    .await;
    assert_eq!(server.server.transport_kind(), Some(TransportKind::Tls));

    let connector = tls_connector(cert.cert_der.clone(), &[b"http/1.1"]);
    let tcp = TcpStream::connect(server.info.socket_addr()).await.unwrap();
    let mut tls = connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .unwrap();

    assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"http/1.1"[..]));

    tls.write_all(b"GET /secure HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let response = read_all(&mut tls).await;

    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);
    assert!(response.contains("strict-transport-security"));
    assert!(response.contains(r#""scheme":"https""#), "{}", response);
    assert!(response.contains(r#""authority":"localhost""#), "{}", response);

    server.close().await;
}

/// Generation 2 over TLS offers h2 through ALPN
#[tokio::test]
async fn test_tls_alpn_h2() {
    let cert = test_cert();
    let mut config = test_config();
    config.server.generation = Generation::Http2;
    config.server.tls = Some(cert.config.clone());

    let server = TestServer::start(config, |_| {}).await;
    assert_eq!(
        server.server.transport_kind(),
        Some(TransportKind::TlsMultiplexed)
    );

    let connector = tls_connector(cert.cert_der.clone(), &[b"h2", b"http/1.1"]);
    let tcp = TcpStream::connect(server.info.socket_addr()).await.unwrap();
    let tls = connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .unwrap();
    assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"h2"[..]));
    drop(tls);

    // HTTP/1.1 clients are still served
    let connector = tls_connector(cert.cert_der.clone(), &[b"http/1.1"]);
    let tcp = TcpStream::connect(server.info.socket_addr()).await.unwrap();
    let mut tls = connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .unwrap();
    tls.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let response = read_all(&mut tls).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{}", response);

    server.close().await;
}
