//! Test helpers: an in-process server on an ephemeral port and the plugins
//! the tests register on it.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode as HttpStatus;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

use tokio_appserver::config::Config;
use tokio_appserver::core::{Binding, Body, RequestContext};
use tokio_appserver::listener::TlsConfig;
use tokio_appserver::plugin::{Plugin, PluginResult};
use tokio_appserver::{ListenInfo, Server};

/// Server running on 127.0.0.1 with a client pointed at it.
pub struct TestServer {
    pub server: Server,
    pub info: ListenInfo,
    pub base_url: String,
    pub client: Client,
}

#[allow(dead_code)]
impl TestServer {
    /// Open a server with `config` after `setup` registered its plugins.
    pub async fn start(config: Config, setup: impl FnOnce(&mut Server)) -> Self {
        let mut server = Server::new(config);
        setup(&mut server);

        let info = server.open().await.expect("Failed to open server");
        let base_url = format!("http://{}", info.socket_addr());

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            server,
            info,
            base_url,
            client,
        }
    }

    /// Open a server with the default test config.
    pub async fn with_plugins(setup: impl FnOnce(&mut Server)) -> Self {
        Self::start(test_config(), setup).await
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request to the server
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// Make a GET request with custom headers
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> Response {
        let mut req = self.client.get(self.url(path));
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        req.send().await.expect("GET request failed")
    }

    /// Make a GET request and parse the body as JSON
    pub async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let resp = self.get(path).await;
        let status = resp.status();
        let body = resp.json().await.expect("Body is not JSON");
        (status, body)
    }

    pub async fn close(mut self) {
        self.server.close().await.expect("Failed to close server");
    }
}

/// Loopback, ephemeral port, short drain.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.drain_timeout = Duration::from_secs(2);
    config
}

/// Assert that response has expected status
pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Assert that response contains header
pub fn assert_header(response: &Response, name: &str, expected: &str) {
    let value = response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap();
    assert_eq!(value, expected, "Header '{}' mismatch", name);
}

/// Assert that response contains header with prefix
pub fn assert_header_starts_with(response: &Response, name: &str, prefix: &str) {
    let value = response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap();
    assert!(
        value.starts_with(prefix),
        "Header '{}' expected to start with '{}', got '{}'",
        name,
        prefix,
        value
    );
}

/// Self-signed `localhost` certificate written to temp PEM files.
pub struct TestCert {
    pub config: TlsConfig,
    pub cert_der: tokio_rustls::rustls::pki_types::CertificateDer<'static>,
    _cert_file: tempfile::NamedTempFile,
    _key_file: tempfile::NamedTempFile,
}

pub fn test_cert() -> TestCert {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

    let mut cert_file = tempfile::NamedTempFile::new().unwrap();
    cert_file.write_all(certified.cert.pem().as_bytes()).unwrap();
    let mut key_file = tempfile::NamedTempFile::new().unwrap();
    key_file
        .write_all(certified.key_pair.serialize_pem().as_bytes())
        .unwrap();

    TestCert {
        config: TlsConfig::new(
            cert_file.path().to_string_lossy(),
            key_file.path().to_string_lossy(),
        ),
        cert_der: certified.cert.der().clone(),
        _cert_file: cert_file,
        _key_file: key_file,
    }
}

// =============================================================================
// Plugins
// =============================================================================

/// Stages `{"a":1}`.
pub struct Hello;

#[async_trait]
impl Plugin for Hello {
    async fn handle(&self, ctx: &mut RequestContext) -> PluginResult {
        ctx.set_body(json!({ "a": 1 }));
        Ok(Binding::from("world"))
    }
}

/// Always fails with its message.
pub struct Fail(pub &'static str);

#[async_trait]
impl Plugin for Fail {
    async fn handle(&self, _ctx: &mut RequestContext) -> PluginResult {
        Err(self.0.into())
    }
}

/// Ends every request with 404.
pub struct NotFound;

#[async_trait]
impl Plugin for NotFound {
    async fn handle(&self, ctx: &mut RequestContext) -> PluginResult {
        ctx.set_code(HttpStatus::NOT_FOUND).end(None)?;
        Ok(Binding::Empty)
    }
}

/// Counts its invocations.
#[derive(Clone, Default)]
pub struct Counter(pub Arc<AtomicUsize>);

#[allow(dead_code)]
impl Counter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for Counter {
    async fn handle(&self, _ctx: &mut RequestContext) -> PluginResult {
        let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Binding::from(json!(n)))
    }
}

/// Echoes request identity and the values bound before it.
pub struct Inspect;

#[async_trait]
impl Plugin for Inspect {
    async fn handle(&self, ctx: &mut RequestContext) -> PluginResult {
        let body = json!({
            "method": ctx.method(),
            "path": ctx.path(),
            "scheme": ctx.scheme(),
            "authority": ctx.authority(),
            "hello": ctx.value("hello").cloned(),
            "requestId": ctx.value("requestId").cloned(),
        });
        ctx.set_body(body);
        Ok(Binding::Empty)
    }
}

/// Streams `count` chunks `chunk{i}\n`, `delay` apart.
pub struct Chunks {
    pub count: usize,
    pub delay: Duration,
}

#[async_trait]
impl Plugin for Chunks {
    async fn handle(&self, ctx: &mut RequestContext) -> PluginResult {
        let (tx, body) = Body::channel(4);
        let (count, delay) = (self.count, self.delay);

        tokio::spawn(async move {
            for i in 1..=count {
                let chunk = Bytes::from(format!("chunk{}\n", i));
                if tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
                tokio::time::sleep(delay).await;
            }
        });

        ctx.set_type("text")?.set_body(body);
        Ok(Binding::Empty)
    }
}

/// Sleeps before letting the chain continue.
pub struct Slow(pub Duration);

#[async_trait]
impl Plugin for Slow {
    async fn handle(&self, _ctx: &mut RequestContext) -> PluginResult {
        tokio::time::sleep(self.0).await;
        Ok(Binding::Empty)
    }
}
