//! Basic HTTP tests: default bodies, content types, headers, identity.

use crate::helpers::*;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tokio_appserver::config::SecurityHeaders;
use tokio_appserver::plugin::RequestId;

/// No plugins: the status document is written
#[tokio::test]
async fn test_default_body() {
    let server = TestServer::with_plugins(|_| {}).await;
    let resp = server.get("/").await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-type", "application/json; charset=utf-8");
    assert_eq!(resp.text().await.unwrap(), r#"{"code":200,"message":"OK"}"#);

    server.close().await;
}

/// Structured body is serialized verbatim as JSON
#[tokio::test]
async fn test_json_body() {
    let server = TestServer::with_plugins(|s| {
        s.plugin(Hello).unwrap();
    })
    .await;

    let resp = server.get("/anything.html").await;

    assert_status(&resp, StatusCode::OK);
    assert_header_starts_with(&resp, "content-type", "application/json");
    assert_header(&resp, "content-length", "7");
    assert_eq!(resp.text().await.unwrap(), r#"{"a":1}"#);

    server.close().await;
}

/// Content type follows the path extension when nothing set one
#[tokio::test]
async fn test_extension_content_type() {
    struct Page;

    #[async_trait::async_trait]
    impl tokio_appserver::plugin::Plugin for Page {
        async fn handle(
            &self,
            ctx: &mut tokio_appserver::core::RequestContext,
        ) -> tokio_appserver::plugin::PluginResult {
            ctx.set_body("body { color: red }");
            Ok(tokio_appserver::core::Binding::Empty)
        }
    }

    let server = TestServer::with_plugins(|s| {
        s.plugin(Page).unwrap();
    })
    .await;

    let resp = server.get("/site.css?v=3").await;
    assert_header(&resp, "content-type", "text/css; charset=utf-8");

    // Unknown extension falls back to the default type
    let resp = server.get("/notes").await;
    assert_header(&resp, "content-type", "text/plain; charset=utf-8");
    assert_eq!(resp.text().await.unwrap(), "body { color: red }");

    server.close().await;
}

/// Security headers are on every response by default
#[tokio::test]
async fn test_security_headers() {
    let server = TestServer::with_plugins(|s| {
        s.plugin(NotFound).unwrap();
    })
    .await;

    let resp = server.get("/missing").await;

    assert_status(&resp, StatusCode::NOT_FOUND);
    assert_header(&resp, "x-xss-protection", "1; mode=block");
    assert_header(&resp, "x-frame-options", "SAMEORIGIN");
    assert_header(&resp, "x-content-type-options", "nosniff");
    assert_header(&resp, "x-download-options", "noopen");
    assert_header_starts_with(&resp, "strict-transport-security", "max-age=");

    server.close().await;
}

/// Disabled security headers are not sent
#[tokio::test]
async fn test_security_headers_disabled() {
    let mut config = test_config();
    config.security = SecurityHeaders::disabled();
    config.security.frame_options = Some("DENY".to_string());

    let server = TestServer::start(config, |_| {}).await;
    let resp = server.get("/").await;

    assert_header(&resp, "x-frame-options", "DENY");
    assert!(resp.headers().get("strict-transport-security").is_none());
    assert!(resp.headers().get("x-xss-protection").is_none());

    server.close().await;
}

/// Request identity as plugins see it
#[tokio::test]
async fn test_request_identity() {
    let server = TestServer::with_plugins(|s| {
        s.plugin(Hello).unwrap();
        s.plugin(Inspect).unwrap();
    })
    .await;

    let resp = server
        .client
        .post(server.url("/users/7?full=1"))
        .send()
        .await
        .unwrap();
    assert_status(&resp, StatusCode::OK);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["method"], "post");
    assert_eq!(body["path"], "/users/7?full=1");
    assert_eq!(body["scheme"], "http");
    assert_eq!(
        body["authority"],
        format!("127.0.0.1:{}", server.info.port)
    );
    assert_eq!(body["hello"], "world");

    server.close().await;
}

/// Request IDs are generated, or reused when well-formed
#[tokio::test]
async fn test_request_id() {
    let server = TestServer::with_plugins(|s| {
        s.plugin(RequestId::new()).unwrap();
        s.plugin(Inspect).unwrap();
    })
    .await;

    let resp = server.get("/").await;
    let generated = resp.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(generated.len(), 32);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["requestId"], json!(generated));

    let resp = server
        .get_with_headers("/", &[("x-request-id", "trace-abc.1")])
        .await;
    assert_header(&resp, "x-request-id", "trace-abc.1");

    let resp = server
        .get_with_headers("/", &[("x-request-id", "bad id")])
        .await;
    assert_ne!(resp.headers()["x-request-id"], "bad id");

    server.close().await;
}

/// HEAD gets the headers of the default body without the body
#[tokio::test]
async fn test_head_request() {
    let server = TestServer::with_plugins(|_| {}).await;

    let resp = server.client.head(server.url("/")).send().await.unwrap();

    assert_status(&resp, StatusCode::OK);
    assert_header_starts_with(&resp, "content-type", "application/json");
    assert!(resp.bytes().await.unwrap().is_empty());

    server.close().await;
}

/// Holds on to the token of the last request it saw.
struct LastToken(Arc<Mutex<Option<CancellationToken>>>);

#[async_trait::async_trait]
impl tokio_appserver::plugin::Plugin for LastToken {
    async fn handle(
        &self,
        ctx: &mut tokio_appserver::core::RequestContext,
    ) -> tokio_appserver::plugin::PluginResult {
        *self.0.lock().unwrap() = Some(ctx.cancellation().clone());
        Ok(tokio_appserver::core::Binding::Empty)
    }
}

/// A completed HEAD response does not cancel the request token
#[tokio::test]
async fn test_head_request_not_cancelled() {
    let slot = Arc::new(Mutex::new(None));
    let server = TestServer::with_plugins({
        let slot = Arc::clone(&slot);
        move |s| {
            s.plugin(LastToken(slot)).unwrap();
        }
    })
    .await;

    let resp = server.get("/").await;
    assert_eq!(resp.text().await.unwrap(), r#"{"code":200,"message":"OK"}"#);
    tokio::time::sleep(Duration::from_millis(200)).await;
    let token = slot.lock().unwrap().take().unwrap();
    assert!(!token.is_cancelled());

    let resp = server.client.head(server.url("/")).send().await.unwrap();
    assert_status(&resp, StatusCode::OK);
    assert!(resp.bytes().await.unwrap().is_empty());
    tokio::time::sleep(Duration::from_millis(200)).await;
    let token = slot.lock().unwrap().take().unwrap();
    assert!(!token.is_cancelled());

    server.close().await;
}

/// A `.json` path types a text body as JSON
#[tokio::test]
async fn test_json_extension_content_type() {
    struct Raw;

    #[async_trait::async_trait]
    impl tokio_appserver::plugin::Plugin for Raw {
        async fn handle(
            &self,
            ctx: &mut tokio_appserver::core::RequestContext,
        ) -> tokio_appserver::plugin::PluginResult {
            ctx.set_body("[1,2]");
            Ok(tokio_appserver::core::Binding::Empty)
        }
    }

    let server = TestServer::with_plugins(|s| {
        s.plugin(Raw).unwrap();
    })
    .await;

    let resp = server.get("/data.json").await;
    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-type", "application/json; charset=utf-8");
    assert_header(&resp, "content-length", "5");
    assert_eq!(resp.text().await.unwrap(), "[1,2]");

    server.close().await;
}
