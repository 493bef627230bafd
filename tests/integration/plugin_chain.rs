//! Plugin chain tests: ordering, bindings, short-circuit and failures.

use crate::helpers::*;
use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::json;

use tokio_appserver::core::{Binding, Error, RequestContext};
use tokio_appserver::plugin::PluginResult;

/// A plugin error becomes a generic 500
#[tokio::test]
async fn test_plugin_error_hidden() {
    let server = TestServer::with_plugins(|s| {
        s.plugin(Hello).unwrap();
        s.plugin(Fail("db password rejected")).unwrap();
    })
    .await;

    let resp = server.get("/").await;
    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    assert_header_starts_with(&resp, "content-type", "application/json");
    assert_eq!(
        resp.text().await.unwrap(),
        r#"{"code":500,"message":"internal server error"}"#
    );

    server.close().await;
}

/// Debug mode exposes the plugin's message
#[tokio::test]
async fn test_plugin_error_debug() {
    let mut config = test_config();
    config.server.debug = true;

    let server = TestServer::start(config, |s| {
        s.plugin(Fail("db password rejected")).unwrap();
    })
    .await;

    let (status, body) = server.get_json("/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "code": 500, "message": "db password rejected" }));

    server.close().await;
}

/// Plugins after one that ended the response never run
#[tokio::test]
async fn test_short_circuit() {
    let counter = Counter::default();
    let server = TestServer::with_plugins({
        let counter = counter.clone();
        move |s| {
            s.plugin(NotFound).unwrap();
            s.plugin(counter).unwrap();
            s.plugin(Fail("unreachable")).unwrap();
        }
    })
    .await;

    let (status, body) = server.get_json("/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "code": 404, "message": "Not Found" }));
    assert_eq!(counter.count(), 0);

    server.close().await;
}

/// Plugins run in order once per request
#[tokio::test]
async fn test_runs_every_request() {
    let counter = Counter::default();
    let server = TestServer::with_plugins({
        let counter = counter.clone();
        move |s| {
            s.plugin(counter).unwrap();
        }
    })
    .await;

    for _ in 0..3 {
        assert_status(&server.get("/").await, StatusCode::OK);
    }
    assert_eq!(counter.count(), 3);

    server.close().await;
}

/// Two plugins bound under the same name fail the request
#[tokio::test]
async fn test_duplicate_binding() {
    let mut config = test_config();
    config.server.debug = true;

    let server = TestServer::start(config, |s| {
        s.plugin(Counter::default()).unwrap();
        s.plugin(Counter::default()).unwrap();
    })
    .await;

    let (status, body) = server.get_json("/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "context property already defined: counter");

    server.close().await;
}

/// Core names are reserved
#[tokio::test]
async fn test_reserved_binding() {
    let server = TestServer::with_plugins(|s| {
        s.plugin_named("path", Hello).unwrap();
    })
    .await;

    assert_status(&server.get("/").await, StatusCode::INTERNAL_SERVER_ERROR);

    server.close().await;
}

fn greeting(ctx: &mut RequestContext) -> BoxFuture<'_, PluginResult> {
    Box::pin(async move {
        ctx.set_code(http::StatusCode::ACCEPTED)
            .set_message("queued")
            .set_header("x-greeting", "hi")?;
        Ok(Binding::Empty)
    })
}

/// Bare functions register under their own name
#[tokio::test]
async fn test_function_plugin() {
    let server = TestServer::with_plugins(|s| {
        s.plugin_fn(greeting).unwrap();
    })
    .await;

    let resp = server.get("/").await;
    assert_status(&resp, StatusCode::ACCEPTED);
    assert_header(&resp, "x-greeting", "hi");
    assert_eq!(
        resp.text().await.unwrap(),
        r#"{"code":202,"message":"queued"}"#
    );

    server.close().await;
}

/// Invalid plugin names are rejected at registration
#[tokio::test]
async fn test_invalid_name() {
    let server = TestServer::with_plugins(|s| {
        assert!(matches!(
            s.plugin_named("", Hello),
            Err(Error::InvalidPluginName(_))
        ));
    })
    .await;

    server.close().await;
}
