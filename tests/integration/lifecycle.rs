//! Server lifecycle: open, graceful close, drain timeout.

use crate::helpers::*;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

use tokio_appserver::core::Error;

/// Listen info reflects the bound socket
#[tokio::test]
async fn test_listen_info() {
    let server = TestServer::with_plugins(|_| {}).await;

    assert_eq!(server.info.family, "IPv4");
    assert_eq!(server.info.address.to_string(), "127.0.0.1");
    assert_ne!(server.info.port, 0);
    assert_eq!(server.server.listen_info(), Some(&server.info));

    server.close().await;
}

/// Plugins cannot be added once the server listens
#[tokio::test]
async fn test_register_after_open() {
    let mut server = TestServer::with_plugins(|_| {}).await;

    assert!(matches!(
        server.server.plugin(Hello),
        Err(Error::AlreadyListening)
    ));
    assert!(matches!(
        server.server.plugin_named("late", Hello),
        Err(Error::AlreadyListening)
    ));

    // The frozen chain is unchanged
    let resp = server.get("/").await;
    assert_eq!(
        resp.text().await.unwrap(),
        r#"{"code":200,"message":"OK"}"#
    );

    server.close().await;
}

/// In-flight requests finish during a graceful close
#[tokio::test]
async fn test_close_drains_in_flight() {
    let mut server = TestServer::with_plugins(|s| {
        s.plugin(Slow(Duration::from_millis(300))).unwrap();
        s.plugin(Hello).unwrap();
    })
    .await;

    let url = server.url("/slow");
    let client = server.client.clone();
    let in_flight = tokio::spawn(async move { client.get(url).send().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.server.active_connections(), 1);
    server.server.close().await.unwrap();

    let resp = in_flight.await.unwrap().expect("in-flight request should complete");
    assert_status(&resp, StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), r#"{"a":1}"#);

    // No longer accepting
    let fresh = Client::new();
    assert!(fresh.get(server.url("/")).send().await.is_err());
}

/// Requests still running at the drain timeout are cancelled
#[tokio::test]
async fn test_drain_timeout_cancels() {
    let mut config = test_config();
    config.server.drain_timeout = Duration::from_millis(200);

    let mut server = TestServer::start(config, |s| {
        s.plugin(Slow(Duration::from_secs(30))).unwrap();
    })
    .await;

    let url = server.url("/stuck");
    let client = server.client.clone();
    let in_flight = tokio::spawn(async move { client.get(url).send().await });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    server.server.close().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));

    // Aborted: the connection is dropped without a response
    let result = tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .expect("client should see the connection close")
        .unwrap();
    assert!(result.is_err());
}
