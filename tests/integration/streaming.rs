//! Streaming body tests
//!
//! Stream bodies go out chunked, without a content-length, as they are
//! produced.

use crate::helpers::*;
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::time::{Duration, Instant};

/// Chunks arrive complete and in order
#[tokio::test]
async fn test_stream_body() {
    let server = TestServer::with_plugins(|s| {
        s.plugin(Chunks {
            count: 3,
            delay: Duration::ZERO,
        })
        .unwrap();
    })
    .await;

    let resp = server.get("/events").await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-type", "text/plain; charset=utf-8");
    assert_header(&resp, "transfer-encoding", "chunked");
    assert!(resp.headers().get("content-length").is_none());
    assert_eq!(resp.text().await.unwrap(), "chunk1\nchunk2\nchunk3\n");

    server.close().await;
}

/// The first chunk is delivered before the stream ends
#[tokio::test]
async fn test_stream_is_incremental() {
    let server = TestServer::with_plugins(|s| {
        s.plugin(Chunks {
            count: 3,
            delay: Duration::from_millis(300),
        })
        .unwrap();
    })
    .await;

    let start = Instant::now();
    let resp = server.get("/events").await;
    let mut stream = resp.bytes_stream();

    let first = stream.next().await.unwrap().unwrap();
    let first_at = start.elapsed();
    assert_eq!(&first[..], b"chunk1\n");

    let mut rest = Vec::new();
    while let Some(chunk) = stream.next().await {
        rest.extend_from_slice(&chunk.unwrap());
    }
    let total = start.elapsed();

    assert_eq!(rest, b"chunk2\nchunk3\n");
    assert!(
        total - first_at >= Duration::from_millis(400),
        "first chunk at {:?}, stream done at {:?}",
        first_at,
        total
    );

    server.close().await;
}
