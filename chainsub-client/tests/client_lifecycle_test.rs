//! Client lifecycle integration tests
//!
//! Tests for dialing, handshake failures, closing, and connection teardown.

mod common;

use chainsub_client::{json_decoder, ChainsubClient, ClientBuilder};
use chainsub_core::Error;
use common::MockWsServer;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_client_connect_and_close() {
    let server = MockWsServer::new().await;
    let client = ChainsubClient::connect(server.url()).await.unwrap();

    assert!(!client.is_closed());
    assert_eq!(client.url(), server.url());
    assert_eq!(client.subscription_count().await, 0);

    client.close().await.unwrap();
    assert!(client.is_closed());

    // Closing twice is fine
    client.close().await.unwrap();

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = ChainsubClient::connect(format!("ws://{}", addr))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Dial { status: None, .. }));
}

#[tokio::test]
async fn test_client_connect_http_rejection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = stream.read(&mut buf).await;
        let body = "api key required";
        let response = format!(
            "HTTP/1.1 403 Forbidden\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    });

    let err = ChainsubClient::connect(format!("ws://{}", addr))
        .await
        .unwrap_err();
    match err {
        Error::Dial { status, .. } => assert_eq!(status, Some(403)),
        other => panic!("Expected dial error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_handshake_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Accept the TCP connection but never answer the upgrade
    let hold = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let err = ClientBuilder::new(format!("ws://{}", addr))
        .with_handshake_timeout(Duration::from_millis(200))
        .connect()
        .await
        .unwrap_err();
    match err {
        Error::Dial { message, status, .. } => {
            assert!(message.contains("timed out"), "message: {}", message);
            assert_eq!(status, None);
        }
        other => panic!("Expected dial error, got {:?}", other),
    }

    hold.abort();
}

#[tokio::test]
async fn test_client_sends_extra_headers() {
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (header_tx, header_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let value = request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let _ = header_tx.send(value);
            Ok(response)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(ws);
    });

    let client = ClientBuilder::new(format!("ws://{}", addr))
        .with_header("x-api-key", "secret")
        .connect()
        .await
        .unwrap();

    assert_eq!(header_rx.await.unwrap().as_deref(), Some("secret"));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_server_close_ends_subscriptions() {
    let mut server = MockWsServer::new().await;
    let client = ChainsubClient::connect(server.url()).await.unwrap();

    let mut sub = client
        .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
        .await
        .unwrap();
    server.wait_for_request().await.unwrap();
    sub.confirmed().await.unwrap();

    server.close_connection();

    assert!(matches!(
        sub.recv_timeout(Duration::from_secs(5)).await,
        Err(Error::ConnectionClosed)
    ));
    tokio::time::timeout(Duration::from_secs(5), client.closed())
        .await
        .unwrap();

    let err = client
        .subscribe(Some(json!(["X"])), "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));

    server.shutdown().await;
}

#[tokio::test]
async fn test_close_ends_live_subscriptions() {
    let mut server = MockWsServer::new().await;
    let client = ChainsubClient::connect(server.url()).await.unwrap();

    let mut subs = Vec::new();
    for _ in 0..3 {
        subs.push(
            client
                .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
                .await
                .unwrap(),
        );
        server.wait_for_request().await.unwrap();
    }
    for sub in subs.iter_mut() {
        sub.confirmed().await.unwrap();
    }
    assert_eq!(client.subscription_count().await, 3);

    client.close().await.unwrap();

    for sub in subs.iter_mut() {
        assert!(matches!(sub.recv().await, Err(Error::ConnectionClosed)));
        // Unsubscribing after close is a no-op
        sub.unsubscribe().await.unwrap();
    }
    assert_eq!(client.subscription_count().await, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_keepalive_survives_past_pong_timeout() {
    let server = MockWsServer::new().await;
    let client = ClientBuilder::new(server.url())
        .with_ping_interval(Duration::from_millis(100))
        .with_pong_timeout(Duration::from_millis(400))
        .connect()
        .await
        .unwrap();

    let mut sub = client
        .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
        .await
        .unwrap();

    // The server answers pings, so the read deadline keeps moving
    assert!(matches!(
        sub.recv_timeout(Duration::from_millis(1200)).await,
        Err(Error::Timeout)
    ));
    assert!(!client.is_closed());

    client.close().await.unwrap();
    server.shutdown().await;
}
