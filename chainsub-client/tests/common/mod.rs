//! Common test utilities for chainsub-client integration tests
//!
//! This module provides a scriptable mock pub/sub server and frame helpers
//! for testing the client against a real socket.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

type Handler = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

/// Mock WebSocket pub/sub server
///
/// Every text frame the client writes is forwarded to the test and passed
/// to a handler that returns the frames to answer with. Frames can also be
/// pushed at any time with [`MockWsServer::push`].
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    message_rx: mpsc::Receiver<Value>,
    push_tx: mpsc::UnboundedSender<Message>,
}

impl MockWsServer {
    /// Start a server that confirms every `*Subscribe` call and acknowledges
    /// every `*Unsubscribe` call
    ///
    /// Subscription ids are the request id plus 1000.
    pub async fn new() -> Self {
        Self::with_handler(auto_confirm).await
    }

    /// Start a server that never answers on its own
    pub async fn silent() -> Self {
        Self::with_handler(|_| Vec::new()).await
    }

    /// Start a mock server with a custom request handler
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, msg_rx) = mpsc::channel::<Value>(100);
        let (push_tx, push_rx) = mpsc::unbounded_channel::<Message>();
        // Pushed frames go to the first connection only
        let push_rx = Arc::new(Mutex::new(Some(push_rx)));

        tokio::spawn(async move {
            let mut connections = Vec::new();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let msg_tx = msg_tx.clone();
                        let handler = handler.clone();
                        let push_rx = push_rx.clone();

                        connections.push(tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();
                            let mut push_rx = push_rx.lock().await.take();

                            loop {
                                let pushed = async {
                                    match push_rx.as_mut() {
                                        Some(rx) => rx.recv().await,
                                        None => std::future::pending().await,
                                    }
                                };

                                tokio::select! {
                                    frame = read.next() => match frame {
                                        Some(Ok(Message::Text(text))) => {
                                            let Ok(request) = serde_json::from_str::<Value>(&text) else { continue };
                                            let _ = msg_tx.send(request.clone()).await;
                                            for reply in handler(&request) {
                                                if write.send(Message::Text(reply)).await.is_err() {
                                                    return;
                                                }
                                            }
                                        }
                                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                                        Some(Ok(_)) => {}
                                    },
                                    message = pushed => match message {
                                        Some(message) => {
                                            let closing = matches!(message, Message::Close(_));
                                            if write.send(message).await.is_err() || closing {
                                                return;
                                            }
                                        }
                                        // The server handle was dropped
                                        None => return,
                                    },
                                }
                            }
                        }));
                    }
                }
            }
            for connection in connections {
                connection.abort();
            }
        });

        // Wait a bit for server to be ready
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        Self {
            addr,
            shutdown_tx,
            message_rx: msg_rx,
            push_tx,
        }
    }

    /// Get the WebSocket URL for connecting to this server
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the next request written by the client
    ///
    /// Returns None if the timeout expires.
    pub async fn wait_for_request(&mut self) -> Option<Value> {
        tokio::time::timeout(tokio::time::Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Send a frame to the client
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.push_tx.send(Message::Text(text.into()));
    }

    /// Close the client's connection from the server side
    pub fn close_connection(&self) {
        let _ = self.push_tx.send(Message::Close(None));
    }

    /// Shutdown the mock server
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        // Give server time to clean up
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}

/// Subscription id [`MockWsServer::new`] assigns to a request id
pub fn subscription_id_for(request_id: u64) -> u64 {
    request_id + 1000
}

fn auto_confirm(request: &Value) -> Vec<String> {
    let (Some(method), Some(id)) = (request["method"].as_str(), request["id"].as_u64()) else {
        return Vec::new();
    };

    if method.ends_with("Unsubscribe") {
        vec![mock_response(id, json!(true))]
    } else if method.ends_with("Subscribe") {
        vec![mock_response(id, json!(subscription_id_for(id)))]
    } else {
        Vec::new()
    }
}

/// Helper to create a mock JSON-RPC response
pub fn mock_response(id: u64, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id
    })
    .to_string()
}

/// Helper to create a mock JSON-RPC error response
pub fn mock_error_response(id: u64, code: i32, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message
        },
        "id": id
    })
    .to_string()
}

/// Helper to create a mock subscription notification
pub fn mock_notification(method: &str, subscription_id: u64, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": {
            "subscription": subscription_id,
            "result": result
        }
    })
    .to_string()
}
