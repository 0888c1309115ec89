//! Subscription client over WebSocket
//!
//! This module provides the main `ChainsubClient` type, which owns one
//! WebSocket connection and multiplexes any number of subscriptions over it.
//!
//! # Client Lifecycle
//!
//! 1. **Connect**: dial, then spawn the reader and keepalive tasks
//! 2. **Use**: open subscriptions, receive values, unsubscribe
//! 3. **Close**: [`close`](ChainsubClient::close), or drop every handle;
//!    all live subscriptions end with `Error::ConnectionClosed`
//!
//! A transport failure or a missed read deadline also ends the connection.
//! There is no automatic reconnection: every subscription receives the
//! terminal error and the caller decides whether to connect again.
//!
//! # Cloning
//!
//! `ChainsubClient` is cheaply cloneable using `Arc` internally. All clones
//! share the same connection and registry.

use crate::client_builder::{ClientBuilder, ClientConfig};
use crate::keepalive::Keepalive;
use crate::metrics::ClientMetrics;
use crate::reader;
use crate::registry::Registry;
use crate::request::RequestIdGenerator;
use crate::session::Session;
use crate::subscription::{self, Decoder, Subscription};
use crate::transport::{FrameSink, FrameStream, Outbound};
use chainsub_core::{Error, JsonRpcRequest, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct ClientInner {
    url: String,
    session: Arc<Session>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Subscription client over one WebSocket connection
#[derive(Clone)]
pub struct ChainsubClient {
    inner: Arc<ClientInner>,
}

impl ChainsubClient {
    /// Connect with default settings
    ///
    /// Use [`ClientBuilder`] to tune timeouts, capacity or headers.
    pub async fn connect(url: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(url).connect().await
    }

    /// Wire up the session and spawn the background tasks
    pub(crate) fn start(
        url: String,
        config: &ClientConfig,
        sink: FrameSink,
        stream: FrameStream,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let outbound = Arc::new(Outbound::new(sink, config.write_timeout));
        let session = Arc::new(Session {
            registry: Registry::new(metrics.clone()),
            outbound: outbound.clone(),
            ids: RequestIdGenerator::new(config.id_strategy),
            metrics: metrics.clone(),
            channel_capacity: config.channel_capacity,
        });
        let cancel = CancellationToken::new();

        let keepalive = config
            .keepalive
            .then(|| Arc::new(Keepalive::new(config.ping_interval, config.pong_timeout)));

        let mut tasks = Vec::with_capacity(2);
        tasks.push(tokio::spawn(reader::run(
            stream,
            session.clone(),
            keepalive.clone(),
            cancel.clone(),
        )));
        if let Some(keepalive) = keepalive {
            tasks.push(tokio::spawn(keepalive.run(
                outbound,
                metrics,
                cancel.clone(),
            )));
        }

        tracing::debug!(url = %url, keepalive = config.keepalive, "Client started");

        Self {
            inner: Arc::new(ClientInner {
                url,
                session,
                cancel,
                tasks: Mutex::new(tasks),
            }),
        }
    }

    /// Open a subscription
    ///
    /// Writes `method` with `params` and returns as soon as the frame is
    /// written; the server's confirmation is handled by the reader (see
    /// [`Subscription::confirmed`]). Each notification payload is turned into
    /// a `T` by `decode`. `unsubscribe_method` is the call that cancels the
    /// subscription server-side.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` (or the error that ended the connection)
    ///   once the connection is gone
    /// - `Error::Serialization`, `Error::Timeout` or `Error::WebSocket` if
    ///   the request could not be written; nothing is left registered
    #[tracing::instrument(skip(self, params, decode), fields(request_id))]
    pub async fn subscribe<T: Send + 'static>(
        &self,
        params: Option<Value>,
        method: &str,
        unsubscribe_method: &str,
        decode: Decoder<T>,
    ) -> Result<Subscription<T>> {
        let session = &self.inner.session;
        let request_id = session.ids.next_id().await;
        tracing::Span::current().record("request_id", request_id);

        let (route, subscription) = subscription::open(
            session.clone(),
            request_id,
            method,
            unsubscribe_method,
            decode,
        );
        session.registry.register(request_id, Box::new(route)).await?;

        let request = JsonRpcRequest::subscribe(request_id, method, params);
        if let Err(e) = session.send_request(&request).await {
            tracing::error!(error = %e, "Failed to send subscribe request");
            session.registry.abort(request_id, e.clone()).await;
            if let Some(ref m) = session.metrics {
                m.record_error(e.kind());
            }
            return Err(e);
        }

        if let Some(ref m) = session.metrics {
            m.record_opened(method);
        }
        tracing::debug!("Subscribe request sent");
        Ok(subscription)
    }

    /// Close the connection
    ///
    /// Stops both background tasks and ends every live subscription with
    /// `Error::ConnectionClosed`. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        let inner = &self.inner;
        inner.cancel.cancel();

        if let Err(e) = inner.session.outbound.close().await {
            tracing::debug!(error = %e, "Close frame not sent");
        }

        let tasks: Vec<JoinHandle<()>> = inner.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task failed");
            }
        }

        // No-op once the reader has purged
        inner.session.registry.purge_all(Error::ConnectionClosed).await;
        tracing::info!(url = %inner.url, "Client closed");
        Ok(())
    }

    /// Wait until the connection has ended, for whatever reason
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Whether the connection has ended
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Number of confirmed subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.inner.session.registry.active_count().await
    }

    /// Number of subscriptions awaiting confirmation
    pub async fn pending_count(&self) -> usize {
        self.inner.session.registry.pending_count().await
    }

    /// URL this client connected to
    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl std::fmt::Debug for ChainsubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainsubClient")
            .field("url", &self.inner.url)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_decoder;
    use crate::transport::memory::{self, Peer};
    use serde_json::json;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};

    fn connect(builder: ClientBuilder) -> (ChainsubClient, Peer) {
        let (sink, stream, peer) = memory::pair();
        let client = builder.connect_transport(sink, stream).unwrap();
        (client, peer)
    }

    fn connect_default() -> (ChainsubClient, Peer) {
        connect(ClientBuilder::new("ws://memory").without_keepalive())
    }

    fn confirmation(request_id: &Value, subscription_id: u64) -> String {
        json!({"jsonrpc": "2.0", "result": subscription_id, "id": request_id}).to_string()
    }

    fn notification(method: &str, subscription_id: u64, result: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": {"subscription": subscription_id, "result": result}
        })
        .to_string()
    }

    async fn subscribe_confirmed<T: Send + 'static>(
        client: &ChainsubClient,
        peer: &mut Peer,
        decode: Decoder<T>,
        subscription_id: u64,
    ) -> Subscription<T> {
        let mut sub = client
            .subscribe(Some(json!(["X"])), "fooSubscribe", "fooUnsubscribe", decode)
            .await
            .unwrap();
        let request = peer.next_json().await;
        peer.push(confirmation(&request["id"], subscription_id));
        assert_eq!(sub.confirmed().await.unwrap(), subscription_id);
        sub
    }

    #[tokio::test]
    async fn test_subscribe_receive_unsubscribe() {
        let (client, mut peer) = connect_default();

        let mut sub = client
            .subscribe(
                Some(json!(["X"])),
                "fooSubscribe",
                "fooUnsubscribe",
                json_decoder::<String>(),
            )
            .await
            .unwrap();

        let request = peer.next_json().await;
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "fooSubscribe");
        assert_eq!(request["params"], json!(["X"]));
        assert_eq!(request["id"], json!(sub.request_id()));
        assert_eq!(client.pending_count().await, 1);

        peer.push(confirmation(&request["id"], 42));
        assert_eq!(sub.confirmed().await.unwrap(), 42);
        assert_eq!(sub.id(), Some(42));
        assert_eq!(client.subscription_count().await, 1);
        assert_eq!(client.pending_count().await, 0);

        peer.push(notification("fooNotification", 42, json!("payload")));
        assert_eq!(sub.recv().await.unwrap(), "payload");

        sub.unsubscribe().await.unwrap();
        let unsubscribe = peer.next_json().await;
        assert_eq!(unsubscribe["method"], "fooUnsubscribe");
        assert_eq!(unsubscribe["params"], json!([42]));
        assert_ne!(unsubscribe["id"], request["id"]);

        // Arrives after the local entry is gone
        peer.push(notification("fooNotification", 42, json!("late")));
        peer.push(json!({"jsonrpc": "2.0", "result": true, "id": unsubscribe["id"]}).to_string());

        assert!(matches!(sub.recv().await, Err(Error::Unsubscribed)));
        assert!(sub.is_closed());
        assert_eq!(client.subscription_count().await, 0);
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_subscribes_are_correlated() {
        let (client, mut peer) = connect_default();

        let subs = futures::future::join_all((0..10).map(|_| {
            let client = client.clone();
            async move {
                client
                    .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
                    .await
                    .unwrap()
            }
        }))
        .await;

        let mut requests = Vec::new();
        for _ in 0..10 {
            requests.push(peer.next_json().await);
        }
        // Confirm in reverse to make sure correlation is by id, not order
        for request in requests.iter().rev() {
            let id = request["id"].as_u64().unwrap();
            peer.push(confirmation(&request["id"], 1000 + id));
        }
        for request in &requests {
            let id = request["id"].as_u64().unwrap();
            peer.push(notification("fooNotification", 1000 + id, json!(id)));
        }

        for mut sub in subs {
            let sub_id = sub.confirmed().await.unwrap();
            assert_eq!(sub_id, 1000 + sub.request_id());
            assert_eq!(sub.recv().await.unwrap(), sub.request_id());
        }
        assert_eq!(client.subscription_count().await, 10);
    }

    #[tokio::test]
    async fn test_interleaved_notifications_are_demultiplexed() {
        let (client, mut peer) = connect_default();
        let mut a = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 1).await;
        let mut b = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 2).await;

        for n in 0..5u64 {
            peer.push(notification("fooNotification", 1, json!(n)));
            peer.push(notification("fooNotification", 2, json!(100 + n)));
        }

        for n in 0..5u64 {
            assert_eq!(a.recv().await.unwrap(), n);
            assert_eq!(b.recv().await.unwrap(), 100 + n);
        }
    }

    #[tokio::test]
    async fn test_slow_consumer_is_closed_alone() {
        let (client, mut peer) = connect(
            ClientBuilder::new("ws://memory")
                .without_keepalive()
                .with_channel_capacity(2),
        );
        let mut slow = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 7).await;
        let mut fast = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 8).await;

        for n in 0..3u64 {
            peer.push(notification("fooNotification", 7, json!(n)));
        }
        peer.push(notification("fooNotification", 8, json!(99)));

        let unsubscribe = peer.next_json().await;
        assert_eq!(unsubscribe["method"], "fooUnsubscribe");
        assert_eq!(unsubscribe["params"], json!([7]));

        assert_eq!(fast.recv().await.unwrap(), 99);
        assert_eq!(slow.recv().await.unwrap(), 0);
        assert_eq!(slow.recv().await.unwrap(), 1);
        assert!(matches!(
            slow.recv().await,
            Err(Error::ChannelFull { capacity: 2 })
        ));
        assert!(!fast.is_closed());
        assert_eq!(client.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_decode_failure_closes_and_unsubscribes() {
        let (client, mut peer) = connect_default();
        let mut sub = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 42).await;

        peer.push(notification("fooNotification", 42, json!({"not": "a number"})));

        let unsubscribe = peer.next_json().await;
        assert_eq!(unsubscribe["method"], "fooUnsubscribe");
        assert_eq!(unsubscribe["params"], json!([42]));
        assert!(matches!(sub.recv().await, Err(Error::Decode(_))));
        assert!(!client.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_quiet_subscriptions_are_unsubscribed() {
        let (client, mut peer) = connect_default();

        let mut subs = Vec::new();
        for id in [5, 6, 7] {
            let mut sub = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), id).await;
            peer.push(notification("fooNotification", id, json!(id)));
            assert_eq!(sub.recv().await.unwrap(), id);
            subs.push(sub);
        }
        assert_eq!(client.subscription_count().await, 3);

        // The server sends nothing more; dropping alone must clean up
        drop(subs);

        let mut unsubscribed = Vec::new();
        for _ in 0..3 {
            let frame = peer.next_json().await;
            assert_eq!(frame["method"], "fooUnsubscribe");
            unsubscribed.push(frame["params"][0].as_u64().unwrap());
        }
        unsubscribed.sort_unstable();
        assert_eq!(unsubscribed, vec![5, 6, 7]);
        assert_eq!(client.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_pending_subscription_is_unsubscribed_on_confirmation() {
        let (client, mut peer) = connect_default();
        let sub = client
            .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
            .await
            .unwrap();
        let request = peer.next_json().await;

        drop(sub);
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.pending_count().await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        peer.push(confirmation(&request["id"], 8));
        let unsubscribe = peer.next_json().await;
        assert_eq!(unsubscribe["method"], "fooUnsubscribe");
        assert_eq!(unsubscribe["params"], json!([8]));
        assert_eq!(client.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropping_unsubscribed_handle_writes_nothing() {
        let (client, mut peer) = connect_default();
        let sub = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 9).await;

        sub.unsubscribe().await.unwrap();
        assert_eq!(peer.next_json().await["params"], json!([9]));
        drop(sub);
        tokio::task::yield_now().await;

        peer.assert_quiet();
        assert_eq!(client.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_subscribe() {
        let (client, mut peer) = connect_default();
        let mut sub = client
            .subscribe(
                Some(json!(["bad"])),
                "fooSubscribe",
                "fooUnsubscribe",
                json_decoder::<u64>(),
            )
            .await
            .unwrap();

        let request = peer.next_json().await;
        peer.push(
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32602, "message": "Invalid param"},
                "id": request["id"]
            })
            .to_string(),
        );

        match sub.confirmed().await {
            Err(Error::JsonRpc(e)) => {
                assert_eq!(e.code, -32602);
                assert_eq!(e.message, "Invalid param");
            }
            other => panic!("Expected JSON-RPC error, got {:?}", other),
        }
        assert!(matches!(sub.recv().await, Err(Error::JsonRpc(_))));
        assert_eq!(client.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_before_confirmation() {
        let (client, mut peer) = connect_default();
        let mut sub = client
            .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
            .await
            .unwrap();
        let request = peer.next_json().await;

        sub.unsubscribe().await.unwrap();
        peer.assert_quiet();
        assert!(matches!(sub.recv().await, Err(Error::Unsubscribed)));

        peer.push(confirmation(&request["id"], 77));
        let unsubscribe = peer.next_json().await;
        assert_eq!(unsubscribe["method"], "fooUnsubscribe");
        assert_eq!(unsubscribe["params"], json!([77]));
        assert_eq!(client.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_across_close() {
        let (client, mut peer) = connect_default();
        let sub = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 3).await;

        sub.unsubscribe().await.unwrap();
        sub.unsubscribe().await.unwrap();
        client.close().await.unwrap();
        sub.unsubscribe().await.unwrap();

        let frames: Vec<String> = std::iter::from_fn(|| peer.written.try_recv().ok())
            .filter_map(|m| match m {
                Message::Text(text) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(frames.len(), 1, "only one unsubscribe frame: {:?}", frames);
    }

    #[tokio::test]
    async fn test_close_purges_and_stops_tasks() {
        let (client, mut peer) = connect(ClientBuilder::new("ws://memory"));
        let mut confirmed = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 1).await;
        let mut pending = client
            .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
            .await
            .unwrap();

        client.close().await.unwrap();
        assert!(client.is_closed());

        assert!(matches!(confirmed.recv().await, Err(Error::ConnectionClosed)));
        assert!(matches!(pending.confirmed().await, Err(Error::ConnectionClosed)));
        assert_eq!(client.subscription_count().await, 0);
        assert_eq!(client.pending_count().await, 0);

        // Only the client and the two live handles still hold the session
        assert_eq!(Arc::strong_count(&client.inner.session), 3);

        client.close().await.unwrap();

        let err = client
            .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_dropping_client_ends_subscriptions() {
        let (client, mut peer) = connect_default();
        let mut sub = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 1).await;

        drop(client);
        assert!(matches!(sub.recv().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_server_close_ends_connection() {
        let (client, mut peer) = connect_default();
        let mut sub = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 1).await;

        peer.push_message(Message::Close(None));

        assert!(matches!(sub.recv().await, Err(Error::ConnectionClosed)));
        client.closed().await;
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_transport_error_reaches_every_subscription() {
        let (client, mut peer) = connect_default();
        let mut a = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 1).await;
        let mut b = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 2).await;

        peer.fail(WsError::Utf8);

        assert!(matches!(a.recv().await, Err(Error::WebSocket(_))));
        assert!(matches!(b.recv().await, Err(Error::WebSocket(_))));
        client.closed().await;
    }

    #[tokio::test]
    async fn test_malformed_and_unmatched_frames_are_dropped() {
        let (client, mut peer) = connect_default();
        let mut sub = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 1).await;

        peer.push("not json");
        peer.push(json!({"jsonrpc": "2.0", "id": "abc", "result": 1}).to_string());
        peer.push(notification("fooNotification", 999, json!(1)));
        peer.push(confirmation(&json!(12345), 5));
        peer.push(json!({"jsonrpc": "2.0", "error": {"code": -32000, "message": "busy"}}).to_string());
        peer.push_message(Message::Binary(vec![0xff, 0xfe]));
        peer.push_message(Message::Binary(
            notification("fooNotification", 1, json!(8)).into_bytes(),
        ));

        assert_eq!(sub.recv().await.unwrap(), 8);
        assert!(!client.is_closed());
        assert_eq!(client.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_array_params_frame_is_not_routed() {
        let (client, mut peer) = connect_default();
        let mut sub = subscribe_confirmed(&client, &mut peer, json_decoder::<u64>(), 1).await;

        peer.push(json!({"jsonrpc": "2.0", "method": "someServerCall", "params": [1, 2]}).to_string());
        peer.push(notification("fooNotification", 1, json!(3)));

        assert_eq!(sub.recv().await.unwrap(), 3);
        assert!(!sub.is_closed());
        peer.assert_quiet();
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pongs_fail_the_connection() {
        let (client, _peer) = connect(
            ClientBuilder::new("ws://memory")
                .with_ping_interval(Duration::from_secs(1))
                .with_pong_timeout(Duration::from_secs(3)),
        );
        let mut sub = client
            .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        assert!(matches!(sub.recv().await, Err(Error::ReadDeadline)));
        assert!(started.elapsed() >= Duration::from_secs(3));
        client.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pongs_keep_the_connection_alive() {
        let (client, peer) = connect(
            ClientBuilder::new("ws://memory")
                .with_ping_interval(Duration::from_secs(1))
                .with_pong_timeout(Duration::from_secs(3)),
        );
        let Peer {
            mut written,
            inject,
        } = peer;

        let responder = tokio::spawn(async move {
            use futures::StreamExt;
            let mut pings = 0;
            while let Some(message) = written.next().await {
                if let Message::Ping(payload) = message {
                    pings += 1;
                    let _ = inject.unbounded_send(Ok(Message::Pong(payload)));
                }
            }
            pings
        });

        let mut sub = client
            .subscribe(None, "fooSubscribe", "fooUnsubscribe", json_decoder::<u64>())
            .await
            .unwrap();

        assert!(matches!(
            sub.recv_timeout(Duration::from_secs(10)).await,
            Err(Error::Timeout)
        ));
        assert!(!client.is_closed());

        client.close().await.unwrap();
        let pings = responder.await.unwrap();
        assert!(pings >= 9, "expected a ping per second, got {}", pings);
    }
}
