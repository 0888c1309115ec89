//! Wire reader
//!
//! The reader task owns the read half of the connection. For every frame it
//! classifies the payload and dispatches:
//!
//! - **Confirmation** → promote the pending entry to active
//! - **Rejection** → close the pending entry with the server's error
//! - **Notification** → decode and enqueue for the owning subscription
//! - **Anything unmatched or malformed** → log and drop
//!
//! A per-subscription fault (decode failure, full channel, dropped handle)
//! evicts that subscription and cancels it server-side; it never stops the
//! reader. A transport failure, the server closing the connection, the read
//! deadline passing, or cancellation ends the loop, and every remaining
//! entry is purged with the matching terminal error.

use crate::keepalive::Keepalive;
use crate::registry::{Promotion, Routing};
use crate::session::Session;
use crate::transport::{transport_error, FrameStream};
use chainsub_core::{codec, Error, InboundFrame};
use futures::StreamExt;
use serde_json::value::RawValue;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Run the read loop until the connection ends
pub(crate) async fn run(
    mut stream: FrameStream,
    session: Arc<Session>,
    keepalive: Option<Arc<Keepalive>>,
    cancel: CancellationToken,
) {
    let terminal = loop {
        let deadline = keepalive.as_ref().map(|k| k.deadline());

        tokio::select! {
            _ = cancel.cancelled() => break Error::ConnectionClosed,

            frame = stream.next() => match frame {
                Some(Ok(message)) => {
                    if let Some(error) = handle_message(message, &session, keepalive.as_deref()).await {
                        break error;
                    }
                }
                Some(Err(e)) => {
                    let error = transport_error(e);
                    tracing::error!(error = %error, "WebSocket read failed");
                    break error;
                }
                None => {
                    tracing::info!("WebSocket stream ended");
                    break Error::ConnectionClosed;
                }
            },

            _ = expire(deadline) => {
                // A pong may have been handled since the deadline was read
                if keepalive.as_ref().map_or(false, |k| k.expired()) {
                    tracing::error!("No pong before read deadline");
                    break Error::ReadDeadline;
                }
            }
        }
    };

    if let Some(ref m) = session.metrics {
        if terminal.is_transport() && !matches!(terminal, Error::ConnectionClosed) {
            m.record_error(terminal.kind());
        }
    }

    let purged = session.registry.purge_all(terminal.clone()).await;
    tracing::info!(error = %terminal, purged, "Reader stopped");

    // Stop the keepalive loop along with the reader
    cancel.cancel();
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle one frame; returns the terminal error if the connection is over
async fn handle_message(
    message: Message,
    session: &Session,
    keepalive: Option<&Keepalive>,
) -> Option<Error> {
    match message {
        Message::Text(text) => dispatch(&text, session).await,
        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => dispatch(text, session).await,
            Err(_) => drop_frame(session, "binary_not_utf8", "Dropping non-UTF-8 binary frame"),
        },
        Message::Pong(_) => {
            tracing::trace!("Pong received");
            if let Some(keepalive) = keepalive {
                keepalive.on_pong();
            }
        }
        // tungstenite queues the pong reply itself
        Message::Ping(_) => tracing::trace!("Ping received"),
        Message::Close(frame) => {
            tracing::info!(frame = ?frame, "Connection closed by server");
            return Some(Error::ConnectionClosed);
        }
        Message::Frame(_) => {}
    }
    None
}

async fn dispatch(text: &str, session: &Session) {
    let frame = match codec::classify(text) {
        Ok(frame) => frame,
        Err(e) => {
            drop_frame(session, "invalid_frame", "Dropping malformed frame");
            tracing::debug!(error = %e, "Frame classification failed");
            return;
        }
    };

    match frame {
        InboundFrame::Response { request_id, result } => match result.as_u64() {
            Some(subscription_id) => confirm(request_id, subscription_id, session).await,
            None => tracing::debug!(request_id, result = %result, "Response ignored"),
        },
        InboundFrame::Rejected { request_id, error } => {
            tracing::warn!(request_id, error = %error, "Subscribe request rejected");
            if !session.registry.reject(request_id, error).await {
                tracing::debug!(request_id, "Rejection matched no pending subscription");
            }
        }
        InboundFrame::Notification {
            subscription_id,
            payload,
            ..
        } => route(subscription_id, &payload, session).await,
        InboundFrame::ServerError(error) => {
            tracing::warn!(error = %error, "Server error without request id");
            if let Some(ref m) = session.metrics {
                m.record_error("server");
            }
        }
    }
}

async fn confirm(request_id: u64, subscription_id: u64, session: &Session) {
    match session.registry.promote(request_id, subscription_id).await {
        Promotion::Promoted => {
            tracing::info!(request_id, subscription_id, "Subscription confirmed");
        }
        Promotion::Abandoned { unsubscribe_method } => {
            tracing::debug!(
                request_id,
                subscription_id,
                "Confirmation for abandoned request, unsubscribing"
            );
            let _ = session
                .send_unsubscribe(&unsubscribe_method, subscription_id)
                .await;
        }
        Promotion::Duplicate => {
            drop_frame(session, "duplicate_subscription", "Subscription id already in use");
        }
        Promotion::Unmatched => {
            tracing::warn!(request_id, subscription_id, "Confirmation matched no pending request");
            if let Some(ref m) = session.metrics {
                m.record_dropped("unmatched_confirmation");
            }
        }
    }
}

async fn route(subscription_id: u64, payload: &RawValue, session: &Session) {
    match session.registry.deliver(subscription_id, payload).await {
        Routing::Delivered { method } => {
            tracing::trace!(subscription_id, "Notification routed");
            if let Some(ref m) = session.metrics {
                m.record_notification(&method);
            }
        }
        Routing::Unmatched => {
            tracing::warn!(subscription_id, "Notification for unknown subscription dropped");
            if let Some(ref m) = session.metrics {
                m.record_dropped("unmatched_notification");
            }
        }
        Routing::Fault(error) => {
            tracing::warn!(subscription_id, error = %error, "Closing subscription");
            if let Some(ref m) = session.metrics {
                m.record_error(error.kind());
            }
            if let Some(evicted) = session.registry.evict(subscription_id, error).await {
                let _ = session
                    .send_unsubscribe(&evicted.unsubscribe_method, evicted.subscription_id)
                    .await;
            }
        }
    }
}

fn drop_frame(session: &Session, reason: &'static str, message: &str) {
    tracing::warn!(reason, "{}", message);
    if let Some(ref m) = session.metrics {
        m.record_dropped(reason);
    }
}
