//! Per-connection state
//!
//! A [`Session`] is everything the reader, the subscription handles and the
//! client share for one connection: the registry, the writer, the request
//! id generator and the optional metrics. Handles hold an `Arc<Session>`
//! rather than the client, so dropping every client handle still tears the
//! connection down even while subscriptions are alive.

use crate::metrics::ClientMetrics;
use crate::registry::Registry;
use crate::request::RequestIdGenerator;
use crate::transport::Outbound;
use chainsub_core::{codec, JsonRpcRequest, Result};
use std::sync::Arc;

pub(crate) struct Session {
    pub(crate) registry: Registry,
    pub(crate) outbound: Arc<Outbound>,
    pub(crate) ids: RequestIdGenerator,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
    pub(crate) channel_capacity: usize,
}

impl Session {
    /// Encode and write a request
    pub(crate) async fn send_request(&self, request: &JsonRpcRequest) -> Result<()> {
        let text = codec::encode_request(request)?;
        self.outbound.send_text(text).await
    }

    /// Tell the server to stop a confirmed subscription
    pub(crate) async fn send_unsubscribe(&self, method: &str, subscription_id: u64) -> Result<()> {
        let id = self.ids.next_id().await;
        let request = JsonRpcRequest::unsubscribe(id, method, subscription_id);
        let result = self.send_request(&request).await;

        if let Err(ref e) = result {
            tracing::warn!(
                subscription_id,
                method = %method,
                error = %e,
                "Failed to send unsubscribe"
            );
            if let Some(ref m) = self.metrics {
                m.record_error(e.kind());
            }
        }
        result
    }
}
