//! Subscription registry
//!
//! The registry bridges the reader to individual consumers. It holds two
//! maps behind a single lock:
//!
//! - **pending**: request id → subscription awaiting its confirmation
//! - **active**: subscription id → confirmed subscription
//!
//! # Entry Lifecycle
//!
//! 1. **Register**: `subscribe()` inserts the entry under its request id
//! 2. **Promote**: the confirmation moves it to the active map
//! 3. **Remove**: unsubscribe, a per-subscription fault, or a purge on
//!    connection teardown takes it out and closes it with a terminal error
//!
//! Promotion, removal and purge all take the write lock, so a confirmation
//! racing a purge either lands before it (and is purged) or finds the
//! registry closed. Delivery only needs the read lock.
//!
//! Entries are type-erased behind [`Route`], which keeps the registry
//! independent of what each subscription decodes to.

use crate::metrics::ClientMetrics;
use chainsub_core::{Error, JsonRpcErrorData, Result};
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Outcome of handing a payload to a subscription
#[derive(Debug)]
pub(crate) enum Delivery {
    /// The value is in the consumer's channel
    Delivered,
    /// The subscription cannot take the value and must be force-closed
    Fault(Error),
}

/// A registry entry, seen without its decoded type
pub(crate) trait Route: Send + Sync {
    /// Subscribe method this entry was opened with
    fn method(&self) -> &str;

    /// Method used to cancel this entry server-side
    fn unsubscribe_method(&self) -> &str;

    /// Publish the server-assigned subscription id to the handle
    fn confirm(&self, subscription_id: u64);

    /// Decode a payload and enqueue it without blocking
    fn deliver(&self, payload: &RawValue) -> Delivery;

    /// Hand the terminal error to the consumer and release the channel
    fn close(self: Box<Self>, error: Error);
}

/// Outcome of a confirmation
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Promotion {
    /// The entry moved to the active map
    Promoted,
    /// The caller unsubscribed before the confirmation arrived; the server
    /// side must now be cancelled with this method
    Abandoned { unsubscribe_method: String },
    /// Another live entry already holds this subscription id
    Duplicate,
    /// No pending request carries this id
    Unmatched,
}

/// Outcome of delivering a notification
#[derive(Debug)]
pub(crate) enum Routing {
    Delivered { method: String },
    Unmatched,
    Fault(Error),
}

/// Outcome of removing an entry on behalf of its handle
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Removal {
    /// The entry was confirmed; the server must be told to stop
    Confirmed(u64),
    /// The entry was still pending; the reader cancels it on confirmation
    Pending,
    /// Nothing to remove
    Absent,
}

/// An entry removed by a fault that still needs a server-side unsubscribe
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Evicted {
    pub(crate) subscription_id: u64,
    pub(crate) unsubscribe_method: String,
}

#[derive(Default)]
struct RegistryState {
    pending: HashMap<u64, Box<dyn Route>>,
    active: HashMap<u64, Box<dyn Route>>,
    /// request id → subscription id, for confirmed entries
    confirmed: HashMap<u64, u64>,
    /// request id → unsubscribe method, for requests dropped before confirmation
    abandoned: HashMap<u64, String>,
    closed: Option<Error>,
}

/// Registry of pending and active subscriptions for one connection
pub(crate) struct Registry {
    state: RwLock<RegistryState>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Registry {
    pub(crate) fn new(metrics: Option<Arc<ClientMetrics>>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            metrics,
        }
    }

    fn finish(&self, route: Box<dyn Route>, error: Error) {
        if let Some(ref m) = self.metrics {
            m.record_closed(error.kind());
        }
        route.close(error);
    }

    /// Add a pending entry under its request id
    ///
    /// Fails with the purge error once the connection has been torn down;
    /// the entry is closed with that error.
    pub(crate) async fn register(&self, request_id: u64, route: Box<dyn Route>) -> Result<()> {
        let mut state = self.state.write().await;
        let closed = state.closed.clone();
        if let Some(error) = closed {
            drop(state);
            route.close(error.clone());
            return Err(error);
        }

        state.pending.insert(request_id, route);
        if let Some(ref m) = self.metrics {
            m.record_registered();
        }
        Ok(())
    }

    /// Move a pending entry to the active map
    pub(crate) async fn promote(&self, request_id: u64, subscription_id: u64) -> Promotion {
        let mut state = self.state.write().await;

        let Some(route) = state.pending.remove(&request_id) else {
            return match state.abandoned.remove(&request_id) {
                Some(unsubscribe_method) => Promotion::Abandoned { unsubscribe_method },
                None => Promotion::Unmatched,
            };
        };

        if state.active.contains_key(&subscription_id) {
            drop(state);
            self.finish(
                route,
                Error::InvalidFrame(format!("duplicate subscription id {}", subscription_id)),
            );
            return Promotion::Duplicate;
        }

        route.confirm(subscription_id);
        state.active.insert(subscription_id, route);
        state.confirmed.insert(request_id, subscription_id);
        Promotion::Promoted
    }

    /// Route a notification payload to its subscription
    pub(crate) async fn deliver(&self, subscription_id: u64, payload: &RawValue) -> Routing {
        let state = self.state.read().await;
        match state.active.get(&subscription_id) {
            None => Routing::Unmatched,
            Some(route) => match route.deliver(payload) {
                Delivery::Delivered => Routing::Delivered {
                    method: route.method().to_string(),
                },
                Delivery::Fault(error) => Routing::Fault(error),
            },
        }
    }

    /// Remove a confirmed entry after a per-subscription fault
    ///
    /// Returns what the caller needs to cancel the subscription server-side,
    /// or `None` if the entry is already gone.
    pub(crate) async fn evict(&self, subscription_id: u64, error: Error) -> Option<Evicted> {
        let mut state = self.state.write().await;
        let route = state.active.remove(&subscription_id)?;
        state.confirmed.retain(|_, sub| *sub != subscription_id);
        drop(state);

        let unsubscribe_method = route.unsubscribe_method().to_string();
        self.finish(route, error);
        Some(Evicted {
            subscription_id,
            unsubscribe_method,
        })
    }

    /// Remove the entry opened by `request_id`, pending or confirmed
    ///
    /// Idempotent: a second call, or a call after a purge, returns
    /// [`Removal::Absent`].
    pub(crate) async fn remove(&self, request_id: u64, error: Error) -> Removal {
        let mut state = self.state.write().await;

        if let Some(route) = state.pending.remove(&request_id) {
            state
                .abandoned
                .insert(request_id, route.unsubscribe_method().to_string());
            drop(state);
            self.finish(route, error);
            return Removal::Pending;
        }

        let Some(subscription_id) = state.confirmed.remove(&request_id) else {
            return Removal::Absent;
        };
        match state.active.remove(&subscription_id) {
            Some(route) => {
                drop(state);
                self.finish(route, error);
                Removal::Confirmed(subscription_id)
            }
            None => Removal::Absent,
        }
    }

    /// Close a pending entry whose subscribe call failed
    ///
    /// Used both for server rejections and for local write failures.
    /// Returns whether an entry was found.
    pub(crate) async fn abort(&self, request_id: u64, error: Error) -> bool {
        let mut state = self.state.write().await;
        state.abandoned.remove(&request_id);
        let Some(route) = state.pending.remove(&request_id) else {
            return false;
        };
        drop(state);
        self.finish(route, error);
        true
    }

    /// Close a pending entry the server rejected
    pub(crate) async fn reject(&self, request_id: u64, error: JsonRpcErrorData) -> bool {
        self.abort(request_id, Error::JsonRpc(error)).await
    }

    /// Close every entry with `error` and refuse further registrations
    ///
    /// Only the first purge has an effect. Returns the number of entries closed.
    pub(crate) async fn purge_all(&self, error: Error) -> usize {
        let mut guard = self.state.write().await;
        if guard.closed.is_some() {
            return 0;
        }

        let state = &mut *guard;
        state.closed = Some(error.clone());
        let routes: Vec<Box<dyn Route>> = state
            .pending
            .drain()
            .chain(state.active.drain())
            .map(|(_, route)| route)
            .collect();
        state.confirmed.clear();
        state.abandoned.clear();
        drop(guard);

        let count = routes.len();
        for route in routes {
            self.finish(route, error.clone());
        }
        count
    }

    pub(crate) async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    pub(crate) async fn active_count(&self) -> usize {
        self.state.read().await.active.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_closed(&self) -> bool {
        self.state.read().await.closed.is_some()
    }
}
