//! Subscription handles
//!
//! Opening a subscription creates two linked halves:
//!
//! - a [`Subscription<T>`] handed to the caller, which receives decoded
//!   values and can unsubscribe
//! - a route owned by the registry, which decodes payloads and pushes them
//!   into the handle's bounded channel
//!
//! # Terminal Errors
//!
//! A subscription ends exactly once. Whoever ends it (the reader on a
//! fault, the handle on unsubscribe, the connection on teardown) hands the
//! route a terminal error and drops it. The handle drains values that were
//! already buffered, then returns that error from every later
//! [`recv`](Subscription::recv).
//!
//! # Slow Consumers
//!
//! The reader never waits for a consumer. When a handle's channel is full
//! the subscription is closed with [`Error::ChannelFull`] and the server is
//! told to stop sending.
//!
//! # Dropping a Handle
//!
//! Dropping an open handle unsubscribes in the background, the same as
//! [`unsubscribe`](Subscription::unsubscribe). Outside a Tokio runtime this
//! is not possible; the next notification for it then finds the receiver
//! gone and closes the subscription with [`Error::ConsumerGone`].

use crate::registry::{Delivery, Removal, Route};
use crate::session::Session;
use chainsub_core::{Error, Result};
use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

/// Turns the raw JSON of a notification payload into a typed value
pub type Decoder<T> = Arc<dyn Fn(&[u8]) -> Result<T> + Send + Sync>;

/// Decoder for any `serde` type
///
/// ```rust
/// use chainsub_client::json_decoder;
///
/// let decode = json_decoder::<u64>();
/// assert_eq!(decode(&b"42"[..]).unwrap(), 42);
/// assert!(decode(&b"\"x\""[..]).is_err());
/// ```
pub fn json_decoder<T: DeserializeOwned + 'static>() -> Decoder<T> {
    Arc::new(|bytes: &[u8]| {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    })
}

/// Registry side of a subscription
pub(crate) struct TypedRoute<T> {
    method: String,
    unsubscribe_method: String,
    decode: Decoder<T>,
    capacity: usize,
    values: mpsc::Sender<T>,
    terminal: oneshot::Sender<Error>,
    id: watch::Sender<Option<u64>>,
    closed: Arc<AtomicBool>,
}

impl<T: Send + 'static> Route for TypedRoute<T> {
    fn method(&self) -> &str {
        &self.method
    }

    fn unsubscribe_method(&self) -> &str {
        &self.unsubscribe_method
    }

    fn confirm(&self, subscription_id: u64) {
        self.id.send_replace(Some(subscription_id));
    }

    fn deliver(&self, payload: &RawValue) -> Delivery {
        let value = match (self.decode)(payload.get().as_bytes()) {
            Ok(value) => value,
            Err(e) => return Delivery::Fault(e),
        };

        match self.values.try_send(value) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Fault(Error::ChannelFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(_)) => Delivery::Fault(Error::ConsumerGone),
        }
    }

    fn close(self: Box<Self>, error: Error) {
        let route = *self;
        route.closed.store(true, Ordering::Release);
        // The error must be in place before the value channel closes
        let _ = route.terminal.send(error);
        drop(route.values);
    }
}

/// A single logical stream of notifications
///
/// Usable as soon as `subscribe` returns; values start flowing once the
/// server confirms. See the [module documentation](self) for how a
/// subscription ends.
pub struct Subscription<T> {
    request_id: u64,
    method: String,
    unsubscribe_method: String,
    values: mpsc::Receiver<T>,
    terminal: oneshot::Receiver<Error>,
    terminal_error: Option<Error>,
    id: watch::Receiver<Option<u64>>,
    closed: Arc<AtomicBool>,
    session: Arc<Session>,
}

/// Create both halves of a subscription
pub(crate) fn open<T: Send + 'static>(
    session: Arc<Session>,
    request_id: u64,
    method: &str,
    unsubscribe_method: &str,
    decode: Decoder<T>,
) -> (TypedRoute<T>, Subscription<T>) {
    let capacity = session.channel_capacity;
    let (values_tx, values_rx) = mpsc::channel(capacity);
    let (terminal_tx, terminal_rx) = oneshot::channel();
    let (id_tx, id_rx) = watch::channel(None);
    let closed = Arc::new(AtomicBool::new(false));

    let route = TypedRoute {
        method: method.to_string(),
        unsubscribe_method: unsubscribe_method.to_string(),
        decode,
        capacity,
        values: values_tx,
        terminal: terminal_tx,
        id: id_tx,
        closed: closed.clone(),
    };

    let subscription = Subscription {
        request_id,
        method: method.to_string(),
        unsubscribe_method: unsubscribe_method.to_string(),
        values: values_rx,
        terminal: terminal_rx,
        terminal_error: None,
        id: id_rx,
        closed,
        session,
    };

    (route, subscription)
}

impl<T: Send + 'static> Subscription<T> {
    /// Wait for the next value
    ///
    /// Returns the terminal error once the subscription has ended and every
    /// buffered value has been received. There is no implicit timeout; see
    /// [`recv_timeout`](Self::recv_timeout).
    pub async fn recv(&mut self) -> Result<T> {
        if let Some(ref error) = self.terminal_error {
            return Err(error.clone());
        }

        match self.values.recv().await {
            Some(value) => Ok(value),
            None => Err(self.settle()),
        }
    }

    /// Wait for the next value for at most `timeout`
    ///
    /// Expiry returns `Error::Timeout` and leaves the subscription open.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Wait until the server has confirmed the subscription
    ///
    /// Returns the subscription id, or the terminal error if the subscription
    /// ended first (for instance because the server rejected it).
    pub async fn confirmed(&mut self) -> Result<u64> {
        let confirmed = match self.id.wait_for(Option::is_some).await {
            Ok(id) => *id,
            Err(_) => None,
        };

        match confirmed.or_else(|| self.id()) {
            Some(id) => Ok(id),
            None => Err(self.settle()),
        }
    }

    /// Cancel the subscription
    ///
    /// The local entry is removed first, so no further values are routed
    /// here whatever happens on the wire. If the server had confirmed the
    /// subscription an unsubscribe call is written and its send error, if
    /// any, is returned. Calling this again, or after the connection closed,
    /// does nothing and returns `Ok(())`.
    #[tracing::instrument(skip(self), fields(method = %self.method, request_id = self.request_id))]
    pub async fn unsubscribe(&self) -> Result<()> {
        match self
            .session
            .registry
            .remove(self.request_id, Error::Unsubscribed)
            .await
        {
            Removal::Confirmed(subscription_id) => {
                tracing::info!(subscription_id, "Unsubscribing");
                self.session
                    .send_unsubscribe(&self.unsubscribe_method, subscription_id)
                    .await
            }
            Removal::Pending => {
                tracing::debug!("Unsubscribed before confirmation");
                Ok(())
            }
            Removal::Absent => Ok(()),
        }
    }

    /// Consume the handle as a stream that ends after the terminal error
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut subscription = state?;
            match subscription.recv().await {
                Ok(value) => Some((Ok(value), Some(subscription))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn settle(&mut self) -> Error {
        let error = self
            .terminal
            .try_recv()
            .unwrap_or(Error::ConnectionClosed);
        self.terminal_error = Some(error.clone());
        error
    }
}

impl<T> Subscription<T> {
    /// Server-assigned subscription id, once confirmed
    pub fn id(&self) -> Option<u64> {
        *self.id.borrow()
    }

    /// Id of the subscribe request
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Subscribe method this subscription was opened with
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Whether the subscription has ended
    ///
    /// Values buffered before the end can still be received.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        // Without a runtime the entry is reclaimed by the next notification
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let session = self.session.clone();
        let request_id = self.request_id;
        let unsubscribe_method = std::mem::take(&mut self.unsubscribe_method);
        runtime.spawn(async move {
            match session.registry.remove(request_id, Error::Unsubscribed).await {
                Removal::Confirmed(subscription_id) => {
                    tracing::debug!(request_id, subscription_id, "Handle dropped, unsubscribing");
                    if let Err(e) = session
                        .send_unsubscribe(&unsubscribe_method, subscription_id)
                        .await
                    {
                        tracing::debug!(subscription_id, error = %e, "Unsubscribe after drop failed");
                    }
                }
                Removal::Pending | Removal::Absent => {}
            }
        });
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("method", &self.method)
            .field("request_id", &self.request_id)
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}
