//! WebSocket transport halves
//!
//! The connection is split into a read half owned by the reader task and a
//! write half, [`Outbound`], shared by everything that writes: subscribe and
//! unsubscribe calls, the keepalive loop, and the reader itself when it
//! cancels a faulted subscription. Writers are serialised by a mutex and
//! every write is bounded by the configured write timeout.
//!
//! Both halves are boxed trait objects, so the client runs the same way over
//! a real socket and over an in-memory channel pair.

use chainsub_core::{Error, Result};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Write half of a WebSocket connection
pub(crate) type FrameSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Read half of a WebSocket connection
pub(crate) type FrameStream =
    Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// Map a tungstenite error onto the transport error taxonomy
pub(crate) fn transport_error(error: WsError) -> Error {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ConnectionClosed,
        other => Error::WebSocket(other.to_string()),
    }
}

/// Open a WebSocket connection and split it
///
/// Extra headers are added to the upgrade request. The whole handshake is
/// bounded by `handshake_timeout`. There is no retry.
pub(crate) async fn dial(
    url: &str,
    headers: &[(String, String)],
    handshake_timeout: Duration,
) -> Result<(FrameSink, FrameStream)> {
    let mut request = url.into_client_request().map_err(|e| Error::Dial {
        message: e.to_string(),
        status: None,
        body: None,
    })?;

    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidConfig(format!("header name {:?}: {}", name, e)))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidConfig(format!("header {:?} value: {}", name, e)))?;
        request.headers_mut().insert(header_name, header_value);
    }

    let (ws_stream, response) =
        match tokio::time::timeout(handshake_timeout, connect_async(request)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => return Err(dial_error(e)),
            Err(_) => {
                return Err(Error::Dial {
                    message: format!("handshake timed out after {:?}", handshake_timeout),
                    status: None,
                    body: None,
                })
            }
        };

    tracing::debug!(status = %response.status(), "WebSocket handshake complete");

    let (sink, stream) = ws_stream.split();
    Ok((Box::pin(sink), Box::pin(stream)))
}

/// Keep whatever the server said when it refused the upgrade
fn dial_error(error: WsError) -> Error {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            let body = response
                .body()
                .as_ref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
            Error::Dial {
                message: format!("HTTP error: {}", status),
                status: Some(status.as_u16()),
                body,
            }
        }
        other => Error::Dial {
            message: other.to_string(),
            status: None,
            body: None,
        },
    }
}

/// Serialised, deadline-bounded writer
pub(crate) struct Outbound {
    sink: Mutex<FrameSink>,
    write_timeout: Duration,
    closed: AtomicBool,
}

impl Outbound {
    pub(crate) fn new(sink: FrameSink, write_timeout: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            write_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Write one frame
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` after [`Outbound::close`]
    /// - `Error::Timeout` if the write does not finish within the write timeout
    /// - `Error::WebSocket` if the transport rejects the frame
    pub(crate) async fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.write_timeout, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(transport_error(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Write a text frame
    pub(crate) async fn send_text(&self, text: String) -> Result<()> {
        self.send(Message::Text(text)).await
    }

    /// Send a close frame and shut the sink; later writes fail
    ///
    /// Only the first call touches the transport.
    pub(crate) async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut sink = self.sink.lock().await;
        let shutdown = async {
            sink.send(Message::Close(None)).await?;
            sink.close().await
        };
        match tokio::time::timeout(self.write_timeout, shutdown).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(transport_error(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
