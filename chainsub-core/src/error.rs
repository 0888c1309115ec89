//! Error types for chainsub
//!
//! This module defines the error taxonomy shared by every chainsub crate.
//! Two types live here:
//!
//! - **Error**: Application-level errors returned by the client (uses thiserror)
//! - **JsonRpcErrorData**: The JSON-RPC 2.0 error object as it appears on the wire
//!
//! # Error Categories
//!
//! The variants fall into four groups, and where an error lands decides
//! how far it travels:
//!
//! - **Transport**: `Dial`, `WebSocket`, `ReadDeadline`, `Timeout`,
//!   `ConnectionClosed`. Fatal to the connection; every open subscription
//!   receives a clone of the error as its terminal value.
//! - **Protocol**: `InvalidFrame`. Logged and dropped by the reader, never
//!   handed to a subscription.
//! - **Per-subscription**: `Decode`, `ChannelFull`, `ConsumerGone`, `JsonRpc`.
//!   Fatal to one subscription only.
//! - **Lifecycle / local**: `Unsubscribed`, `Serialization`, `InvalidConfig`,
//!   `TransactionFailed`.
//!
//! `Error` is `Clone` because a single transport failure fans out to many
//! subscriptions at once.
//!
//! # Examples
//!
//! ```rust
//! use chainsub_core::{Error, JsonRpcErrorData};
//!
//! let rejected = Error::JsonRpc(JsonRpcErrorData::invalid_params("Invalid pubkey"));
//! assert!(rejected.is_subscription_fault());
//! assert!(Error::ConnectionClosed.is_transport());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for chainsub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for chainsub operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The server rejected a call with a JSON-RPC error object
    ///
    /// Delivered as the terminal error of a subscription whose subscribe
    /// request came back with an `error` instead of a subscription id.
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// Serialization of an outbound request failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The WebSocket handshake failed
    ///
    /// `status` and `body` are filled in when the server answered the
    /// upgrade request with a non-101 HTTP response.
    #[error("Dial failed: {message}{}", format_http(.status, .body))]
    Dial {
        /// Transport-level description of the failure
        message: String,
        /// HTTP status returned by the server, if any
        status: Option<u16>,
        /// HTTP response body returned by the server, if any
        body: Option<String>,
    },

    /// WebSocket transport layer error (read or write)
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// No pong arrived before the read deadline expired
    #[error("Read deadline exceeded: no pong received in time")]
    ReadDeadline,

    /// An outbound write, or a bounded wait such as `recv_timeout`, ran out of time
    #[error("Operation timed out")]
    Timeout,

    /// The connection was closed, locally or by the server
    #[error("Connection closed")]
    ConnectionClosed,

    /// An inbound frame did not match any known JSON-RPC shape
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The subscription's decode function rejected a notification payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// The consumer did not drain its channel fast enough
    #[error("Subscription channel full: reached capacity {capacity}")]
    ChannelFull {
        /// Capacity of the subscription's inbound channel
        capacity: usize,
    },

    /// The subscription handle was dropped while notifications were still arriving
    #[error("Subscription consumer dropped")]
    ConsumerGone,

    /// The subscription was explicitly unsubscribed
    #[error("Subscription closed by unsubscribe")]
    Unsubscribed,

    /// Client configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A watched transaction landed with an execution error
    #[error("Transaction failed: {0}")]
    TransactionFailed(serde_json::Value),
}

impl Error {
    /// Returns true for errors that end the whole connection
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Dial { .. }
                | Error::WebSocket(_)
                | Error::ReadDeadline
                | Error::Timeout
                | Error::ConnectionClosed
        )
    }

    /// Returns true for errors that end a single subscription
    pub fn is_subscription_fault(&self) -> bool {
        matches!(
            self,
            Error::Decode(_) | Error::ChannelFull { .. } | Error::ConsumerGone | Error::JsonRpc(_)
        )
    }

    /// Short, stable label for the variant, used as a metric attribute
    pub fn kind(&self) -> &'static str {
        match self {
            Error::JsonRpc(_) => "json_rpc",
            Error::Serialization(_) => "serialization",
            Error::Dial { .. } => "dial",
            Error::WebSocket(_) => "websocket",
            Error::ReadDeadline => "read_deadline",
            Error::Timeout => "timeout",
            Error::ConnectionClosed => "connection_closed",
            Error::InvalidFrame(_) => "invalid_frame",
            Error::Decode(_) => "decode",
            Error::ChannelFull { .. } => "channel_full",
            Error::ConsumerGone => "consumer_gone",
            Error::Unsubscribed => "unsubscribed",
            Error::InvalidConfig(_) => "invalid_config",
            Error::TransactionFailed(_) => "transaction_failed",
        }
    }
}

fn format_http(status: &Option<u16>, body: &Option<String>) -> String {
    match (status, body) {
        (Some(status), Some(body)) if !body.is_empty() => {
            format!(" (status {}, body: {})", status, body)
        }
        (Some(status), _) => format!(" (status {})", status),
        _ => String::new(),
    }
}

/// JSON-RPC 2.0 error data as defined in the specification
///
/// This is the `error` member of a failed response:
///
/// ```json
/// {"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params"},"id":7}
/// ```
///
/// # Standard Error Codes
///
/// - `-32700`: Parse error
/// - `-32600`: Invalid Request
/// - `-32601`: Method not found
/// - `-32602`: Invalid params
/// - `-32603`: Internal error
/// - `-32000 to -32099`: Server error (implementation-defined)
///
/// # Examples
///
/// ```rust
/// use chainsub_core::JsonRpcErrorData;
///
/// let error = JsonRpcErrorData::invalid_params("Invalid param: WrongSize");
/// assert_eq!(error.code, -32602);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code indicating the error type
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Optional additional error information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    /// Create a new JSON-RPC error with code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, msg)
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    /// Formats as "[code] message", e.g. "[-32602] Invalid param: WrongSize"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}
