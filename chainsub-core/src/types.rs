//! JSON-RPC 2.0 wire types for pub/sub endpoints
//!
//! The subscription protocol spoken by blockchain pub/sub endpoints uses a
//! narrow slice of JSON-RPC 2.0. Outbound traffic is always a request with a
//! numeric id:
//!
//! ```json
//! {"jsonrpc":"2.0","method":"accountSubscribe","params":["<pubkey>",{"encoding":"base64"}],"id":1}
//! ```
//!
//! Inbound traffic is one of:
//!
//! 1. **Confirmation**: `{"jsonrpc":"2.0","result":42,"id":1}` answers a
//!    subscribe call with the server-assigned subscription id
//! 2. **Notification**: `{"jsonrpc":"2.0","method":"accountNotification","params":{"subscription":42,"result":{...}}}`
//!    carries one payload for an already-confirmed subscription
//! 3. **Error**: `{"jsonrpc":"2.0","error":{"code":-32602,"message":"..."},"id":1}`,
//!    with or without an `id`
//!
//! [`InboundFrame`] is the classified form of those shapes; see
//! [`crate::codec::classify`].

use crate::error::JsonRpcErrorData;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

/// JSON-RPC 2.0 request message
///
/// Both subscribe and unsubscribe calls use this envelope. The `id` is a
/// plain `u64`: pub/sub endpoints correlate confirmations by numeric id only.
///
/// # Examples
///
/// ```rust
/// use chainsub_core::JsonRpcRequest;
/// use serde_json::json;
///
/// let req = JsonRpcRequest::subscribe(7, "slotSubscribe", None);
/// assert_eq!(req.jsonrpc, "2.0");
///
/// let unsub = JsonRpcRequest::unsubscribe(8, "slotUnsubscribe", 42);
/// assert_eq!(unsub.params, Some(json!([42])));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version - always "2.0"
    pub jsonrpc: String,
    /// Name of the remote method to invoke
    pub method: String,
    /// Positional parameters, omitted from the JSON when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request identifier, unique per connection
    pub id: u64,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request
    pub fn new(method: impl Into<String>, params: Option<Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Build a subscribe call
    pub fn subscribe(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(method, params, id)
    }

    /// Build an unsubscribe call, `params: [subscription_id]`
    pub fn unsubscribe(id: u64, method: impl Into<String>, subscription_id: u64) -> Self {
        Self::new(method, Some(Value::from(vec![subscription_id])), id)
    }
}

/// Assemble positional params for a subscribe call
///
/// The configuration object, when present and non-empty, is appended as the
/// last positional parameter. Calls with neither positional params nor a
/// configuration send no `params` member at all.
///
/// ```rust
/// use chainsub_core::types::build_params;
/// use serde_json::{json, Map};
///
/// let mut config = Map::new();
/// config.insert("commitment".into(), json!("finalized"));
///
/// assert_eq!(
///     build_params(vec![json!("X")], Some(config)),
///     Some(json!(["X", {"commitment": "finalized"}]))
/// );
/// assert_eq!(build_params(vec![], None), None);
/// ```
pub fn build_params(mut params: Vec<Value>, config: Option<Map<String, Value>>) -> Option<Value> {
    if let Some(config) = config {
        if !config.is_empty() {
            params.push(Value::Object(config));
        }
    }

    if params.is_empty() {
        None
    } else {
        Some(Value::Array(params))
    }
}

/// A classified inbound frame
///
/// Produced by [`crate::codec::classify`]. The reader dispatches on the
/// variant without ever touching the notification payload, which stays as
/// raw JSON until the owning subscription decodes it.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// A successful response carrying the original request id
    ///
    /// When `result` is an unsigned integer this is a subscription
    /// confirmation; unsubscribe acknowledgements (`true`) also land here.
    Response {
        /// Id of the request this answers
        request_id: u64,
        /// Raw result value
        result: Value,
    },

    /// An error response carrying the original request id
    Rejected {
        /// Id of the request this answers
        request_id: u64,
        /// Error object sent by the server
        error: JsonRpcErrorData,
    },

    /// A server-pushed notification for a subscription
    Notification {
        /// Notification method, e.g. `accountNotification`
        method: Option<String>,
        /// Server-assigned subscription id
        subscription_id: u64,
        /// Raw JSON of `params.result`
        payload: Box<RawValue>,
    },

    /// An error frame that cannot be correlated to a request
    ServerError(JsonRpcErrorData),
}

impl InboundFrame {
    /// Subscription id carried by a confirmation, if this is one
    pub fn confirmed_subscription(&self) -> Option<(u64, u64)> {
        match self {
            InboundFrame::Response { request_id, result } => {
                result.as_u64().map(|sub_id| (*request_id, sub_id))
            }
            _ => None,
        }
    }

    /// Check if this frame is a notification
    pub fn is_notification(&self) -> bool {
        matches!(self, InboundFrame::Notification { .. })
    }
}
