//! Codec for pub/sub frames
//!
//! Outbound, the codec turns a [`JsonRpcRequest`] into the text of a
//! WebSocket frame. Inbound, [`classify`] determines what a frame is by
//! probing its structure, without committing to any payload schema:
//!
//! | probe | frame |
//! |-------|-------|
//! | numeric `id` + `error` | [`InboundFrame::Rejected`] |
//! | numeric `id` + `result` | [`InboundFrame::Response`] |
//! | `params.subscription` | [`InboundFrame::Notification`] |
//! | `error` without `id` | [`InboundFrame::ServerError`] |
//!
//! Anything else is a protocol error ([`Error::InvalidFrame`]); the reader
//! logs it and moves on.
//!
//! # Examples
//!
//! ```rust
//! use chainsub_core::{codec, InboundFrame};
//!
//! let frame = codec::classify(r#"{"jsonrpc":"2.0","result":42,"id":1}"#).unwrap();
//! assert_eq!(frame.confirmed_subscription(), Some((1, 42)));
//!
//! let frame = codec::classify(
//!     r#"{"jsonrpc":"2.0","method":"fooNotification","params":{"subscription":42,"result":"payload"}}"#,
//! ).unwrap();
//! match frame {
//!     InboundFrame::Notification { subscription_id, payload, .. } => {
//!         assert_eq!(subscription_id, 42);
//!         assert_eq!(payload.get(), "\"payload\"");
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use crate::error::{Error, JsonRpcErrorData, Result};
use crate::types::{InboundFrame, JsonRpcRequest};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// Code used when the server sends an error member that is not a valid error object
const SERVER_ERROR_CODE: i32 = -32000;

/// Encode any serializable message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a JSON-RPC request to the text of a WebSocket frame
///
/// ```rust
/// use chainsub_core::{codec, JsonRpcRequest};
///
/// let text = codec::encode_request(&JsonRpcRequest::unsubscribe(2, "fooUnsubscribe", 42)).unwrap();
/// assert_eq!(text, r#"{"jsonrpc":"2.0","method":"fooUnsubscribe","params":[42],"id":2}"#);
/// ```
pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

/// Top-level members the classifier looks at
///
/// Everything is optional; the combination present decides the frame kind.
#[derive(Deserialize)]
struct FrameProbe<'a> {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default, borrow)]
    params: Option<&'a RawValue>,
}

/// `params` of a notification; the result is kept as raw JSON
#[derive(Deserialize)]
struct NotificationParams<'a> {
    #[serde(default)]
    subscription: Option<u64>,
    #[serde(default, borrow)]
    result: Option<&'a RawValue>,
}

/// Classify an inbound text frame
///
/// Never inspects the notification payload beyond locating it, so decode
/// failures stay per-subscription.
///
/// # Errors
///
/// Returns [`Error::InvalidFrame`] for invalid JSON, a non-numeric `id`,
/// or a frame matching none of the known shapes.
pub fn classify(text: &str) -> Result<InboundFrame> {
    let probe: FrameProbe<'_> =
        serde_json::from_str(text).map_err(|e| Error::InvalidFrame(e.to_string()))?;

    let request_id = match probe.id {
        None | Some(Value::Null) => None,
        Some(id) => Some(
            id.as_u64()
                .ok_or_else(|| Error::InvalidFrame(format!("non-numeric id: {}", id)))?,
        ),
    };

    if let Some(error) = probe.error {
        let error = error_data(error);
        return Ok(match request_id {
            Some(request_id) => InboundFrame::Rejected { request_id, error },
            None => InboundFrame::ServerError(error),
        });
    }

    if let Some(request_id) = request_id {
        let result = probe
            .result
            .ok_or_else(|| Error::InvalidFrame(format!("response {} has no result", request_id)))?;
        return Ok(InboundFrame::Response { request_id, result });
    }

    let params = probe
        .params
        .ok_or_else(|| Error::InvalidFrame("frame has neither id nor params".to_string()))?;
    // Only object params carry a subscription id
    if !params.get().starts_with('{') {
        return Err(Error::InvalidFrame(
            "notification params must be an object".to_string(),
        ));
    }
    let params: NotificationParams<'_> = serde_json::from_str(params.get())
        .map_err(|e| Error::InvalidFrame(format!("notification params: {}", e)))?;

    let subscription_id = params
        .subscription
        .ok_or_else(|| Error::InvalidFrame("params.subscription missing".to_string()))?;
    let payload = params.result.ok_or_else(|| {
        Error::InvalidFrame(format!(
            "notification for subscription {} has no result",
            subscription_id
        ))
    })?;

    Ok(InboundFrame::Notification {
        method: probe.method,
        subscription_id,
        payload: payload.to_owned(),
    })
}

/// Interpret an `error` member, falling back to a generic server error
fn error_data(error: Value) -> JsonRpcErrorData {
    match serde_json::from_value::<JsonRpcErrorData>(error.clone()) {
        Ok(data) => data,
        Err(_) => JsonRpcErrorData::new(SERVER_ERROR_CODE, error.to_string()),
    }
}
