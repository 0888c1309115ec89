//! Core wire types and frame codec for chainsub
//!
//! This crate holds everything about the pub/sub protocol that does not
//! need a socket:
//!
//! - **Types**: The request envelope and the classified inbound frame
//! - **Codec**: Request encoding and structural classification of inbound frames
//! - **Error handling**: The error taxonomy shared by every chainsub crate
//! - **Observability**: Tracing subscriber and OpenTelemetry setup for applications
//!
//! The `chainsub-client` crate builds the connection, the subscription
//! registry and the typed subscription methods on top of it.
//!
//! # Example
//!
//! ```rust
//! use chainsub_core::{codec, InboundFrame, JsonRpcRequest};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::subscribe(1, "fooSubscribe", Some(json!(["X"])));
//! let text = codec::encode_request(&request).unwrap();
//! assert!(text.contains("fooSubscribe"));
//!
//! let frame = codec::classify(r#"{"jsonrpc":"2.0","result":42,"id":1}"#).unwrap();
//! assert_eq!(frame.confirmed_subscription(), Some((1, 42)));
//! # let _ = InboundFrame::ServerError(chainsub_core::JsonRpcErrorData::new(-32603, "x"));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{build_params, InboundFrame, JsonRpcRequest};
