//! Subscription multiplexer over one WebSocket connection
//!
//! This crate implements the client side of a JSON-RPC 2.0 pub/sub
//! endpoint such as a Solana validator's `wss://` port. Any number of
//! subscriptions share a single connection; every notification is routed
//! to the subscription that asked for it.
//!
//! # Core Features
//!
//! - **Multiplexing**: Concurrent subscribe calls correlated by request id,
//!   notifications routed by subscription id
//! - **Typed Subscriptions**: Each [`Subscription<T>`] decodes its own payloads
//! - **Slow-Consumer Isolation**: A subscription that falls behind is closed
//!   on its own; the reader never blocks
//! - **Keepalive**: Periodic pings and a pong-driven read deadline
//! - **Explicit Terminal Errors**: Every subscription ends with exactly one
//!   error describing why
//! - **Observability**: OpenTelemetry integration for traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chainsub_client::{ChainsubClient, Commitment};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChainsubClient::connect("wss://api.mainnet-beta.solana.com").await?;
//!
//!     let mut slots = client.slot_subscribe().await?;
//!     let mut account = client
//!         .account_subscribe("SysvarC1ock11111111111111111111111111111111", Some(Commitment::Confirmed))
//!         .await?;
//!
//!     let slot = slots.recv().await?;
//!     println!("slot {}", slot.slot);
//!
//!     let update = account.recv().await?;
//!     println!("clock account at slot {}", update.context.slot);
//!
//!     slots.unsubscribe().await?;
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Custom Methods
//!
//! Methods without a typed wrapper go through
//! [`ChainsubClient::subscribe`] with a decoder:
//!
//! ```rust,no_run
//! use chainsub_client::{json_decoder, ChainsubClient};
//! use serde_json::json;
//!
//! # async fn example(client: ChainsubClient) -> chainsub_core::Result<()> {
//! let mut sub = client
//!     .subscribe(
//!         Some(json!(["X"])),
//!         "fooSubscribe",
//!         "fooUnsubscribe",
//!         json_decoder::<serde_json::Value>(),
//!     )
//!     .await?;
//! let value = sub.recv().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod client_builder;
mod keepalive;
pub mod methods;
mod metrics;
mod reader;
mod registry;
mod request;
mod session;
mod subscription;
mod transport;

pub use chainsub_core::{Error, Result};
pub use client::ChainsubClient;
pub use client_builder::{ClientBuilder, ClientConfig};
pub use methods::{AccountEncoding, Commitment, RpcContext, RpcResponse};
pub use metrics::ClientMetrics;
pub use request::IdStrategy;
pub use subscription::{json_decoder, Decoder, Subscription};
