//! chainsub - WebSocket subscription multiplexer for blockchain pub/sub
//!
//! This is the main convenience crate that re-exports the chainsub
//! sub-crates. Use it if you want a single dependency.
//!
//! # Architecture
//!
//! chainsub is organized into modular crates:
//!
//! - **chainsub-core**: Wire types, frame codec, error taxonomy, observability
//! - **chainsub-client**: Connection, reader, registry, keepalive and the
//!   typed subscription methods
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use chainsub::ChainsubClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChainsubClient::connect("wss://api.mainnet-beta.solana.com").await?;
//!
//!     let mut roots = client.root_subscribe().await?;
//!     for _ in 0..3 {
//!         println!("rooted slot {}", roots.recv().await?);
//!     }
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

// Re-export all public APIs from sub-crates
pub use chainsub_client as client;
pub use chainsub_core as core;

// Convenience re-exports of the most commonly used types
pub use chainsub_client::{ChainsubClient, ClientBuilder, Subscription};
pub use chainsub_core::{Error, Result};
