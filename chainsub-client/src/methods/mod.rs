//! Typed subscription methods
//!
//! Thin wrappers over [`ChainsubClient::subscribe`](crate::ChainsubClient::subscribe),
//! one per Solana pub/sub method. Each one assembles the positional params,
//! picks the matching unsubscribe method and decodes notifications into a
//! concrete type. Nested chain data (account contents, block bodies,
//! transaction errors) is kept as `serde_json::Value`.
//!
//! | method | notification |
//! |--------|--------------|
//! | `account_subscribe` | [`RpcResponse<UiAccount>`] |
//! | `program_subscribe` | [`RpcResponse<KeyedAccount>`] |
//! | `signature_subscribe` | [`RpcResponse<SignatureResult>`] |
//! | `logs_subscribe` | [`RpcResponse<LogsValue>`] |
//! | `block_subscribe` | [`RpcResponse<BlockValue>`] |
//! | `slot_subscribe` | [`SlotInfo`] |
//! | `slots_updates_subscribe` | [`SlotsUpdate`] |
//! | `root_subscribe` | `u64` |
//! | `vote_subscribe` | [`VoteInfo`] |

mod account;
mod block;
mod logs;
mod signature;
mod slot;
mod vote;

pub use account::{KeyedAccount, ProgramFilter, ProgramSubscribeConfig, UiAccount};
pub use block::{BlockFilter, BlockSubscribeConfig, BlockValue, TransactionDetails};
pub use logs::{LogsFilter, LogsValue};
pub use signature::SignatureResult;
pub use slot::{SlotInfo, SlotsUpdate, SlotsUpdateKind};
pub use vote::VoteInfo;

use chainsub_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How settled the bank state must be for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

/// Encoding for account data in notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountEncoding {
    Base58,
    #[default]
    Base64,
    #[serde(rename = "base64+zstd")]
    Base64Zstd,
    JsonParsed,
}

/// Slot the notification was produced at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcContext {
    pub slot: u64,
}

/// `{context, value}` wrapper used by most account-level notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse<T> {
    pub context: RpcContext,
    pub value: T,
}

/// Config object carrying an optional commitment
fn commitment_config(commitment: Option<Commitment>) -> Result<Map<String, Value>> {
    let mut config = Map::new();
    if let Some(commitment) = commitment {
        config.insert("commitment".to_string(), to_value(commitment)?);
    }
    Ok(config)
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))
}
