//! `blockSubscribe`

use super::{to_value, AccountEncoding, Commitment, RpcResponse};
use crate::{json_decoder, ChainsubClient, Subscription};
use chainsub_core::{build_params, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Which blocks to receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockFilter {
    All,
    /// Blocks with a transaction touching this account or program
    MentionsAccountOrProgram(String),
}

impl BlockFilter {
    fn to_param(&self) -> Value {
        match self {
            BlockFilter::All => json!("all"),
            BlockFilter::MentionsAccountOrProgram(pubkey) => {
                json!({ "mentionsAccountOrProgram": pubkey })
            }
        }
    }
}

/// Level of transaction detail in block notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionDetails {
    Full,
    Accounts,
    Signatures,
    None,
}

/// Options for `blockSubscribe`; unset fields are left to the server
#[derive(Debug, Clone, Default)]
pub struct BlockSubscribeConfig {
    pub commitment: Option<Commitment>,
    pub encoding: Option<AccountEncoding>,
    pub transaction_details: Option<TransactionDetails>,
    pub show_rewards: Option<bool>,
    pub max_supported_transaction_version: Option<u8>,
}

impl BlockSubscribeConfig {
    fn to_config(&self) -> Result<Map<String, Value>> {
        let mut config = Map::new();
        if let Some(commitment) = self.commitment {
            config.insert("commitment".to_string(), to_value(commitment)?);
        }
        if let Some(encoding) = self.encoding {
            config.insert("encoding".to_string(), to_value(encoding)?);
        }
        if let Some(details) = self.transaction_details {
            config.insert("transactionDetails".to_string(), to_value(details)?);
        }
        if let Some(show_rewards) = self.show_rewards {
            config.insert("showRewards".to_string(), json!(show_rewards));
        }
        if let Some(version) = self.max_supported_transaction_version {
            config.insert("maxSupportedTransactionVersion".to_string(), json!(version));
        }
        Ok(config)
    }
}

/// A produced block, or the error that kept it from being fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockValue {
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub block: Option<Value>,
}

impl ChainsubClient {
    /// Stream blocks matching `filter`
    ///
    /// `blockSubscribe` is disabled on many public endpoints; in that case
    /// the subscription ends with the server's `Error::JsonRpc`.
    pub async fn block_subscribe(
        &self,
        filter: BlockFilter,
        options: BlockSubscribeConfig,
    ) -> Result<Subscription<RpcResponse<BlockValue>>> {
        let config = options.to_config()?;
        self.subscribe(
            build_params(vec![filter.to_param()], Some(config)),
            "blockSubscribe",
            "blockUnsubscribe",
            json_decoder(),
        )
        .await
    }
}
