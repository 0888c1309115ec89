//! `logsSubscribe`

use super::{commitment_config, Commitment, RpcResponse};
use crate::{json_decoder, ChainsubClient, Subscription};
use chainsub_core::{build_params, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Which transactions' logs to receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogsFilter {
    /// Every transaction except simple vote transactions
    All,
    /// Every transaction including votes
    AllWithVotes,
    /// Transactions mentioning the given address
    Mentions(String),
}

impl LogsFilter {
    fn to_param(&self) -> Value {
        match self {
            LogsFilter::All => json!("all"),
            LogsFilter::AllWithVotes => json!("allWithVotes"),
            LogsFilter::Mentions(pubkey) => json!({ "mentions": [pubkey] }),
        }
    }
}

/// Logs emitted by one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsValue {
    pub signature: String,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub logs: Option<Vec<String>>,
}

impl ChainsubClient {
    /// Stream transaction logs matching `filter`
    pub async fn logs_subscribe(
        &self,
        filter: LogsFilter,
        commitment: Option<Commitment>,
    ) -> Result<Subscription<RpcResponse<LogsValue>>> {
        let config = commitment_config(commitment)?;
        self.subscribe(
            build_params(vec![filter.to_param()], Some(config)),
            "logsSubscribe",
            "logsUnsubscribe",
            json_decoder(),
        )
        .await
    }
}
