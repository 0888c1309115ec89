//! `voteSubscribe`

use crate::{json_decoder, ChainsubClient, Subscription};
use chainsub_core::Result;
use serde::{Deserialize, Serialize};

/// A vote observed in gossip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteInfo {
    pub hash: String,
    pub slots: Vec<u64>,
    /// Unix seconds
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub vote_pubkey: Option<String>,
}

impl ChainsubClient {
    /// Stream votes seen in gossip
    ///
    /// Only served by validators started with
    /// `--rpc-pubsub-enable-vote-subscription`.
    pub async fn vote_subscribe(&self) -> Result<Subscription<VoteInfo>> {
        self.subscribe(None, "voteSubscribe", "voteUnsubscribe", json_decoder())
            .await
    }
}
