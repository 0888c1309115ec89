//! `slotSubscribe`, `slotsUpdatesSubscribe` and `rootSubscribe`

use crate::{json_decoder, ChainsubClient, Subscription};
use chainsub_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A slot processed by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub parent: u64,
    pub root: u64,
    pub slot: u64,
}

/// Stage a slot reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotsUpdateKind {
    FirstShredReceived,
    Completed,
    CreatedBank,
    Frozen,
    Dead,
    OptimisticConfirmation,
    Root,
}

/// One slot lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotsUpdate {
    #[serde(rename = "type")]
    pub kind: SlotsUpdateKind,
    pub slot: u64,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub parent: Option<u64>,
    /// Bank statistics, sent with `frozen`
    #[serde(default)]
    pub stats: Option<Value>,
    /// Reason, sent with `dead`
    #[serde(default)]
    pub err: Option<String>,
}

impl ChainsubClient {
    /// Stream every slot the validator processes
    pub async fn slot_subscribe(&self) -> Result<Subscription<SlotInfo>> {
        self.subscribe(None, "slotSubscribe", "slotUnsubscribe", json_decoder())
            .await
    }

    /// Stream detailed slot lifecycle events
    pub async fn slots_updates_subscribe(&self) -> Result<Subscription<SlotsUpdate>> {
        self.subscribe(
            None,
            "slotsUpdatesSubscribe",
            "slotsUpdatesUnsubscribe",
            json_decoder(),
        )
        .await
    }

    /// Stream newly rooted slots
    pub async fn root_subscribe(&self) -> Result<Subscription<u64>> {
        self.subscribe(None, "rootSubscribe", "rootUnsubscribe", json_decoder())
            .await
    }
}
