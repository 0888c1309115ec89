//! `accountSubscribe` and `programSubscribe`

use super::{commitment_config, to_value, AccountEncoding, Commitment, RpcResponse};
use crate::{json_decoder, ChainsubClient, Subscription};
use chainsub_core::{build_params, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Account state as carried by account and program notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiAccount {
    pub lamports: u64,
    /// `[data, encoding]` for binary encodings, an object for `jsonParsed`
    pub data: Value,
    pub owner: String,
    pub executable: bool,
    pub rent_epoch: u64,
    #[serde(default)]
    pub space: Option<u64>,
}

/// An account together with its address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedAccount {
    pub pubkey: String,
    pub account: UiAccount,
}

/// Server-side filter on program accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgramFilter {
    /// Account data length must equal this many bytes
    DataSize(u64),
    /// Account data at `offset` must equal the base58 `bytes`
    Memcmp { offset: u64, bytes: String },
}

/// Options for `programSubscribe`
#[derive(Debug, Clone, Default)]
pub struct ProgramSubscribeConfig {
    pub commitment: Option<Commitment>,
    pub encoding: AccountEncoding,
    pub filters: Vec<ProgramFilter>,
}

impl ChainsubClient {
    /// Watch one account for lamport or data changes
    pub async fn account_subscribe(
        &self,
        pubkey: &str,
        commitment: Option<Commitment>,
    ) -> Result<Subscription<RpcResponse<UiAccount>>> {
        self.account_subscribe_with_encoding(pubkey, commitment, AccountEncoding::default())
            .await
    }

    /// Watch one account, choosing how its data is encoded
    pub async fn account_subscribe_with_encoding(
        &self,
        pubkey: &str,
        commitment: Option<Commitment>,
        encoding: AccountEncoding,
    ) -> Result<Subscription<RpcResponse<UiAccount>>> {
        let mut config = commitment_config(commitment)?;
        config.insert("encoding".to_string(), to_value(encoding)?);

        self.subscribe(
            build_params(vec![json!(pubkey)], Some(config)),
            "accountSubscribe",
            "accountUnsubscribe",
            json_decoder(),
        )
        .await
    }

    /// Watch every account owned by a program
    pub async fn program_subscribe(
        &self,
        program_id: &str,
        commitment: Option<Commitment>,
    ) -> Result<Subscription<RpcResponse<KeyedAccount>>> {
        self.program_subscribe_with_config(
            program_id,
            ProgramSubscribeConfig {
                commitment,
                ..ProgramSubscribeConfig::default()
            },
        )
        .await
    }

    /// Watch program accounts with an encoding and filters
    pub async fn program_subscribe_with_config(
        &self,
        program_id: &str,
        options: ProgramSubscribeConfig,
    ) -> Result<Subscription<RpcResponse<KeyedAccount>>> {
        let mut config = commitment_config(options.commitment)?;
        config.insert("encoding".to_string(), to_value(options.encoding)?);
        if !options.filters.is_empty() {
            config.insert("filters".to_string(), to_value(&options.filters)?);
        }

        self.subscribe(
            build_params(vec![json!(program_id)], Some(config)),
            "programSubscribe",
            "programUnsubscribe",
            json_decoder(),
        )
        .await
    }
}
