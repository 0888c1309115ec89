//! `signatureSubscribe` and waiting for a transaction to land

use super::{commitment_config, Commitment, RpcResponse};
use crate::{json_decoder, ChainsubClient, Subscription};
use chainsub_core::{build_params, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Processing outcome of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureResult {
    /// `None` on success, the transaction error otherwise
    #[serde(default)]
    pub err: Option<Value>,
}

impl ChainsubClient {
    /// Get notified once a transaction reaches `commitment`
    ///
    /// The server sends a single notification and then drops the
    /// subscription on its side.
    pub async fn signature_subscribe(
        &self,
        signature: &str,
        commitment: Option<Commitment>,
    ) -> Result<Subscription<RpcResponse<SignatureResult>>> {
        let config = commitment_config(commitment)?;
        self.subscribe(
            build_params(vec![json!(signature)], Some(config)),
            "signatureSubscribe",
            "signatureUnsubscribe",
            json_decoder(),
        )
        .await
    }

    /// Wait until a transaction lands
    ///
    /// Subscribes, takes the first notification and unsubscribes whatever
    /// the outcome. Wrap the call in `tokio::time::timeout` to bound it.
    ///
    /// # Errors
    ///
    /// - `Error::TransactionFailed` carrying the transaction error
    /// - the subscription's terminal error if it ends first
    #[tracing::instrument(skip(self))]
    pub async fn wait_for_signature(
        &self,
        signature: &str,
        commitment: Option<Commitment>,
    ) -> Result<()> {
        let mut sub = self.signature_subscribe(signature, commitment).await?;
        let outcome = sub.recv().await;

        if let Err(e) = sub.unsubscribe().await {
            tracing::debug!(error = %e, "Unsubscribe after signature notification failed");
        }

        match outcome?.value.err {
            None => Ok(()),
            Some(err) => Err(Error::TransactionFailed(err)),
        }
    }
}
