//! JSON-RPC 2.0 implementation of [`Network`] over HTTP.
//!
//! Speaks the standard Solana RPC methods. Transactions and account data
//! travel base64-encoded.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chain_sol::{Address, Checkpoint, Signature, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::NetworkError;
use crate::network::{Durability, Network, SignatureStatus};

/// JSON-RPC client for a Solana-compatible endpoint.
pub struct RpcNetwork {
    url: String,
    commitment: Durability,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// `{ context, value }` wrapper used by most read methods.
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    confirmation_status: Option<Durability>,
    #[serde(default)]
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    /// `[payload, encoding]`
    data: (String, String),
}

enum CallError {
    Transport(String),
    Rpc(RpcErrorObject),
}

impl From<CallError> for NetworkError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Transport(msg) => NetworkError::Transport(msg),
            CallError::Rpc(err) => NetworkError::Transport(format!("rpc error {}: {}", err.code, err.message)),
        }
    }
}

impl RpcNetwork {
    pub fn new(url: impl Into<String>, commitment: Durability) -> Self {
        Self {
            url: url.into(),
            commitment,
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.rpc_url.clone(), config.durability)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, CallError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = request.id, "rpc call");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| CallError::Transport(format!("{method}: invalid response: {e}")))?;

        match (body.result, body.error) {
            (_, Some(err)) => Err(CallError::Rpc(err)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(CallError::Transport(format!("{method}: empty response"))),
        }
    }
}

/// Map a `sendTransaction` error. An unknown blockhash means the checkpoint
/// expired; anything else the node reports is a rejection of the transaction.
fn classify_send_error(err: RpcErrorObject) -> NetworkError {
    let blockhash_missing = err.message.contains("Blockhash not found")
        || err
            .data
            .as_ref()
            .and_then(|d| d.get("err"))
            .and_then(Value::as_str)
            .is_some_and(|e| e == "BlockhashNotFound");

    if blockhash_missing {
        NetworkError::CheckpointExpired
    } else {
        NetworkError::Rejected(err.message)
    }
}

fn parse_status(raw: Option<RawStatus>) -> Option<SignatureStatus> {
    let raw = raw?;
    Some(SignatureStatus {
        // A status without confirmationStatus comes from old nodes; it has at
        // least been processed.
        level: raw.confirmation_status.unwrap_or(Durability::Processed),
        err: raw.err.filter(|e| !e.is_null()).map(|e| e.to_string()),
    })
}

fn decode_account(raw: Option<RawAccount>) -> Result<Option<Vec<u8>>, NetworkError> {
    let Some(RawAccount {
        data: (payload, encoding),
    }) = raw
    else {
        return Ok(None);
    };
    if encoding != "base64" {
        return Err(NetworkError::Transport(format!(
            "unexpected account encoding {encoding}"
        )));
    }
    STANDARD
        .decode(payload)
        .map(Some)
        .map_err(|e| NetworkError::Transport(format!("account data: {e}")))
}

fn parse_blockhash(raw: LatestBlockhash) -> Result<Checkpoint, NetworkError> {
    let blockhash: Address = raw
        .blockhash
        .parse()
        .map_err(|e| NetworkError::Transport(format!("blockhash: {e}")))?;
    Ok(Checkpoint {
        blockhash: blockhash.to_bytes(),
        last_valid_block_height: raw.last_valid_block_height,
    })
}

#[async_trait]
impl Network for RpcNetwork {
    async fn latest_checkpoint(&self) -> Result<Checkpoint, NetworkError> {
        let raw: WithContext<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await?;
        parse_blockhash(raw.value)
    }

    async fn block_height(&self) -> Result<u64, NetworkError> {
        Ok(self
            .call(
                "getBlockHeight",
                json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await?)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, NetworkError> {
        let wire = tx
            .serialize()
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        let params = json!([
            STANDARD.encode(wire),
            { "encoding": "base64", "preflightCommitment": self.commitment.as_str() }
        ]);

        let signature: String = match self.call("sendTransaction", params).await {
            Ok(signature) => signature,
            Err(CallError::Rpc(err)) => {
                warn!(code = err.code, reason = %err.message, "sendTransaction failed");
                return Err(classify_send_error(err));
            }
            Err(e) => return Err(e.into()),
        };
        signature
            .parse()
            .map_err(|e| NetworkError::Transport(format!("signature: {e}")))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, NetworkError> {
        let raw: WithContext<Vec<Option<RawStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature.to_string()], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(parse_status(raw.value.into_iter().next().flatten()))
    }

    async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, NetworkError> {
        let raw: WithContext<Option<RawAccount>> = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.commitment.as_str() }
                ]),
            )
            .await?;
        decode_account(raw.value)
    }
}
