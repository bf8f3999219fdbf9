//! The network seam.
//!
//! The core never owns the endpoint's lifecycle; it only talks to it through
//! [`Network`]. [`crate::rpc::RpcNetwork`] is the JSON-RPC implementation,
//! tests substitute their own.

use std::sync::Arc;

use async_trait::async_trait;
use chain_sol::{Address, Checkpoint, Signature, Transaction};
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Requested confirmation strength, weakest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Durability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Durability::Processed => "processed",
            Durability::Confirmed => "confirmed",
            Durability::Finalized => "finalized",
        }
    }
}

/// What the network currently knows about a sent transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub level: Durability,
    /// Set when the transaction landed but the program failed it.
    pub err: Option<String>,
}

#[async_trait]
pub trait Network: Send + Sync {
    /// A fresh checkpoint to reference from a new transaction.
    async fn latest_checkpoint(&self) -> Result<Checkpoint, NetworkError>;

    /// Current block height, used to detect checkpoint expiry.
    async fn block_height(&self) -> Result<u64, NetworkError>;

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, NetworkError>;

    /// `None` while the network has not seen the transaction.
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, NetworkError>;

    /// Raw account data, `None` if the account does not exist.
    async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, NetworkError>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    async fn latest_checkpoint(&self) -> Result<Checkpoint, NetworkError> {
        (**self).latest_checkpoint().await
    }

    async fn block_height(&self) -> Result<u64, NetworkError> {
        (**self).block_height().await
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, NetworkError> {
        (**self).send_transaction(tx).await
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, NetworkError> {
        (**self).signature_status(signature).await
    }

    async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, NetworkError> {
        (**self).account_data(address).await
    }
}
