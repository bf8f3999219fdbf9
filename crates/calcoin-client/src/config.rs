//! Client configuration.
//!
//! Built explicitly by the embedding application (from JSON or in code);
//! nothing is read from the environment.

use std::time::Duration;

use chain_sol::Address;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::network::Durability;

pub const DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub rpc_url: String,
    /// When set, the loaded descriptor must name this program.
    pub program_id: Option<Address>,
    pub durability: Durability,
    /// Gateway token account passed to the program. Defaults to the
    /// connected user's own address.
    pub gateway_token: Option<Address>,
    pub submit: SubmitPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEVNET_RPC_URL.to_string(),
            program_id: None,
            durability: Durability::Confirmed,
            gateway_token: None,
            submit: SubmitPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))?;
        config.submit.validate()?;
        Ok(config)
    }
}

/// Retry and confirmation policy for [`crate::SubmissionEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmitPolicy {
    /// Total send attempts, including the first, before giving up on an
    /// expiring checkpoint.
    pub max_attempts: u32,
    pub confirm_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            confirm_timeout_ms: 30_000,
            poll_interval_ms: 500,
        }
    }
}

impl SubmitPolicy {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.max_attempts == 0 {
            return Err(ClientError::Config("submit.max_attempts must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ClientError::Config(
                "submit.poll_interval_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}
