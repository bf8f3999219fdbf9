//! Shared fixtures for calcoin-client integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calcoin_client::{
    ClientConfig, Durability, KeypairWallet, Network, NetworkError, ProgramClient,
    SignatureStatus, SubmitPolicy,
};
use chain_sol::{Address, Checkpoint, Signature, Transaction};

pub const CAL_COIN: &[u8] = include_bytes!("../fixtures/cal_coin.json");

pub const LAST_VALID_BLOCK_HEIGHT: u64 = 150;

/// What the mock chain does with the next transaction it receives.
#[derive(Debug, Clone)]
pub enum Reply {
    Land(Durability),
    Expire,
    Reject(&'static str),
}

/// An in-memory endpoint that verifies every transaction it is sent.
#[derive(Default)]
pub struct MockChain {
    replies: Mutex<VecDeque<Reply>>,
    statuses: Mutex<HashMap<Signature, SignatureStatus>>,
    accounts: Mutex<HashMap<Address, Vec<u8>>>,
    sent: Mutex<Vec<Transaction>>,
    checkpoint_fetches: AtomicUsize,
    height: AtomicU64,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, replies: impl IntoIterator<Item = Reply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    pub fn put_account(&self, address: Address, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn checkpoint_fetches(&self) -> usize {
        self.checkpoint_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for MockChain {
    async fn latest_checkpoint(&self) -> Result<Checkpoint, NetworkError> {
        let n = self.checkpoint_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Checkpoint {
            blockhash: [n as u8; 32],
            last_valid_block_height: LAST_VALID_BLOCK_HEIGHT,
        })
    }

    async fn block_height(&self) -> Result<u64, NetworkError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, NetworkError> {
        tx.verify_signatures()
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        self.sent.lock().unwrap().push(tx.clone());

        let signature = tx.id().ok_or_else(|| NetworkError::Rejected("unsigned".into()))?;
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Land(Durability::Confirmed));

        match reply {
            Reply::Land(level) => {
                self.statuses
                    .lock()
                    .unwrap()
                    .insert(signature, SignatureStatus { level, err: None });
                Ok(signature)
            }
            Reply::Expire => Err(NetworkError::CheckpointExpired),
            Reply::Reject(reason) => Err(NetworkError::Rejected(reason.into())),
        }
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, NetworkError> {
        Ok(self.statuses.lock().unwrap().get(signature).cloned())
    }

    async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>, NetworkError> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        submit: SubmitPolicy {
            max_attempts: 3,
            confirm_timeout_ms: 1_000,
            poll_interval_ms: 10,
        },
        ..ClientConfig::default()
    }
}

pub fn client_with(
    seed: [u8; 32],
    chain: &Arc<MockChain>,
) -> ProgramClient<KeypairWallet, Arc<MockChain>> {
    ProgramClient::new(
        test_config(),
        CAL_COIN,
        KeypairWallet::from_seed(seed),
        Arc::clone(chain),
    )
    .unwrap()
}

/// Serialized `DappConfig` account as the program would store it.
pub fn dapp_config_account(token_mint: Address, exempt: Address) -> Vec<u8> {
    let mut data = vec![213, 69, 23, 209, 116, 1, 204, 100];
    data.extend_from_slice(&[0x11; 32]);
    data.extend_from_slice(token_mint.as_bytes());
    data.push(255);
    data.extend_from_slice(exempt.as_bytes());
    data
}

pub fn user_record_account(authority: Address, last_claimed: i64) -> Vec<u8> {
    let mut data = vec![182, 179, 144, 178, 135, 99, 143, 249];
    data.extend_from_slice(authority.as_bytes());
    data.extend_from_slice(&last_claimed.to_le_bytes());
    data
}
