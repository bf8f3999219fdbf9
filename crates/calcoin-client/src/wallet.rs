//! Wallet session: the connection state machine around an injected signing
//! capability.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──approved──▶ Connected
//!       ▲                       │                       │
//!       │                       └──rejected/absent──▶ Error
//!       └──────────── disconnect / revoke ◀─────────────┘
//! ```
//!
//! The state lives in a `watch` channel so the UI collaborator can follow
//! it, and so concurrent `connect()` callers can wait on the attempt already
//! in flight instead of prompting the user twice.

use std::sync::Arc;

use async_trait::async_trait;
use chain_sol::{Address, Transaction};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{CapabilityError, WalletError};

/// The injected wallet's functions, treated as an opaque external contract.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    /// Whether a provider is installed at all. Checked before anything else
    /// so absence is distinguishable from rejection.
    fn is_present(&self) -> bool;

    /// Ask the user to approve the connection; returns their public key.
    async fn connect(&self) -> Result<Address, CapabilityError>;

    /// Ask the user to sign `tx`; returns it with the user's signature filled in.
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, CapabilityError>;

    async fn disconnect(&self) -> Result<(), CapabilityError> {
        Ok(())
    }
}

#[async_trait]
impl<T: WalletCapability + ?Sized> WalletCapability for Arc<T> {
    fn is_present(&self) -> bool {
        (**self).is_present()
    }

    async fn connect(&self) -> Result<Address, CapabilityError> {
        (**self).connect().await
    }

    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, CapabilityError> {
        (**self).sign_transaction(tx).await
    }

    async fn disconnect(&self) -> Result<(), CapabilityError> {
        (**self).disconnect().await
    }
}

/// Anything that can turn an unsigned transaction into a signed one.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected { identity: Address },
    Error(WalletError),
}

pub struct WalletSession<W> {
    capability: W,
    state: watch::Sender<SessionState>,
}

impl<W: WalletCapability> WalletSession<W> {
    pub fn new(capability: W) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self { capability, state }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Follow state changes; the UI enables its actions on `Connected`.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> Option<Address> {
        match *self.state.borrow() {
            SessionState::Connected { identity } => Some(identity),
            _ => None,
        }
    }

    /// Whether operations that need a connected wallet may be offered.
    pub fn actions_enabled(&self) -> bool {
        self.identity().is_some()
    }

    /// Connect to the wallet, prompting the user at most once.
    ///
    /// Calls made while another connect is pending resolve to that attempt's
    /// outcome. Calling while already connected returns the identity.
    pub async fn connect(&self) -> Result<Address, WalletError> {
        let mut leader = false;
        self.state.send_if_modified(|state| match state {
            SessionState::Disconnected | SessionState::Error(_) => {
                *state = SessionState::Connecting;
                leader = true;
                true
            }
            _ => false,
        });

        if !leader {
            return self.await_settled().await;
        }

        let mut reset = ResetOnDrop {
            state: &self.state,
            armed: true,
        };

        let outcome = if self.capability.is_present() {
            debug!("requesting wallet approval");
            self.capability.connect().await.map_err(|e| match e {
                CapabilityError::Rejected(reason) => WalletError::UserRejected(reason),
                CapabilityError::Failed(reason) => WalletError::Capability(reason),
            })
        } else {
            Err(WalletError::CapabilityAbsent)
        };
        reset.armed = false;

        // A disconnect or revoke while the prompt was open wins over its result.
        let settled = match &outcome {
            Ok(identity) => SessionState::Connected {
                identity: *identity,
            },
            Err(e) => SessionState::Error(e.clone()),
        };
        let installed = self.state.send_if_modified(|state| {
            if matches!(state, SessionState::Connecting) {
                *state = settled;
                true
            } else {
                false
            }
        });
        if !installed {
            debug!("connect superseded while the prompt was open");
            return Err(WalletError::ConnectionAbandoned);
        }

        match &outcome {
            Ok(identity) => info!(%identity, "wallet connected"),
            Err(e) => warn!(error = %e, "wallet connection failed"),
        }
        outcome
    }

    async fn await_settled(&self) -> Result<Address, WalletError> {
        let mut rx = self.state.subscribe();
        let settled = rx
            .wait_for(|s| !matches!(s, SessionState::Connecting))
            .await
            .map_err(|_| WalletError::ConnectionAbandoned)?
            .clone();

        match settled {
            SessionState::Connected { identity } => Ok(identity),
            SessionState::Error(e) => Err(e),
            SessionState::Disconnected | SessionState::Connecting => {
                Err(WalletError::ConnectionAbandoned)
            }
        }
    }

    /// Explicit user disconnect.
    pub async fn disconnect(&self) -> Result<(), WalletError> {
        let was_connected = matches!(*self.state.borrow(), SessionState::Connected { .. });
        self.state.send_replace(SessionState::Disconnected);
        if was_connected {
            info!("wallet disconnected");
            self.capability
                .disconnect()
                .await
                .map_err(|e| WalletError::Capability(e.to_string()))?;
        }
        Ok(())
    }

    /// The provider withdrew access (account switched, extension locked).
    pub fn revoke(&self) {
        let previous = self.state.send_replace(SessionState::Disconnected);
        if matches!(previous, SessionState::Connected { .. }) {
            warn!("wallet capability revoked");
        }
    }

    /// Ask the connected wallet to sign `tx`.
    ///
    /// The returned transaction must carry the same message and a valid
    /// signature from the session identity.
    pub async fn request_signature(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        let identity = self.identity().ok_or(WalletError::NotConnected)?;
        let expected = tx.message.clone();

        let signed = self
            .capability
            .sign_transaction(tx)
            .await
            .map_err(|e| match e {
                CapabilityError::Rejected(reason) => WalletError::SignatureDenied(reason),
                CapabilityError::Failed(reason) => WalletError::Capability(reason),
            })?;

        if signed.message != expected {
            return Err(WalletError::InvalidSignature(
                "wallet altered the transaction message".into(),
            ));
        }
        signed
            .verify_signer(&identity)
            .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;

        Ok(signed)
    }
}

#[async_trait]
impl<W: WalletCapability> TransactionSigner for WalletSession<W> {
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError> {
        self.request_signature(tx).await
    }
}

/// Puts an abandoned `Connecting` state back to `Disconnected`.
struct ResetOnDrop<'a> {
    state: &'a watch::Sender<SessionState>,
    armed: bool,
}

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_if_modified(|s| {
                if matches!(s, SessionState::Connecting) {
                    *s = SessionState::Disconnected;
                    true
                } else {
                    false
                }
            });
        }
    }
}

/// A capability backed by a locally held Ed25519 seed.
///
/// Approves every request. Meant for backends, scripts and tests where no
/// browser extension exists.
pub struct KeypairWallet {
    seed: Zeroizing<[u8; 32]>,
    public: Address,
}

impl KeypairWallet {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
        Self {
            public: Address::new(signing_key.verifying_key().to_bytes()),
            seed,
        }
    }

    pub fn address(&self) -> Address {
        self.public
    }
}

#[async_trait]
impl WalletCapability for KeypairWallet {
    fn is_present(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<Address, CapabilityError> {
        Ok(self.public)
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, CapabilityError> {
        tx.sign_with_keypair(&self.seed)
            .map_err(|e| CapabilityError::Failed(e.to_string()))?;
        Ok(tx)
    }
}
