//! Client core for the cal-coin Solana program.
//!
//! Connects to an injected wallet, binds calls to the program's published
//! interface descriptor and submits them with checkpoint-expiry retry:
//!
//! - [`wallet`]: connection state machine around the wallet capability
//! - [`interface`]: descriptor loading and instruction encoding
//! - [`submit`]: build, sign, send, confirm
//! - [`network`] / [`rpc`]: the network seam and its JSON-RPC implementation
//! - [`state`]: decoding of program accounts
//! - [`client`]: [`ProgramClient`], tying it all together
//!
//! Address derivation and transaction compilation live in `chain-sol`.

pub mod client;
pub mod config;
pub mod error;
pub mod interface;
pub mod network;
pub mod rpc;
pub mod state;
pub mod submit;
pub mod wallet;

pub use client::ProgramClient;
pub use config::{ClientConfig, SubmitPolicy};
pub use error::{
    CapabilityError, ClientError, InterfaceError, NetworkError, StateError, SubmitError,
    WalletError,
};
pub use interface::{ArgValue, ProgramInterface};
pub use network::{Durability, Network, SignatureStatus};
pub use rpc::RpcNetwork;
pub use state::{ClaimEstimate, DappConfig, MintAuthority, UserRecord};
pub use submit::{Outcome, SubmissionEngine, TransactionPlan};
pub use wallet::{KeypairWallet, SessionState, TransactionSigner, WalletCapability, WalletSession};
