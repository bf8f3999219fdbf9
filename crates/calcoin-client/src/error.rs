use chain_sol::{Address, Signature, SolError};
use thiserror::Error;

/// Failures reported by the injected wallet capability itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("declined by user: {0}")]
    Rejected(String),

    #[error("wallet failure: {0}")]
    Failed(String),
}

/// Wallet session errors. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("no wallet capability is present")]
    CapabilityAbsent,

    #[error("connection rejected: {0}")]
    UserRejected(String),

    #[error("signature denied: {0}")]
    SignatureDenied(String),

    #[error("wallet is not connected")]
    NotConnected,

    #[error("connection attempt was abandoned")]
    ConnectionAbandoned,

    #[error("wallet returned an invalid signature: {0}")]
    InvalidSignature(String),

    #[error("wallet error: {0}")]
    Capability(String),
}

/// Descriptor and encoding errors. These indicate client/program version skew.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterfaceError {
    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("account layout mismatch for {operation}: {reason}")]
    AccountLayoutMismatch { operation: String, reason: String },

    #[error("argument mismatch for {operation}: {reason}")]
    ArgumentMismatch { operation: String, reason: String },
}

/// Errors reported by the network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("checkpoint expired before inclusion")]
    CheckpointExpired,

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Submission failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a submission for {operation} is already pending")]
    AlreadyPending { operation: String },

    #[error("rejected by program: {reason}")]
    Rejected { reason: String },

    #[error("checkpoint expired on all {attempts} attempts")]
    Expired { attempts: u32 },

    #[error("confirmation timed out for {signature}")]
    Timeout { signature: Signature },

    /// Sent, but the status could not be read; the transaction may still land.
    #[error("lost track of {signature} while confirming: {reason}")]
    Unconfirmed { signature: Signature, reason: String },

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Build(#[from] SolError),

    #[error("network error: {0}")]
    Network(String),
}

impl From<NetworkError> for SubmitError {
    fn from(e: NetworkError) -> Self {
        match e {
            NetworkError::Rejected(reason) => SubmitError::Rejected { reason },
            other => SubmitError::Network(other.to_string()),
        }
    }
}

/// Decoding failures for program-owned account data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("{account} data too short: expected {expected} bytes, got {got}")]
    TooShort {
        account: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{account} discriminator mismatch")]
    DiscriminatorMismatch { account: &'static str },

    #[error("{account} data malformed: {reason}")]
    Malformed { account: &'static str, reason: String },
}

/// Top-level error returned by [`crate::ProgramClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("descriptor is for program {descriptor}, config expects {configured}")]
    ProgramMismatch {
        configured: Address,
        descriptor: Address,
    },

    #[error("account not found: {0}")]
    AccountNotFound(Address),

    #[error(transparent)]
    Interface(#[from] InterfaceError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Sol(#[from] SolError),
}
