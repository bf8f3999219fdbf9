//! Solana primitives for the cal-coin client.
//!
//! This crate handles program-derived address derivation, transaction
//! compilation, the compact wire format and Ed25519 signature handling,
//! all without pulling in `solana-sdk`.
//!
//! Addresses are derived with SHA-256 and checked against the Ed25519 curve
//! with `curve25519-dalek`; signatures use `ed25519-dalek`.

pub mod address;
pub mod error;
pub mod pda;
pub mod transaction;

// Re-export key public types for ergonomic imports.
pub use address::{
    Address, Signature, ASSOCIATED_TOKEN_PROGRAM_ID, RENT_SYSVAR_ID, SYSTEM_PROGRAM_ID,
    TOKEN_2022_PROGRAM_ID,
};
pub use error::SolError;
pub use pda::{create_program_address, derive_associated_token_address, find_program_address};
pub use transaction::{
    build_transaction, compile_message, encode_compact_u16, AccountMeta, AccountOrigin,
    Checkpoint, CompiledInstruction, Instruction, Message, Transaction,
};
