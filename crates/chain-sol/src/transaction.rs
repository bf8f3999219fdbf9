//! Transaction assembly and the Solana wire format.
//!
//! Transactions are compiled and serialized by hand. The wire format is a
//! compact binary layout:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```

use ed25519_dalek::{Signer, VerifyingKey};
use zeroize::Zeroize;

use crate::address::{Address, Signature};
use crate::error::SolError;

/// Header counts are a single byte on the wire.
const MAX_ACCOUNT_KEYS: usize = u8::MAX as usize;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

fn compact_len(len: usize, what: &str) -> Result<Vec<u8>, SolError> {
    let value = u16::try_from(len)
        .map_err(|_| SolError::SerializationError(format!("too many {what}: {len}")))?;
    Ok(encode_compact_u16(value))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Who controls an account referenced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountOrigin {
    /// A key held by a wallet, or a well-known program/sysvar id.
    #[default]
    External,
    /// A program-derived address; never signs at the transaction level.
    ProgramDerived,
}

/// A single account reference in an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Address,
    pub is_signer: bool,
    pub is_writable: bool,
    pub origin: AccountOrigin,
}

impl AccountMeta {
    pub fn writable_signer(pubkey: Address) -> Self {
        Self::with_role(pubkey, true, true)
    }

    pub fn readonly_signer(pubkey: Address) -> Self {
        Self::with_role(pubkey, true, false)
    }

    pub fn writable(pubkey: Address) -> Self {
        Self::with_role(pubkey, false, true)
    }

    pub fn readonly(pubkey: Address) -> Self {
        Self::with_role(pubkey, false, false)
    }

    /// Mark this reference as a program-derived address.
    pub fn derived(mut self) -> Self {
        self.origin = AccountOrigin::ProgramDerived;
        self
    }

    fn with_role(pubkey: Address, is_signer: bool, is_writable: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable,
            origin: AccountOrigin::External,
        }
    }
}

/// One program invocation, before it is compiled into a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// A recent blockhash plus the last block height at which it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub blockhash: [u8; 32],
    pub last_valid_block_height: u64,
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the message's `account_keys` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

/// The signed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// All account keys referenced by this transaction, in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<Address>,

    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,

    pub recent_blockhash: [u8; 32],

    pub instructions: Vec<CompiledInstruction>,
}

/// A message plus one signature slot per required signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<Signature>,
    pub message: Message,
}

// ---------------------------------------------------------------------------
// Transaction building
// ---------------------------------------------------------------------------

/// Build an unsigned transaction from `instructions` paid for by `fee_payer`.
///
/// Accounts that appear in several instructions are listed once, with the
/// most permissive role observed (signer beats non-signer, writable beats
/// read-only). Instruction order is kept exactly as supplied.
pub fn build_transaction(
    instructions: &[Instruction],
    fee_payer: &Address,
    checkpoint: &Checkpoint,
) -> Result<Transaction, SolError> {
    if instructions.is_empty() {
        return Err(SolError::TransactionBuildError(
            "transaction needs at least one instruction".into(),
        ));
    }

    let message = compile_message(instructions, fee_payer, &checkpoint.blockhash)?;
    Ok(Transaction::new_unsigned(message))
}

/// Compile instructions into a [`Message`] with a single fee payer.
pub fn compile_message(
    instructions: &[Instruction],
    fee_payer: &Address,
    recent_blockhash: &[u8; 32],
) -> Result<Message, SolError> {
    struct AccountEntry {
        pubkey: Address,
        is_signer: bool,
        is_writable: bool,
    }

    // Instruction account lists are tiny; a Vec keeps insertion order.
    let mut entries: Vec<AccountEntry> = Vec::new();

    let mut upsert = |pubkey: Address, signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    // Fee payer is always signer + writable.
    upsert(*fee_payer, true, true);

    for ix in instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        // Program IDs are non-signer, read-only accounts.
        upsert(ix.program_id, false, false);
    }

    if entries.len() > MAX_ACCOUNT_KEYS {
        return Err(SolError::TransactionBuildError(format!(
            "{} accounts exceed the {MAX_ACCOUNT_KEYS} account limit",
            entries.len()
        )));
    }

    // Stable sort keeps insertion order within a class, so the fee payer
    // (first writable signer) stays at index 0.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    let count = |f: fn(&AccountEntry) -> bool| entries.iter().filter(|e| f(e)).count() as u8;
    let num_required_signatures = count(|e| e.is_signer);
    let num_readonly_signed = count(|e| e.is_signer && !e.is_writable);
    let num_readonly_unsigned = count(|e| !e.is_signer && !e.is_writable);

    let account_keys: Vec<Address> = entries.iter().map(|e| e.pubkey).collect();

    let index_of = |key: &Address| -> Result<u8, SolError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| SolError::TransactionBuildError(format!("{key} not in account keys")))
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey))
            .collect::<Result<Vec<_>, _>>()?;

        compiled.push(CompiledInstruction {
            program_id_index: index_of(&ix.program_id)?,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(Message {
        account_keys,
        num_required_signatures,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        instructions: compiled,
    })
}

impl Message {
    /// Serialize the message (the bytes that get signed).
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let mut buf = Vec::with_capacity(256);

        buf.push(self.num_required_signatures);
        buf.push(self.num_readonly_signed);
        buf.push(self.num_readonly_unsigned);

        buf.extend_from_slice(&compact_len(self.account_keys.len(), "account keys")?);
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_bytes());
        }

        buf.extend_from_slice(&self.recent_blockhash);

        buf.extend_from_slice(&compact_len(self.instructions.len(), "instructions")?);
        for ix in &self.instructions {
            buf.push(ix.program_id_index);

            buf.extend_from_slice(&compact_len(ix.account_indices.len(), "instruction accounts")?);
            buf.extend_from_slice(&ix.account_indices);

            buf.extend_from_slice(&compact_len(ix.data.len(), "instruction data bytes")?);
            buf.extend_from_slice(&ix.data);
        }

        Ok(buf)
    }

    /// The accounts that must sign, in signature-slot order.
    pub fn signers(&self) -> &[Address] {
        let n = (self.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    pub fn fee_payer(&self) -> Option<&Address> {
        self.account_keys.first()
    }
}

impl Transaction {
    /// Wrap a message with empty signature slots.
    pub fn new_unsigned(message: Message) -> Self {
        let slots = message.signers().len();
        Self {
            signatures: vec![Signature::default(); slots],
            message,
        }
    }

    /// The transaction id: the fee payer's signature, once present.
    pub fn id(&self) -> Option<Signature> {
        self.signatures.first().copied().filter(|s| !s.is_empty())
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.len() == self.message.signers().len()
            && self.signatures.iter().all(|s| !s.is_empty())
    }

    /// Place `signature` into the slot belonging to `signer`.
    pub fn add_signature(&mut self, signer: &Address, signature: Signature) -> Result<(), SolError> {
        let slot = self
            .message
            .signers()
            .iter()
            .position(|k| k == signer)
            .ok_or_else(|| {
                SolError::SigningError(format!("{signer} is not a signer of this transaction"))
            })?;
        let signatures_len = self.signatures.len();
        let entry = self.signatures.get_mut(slot).ok_or_else(|| {
            SolError::SigningError(format!(
                "no signature slot {slot} for {signer} ({signatures_len} slots)"
            ))
        })?;
        *entry = signature;
        Ok(())
    }

    /// Sign with a 32-byte Ed25519 seed held locally.
    pub fn sign_with_keypair(&mut self, private_key: &[u8; 32]) -> Result<(), SolError> {
        let mut seed = *private_key;
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
        seed.zeroize();

        let signer = Address::new(signing_key.verifying_key().to_bytes());
        let message_bytes = self.message.serialize()?;
        let signature = signing_key.sign(&message_bytes);

        self.add_signature(&signer, Signature::new(signature.to_bytes()))
    }

    /// Check the signature of one signer against the message bytes.
    pub fn verify_signer(&self, signer: &Address) -> Result<(), SolError> {
        let slot = self
            .message
            .signers()
            .iter()
            .position(|k| k == signer)
            .ok_or_else(|| {
                SolError::SigningError(format!("{signer} is not a signer of this transaction"))
            })?;
        let signature = self.signatures.get(slot).ok_or_else(|| {
            SolError::SigningError(format!("missing signature slot for {signer}"))
        })?;
        let message_bytes = self.message.serialize()?;
        verify_slot(signer, signature, &message_bytes)
    }

    /// Check every signature slot against the message bytes.
    pub fn verify_signatures(&self) -> Result<(), SolError> {
        if self.signatures.len() != self.message.signers().len() {
            return Err(SolError::SigningError(format!(
                "expected {} signatures, got {}",
                self.message.signers().len(),
                self.signatures.len()
            )));
        }
        let message_bytes = self.message.serialize()?;
        for (signer, signature) in self.message.signers().iter().zip(&self.signatures) {
            verify_slot(signer, signature, &message_bytes)?;
        }
        Ok(())
    }

    /// Serialize into the wire format accepted by `sendTransaction`.
    pub fn serialize(&self) -> Result<Vec<u8>, SolError> {
        let message_bytes = self.message.serialize()?;

        let mut wire = Vec::with_capacity(3 + 64 * self.signatures.len() + message_bytes.len());
        wire.extend_from_slice(&compact_len(self.signatures.len(), "signatures")?);
        for signature in &self.signatures {
            wire.extend_from_slice(signature.as_bytes());
        }
        wire.extend_from_slice(&message_bytes);

        Ok(wire)
    }
}

fn verify_slot(signer: &Address, signature: &Signature, message: &[u8]) -> Result<(), SolError> {
    if signature.is_empty() {
        return Err(SolError::SigningError(format!("missing signature for {signer}")));
    }
    let key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|e| SolError::SigningError(format!("{signer} is not an ed25519 key: {e}")))?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    key.verify_strict(message, &sig)
        .map_err(|_| SolError::SigningError(format!("invalid signature for {signer}")))
}
