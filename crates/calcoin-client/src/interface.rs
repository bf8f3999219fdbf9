//! Program interface descriptor (IDL) loading and instruction encoding.
//!
//! The descriptor is an Anchor-style JSON document. For every operation it
//! fixes the 8-byte selector, the exact account layout (order and role) and
//! the argument types. Selectors are taken from the document as-is, never
//! re-derived, so the client always matches the deployed program's view.
//!
//! Instruction data is `selector || args`, with args Borsh-serialized:
//! little-endian integers, `bool` as one byte, `pubkey` as 32 raw bytes,
//! `string`/`bytes` as a `u32` LE length prefix followed by the bytes.

use std::collections::BTreeMap;
use std::io::{self, Write};

use borsh::BorshSerialize;
use chain_sol::{AccountMeta, Address, Instruction};
use serde::Deserialize;
use serde_json::Value;

use crate::error::InterfaceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I64,
    U128,
    Pubkey,
    String,
    Bytes,
}

impl ArgType {
    fn parse(value: &Value) -> Option<Self> {
        Some(match value.as_str()? {
            "bool" => ArgType::Bool,
            "u8" => ArgType::U8,
            "u16" => ArgType::U16,
            "u32" => ArgType::U32,
            "u64" => ArgType::U64,
            "i64" => ArgType::I64,
            "u128" => ArgType::U128,
            "pubkey" | "publicKey" => ArgType::Pubkey,
            "string" => ArgType::String,
            "bytes" => ArgType::Bytes,
            _ => return None,
        })
    }
}

/// A concrete argument value supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I64(i64),
    U128(u128),
    Pubkey(Address),
    String(String),
    Bytes(Vec<u8>),
}

impl ArgValue {
    fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::Bool(_) => ArgType::Bool,
            ArgValue::U8(_) => ArgType::U8,
            ArgValue::U16(_) => ArgType::U16,
            ArgValue::U32(_) => ArgType::U32,
            ArgValue::U64(_) => ArgType::U64,
            ArgValue::I64(_) => ArgType::I64,
            ArgValue::U128(_) => ArgType::U128,
            ArgValue::Pubkey(_) => ArgType::Pubkey,
            ArgValue::String(_) => ArgType::String,
            ArgValue::Bytes(_) => ArgType::Bytes,
        }
    }
}

impl BorshSerialize for ArgValue {
    fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            ArgValue::Bool(v) => v.serialize(writer),
            ArgValue::U8(v) => v.serialize(writer),
            ArgValue::U16(v) => v.serialize(writer),
            ArgValue::U32(v) => v.serialize(writer),
            ArgValue::U64(v) => v.serialize(writer),
            ArgValue::I64(v) => v.serialize(writer),
            ArgValue::U128(v) => v.serialize(writer),
            ArgValue::Pubkey(v) => v.to_bytes().serialize(writer),
            ArgValue::String(v) => v.serialize(writer),
            ArgValue::Bytes(v) => v.serialize(writer),
        }
    }
}

/// One position in an operation's account layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSlot {
    pub name: String,
    pub is_signer: bool,
    pub is_writable: bool,
    /// Fixed address the slot must hold (programs, sysvars).
    pub address: Option<Address>,
    /// The program derives this account itself.
    pub derived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub ty: ArgType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSchema {
    pub name: String,
    pub selector: [u8; 8],
    pub accounts: Vec<AccountSlot>,
    pub args: Vec<ArgSpec>,
}

/// A loaded descriptor. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProgramInterface {
    program_id: Address,
    name: Option<String>,
    operations: BTreeMap<String, OperationSchema>,
    account_types: BTreeMap<String, [u8; 8]>,
    errors: BTreeMap<u32, (String, String)>,
}

// -- Raw document shape ------------------------------------------------------

#[derive(Deserialize)]
struct RawDescriptor {
    address: Option<String>,
    metadata: Option<RawMetadata>,
    instructions: Option<Vec<RawInstruction>>,
    #[serde(default)]
    accounts: Vec<RawAccountType>,
    #[serde(default)]
    errors: Vec<RawErrorCode>,
}

#[derive(Deserialize)]
struct RawMetadata {
    name: Option<String>,
    address: Option<String>,
}

#[derive(Deserialize)]
struct RawInstruction {
    name: Option<String>,
    discriminator: Option<Vec<u8>>,
    accounts: Option<Vec<RawAccount>>,
    args: Option<Vec<RawArg>>,
}

#[derive(Deserialize)]
struct RawAccount {
    name: String,
    #[serde(default, alias = "isMut")]
    writable: bool,
    #[serde(default, alias = "isSigner")]
    signer: bool,
    address: Option<String>,
    pda: Option<Value>,
}

#[derive(Deserialize)]
struct RawArg {
    name: String,
    #[serde(rename = "type")]
    ty: Value,
}

#[derive(Deserialize)]
struct RawAccountType {
    name: String,
    discriminator: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct RawErrorCode {
    code: u32,
    name: String,
    #[serde(default)]
    msg: String,
}

fn malformed(msg: impl Into<String>) -> InterfaceError {
    InterfaceError::MalformedDescriptor(msg.into())
}

fn discriminator(raw: Option<Vec<u8>>, owner: &str) -> Result<[u8; 8], InterfaceError> {
    let bytes = raw.ok_or_else(|| malformed(format!("{owner}: missing discriminator")))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| malformed(format!("{owner}: discriminator is {} bytes, expected 8", v.len())))
}

impl ProgramInterface {
    /// Parse a descriptor document.
    pub fn load(descriptor: &[u8]) -> Result<Self, InterfaceError> {
        let raw: RawDescriptor = serde_json::from_slice(descriptor)
            .map_err(|e| malformed(format!("invalid JSON: {e}")))?;

        let address = raw
            .address
            .or_else(|| raw.metadata.as_ref().and_then(|m| m.address.clone()))
            .ok_or_else(|| malformed("missing program address"))?;
        let program_id: Address = address
            .parse()
            .map_err(|e| malformed(format!("program address: {e}")))?;

        let instructions = raw
            .instructions
            .ok_or_else(|| malformed("missing instructions"))?;

        let mut operations = BTreeMap::new();
        for (i, ix) in instructions.into_iter().enumerate() {
            let name = ix
                .name
                .ok_or_else(|| malformed(format!("instruction #{i}: missing name")))?;
            let selector = discriminator(ix.discriminator, &name)?;

            let accounts = ix
                .accounts
                .ok_or_else(|| malformed(format!("{name}: missing accounts")))?
                .into_iter()
                .map(|a| {
                    let address = a
                        .address
                        .map(|s| s.parse::<Address>())
                        .transpose()
                        .map_err(|e| malformed(format!("{name}.{}: {e}", a.name)))?;
                    Ok(AccountSlot {
                        is_signer: a.signer,
                        is_writable: a.writable,
                        address,
                        derived: a.pda.is_some(),
                        name: a.name,
                    })
                })
                .collect::<Result<Vec<_>, InterfaceError>>()?;

            let args = ix
                .args
                .ok_or_else(|| malformed(format!("{name}: missing args")))?
                .into_iter()
                .map(|a| {
                    let ty = ArgType::parse(&a.ty).ok_or_else(|| {
                        malformed(format!("{name}.{}: unsupported type {}", a.name, a.ty))
                    })?;
                    Ok(ArgSpec { name: a.name, ty })
                })
                .collect::<Result<Vec<_>, InterfaceError>>()?;

            if operations
                .insert(
                    name.clone(),
                    OperationSchema {
                        name: name.clone(),
                        selector,
                        accounts,
                        args,
                    },
                )
                .is_some()
            {
                return Err(malformed(format!("duplicate instruction {name}")));
            }
        }

        let mut account_types = BTreeMap::new();
        for account in raw.accounts {
            if let Some(bytes) = account.discriminator {
                let disc = discriminator(Some(bytes), &account.name)?;
                account_types.insert(account.name, disc);
            }
        }

        let errors = raw
            .errors
            .into_iter()
            .map(|e| (e.code, (e.name, e.msg)))
            .collect();

        Ok(Self {
            program_id,
            name: raw.metadata.and_then(|m| m.name),
            operations,
            account_types,
            errors,
        })
    }

    pub fn program_id(&self) -> Address {
        self.program_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn operation(&self, name: &str) -> Option<&OperationSchema> {
        self.operations.get(name)
    }

    pub fn account_discriminator(&self, account_type: &str) -> Option<&[u8; 8]> {
        self.account_types.get(account_type)
    }

    /// Name and message of a program error code, if the descriptor lists it.
    pub fn error(&self, code: u32) -> Option<(&str, &str)> {
        self.errors
            .get(&code)
            .map(|(name, msg)| (name.as_str(), msg.as_str()))
    }

    /// Append the descriptor's error text to a network rejection reason.
    ///
    /// Understands both the preflight log form (`custom program error:
    /// 0x1770`) and the status form (`{"InstructionError":[0,{"Custom":6000}]}`).
    pub fn explain_rejection(&self, reason: &str) -> String {
        match custom_error_code(reason).and_then(|c| self.error(c)) {
            Some((name, msg)) => format!("{reason} ({name}: {msg})"),
            None => reason.to_string(),
        }
    }

    /// Turn a logical call into a raw instruction.
    ///
    /// `accounts` must match the operation's layout exactly: same length,
    /// and at each position the same signer/writable role and, where the
    /// descriptor pins one, the same address.
    pub fn encode(
        &self,
        operation: &str,
        args: &[ArgValue],
        accounts: &[AccountMeta],
    ) -> Result<Instruction, InterfaceError> {
        let schema = self
            .operation(operation)
            .ok_or_else(|| InterfaceError::UnknownOperation(operation.to_string()))?;

        let layout_err = |reason: String| InterfaceError::AccountLayoutMismatch {
            operation: operation.to_string(),
            reason,
        };

        if accounts.len() != schema.accounts.len() {
            return Err(layout_err(format!(
                "expected {} accounts, got {}",
                schema.accounts.len(),
                accounts.len()
            )));
        }

        let mut metas = Vec::with_capacity(accounts.len());
        for (i, (slot, meta)) in schema.accounts.iter().zip(accounts).enumerate() {
            if slot.is_signer != meta.is_signer || slot.is_writable != meta.is_writable {
                return Err(layout_err(format!(
                    "account #{i} ({}) must be {}, got {}",
                    slot.name,
                    role_name(slot.is_signer, slot.is_writable),
                    role_name(meta.is_signer, meta.is_writable)
                )));
            }
            if let Some(fixed) = slot.address {
                if fixed != meta.pubkey {
                    return Err(layout_err(format!(
                        "account #{i} ({}) must be {fixed}, got {}",
                        slot.name, meta.pubkey
                    )));
                }
            }
            metas.push(if slot.derived { meta.derived() } else { *meta });
        }

        if args.len() != schema.args.len() {
            return Err(InterfaceError::ArgumentMismatch {
                operation: operation.to_string(),
                reason: format!("expected {} args, got {}", schema.args.len(), args.len()),
            });
        }

        let mut data = Vec::with_capacity(8 + 32 * args.len());
        data.extend_from_slice(&schema.selector);
        for (spec, value) in schema.args.iter().zip(args) {
            if spec.ty != value.arg_type() {
                return Err(InterfaceError::ArgumentMismatch {
                    operation: operation.to_string(),
                    reason: format!(
                        "{} must be {:?}, got {:?}",
                        spec.name,
                        spec.ty,
                        value.arg_type()
                    ),
                });
            }
            borsh::to_writer(&mut data, value).map_err(|e| InterfaceError::ArgumentMismatch {
                operation: operation.to_string(),
                reason: format!("{}: {e}", spec.name),
            })?;
        }

        Ok(Instruction {
            program_id: self.program_id,
            accounts: metas,
            data,
        })
    }
}

fn custom_error_code(reason: &str) -> Option<u32> {
    if let Some((_, hex)) = reason.rsplit_once("custom program error: 0x") {
        let digits: String = hex.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
        return u32::from_str_radix(&digits, 16).ok();
    }
    let status: Value = serde_json::from_str(reason).ok()?;
    let code = status.get("InstructionError")?.get(1)?.get("Custom")?.as_u64()?;
    u32::try_from(code).ok()
}

fn role_name(is_signer: bool, is_writable: bool) -> &'static str {
    match (is_signer, is_writable) {
        (true, true) => "writable signer",
        (true, false) => "read-only signer",
        (false, true) => "writable",
        (false, false) => "read-only",
    }
}
