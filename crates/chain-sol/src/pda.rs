//! Program Derived Address (PDA) derivation.
//!
//! A PDA is a SHA-256 digest of the seeds, a one-byte bump, the owning
//! program id and the marker `"ProgramDerivedAddress"`. The bump is searched
//! from 255 downward until the digest falls OFF the Ed25519 curve, so no
//! private key can ever sign for the resulting address. The on-chain program
//! re-derives the same address from the same seeds, which is why the search
//! order and byte layout are fixed.

use sha2::{Digest, Sha256};

use crate::address::{Address, ASSOCIATED_TOKEN_PROGRAM_ID};
use crate::error::SolError;

/// Maximum number of seeds (excluding the bump).
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single seed in bytes.
pub const MAX_SEED_LEN: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Find the canonical PDA for `seeds` under `program_id`.
///
/// Returns the address together with the bump that produced it. The bump
/// is the largest value in `0..=255` whose digest is off-curve.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<(Address, u8), SolError> {
    validate_seeds(seeds)?;

    for bump in (0u8..=255).rev() {
        match create_program_address(seeds, bump, program_id) {
            Ok(address) => return Ok((address, bump)),
            Err(SolError::OnCurve) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(SolError::DerivationExhausted)
}

/// Compute the PDA for one specific bump.
///
/// Fails with [`SolError::OnCurve`] when the digest is a valid curve point.
pub fn create_program_address(
    seeds: &[&[u8]],
    bump: u8,
    program_id: &Address,
) -> Result<Address, SolError> {
    validate_seeds(seeds)?;

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);

    let address = Address::new(hasher.finalize().into());
    if address.is_on_curve() {
        return Err(SolError::OnCurve);
    }

    Ok(address)
}

/// Derive the associated token account for `owner` holding `mint`.
///
/// Seeds are `[owner, token_program, mint]` under the associated token
/// account program, so the same owner has a different account per token
/// program (legacy SPL Token vs Token-2022).
pub fn derive_associated_token_address(
    owner: &Address,
    mint: &Address,
    token_program: &Address,
) -> Result<(Address, u8), SolError> {
    find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
}

fn validate_seeds(seeds: &[&[u8]]) -> Result<(), SolError> {
    if seeds.len() > MAX_SEEDS {
        return Err(SolError::InvalidSeeds(format!(
            "at most {MAX_SEEDS} seeds allowed, got {}",
            seeds.len()
        )));
    }
    if let Some((i, seed)) = seeds
        .iter()
        .enumerate()
        .find(|(_, s)| s.len() > MAX_SEED_LEN)
    {
        return Err(SolError::InvalidSeeds(format!(
            "seed {i} is {} bytes, max is {MAX_SEED_LEN}",
            seed.len()
        )));
    }
    Ok(())
}
