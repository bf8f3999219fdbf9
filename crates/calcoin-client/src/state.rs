//! Decoding of cal-coin program accounts.
//!
//! Every account starts with the 8-byte type discriminator the descriptor
//! lists for it, followed by the Borsh-encoded fields.

use borsh::BorshDeserialize;
use chain_sol::Address;

use crate::error::StateError;

const DISCRIMINATOR_LEN: usize = 8;

/// Minimum wait between claims, enforced on-chain.
pub const CLAIM_COOLDOWN_SECS: i64 = 60;

/// Mint rate in base units per elapsed second (1.25 tokens/min at 6 decimals).
pub const MICRO_TOKENS_PER_SECOND: u64 = 20_833;

/// Global program configuration, stored at the `dapp_config` address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DappConfig {
    pub gatekeeper_network: Address,
    pub token_mint: Address,
    pub mint_authority_bump: u8,
    /// Address exempt from gateway checks; all zeros until first set.
    pub exempt_address: Address,
}

#[derive(BorshDeserialize)]
struct DappConfigBody {
    gatekeeper_network: [u8; 32],
    token_mint: [u8; 32],
    mint_authority_bump: u8,
    exempt_address: [u8; 32],
}

impl DappConfig {
    pub const ACCOUNT_TYPE: &'static str = "DappConfig";
    pub const LEN: usize = DISCRIMINATOR_LEN + 32 + 32 + 1 + 32;

    pub fn decode(data: &[u8], discriminator: Option<&[u8; 8]>) -> Result<Self, StateError> {
        let body: DappConfigBody = decode_body(Self::ACCOUNT_TYPE, data, Self::LEN, discriminator)?;
        Ok(Self {
            gatekeeper_network: Address::new(body.gatekeeper_network),
            token_mint: Address::new(body.token_mint),
            mint_authority_bump: body.mint_authority_bump,
            exempt_address: Address::new(body.exempt_address),
        })
    }

    /// Whether any signer may still claim the exempt role.
    pub fn exempt_unset(&self) -> bool {
        self.exempt_address == Address::default()
    }

    pub fn is_exempt(&self, user: &Address) -> bool {
        !self.exempt_unset() && self.exempt_address == *user
    }
}

/// Per-user claim record, stored at the user's derived address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRecord {
    pub authority: Address,
    pub last_claimed_timestamp: i64,
}

#[derive(BorshDeserialize)]
struct UserRecordBody {
    authority: [u8; 32],
    last_claimed_timestamp: i64,
}

/// What a claim at a given time would yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimEstimate {
    /// Too early; `wait_secs` until the cooldown ends.
    CoolingDown { wait_secs: i64 },
    Claimable { elapsed_secs: i64, amount: u64 },
}

impl UserRecord {
    pub const ACCOUNT_TYPE: &'static str = "UserPda";
    pub const LEN: usize = DISCRIMINATOR_LEN + 32 + 8;

    pub fn decode(data: &[u8], discriminator: Option<&[u8; 8]>) -> Result<Self, StateError> {
        let body: UserRecordBody = decode_body(Self::ACCOUNT_TYPE, data, Self::LEN, discriminator)?;
        Ok(Self {
            authority: Address::new(body.authority),
            last_claimed_timestamp: body.last_claimed_timestamp,
        })
    }

    /// Mirror of the program's mint computation for a claim at `now`
    /// (unix seconds).
    pub fn estimate_claim(&self, now: i64) -> ClaimEstimate {
        let elapsed = now.saturating_sub(self.last_claimed_timestamp);
        if elapsed < CLAIM_COOLDOWN_SECS {
            return ClaimEstimate::CoolingDown {
                wait_secs: CLAIM_COOLDOWN_SECS.saturating_sub(elapsed),
            };
        }
        ClaimEstimate::Claimable {
            elapsed_secs: elapsed,
            amount: MICRO_TOKENS_PER_SECOND.saturating_mul(elapsed as u64),
        }
    }
}

/// Holds the mint authority's bump; the program signs mints with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshDeserialize)]
pub struct MintAuthority {
    pub bump: u8,
}

impl MintAuthority {
    pub const ACCOUNT_TYPE: &'static str = "MintAuthorityPda";
    pub const LEN: usize = DISCRIMINATOR_LEN + 1;

    pub fn decode(data: &[u8], discriminator: Option<&[u8; 8]>) -> Result<Self, StateError> {
        decode_body(Self::ACCOUNT_TYPE, data, Self::LEN, discriminator)
    }
}

/// Check length and discriminator, then Borsh-decode the fields after it.
fn decode_body<T: BorshDeserialize>(
    account: &'static str,
    data: &[u8],
    len: usize,
    discriminator: Option<&[u8; 8]>,
) -> Result<T, StateError> {
    if data.len() < len {
        return Err(StateError::TooShort {
            account,
            expected: len,
            got: data.len(),
        });
    }
    if let Some(expected) = discriminator {
        if &data[..DISCRIMINATOR_LEN] != expected {
            return Err(StateError::DiscriminatorMismatch { account });
        }
    }
    // Accounts may be allocated larger than their fields, so trailing bytes
    // are left unread.
    let mut body = &data[DISCRIMINATOR_LEN..];
    T::deserialize(&mut body).map_err(|e| StateError::Malformed {
        account,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_DISC: [u8; 8] = [213, 69, 23, 209, 116, 1, 204, 100];
    const USER_DISC: [u8; 8] = [182, 179, 144, 178, 135, 99, 143, 249];

    fn config_bytes(exempt: [u8; 32]) -> Vec<u8> {
        let mut data = CONFIG_DISC.to_vec();
        data.extend_from_slice(&[1u8; 32]);
        data.extend_from_slice(&[2u8; 32]);
        data.push(253);
        data.extend_from_slice(&exempt);
        data
    }

    #[test]
    fn decodes_dapp_config() {
        let config = DappConfig::decode(&config_bytes([3u8; 32]), Some(&CONFIG_DISC)).unwrap();
        assert_eq!(config.gatekeeper_network, Address::new([1; 32]));
        assert_eq!(config.token_mint, Address::new([2; 32]));
        assert_eq!(config.mint_authority_bump, 253);
        assert!(config.is_exempt(&Address::new([3; 32])));
        assert!(!config.exempt_unset());
    }

    #[test]
    fn zero_exempt_address_is_unset() {
        let config = DappConfig::decode(&config_bytes([0u8; 32]), None).unwrap();
        assert!(config.exempt_unset());
        assert!(!config.is_exempt(&Address::default()));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut data = config_bytes([3u8; 32]);
        data.extend_from_slice(&[0xFF; 16]);
        assert!(DappConfig::decode(&data, Some(&CONFIG_DISC)).is_ok());
    }

    #[test]
    fn short_data_is_rejected() {
        let data = config_bytes([3u8; 32]);
        let err = DappConfig::decode(&data[..100], Some(&CONFIG_DISC)).unwrap_err();
        assert_eq!(
            err,
            StateError::TooShort {
                account: "DappConfig",
                expected: 105,
                got: 100
            }
        );
    }

    #[test]
    fn wrong_discriminator_is_rejected() {
        let data = config_bytes([3u8; 32]);
        let err = UserRecord::decode(&data, Some(&USER_DISC)).unwrap_err();
        assert_eq!(err, StateError::DiscriminatorMismatch { account: "UserPda" });
    }

    #[test]
    fn claim_estimate_follows_cooldown_and_rate() {
        let mut data = USER_DISC.to_vec();
        data.extend_from_slice(&[5u8; 32]);
        data.extend_from_slice(&1_000i64.to_le_bytes());
        let record = UserRecord::decode(&data, Some(&USER_DISC)).unwrap();
        assert_eq!(record.authority, Address::new([5; 32]));

        assert_eq!(
            record.estimate_claim(1_045),
            ClaimEstimate::CoolingDown { wait_secs: 15 }
        );
        assert_eq!(
            record.estimate_claim(1_060),
            ClaimEstimate::Claimable {
                elapsed_secs: 60,
                amount: 1_249_980
            }
        );
    }

    #[test]
    fn fresh_record_can_claim_everything_since_epoch() {
        let record = UserRecord {
            authority: Address::new([5; 32]),
            last_claimed_timestamp: 0,
        };
        assert!(matches!(
            record.estimate_claim(1_700_000_000),
            ClaimEstimate::Claimable { .. }
        ));
    }

    #[test]
    fn far_future_timestamp_does_not_overflow() {
        let record = UserRecord {
            authority: Address::new([5; 32]),
            last_claimed_timestamp: i64::MAX,
        };
        assert_eq!(
            record.estimate_claim(-10),
            ClaimEstimate::CoolingDown { wait_secs: i64::MAX }
        );
    }

    #[test]
    fn decodes_mint_authority() {
        let mut data = vec![0u8; 8];
        data.push(251);
        assert_eq!(MintAuthority::decode(&data, None).unwrap().bump, 251);
    }
}
