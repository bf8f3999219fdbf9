//! The cal-coin program client.
//!
//! Composes a wallet session, the program interface and a submission engine
//! into the three user-facing operations: `set_exempt`, `register_user` and
//! `claim`.

use chain_sol::{
    derive_associated_token_address, find_program_address, AccountMeta, Address, Signature,
    ASSOCIATED_TOKEN_PROGRAM_ID, RENT_SYSVAR_ID, SYSTEM_PROGRAM_ID, TOKEN_2022_PROGRAM_ID,
};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{ClientError, SubmitError, WalletError};
use crate::interface::{ArgValue, ProgramInterface};
use crate::network::{Durability, Network};
use crate::state::{DappConfig, UserRecord};
use crate::submit::{Outcome, SubmissionEngine, TransactionPlan};
use crate::wallet::{SessionState, WalletCapability, WalletSession};

pub const DAPP_CONFIG_SEED: &[u8] = b"dapp_config";
pub const MINT_AUTHORITY_SEED: &[u8] = b"mint_authority";
pub const USER_SEED: &[u8] = b"user";

pub const SET_EXEMPT: &str = "set_exempt";
pub const REGISTER_USER: &str = "register_user";
pub const CLAIM: &str = "claim";

pub struct ProgramClient<W, N> {
    config: ClientConfig,
    interface: ProgramInterface,
    session: WalletSession<W>,
    engine: SubmissionEngine<N>,
}

impl<W: WalletCapability, N: Network> ProgramClient<W, N> {
    /// Build a client from its configuration, the program's interface
    /// descriptor, a wallet capability and a network endpoint.
    pub fn new(
        config: ClientConfig,
        descriptor: &[u8],
        wallet: W,
        network: N,
    ) -> Result<Self, ClientError> {
        config.submit.validate()?;

        let interface = ProgramInterface::load(descriptor)?;
        if let Some(configured) = config.program_id {
            if configured != interface.program_id() {
                return Err(ClientError::ProgramMismatch {
                    configured,
                    descriptor: interface.program_id(),
                });
            }
        }
        debug!(program = %interface.program_id(), "program interface loaded");

        let engine = SubmissionEngine::new(network, config.submit.clone());
        Ok(Self {
            config,
            interface,
            session: WalletSession::new(wallet),
            engine,
        })
    }

    pub fn program_id(&self) -> Address {
        self.interface.program_id()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    pub fn session(&self) -> &WalletSession<W> {
        &self.session
    }

    pub fn engine(&self) -> &SubmissionEngine<N> {
        &self.engine
    }

    // -- Addresses -----------------------------------------------------------

    pub fn dapp_config_address(&self) -> Result<Address, ClientError> {
        Ok(find_program_address(&[DAPP_CONFIG_SEED], &self.program_id())?.0)
    }

    pub fn mint_authority_address(&self) -> Result<Address, ClientError> {
        Ok(find_program_address(&[MINT_AUTHORITY_SEED], &self.program_id())?.0)
    }

    /// The per-user record address, `["user", user]`.
    pub fn user_address(&self, user: &Address) -> Result<Address, ClientError> {
        Ok(find_program_address(&[USER_SEED, user.as_ref()], &self.program_id())?.0)
    }

    /// The user's Token-2022 associated token account for `mint`.
    pub fn user_token_account(&self, user: &Address, mint: &Address) -> Result<Address, ClientError> {
        Ok(derive_associated_token_address(user, mint, &TOKEN_2022_PROGRAM_ID)?.0)
    }

    fn gateway_token(&self, user: Address) -> Address {
        self.config.gateway_token.unwrap_or(user)
    }

    // -- Session -------------------------------------------------------------

    pub async fn connect(&self) -> Result<Address, ClientError> {
        Ok(self.session.connect().await?)
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        Ok(self.session.disconnect().await?)
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    fn identity(&self) -> Result<Address, ClientError> {
        Ok(self.session.identity().ok_or(WalletError::NotConnected)?)
    }

    // -- Operations ----------------------------------------------------------

    /// Hand the exempt role to `new_exempt`. The connected user must hold it
    /// (or nobody does yet).
    pub async fn set_exempt(&self, new_exempt: Address) -> Result<Outcome, ClientError> {
        let user = self.identity()?;
        let accounts = vec![
            AccountMeta::writable(self.dapp_config_address()?),
            AccountMeta::writable_signer(user),
        ];
        self.submit(SET_EXEMPT, &[ArgValue::Pubkey(new_exempt)], &accounts)
            .await
    }

    /// Create the connected user's claim record.
    pub async fn register_user(&self) -> Result<Outcome, ClientError> {
        let user = self.identity()?;
        let accounts = vec![
            AccountMeta::readonly(self.dapp_config_address()?),
            AccountMeta::writable_signer(user),
            AccountMeta::readonly(self.gateway_token(user)),
            AccountMeta::writable(self.user_address(&user)?),
            AccountMeta::readonly(SYSTEM_PROGRAM_ID),
            AccountMeta::readonly(RENT_SYSVAR_ID),
        ];
        self.submit(REGISTER_USER, &[], &accounts).await
    }

    /// Mint the tokens accrued since the last claim to the user's token
    /// account, creating it if needed.
    pub async fn claim_tokens(&self) -> Result<Outcome, ClientError> {
        let user = self.identity()?;
        let config = self.fetch_dapp_config().await?;
        let accounts = self.claim_accounts(&user, &config.token_mint)?;
        self.submit(CLAIM, &[], &accounts).await
    }

    /// Account layout of a claim by `user` against `mint`.
    pub fn claim_accounts(&self, user: &Address, mint: &Address) -> Result<Vec<AccountMeta>, ClientError> {
        Ok(vec![
            AccountMeta::readonly(self.dapp_config_address()?),
            AccountMeta::writable_signer(*user),
            AccountMeta::readonly(self.gateway_token(*user)),
            AccountMeta::writable(self.user_address(user)?),
            AccountMeta::writable(*mint),
            AccountMeta::readonly(self.mint_authority_address()?),
            AccountMeta::writable(self.user_token_account(user, mint)?),
            AccountMeta::readonly(TOKEN_2022_PROGRAM_ID),
            AccountMeta::readonly(ASSOCIATED_TOKEN_PROGRAM_ID),
            AccountMeta::readonly(SYSTEM_PROGRAM_ID),
            AccountMeta::readonly(RENT_SYSVAR_ID),
        ])
    }

    /// Encode and submit one operation as the connected user.
    ///
    /// Encoding is checked against the descriptor before anything reaches
    /// the wallet or the network.
    pub async fn submit(
        &self,
        operation: &str,
        args: &[ArgValue],
        accounts: &[AccountMeta],
    ) -> Result<Outcome, ClientError> {
        let user = self.identity()?;
        let instruction = self.interface.encode(operation, args, accounts)?;
        let plan = TransactionPlan {
            instructions: vec![instruction],
            fee_payer: user,
        };

        let outcome = self
            .engine
            .submit(operation, &plan, &self.session, self.config.durability)
            .await
            .map_err(|e| match e {
                SubmitError::Rejected { reason } => SubmitError::Rejected {
                    reason: self.interface.explain_rejection(&reason),
                },
                other => other,
            })?;

        info!(operation, signature = %outcome.signature, "operation complete");
        Ok(outcome)
    }

    /// Keep waiting on a signature whose submission timed out.
    pub async fn confirm(&self, signature: &Signature) -> Result<Durability, ClientError> {
        Ok(self
            .engine
            .confirm(signature, self.config.durability)
            .await?)
    }

    // -- State ---------------------------------------------------------------

    pub async fn fetch_dapp_config(&self) -> Result<DappConfig, ClientError> {
        let address = self.dapp_config_address()?;
        let data = self
            .engine
            .network()
            .account_data(&address)
            .await?
            .ok_or(ClientError::AccountNotFound(address))?;
        Ok(DappConfig::decode(
            &data,
            self.interface.account_discriminator(DappConfig::ACCOUNT_TYPE),
        )?)
    }

    /// The claim record of `user`, `None` if they have not registered.
    pub async fn fetch_user_record(&self, user: &Address) -> Result<Option<UserRecord>, ClientError> {
        let address = self.user_address(user)?;
        let Some(data) = self.engine.network().account_data(&address).await? else {
            return Ok(None);
        };
        Ok(Some(UserRecord::decode(
            &data,
            self.interface.account_discriminator(UserRecord::ACCOUNT_TYPE),
        )?))
    }
}
