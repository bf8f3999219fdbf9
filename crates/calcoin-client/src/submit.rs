//! Submission engine: build, sign, send and confirm with checkpoint retry.
//!
//! Each attempt references a freshly fetched checkpoint. When the network
//! reports that checkpoint as expired (either on send, or because the block
//! height passed it while we were polling) the whole transaction is rebuilt
//! and re-signed against a new one, up to `max_attempts` sends. Rejections,
//! wallet failures and transport errors end the submission immediately.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use chain_sol::{build_transaction, Address, Checkpoint, Instruction, Signature};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::SubmitPolicy;
use crate::error::{NetworkError, SubmitError, WalletError};
use crate::network::{Durability, Network};
use crate::wallet::TransactionSigner;

/// What to submit: the instructions, in order, and who pays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    pub instructions: Vec<Instruction>,
    pub fee_payer: Address,
}

/// A transaction that reached the requested durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub signature: Signature,
    pub level: Durability,
    /// Sends it took, including the one that landed.
    pub attempts: u32,
}

enum Landing {
    Reached(Durability),
    Expired,
}

pub struct SubmissionEngine<N> {
    network: N,
    policy: SubmitPolicy,
    pending: Mutex<HashSet<String>>,
}

impl<N: Network> SubmissionEngine<N> {
    pub fn new(network: N, policy: SubmitPolicy) -> Self {
        Self {
            network,
            policy,
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn policy(&self) -> &SubmitPolicy {
        &self.policy
    }

    /// Whether a submission for `operation` is in flight.
    pub fn is_pending(&self, operation: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(operation)
    }

    /// Submit `plan` and wait until it reaches `durability`.
    ///
    /// At most one submission per `operation` runs at a time; a second call
    /// fails with [`SubmitError::AlreadyPending`] before touching the network.
    pub async fn submit(
        &self,
        operation: &str,
        plan: &TransactionPlan,
        signer: &dyn TransactionSigner,
        durability: Durability,
    ) -> Result<Outcome, SubmitError> {
        let _guard = PendingGuard::acquire(&self.pending, operation)?;

        for attempt in 1..=self.policy.max_attempts {
            let checkpoint = self.network.latest_checkpoint().await?;
            let tx = build_transaction(&plan.instructions, &plan.fee_payer, &checkpoint)?;

            debug!(operation, attempt, "requesting signature");
            let signed = signer.sign_transaction(tx).await?;
            if !signed.is_fully_signed() {
                return Err(WalletError::InvalidSignature(
                    "transaction is missing required signatures".into(),
                )
                .into());
            }

            let signature = match self.network.send_transaction(&signed).await {
                Ok(signature) => signature,
                Err(NetworkError::CheckpointExpired) => {
                    warn!(operation, attempt, "checkpoint expired on send, rebuilding");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            debug!(operation, attempt, %signature, "transaction sent");

            match self.await_landing(&signature, durability, Some(&checkpoint)).await? {
                Landing::Reached(level) => {
                    info!(
                        operation,
                        attempts = attempt,
                        %signature,
                        durability = level.as_str(),
                        "transaction confirmed"
                    );
                    return Ok(Outcome {
                        signature,
                        level,
                        attempts: attempt,
                    });
                }
                Landing::Expired => {
                    warn!(operation, attempt, %signature, "checkpoint expired before inclusion, rebuilding");
                }
            }
        }

        Err(SubmitError::Expired {
            attempts: self.policy.max_attempts,
        })
    }

    /// Poll a previously sent signature, e.g. after a [`SubmitError::Timeout`]
    /// or [`SubmitError::Unconfirmed`].
    pub async fn confirm(
        &self,
        signature: &Signature,
        durability: Durability,
    ) -> Result<Durability, SubmitError> {
        match self.await_landing(signature, durability, None).await? {
            Landing::Reached(level) => Ok(level),
            Landing::Expired => Err(SubmitError::Expired { attempts: 1 }),
        }
    }

    async fn await_landing(
        &self,
        signature: &Signature,
        durability: Durability,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<Landing, SubmitError> {
        let deadline = Instant::now() + self.policy.confirm_timeout();

        let unconfirmed = |e: NetworkError| {
            warn!(%signature, error = %e, "status check failed");
            SubmitError::Unconfirmed {
                signature: *signature,
                reason: e.to_string(),
            }
        };

        loop {
            match self
                .network
                .signature_status(signature)
                .await
                .map_err(unconfirmed)?
            {
                Some(status) => {
                    if let Some(reason) = status.err {
                        return Err(SubmitError::Rejected { reason });
                    }
                    if status.level >= durability {
                        return Ok(Landing::Reached(status.level));
                    }
                }
                None => {
                    if let Some(checkpoint) = checkpoint {
                        let height = self.network.block_height().await.map_err(unconfirmed)?;
                        if height > checkpoint.last_valid_block_height {
                            return Ok(Landing::Expired);
                        }
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(SubmitError::Timeout {
                    signature: *signature,
                });
            }
            sleep(self.policy.poll_interval()).await;
        }
    }
}

/// Marks an operation as pending for as long as it lives.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashSet<String>>,
    operation: String,
}

impl<'a> PendingGuard<'a> {
    fn acquire(pending: &'a Mutex<HashSet<String>>, operation: &str) -> Result<Self, SubmitError> {
        let mut set = pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(operation.to_string()) {
            return Err(SubmitError::AlreadyPending {
                operation: operation.to_string(),
            });
        }
        Ok(Self {
            pending,
            operation: operation.to_string(),
        })
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.operation);
    }
}
