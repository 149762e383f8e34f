//! Confidential transfers.
//!
//! Validation runs synchronously and either rejects, queues the intent until the
//! next epoch, or starts the chain pipeline: fetch the participants' commitments,
//! prove, submit, and wait for the confirmation.

use super::outcome::{Admission, OperationKind, OperationUpdate, PendingIntent, QueueReason, UpdateSender};
use super::{ClientError, LedgerClient, Stage, lock};
use crate::ledger::{OperationId, TransferStatement};
use crate::transaction::{AnonymitySet, AnonymitySetBuilder, ProofTimingEstimator, validate_set_size};
use crate::wallet::{AccountState, Keypair};

use std::time::Duration;
use tracing::{debug, error, info};

/// A transfer as requested by the caller. Retries re-validate the whole request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub account: usize,
    pub recipient: String,
    pub value: u64,
    pub decoys: Vec<String>,
}

impl TransferRequest {
    pub fn new(account: usize, recipient: impl Into<String>, value: u64) -> Self {
        Self {
            account,
            recipient: recipient.into(),
            value,
            decoys: Vec::new(),
        }
    }

    pub fn with_decoys<I, S>(mut self, decoys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoys = decoys.into_iter().map(Into::into).collect();
        self
    }

    /// Sender, recipient and decoys.
    pub fn set_size(&self) -> usize {
        2 + self.decoys.len()
    }
}

/// Everything the pipeline needs once validation has passed.
struct TransferPlan {
    request: TransferRequest,
    keypair: Keypair,
    projected: AccountState,
    set: AnonymitySet,
    estimated_ms: u64,
}

impl LedgerClient {
    /// Send `request.value` from a local account to a friend, hidden among decoys.
    ///
    /// Validation errors are returned immediately. Anything that happens after
    /// admission, including queued retries, is reported on the intent.
    pub async fn transfer(&self, request: TransferRequest) -> Result<PendingIntent, ClientError> {
        let account = request.account;
        let (updates, receiver) = Self::intent_channel();
        let admission = self.attempt_transfer(request, updates)?;
        Ok(PendingIntent::new(
            account,
            OperationKind::Transfer,
            admission,
            receiver,
        ))
    }

    fn attempt_transfer(
        &self,
        request: TransferRequest,
        updates: UpdateSender,
    ) -> Result<Admission, ClientError> {
        let key = (request.account, OperationKind::Transfer);
        lock(&self.inner.retries).cancel(key);

        let now = self.now();
        let (keypair, projected) = {
            let accounts = lock(&self.inner.accounts);
            let account = accounts.get(request.account)?;
            (account.keypair.clone(), account.simulate(&self.inner.clock, now)?)
        };

        if request.value > projected.total() {
            return Err(ClientError::InsufficientBalance {
                requested: request.value,
                balance: projected.total(),
            });
        }

        // the set size is checked before any queueing
        let size = request.set_size();
        validate_set_size(size)?;

        let wait = self.time_left_in_epoch(now)?;
        if request.value > projected.available {
            return Ok(self.queue(key, QueueReason::FundsPending, wait, updates, move |client, updates| {
                client.attempt_transfer(request, updates)
            }));
        }
        if projected.nonce_used {
            return Ok(self.queue(key, QueueReason::NonceUsed, wait, updates, move |client, updates| {
                client.attempt_transfer(request, updates)
            }));
        }

        let epoch_length = self.inner.clock.epoch_length()?;
        let estimated_ms = ProofTimingEstimator::estimate(size, false);
        if estimated_ms > epoch_length {
            return Err(ClientError::EpochTooShort {
                size,
                epoch_length,
                minimum: ProofTimingEstimator::estimate(size, true),
            });
        }
        if estimated_ms > wait {
            return Ok(self.queue(key, QueueReason::ProofWindow, wait, updates, move |client, updates| {
                client.attempt_transfer(request, updates)
            }));
        }

        let set = {
            let friends = lock(&self.inner.friends);
            AnonymitySetBuilder::new(&friends).build(
                &keypair.public,
                &request.recipient,
                &request.decoys,
                &mut rand::rng(),
            )?
        };

        info!(
            "Initiating transfer of {} from account {} to {}",
            request.value, request.account, request.recipient
        );
        let plan = TransferPlan {
            request,
            keypair,
            projected,
            set,
            estimated_ms,
        };
        let client = self.clone();
        tokio::spawn(async move {
            let account = plan.request.account;
            if let Err(e) = client.run_transfer(plan, &updates).await {
                error!("Transfer from account {} failed: {}", account, e);
                let _ = updates.send(OperationUpdate::Failed(e));
            }
        });
        Ok(Admission::Initiated)
    }

    async fn run_transfer(&self, plan: TransferPlan, updates: &UpdateSender) -> Result<OperationId, ClientError> {
        let TransferPlan {
            request,
            keypair,
            projected,
            set,
            estimated_ms,
        } = plan;

        let epoch = self.inner.clock.epoch_index(self.now())?;
        debug!(
            "Fetching commitments of {} participants at epoch {}",
            set.size(),
            epoch
        );
        let commitments = self
            .contract()
            .simulate_accounts(&set.participants, epoch)
            .await
            .map_err(|e| ClientError::chain(Stage::FetchingChainState, e))?;
        let (commitments_left, commitments_right) = commitments
            .into_iter()
            .map(|commitment| (commitment.left, commitment.right))
            .unzip();

        debug!("Proving transfer from account {}", request.account);
        let statement = TransferStatement {
            commitments_left,
            commitments_right,
            participants: set.participants.clone(),
            last_roll_over: projected.last_roll_over,
            secret: keypair.secret.clone(),
            value: request.value,
            remaining_balance: projected.available - request.value,
            index: (set.self_index, set.recipient_index),
        };
        let proof = self
            .prover()
            .prove_transfer(statement)
            .await
            .map_err(|e| ClientError::chain(Stage::Proving, e))?;
        let epoch_tag = self
            .crypto()
            .epoch_tag(projected.last_roll_over)
            .await
            .map_err(|e| ClientError::chain(Stage::Proving, e))?;

        debug!("Submitting transfer from account {}", request.account);
        let operation_id = self
            .contract()
            .transfer(
                &proof.left,
                &proof.right,
                &set.participants,
                &epoch_tag,
                &proof.proof,
            )
            .await
            .map_err(|e| ClientError::chain(Stage::Submitting, e))?;

        let bound = self.inner.config.liveness_timeout + Duration::from_millis(estimated_ms / 4);
        let liveness = self.watch_liveness(
            OperationKind::Transfer,
            request.account,
            &operation_id,
            bound,
            Some(updates.clone()),
        );
        let value = request.value;
        self.await_confirmation(
            OperationKind::Transfer,
            request.account,
            operation_id.clone(),
            liveness,
            updates.clone(),
            move |state| state.apply_spend(value),
        );
        info!(
            "Transfer {} of {} from account {} submitted",
            operation_id, value, request.account
        );
        let _ = updates.send(OperationUpdate::Submitted {
            operation_id: operation_id.clone(),
        });
        Ok(operation_id)
    }
}
