//! Withdrawals burn part of an account's balance back out of the confidential
//! pool. Same gating as a transfer, without an anonymity set.

use super::outcome::{Admission, OperationKind, OperationUpdate, PendingIntent, QueueReason, UpdateSender};
use super::{ClientError, LedgerClient, Stage, lock};
use crate::ledger::{BurnStatement, LedgerError, OperationId};
use crate::transaction::BURN_PROOF_WINDOW_MS;
use crate::wallet::{AccountState, Keypair};

use tracing::{debug, error, info};

impl LedgerClient {
    /// Withdraw `value` from a local account.
    pub async fn withdraw(&self, account: usize, value: u64) -> Result<PendingIntent, ClientError> {
        let (updates, receiver) = Self::intent_channel();
        let admission = self.attempt_withdraw(account, value, updates)?;
        Ok(PendingIntent::new(
            account,
            OperationKind::Withdraw,
            admission,
            receiver,
        ))
    }

    fn attempt_withdraw(
        &self,
        account: usize,
        value: u64,
        updates: UpdateSender,
    ) -> Result<Admission, ClientError> {
        let key = (account, OperationKind::Withdraw);
        lock(&self.inner.retries).cancel(key);

        let now = self.now();
        let (keypair, projected) = {
            let accounts = lock(&self.inner.accounts);
            let entry = accounts.get(account)?;
            (entry.keypair.clone(), entry.simulate(&self.inner.clock, now)?)
        };

        if value > projected.total() {
            return Err(ClientError::InsufficientBalance {
                requested: value,
                balance: projected.total(),
            });
        }

        let wait = self.time_left_in_epoch(now)?;
        let retry = move |client: &LedgerClient, updates| client.attempt_withdraw(account, value, updates);
        if value > projected.available {
            return Ok(self.queue(key, QueueReason::FundsPending, wait, updates, retry));
        }
        if projected.nonce_used {
            return Ok(self.queue(key, QueueReason::NonceUsed, wait, updates, retry));
        }

        let epoch_length = self.inner.clock.epoch_length()?;
        if BURN_PROOF_WINDOW_MS > epoch_length {
            return Err(ClientError::EpochTooShort {
                size: 1,
                epoch_length,
                minimum: BURN_PROOF_WINDOW_MS,
            });
        }
        if BURN_PROOF_WINDOW_MS > wait {
            return Ok(self.queue(key, QueueReason::ProofWindow, wait, updates, retry));
        }

        info!("Initiating withdrawal of {} from account {}", value, account);
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client
                .run_withdraw(account, value, keypair, projected, &updates)
                .await
            {
                error!("Withdrawal from account {} failed: {}", account, e);
                let _ = updates.send(OperationUpdate::Failed(e));
            }
        });
        Ok(Admission::Initiated)
    }

    async fn run_withdraw(
        &self,
        account: usize,
        value: u64,
        keypair: Keypair,
        projected: AccountState,
        updates: &UpdateSender,
    ) -> Result<OperationId, ClientError> {
        let epoch = self.inner.clock.epoch_index(self.now())?;
        let commitment = self
            .contract()
            .simulate_accounts(std::slice::from_ref(&keypair.public), epoch)
            .await
            .map_err(|e| ClientError::chain(Stage::FetchingChainState, e))?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::chain(Stage::FetchingChainState, LedgerError::NoData))?;

        debug!("Proving withdrawal from account {}", account);
        let statement = BurnStatement {
            commitment_left: commitment.left,
            commitment_right: commitment.right,
            public_key: keypair.public.clone(),
            value,
            last_roll_over: projected.last_roll_over,
            secret: keypair.secret.clone(),
            remaining_balance: projected.available - value,
        };
        let proof = self
            .prover()
            .prove_burn(statement)
            .await
            .map_err(|e| ClientError::chain(Stage::Proving, e))?;
        let epoch_tag = self
            .crypto()
            .epoch_tag(projected.last_roll_over)
            .await
            .map_err(|e| ClientError::chain(Stage::Proving, e))?;

        debug!("Submitting withdrawal from account {}", account);
        let operation_id = self
            .contract()
            .burn(&keypair.public, value, &epoch_tag, &proof)
            .await
            .map_err(|e| ClientError::chain(Stage::Submitting, e))?;

        let liveness = self.watch_liveness(
            OperationKind::Withdraw,
            account,
            &operation_id,
            self.inner.config.liveness_timeout,
            Some(updates.clone()),
        );
        self.await_confirmation(
            OperationKind::Withdraw,
            account,
            operation_id.clone(),
            liveness,
            updates.clone(),
            move |state| state.apply_spend(value),
        );
        info!(
            "Withdrawal {} of {} from account {} submitted",
            operation_id, value, account
        );
        let _ = updates.send(OperationUpdate::Submitted {
            operation_id: operation_id.clone(),
        });
        Ok(operation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{Harness, funded};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn burns_and_confirms() {
        let harness = Harness::start(10_000, 1_000).await;
        let account = harness.account_with(funded(100, 0));

        let mut intent = harness.client.withdraw(account, 40).await.unwrap();
        assert_eq!(intent.admission, Admission::Initiated);
        let operation_id = match intent.next_update().await {
            Some(OperationUpdate::Submitted { operation_id }) => operation_id,
            other => panic!("unexpected: {:?}", other),
        };
        assert_eq!(harness.ledger.calls(), vec!["simulate_accounts", "burn"]);
        let statement = harness.prover.last_burn().unwrap();
        assert_eq!(statement.remaining_balance, 60);
        assert_eq!(statement.value, 40);

        assert!(harness.client.dispatch_confirmation(&operation_id));
        match intent.next_update().await {
            Some(OperationUpdate::Confirmed { state, .. }) => {
                assert_eq!(state.available, 60);
                assert!(state.nonce_used);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_balance_is_rejected() {
        let harness = Harness::start(10_000, 1_000).await;
        let account = harness.account_with(funded(10, 5));
        let err = harness.client.withdraw(account, 20).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::InsufficientBalance {
                requested: 20,
                balance: 15
            }
        ));
        assert!(harness.ledger.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn epoch_shorter_than_the_burn_window_is_rejected() {
        let harness = Harness::start(1_500, 0).await;
        let account = harness.account_with(funded(100, 0));
        let err = harness.client.withdraw(account, 10).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::EpochTooShort {
                size: 1,
                epoch_length: 1_500,
                minimum: 2_000
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn late_in_the_epoch_queues_then_burns() {
        let harness = Harness::start(10_000, 8_200).await;
        let account = harness.account_with(funded(100, 0));

        let mut intent = harness.client.withdraw(account, 10).await.unwrap();
        assert_eq!(
            intent.admission,
            Admission::Queued {
                reason: QueueReason::ProofWindow,
                retry_in: Duration::from_millis(1_800),
            }
        );
        assert!(matches!(intent.next_update().await, Some(OperationUpdate::Initiated)));
        assert!(matches!(
            intent.next_update().await,
            Some(OperationUpdate::Submitted { .. })
        ));
        assert_eq!(harness.prover.last_burn().unwrap().last_roll_over, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_keeps_the_account() {
        let harness = Harness::start(10_000, 5_000).await;
        harness.account_with(funded(100, 0));
        let second = harness.account_with(funded(0, 30));

        let mut intent = harness.client.withdraw(second, 30).await.unwrap();
        assert!(matches!(
            intent.admission,
            Admission::Queued {
                reason: QueueReason::FundsPending,
                ..
            }
        ));
        assert!(matches!(intent.next_update().await, Some(OperationUpdate::Initiated)));
        assert!(matches!(
            intent.next_update().await,
            Some(OperationUpdate::Submitted { .. })
        ));
        let statement = harness.prover.last_burn().unwrap();
        assert_eq!(statement.public_key, harness.client.public_key(second).unwrap());
        assert_eq!(statement.remaining_balance, 0);
    }
}
