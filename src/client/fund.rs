//! Account registration and deposits. Neither is gated by epochs or nonces.

use super::outcome::{Admission, OperationKind, OperationUpdate, PendingIntent, UpdateSender};
use super::{ClientError, CompletionHandler, LedgerClient, Stage, lock};
use crate::ledger::{OperationId, PublicKey};
use crate::wallet::Keypair;

use tracing::{error, info};

impl LedgerClient {
    /// Generate a keypair and register it as a new account.
    pub async fn new_account(&self) -> Result<PendingIntent, ClientError> {
        let keypair = self
            .crypto()
            .generate_keypair()
            .await
            .map_err(|e| ClientError::chain(Stage::FetchingChainState, e))?;
        self.add_account(keypair).await
    }

    /// Add an account with zeroed state and register its key with the contract.
    ///
    /// The account is usable locally right away; `PendingIntent::account` is
    /// its index.
    pub async fn add_account(&self, keypair: Keypair) -> Result<PendingIntent, ClientError> {
        let public_key = keypair.public.clone();
        let account = self.register_keypair(keypair);
        info!("Registering account {}", account);

        let (updates, receiver) = Self::intent_channel();
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.run_register(account, &public_key, &updates).await {
                error!("Registration of account {} failed: {}", account, e);
                let _ = updates.send(OperationUpdate::Failed(e));
            }
        });
        Ok(PendingIntent::new(
            account,
            OperationKind::Register,
            Admission::Initiated,
            receiver,
        ))
    }

    async fn run_register(
        &self,
        account: usize,
        public_key: &PublicKey,
        updates: &UpdateSender,
    ) -> Result<OperationId, ClientError> {
        let operation_id = self
            .contract()
            .register(public_key)
            .await
            .map_err(|e| ClientError::chain(Stage::Submitting, e))?;

        let liveness = self.watch_liveness(
            OperationKind::Register,
            account,
            &operation_id,
            self.inner.config.liveness_timeout,
            Some(updates.clone()),
        );
        let accounts = self.inner.accounts.clone();
        let confirmed = updates.clone();
        let id = operation_id.clone();
        let handler: CompletionHandler = Box::new(move || {
            liveness.abort();
            info!("Registration of account {} successful.", account);
            let state = lock(&accounts).get(account).map(|entry| *entry.state());
            let update = match state {
                Ok(state) => OperationUpdate::Confirmed {
                    operation_id: id,
                    state,
                },
                Err(e) => OperationUpdate::Failed(e),
            };
            let _ = confirmed.send(update);
        });
        lock(&self.inner.registry).register(operation_id.clone(), handler);

        let _ = updates.send(OperationUpdate::Submitted {
            operation_id: operation_id.clone(),
        });
        Ok(operation_id)
    }

    /// Move `value` into a local account. The funds stay pending until the next
    /// epoch after confirmation.
    pub async fn deposit(&self, account: usize, value: u64) -> Result<PendingIntent, ClientError> {
        let public_key = self.public_key(account)?;
        info!("Initiating deposit of {} into account {}", value, account);

        let (updates, receiver) = Self::intent_channel();
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.run_deposit(account, value, &public_key, &updates).await {
                error!("Deposit into account {} failed: {}", account, e);
                let _ = updates.send(OperationUpdate::Failed(e));
            }
        });
        Ok(PendingIntent::new(
            account,
            OperationKind::Deposit,
            Admission::Initiated,
            receiver,
        ))
    }

    async fn run_deposit(
        &self,
        account: usize,
        value: u64,
        public_key: &PublicKey,
        updates: &UpdateSender,
    ) -> Result<OperationId, ClientError> {
        let operation_id = self
            .contract()
            .fund(public_key, value)
            .await
            .map_err(|e| ClientError::chain(Stage::Submitting, e))?;

        let liveness = self.watch_liveness(
            OperationKind::Deposit,
            account,
            &operation_id,
            self.inner.config.liveness_timeout,
            Some(updates.clone()),
        );
        self.await_confirmation(
            OperationKind::Deposit,
            account,
            operation_id.clone(),
            liveness,
            updates.clone(),
            move |state| state.apply_credit(value),
        );
        let _ = updates.send(OperationUpdate::Submitted {
            operation_id: operation_id.clone(),
        });
        Ok(operation_id)
    }
}
