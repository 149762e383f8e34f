//! The client session.
//!
//! `LedgerClient` owns every piece of per-session state: the accounts, the friend
//! directory, the epoch clock, the pending-operation registry and the retry
//! timers. Scheduler calls validate synchronously, then hand the chain work to a
//! spawned task and report progress through the returned [`PendingIntent`].

mod error;
mod events;
mod fund;
mod outcome;
mod progress;
mod registry;
mod retry;
mod transfer;
mod withdraw;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ClientError, ErrorKind, Stage};
pub use events::{EventDispatcher, EventOutcome, LedgerEventHandler};
pub use outcome::{Admission, OperationKind, OperationUpdate, PendingIntent, QueueReason};
pub use progress::{FeedProgress, FeedStats};
pub use registry::{CompletionHandler, PendingOperationRegistry};
pub use transfer::TransferRequest;

use outcome::UpdateSender;
use retry::{RetryKey, RetrySlots};

use crate::epoch::{EpochClock, TimeSource};
use crate::ledger::{AccountCrypto, LedgerContract, OperationId, ProofService, PublicKey};
use crate::wallet::{AccountAddress, AccountBook, AccountState, FriendDirectory, Keypair};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Lock a session mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timing knobs of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a submitted operation may wait for its confirmation before a
    /// notice is logged.
    pub liveness_timeout: Duration,
    /// Upper bound of the brute-force search when decrypting inbound amounts.
    pub balance_search_limit: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: Duration::from_millis(5000),
            balance_search_limit: u64::from(u32::MAX),
        }
    }
}

/// External services the session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub contract: Arc<dyn LedgerContract>,
    pub prover: Arc<dyn ProofService>,
    pub crypto: Arc<dyn AccountCrypto>,
}

struct Session {
    collaborators: Collaborators,
    time: Arc<dyn TimeSource>,
    clock: Arc<EpochClock>,
    accounts: Arc<Mutex<AccountBook>>,
    friends: Mutex<FriendDirectory>,
    registry: Mutex<PendingOperationRegistry>,
    retries: Mutex<RetrySlots>,
    config: SessionConfig,
}

/// Handle to a client session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct LedgerClient {
    inner: Arc<Session>,
}

impl LedgerClient {
    /// Create a session whose epoch length is still unknown.
    ///
    /// Every scheduler call fails with [`ClientError::EpochLengthUnknown`] until
    /// [`LedgerClient::load_epoch_length`] has succeeded.
    pub fn new(
        collaborators: Collaborators,
        time: Arc<dyn TimeSource>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Session {
                collaborators,
                time,
                clock: Arc::new(EpochClock::unset()),
                accounts: Arc::new(Mutex::new(AccountBook::new())),
                friends: Mutex::new(FriendDirectory::new()),
                registry: Mutex::new(PendingOperationRegistry::new()),
                retries: Mutex::new(RetrySlots::default()),
                config,
            }),
        }
    }

    /// Create a session and read the epoch length from the contract.
    pub async fn connect(
        collaborators: Collaborators,
        time: Arc<dyn TimeSource>,
        config: SessionConfig,
    ) -> Result<Self, ClientError> {
        let client = Self::new(collaborators, time, config);
        client.load_epoch_length().await?;
        Ok(client)
    }

    /// Fetch the epoch length from the contract. Later calls are no-ops.
    pub async fn load_epoch_length(&self) -> Result<u64, ClientError> {
        if let Ok(epoch_length) = self.inner.clock.epoch_length() {
            return Ok(epoch_length);
        }
        let epoch_length = self
            .inner
            .collaborators
            .contract
            .epoch_length()
            .await
            .map_err(|e| ClientError::chain(Stage::FetchingChainState, e))?;
        self.inner.clock.set_epoch_length(epoch_length)?;
        info!("Epoch length is {} ms", epoch_length);
        Ok(epoch_length)
    }

    pub fn epoch_length(&self) -> Result<u64, ClientError> {
        self.inner.clock.epoch_length()
    }

    pub fn account_count(&self) -> usize {
        lock(&self.inner.accounts).len()
    }

    pub fn public_key(&self, account: usize) -> Result<PublicKey, ClientError> {
        Ok(lock(&self.inner.accounts).get(account)?.public_key().clone())
    }

    /// Bech32m address of an account, optionally tagged with a network.
    pub fn address(&self, account: usize, network: Option<&str>) -> Result<String, ClientError> {
        let public_key = self.public_key(account)?;
        let address = AccountAddress::new(public_key, network.map(str::to_string));
        Ok(address.encode()?)
    }

    /// Last confirmed state of an account.
    pub fn confirmed_state(&self, account: usize) -> Result<AccountState, ClientError> {
        Ok(*lock(&self.inner.accounts).get(account)?.state())
    }

    /// State of an account projected to the current time.
    pub fn simulate(&self, account: usize) -> Result<AccountState, ClientError> {
        let now = self.now();
        lock(&self.inner.accounts)
            .get(account)?
            .simulate(&self.inner.clock, now)
    }

    pub fn add_friend(&self, name: impl Into<String>, public_key: PublicKey) {
        lock(&self.inner.friends).add_friend(name, public_key);
    }

    /// Add a friend from a bech32m account address.
    pub fn add_friend_address(&self, name: impl Into<String>, address: &str) -> Result<(), ClientError> {
        lock(&self.inner.friends).add_friend_address(name, address)
    }

    pub fn remove_friend(&self, name: &str) -> Result<PublicKey, ClientError> {
        lock(&self.inner.friends).remove_friend(name)
    }

    pub fn friends(&self) -> Vec<(String, PublicKey)> {
        lock(&self.inner.friends)
            .friends()
            .map(|(name, key)| (name.to_string(), key.clone()))
            .collect()
    }

    /// Number of submitted operations still waiting for their confirmation.
    pub fn pending_operations(&self) -> usize {
        lock(&self.inner.registry).len()
    }

    /// Run the completion handler registered for `operation_id`, if any.
    pub fn dispatch_confirmation(&self, operation_id: &OperationId) -> bool {
        let matched = lock(&self.inner.registry).dispatch(operation_id);
        if matched {
            debug!("Dispatched confirmation for operation {}", operation_id);
        }
        matched
    }

    /// Drop a queued retry before it fires. Returns whether one was armed.
    pub fn cancel_queued(&self, account: usize, kind: OperationKind) -> bool {
        lock(&self.inner.retries).cancel((account, kind))
    }

    fn now(&self) -> u64 {
        self.inner.time.now_ms()
    }

    fn contract(&self) -> &dyn LedgerContract {
        self.inner.collaborators.contract.as_ref()
    }

    fn prover(&self) -> &dyn ProofService {
        self.inner.collaborators.prover.as_ref()
    }

    fn crypto(&self) -> &dyn AccountCrypto {
        self.inner.collaborators.crypto.as_ref()
    }

    /// Time left in the current epoch. At the very start of an epoch the whole
    /// epoch is left.
    fn time_left_in_epoch(&self, now: u64) -> Result<u64, ClientError> {
        let epoch_length = self.inner.clock.epoch_length()?;
        Ok(match self.inner.clock.time_to_next_boundary(now)? {
            0 => epoch_length,
            wait => wait,
        })
    }

    /// Arm a retry of `attempt` after `wait_ms`, replacing any retry queued for
    /// the same account and operation kind.
    fn queue<F>(
        &self,
        key: RetryKey,
        reason: QueueReason,
        wait_ms: u64,
        updates: UpdateSender,
        attempt: F,
    ) -> Admission
    where
        F: FnOnce(&LedgerClient, UpdateSender) -> Result<Admission, ClientError> + Send + 'static,
    {
        let retry_in = Duration::from_millis(wait_ms);
        info!(
            "{} for account {} queued ({}), retrying in {} ms",
            key.1, key.0, reason, wait_ms
        );

        let client = self.clone();
        let mut slots = lock(&self.inner.retries);
        let ticket = slots.reserve();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(retry_in).await;
            lock(&client.inner.retries).release(key, ticket);
            debug!("Retrying {} for account {}", key.1, key.0);
            let update = match attempt(&client, updates.clone()) {
                Ok(admission) => OperationUpdate::from(admission),
                Err(e) => {
                    warn!("{} for account {} rejected on retry: {}", key.1, key.0, e);
                    OperationUpdate::Rejected(e)
                }
            };
            let _ = updates.send(update);
        });
        slots.arm(key, ticket, timer.abort_handle());
        Admission::Queued { reason, retry_in }
    }

    /// Start the advisory timer that flags a slow confirmation.
    fn watch_liveness(
        &self,
        kind: OperationKind,
        account: usize,
        operation_id: &OperationId,
        bound: Duration,
        updates: Option<UpdateSender>,
    ) -> AbortHandle {
        let operation_id = operation_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(bound).await;
            warn!(
                "{} {} for account {} appears to be taking a while",
                kind, operation_id, account
            );
            if let Some(updates) = updates {
                let _ = updates.send(OperationUpdate::Lagging { operation_id });
            }
        })
        .abort_handle()
    }

    /// Install the completion handler for a submitted operation.
    ///
    /// The handler defuses the liveness timer, folds `effect` into the account's
    /// confirmed state and reports the result on `updates`.
    fn await_confirmation<E>(
        &self,
        kind: OperationKind,
        account: usize,
        operation_id: OperationId,
        liveness: AbortHandle,
        updates: UpdateSender,
        effect: E,
    ) where
        E: FnOnce(&mut AccountState) + Send + 'static,
    {
        let accounts = self.inner.accounts.clone();
        let clock = self.inner.clock.clone();
        let time = self.inner.time.clone();
        let id = operation_id.clone();
        let handler: CompletionHandler = Box::new(move || {
            liveness.abort();
            let now = time.now_ms();
            let confirmed = lock(&accounts)
                .get_mut(account)
                .and_then(|entry| entry.confirm(&clock, now, effect));
            let update = match confirmed {
                Ok(state) => {
                    info!(
                        "{} {} for account {} confirmed; balance is now {}",
                        kind,
                        id,
                        account,
                        state.total()
                    );
                    OperationUpdate::Confirmed {
                        operation_id: id,
                        state,
                    }
                }
                Err(e) => OperationUpdate::Failed(e),
            };
            let _ = updates.send(update);
        });
        lock(&self.inner.registry).register(operation_id, handler);
    }

    fn intent_channel() -> (UpdateSender, mpsc::UnboundedReceiver<OperationUpdate>) {
        mpsc::unbounded_channel()
    }

    fn register_keypair(&self, keypair: Keypair) -> usize {
        lock(&self.inner.accounts).add(keypair)
    }
}
