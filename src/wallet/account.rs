use crate::client::ClientError;
use crate::epoch::EpochClock;
use crate::ledger::{PublicKey, SecretKey};

use serde::{Deserialize, Serialize};

/// Account keypair. Generated by the account cryptography, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypair {
    #[serde(rename = "x")]
    pub secret: SecretKey,
    #[serde(rename = "y")]
    pub public: PublicKey,
}

/// Balance state of one account as of some epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub available: u64,
    pub pending: u64,
    pub nonce_used: bool,
    pub last_roll_over: u64,
}

impl AccountState {
    /// Roll this state forward to `epoch` without touching `self`.
    ///
    /// All pending funds merge into `available` the first time a later epoch is
    /// observed, however many epochs have elapsed.
    pub fn projected_to(&self, epoch: u64) -> AccountState {
        let mut projected = *self;
        if self.last_roll_over < epoch {
            projected.available = self.available.saturating_add(self.pending);
            projected.pending = 0;
            projected.nonce_used = false;
        }
        projected.last_roll_over = epoch;
        projected
    }

    /// Spendable plus still-locked funds.
    pub fn total(&self) -> u64 {
        self.available.saturating_add(self.pending)
    }

    /// Fold a confirmed value-moving operation into this state.
    ///
    /// The debit comes out of `pending` first and the remainder out of
    /// `available`, so both stay non-negative while the total drops by `value`.
    pub fn apply_spend(&mut self, value: u64) {
        let from_pending = value.min(self.pending);
        self.pending -= from_pending;
        self.available = self.available.saturating_sub(value - from_pending);
        self.nonce_used = true;
    }

    /// Fold a confirmed deposit or inbound transfer into this state.
    pub fn apply_credit(&mut self, value: u64) {
        self.pending = self.pending.saturating_add(value);
    }
}

/// A locally held account: its keypair and its last confirmed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub keypair: Keypair,
    state: AccountState,
}

impl Account {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            state: AccountState::default(),
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public
    }

    /// Last confirmed state.
    pub fn state(&self) -> &AccountState {
        &self.state
    }

    /// Projected state at `now_ms`. Pure: the stored state is left untouched.
    pub fn simulate(&self, clock: &EpochClock, now_ms: u64) -> Result<AccountState, ClientError> {
        Ok(self.state.projected_to(clock.epoch_index(now_ms)?))
    }

    /// Re-simulate at `now_ms`, let `effect` modify the projection, and store it
    /// as the new confirmed state. Only confirmation handlers call this.
    pub fn confirm(
        &mut self,
        clock: &EpochClock,
        now_ms: u64,
        effect: impl FnOnce(&mut AccountState),
    ) -> Result<AccountState, ClientError> {
        // a late confirmation for an older block never moves the roll-over back
        let epoch = clock.epoch_index(now_ms)?.max(self.state.last_roll_over);
        let mut next = self.state.projected_to(epoch);
        effect(&mut next);
        self.state = next;
        Ok(next)
    }
}
