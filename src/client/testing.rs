//! In-memory collaborators for the client tests.

use super::{Collaborators, LedgerClient, SessionConfig, lock};
use crate::epoch::TimeSource;
use crate::ledger::*;
use crate::wallet::{AccountState, Keypair};

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Paused tokio time offset to a wall-clock origin.
pub(crate) struct PausedTime {
    origin_ms: u64,
    start: tokio::time::Instant,
}

impl PausedTime {
    pub(crate) fn new(origin_ms: u64) -> Self {
        Self {
            origin_ms,
            start: tokio::time::Instant::now(),
        }
    }
}

impl TimeSource for PausedTime {
    fn now_ms(&self) -> u64 {
        self.origin_ms + self.start.elapsed().as_millis() as u64
    }
}

fn failure(method: &str) -> LedgerError {
    LedgerError::RpcError(format!("{} unavailable", method))
}

/// Contract fake recording every call by method name.
#[derive(Default)]
pub(crate) struct FakeLedger {
    epoch_length: u64,
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<Option<&'static str>>,
    next_id: AtomicU64,
    ciphertexts: Mutex<HashMap<OperationId, TransferCiphertexts>>,
    block_timestamps: Mutex<HashMap<u64, u64>>,
}

impl FakeLedger {
    pub(crate) fn new(epoch_length: u64) -> Self {
        Self {
            epoch_length,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|call| **call == method).count()
    }

    pub(crate) fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make every later call to `method` fail.
    pub(crate) fn fail_on(&self, method: &'static str) {
        *lock(&self.failing) = Some(method);
    }

    pub(crate) fn set_ciphertexts(&self, operation_id: &str, ciphertexts: TransferCiphertexts) {
        lock(&self.ciphertexts).insert(OperationId::from(operation_id), ciphertexts);
    }

    pub(crate) fn set_block_timestamp(&self, block: u64, timestamp_ms: u64) {
        lock(&self.block_timestamps).insert(block, timestamp_ms);
    }

    fn call(&self, method: &'static str) -> Result<(), LedgerError> {
        lock(&self.calls).push(method);
        if *lock(&self.failing) == Some(method) {
            return Err(failure(method));
        }
        Ok(())
    }

    fn operation(&self, method: &'static str) -> Result<OperationId, LedgerError> {
        self.call(method)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OperationId(format!("0x{:04x}", id)))
    }
}

#[async_trait::async_trait]
impl LedgerContract for FakeLedger {
    async fn epoch_length(&self) -> Result<u64, LedgerError> {
        self.call("epoch_length")?;
        Ok(self.epoch_length)
    }

    async fn register(&self, _public_key: &PublicKey) -> Result<OperationId, LedgerError> {
        self.operation("register")
    }

    async fn fund(&self, _public_key: &PublicKey, _value: u64) -> Result<OperationId, LedgerError> {
        self.operation("fund")
    }

    async fn transfer(
        &self,
        _left: &[Point],
        _right: &Point,
        _participants: &[PublicKey],
        _epoch_tag: &EpochTag,
        _proof: &Proof,
    ) -> Result<OperationId, LedgerError> {
        self.operation("transfer")
    }

    async fn burn(
        &self,
        _public_key: &PublicKey,
        _value: u64,
        _epoch_tag: &EpochTag,
        _proof: &Proof,
    ) -> Result<OperationId, LedgerError> {
        self.operation("burn")
    }

    async fn simulate_accounts(
        &self,
        public_keys: &[PublicKey],
        epoch: u64,
    ) -> Result<Vec<Commitment>, LedgerError> {
        self.call("simulate_accounts")?;
        Ok(public_keys
            .iter()
            .map(|key| Commitment {
                left: Point::new(key.0.clone(), format!("0x{:x}", epoch)),
                right: Point::new(key.1.clone(), format!("0x{:x}", epoch)),
            })
            .collect())
    }

    async fn transfer_ciphertexts(
        &self,
        operation_id: &OperationId,
    ) -> Result<TransferCiphertexts, LedgerError> {
        self.call("transfer_ciphertexts")?;
        lock(&self.ciphertexts)
            .get(operation_id)
            .cloned()
            .ok_or(LedgerError::NoData)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError> {
        self.call("block_timestamp")?;
        lock(&self.block_timestamps)
            .get(&block_number)
            .copied()
            .ok_or(LedgerError::NoData)
    }

    async fn subscribe_events(&self) -> Result<LedgerEventStream, LedgerError> {
        self.call("subscribe_events")?;
        Ok(Box::pin(futures_util::stream::empty::<Result<LedgerEvent, LedgerError>>()))
    }
}

/// Proof service and account cryptography fake.
#[derive(Default)]
pub(crate) struct FakeProver {
    calls: Mutex<Vec<&'static str>>,
    keys_issued: AtomicU64,
    transfers: Mutex<Vec<TransferStatement>>,
    burns: Mutex<Vec<BurnStatement>>,
    balances: Mutex<HashMap<Point, u64>>,
    undecryptable: Mutex<Vec<Point>>,
}

impl FakeProver {
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    pub(crate) fn last_transfer(&self) -> Option<TransferStatement> {
        lock(&self.transfers).last().cloned()
    }

    pub(crate) fn last_burn(&self) -> Option<BurnStatement> {
        lock(&self.burns).last().cloned()
    }

    /// Amount `read_balance` reports for a ciphertext with this left point.
    pub(crate) fn set_balance(&self, left: Point, value: u64) {
        lock(&self.balances).insert(left, value);
    }

    /// Make `read_balance` fail for a ciphertext with this left point.
    pub(crate) fn fail_balance(&self, left: Point) {
        lock(&self.undecryptable).push(left);
    }

    fn record(&self, method: &'static str) {
        lock(&self.calls).push(method);
    }
}

#[async_trait::async_trait]
impl ProofService for FakeProver {
    async fn prove_transfer(
        &self,
        statement: TransferStatement,
    ) -> Result<TransferProof, LedgerError> {
        self.record("prove_transfer");
        let left = statement
            .commitments_left
            .iter()
            .map(|point| Point::new(point.0.clone(), "0xl"))
            .collect();
        lock(&self.transfers).push(statement);
        Ok(TransferProof {
            proof: Proof("0xproof".to_string()),
            left,
            right: Point::new("0xr", "0xr"),
        })
    }

    async fn prove_burn(&self, statement: BurnStatement) -> Result<Proof, LedgerError> {
        self.record("prove_burn");
        lock(&self.burns).push(statement);
        Ok(Proof("0xburn".to_string()))
    }
}

#[async_trait::async_trait]
impl AccountCrypto for FakeProver {
    async fn generate_keypair(&self) -> Result<Keypair, LedgerError> {
        self.record("generate_keypair");
        let n = self.keys_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Keypair {
            secret: SecretKey::new(format!("0x{:02x}", n)),
            public: Point::new(format!("0xa{:02x}", n), "0x1"),
        })
    }

    async fn read_balance(
        &self,
        left: &Point,
        _right: &Point,
        _secret: &SecretKey,
        limit: u64,
    ) -> Result<u64, LedgerError> {
        self.record("read_balance");
        if lock(&self.undecryptable).contains(left) {
            return Err(LedgerError::NoData);
        }
        let value = lock(&self.balances).get(left).copied().unwrap_or(0);
        Ok(value.min(limit))
    }

    async fn epoch_tag(&self, epoch: u64) -> Result<EpochTag, LedgerError> {
        self.record("epoch_tag");
        Ok(EpochTag(Point::new(format!("0x{:x}", epoch), "0x0")))
    }
}

/// A state with the given balances as of epoch zero.
pub(crate) fn funded(available: u64, pending: u64) -> AccountState {
    AccountState {
        available,
        pending,
        nonce_used: false,
        last_roll_over: 0,
    }
}

/// A connected session over the fakes, at `now_ms` on a paused clock.
pub(crate) struct Harness {
    pub(crate) client: LedgerClient,
    pub(crate) ledger: Arc<FakeLedger>,
    pub(crate) prover: Arc<FakeProver>,
    next_key: AtomicU64,
}

impl Harness {
    pub(crate) async fn start(epoch_length: u64, now_ms: u64) -> Self {
        let ledger = Arc::new(FakeLedger::new(epoch_length));
        let prover = Arc::new(FakeProver::default());
        let collaborators = Collaborators {
            contract: ledger.clone(),
            prover: prover.clone(),
            crypto: prover.clone(),
        };
        let client = LedgerClient::connect(
            collaborators,
            Arc::new(PausedTime::new(now_ms)),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        ledger.clear_calls();
        Self {
            client,
            ledger,
            prover,
            next_key: AtomicU64::new(0),
        }
    }

    /// Add an account directly to the book with `state` as its confirmed state.
    /// Nothing is sent to the contract.
    pub(crate) fn account_with(&self, state: AccountState) -> usize {
        let n = self.next_key.fetch_add(1, Ordering::SeqCst) + 1;
        let index = self.client.register_keypair(Keypair {
            secret: SecretKey::new(format!("0x5{:02x}", n)),
            public: Point::new(format!("0xb{:02x}", n), "0x7"),
        });
        let now = self.client.now();
        lock(&self.client.inner.accounts)
            .get_mut(index)
            .unwrap()
            .confirm(&self.client.inner.clock, now, |stored| *stored = state)
            .unwrap();
        index
    }
}
