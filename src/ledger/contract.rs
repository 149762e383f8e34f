//! Interfaces of the external collaborators: the ledger contract, the proof
//! service and the account cryptography. The client only ever talks to these
//! through trait objects.

use super::types::*;
use crate::wallet::Keypair;

use std::pin::Pin;

/// Stream of ledger events as delivered by a feed subscription.
pub type LedgerEventStream =
    Pin<Box<dyn futures_util::Stream<Item = Result<LedgerEvent, LedgerError>> + Send>>;

/// The contract surface consumed by the client.
///
/// "send" methods mutate chain state and resolve once the ledger has accepted the
/// operation for inclusion, yielding its identifier. "call" methods only read.
#[async_trait::async_trait]
pub trait LedgerContract: Send + Sync {
    /// Epoch length in milliseconds. Read once per session.
    async fn epoch_length(&self) -> Result<u64, LedgerError>;

    async fn register(&self, public_key: &PublicKey) -> Result<OperationId, LedgerError>;

    async fn fund(&self, public_key: &PublicKey, value: u64) -> Result<OperationId, LedgerError>;

    async fn transfer(
        &self,
        left: &[Point],
        right: &Point,
        participants: &[PublicKey],
        epoch_tag: &EpochTag,
        proof: &Proof,
    ) -> Result<OperationId, LedgerError>;

    async fn burn(
        &self,
        public_key: &PublicKey,
        value: u64,
        epoch_tag: &EpochTag,
        proof: &Proof,
    ) -> Result<OperationId, LedgerError>;

    /// Commitments of every key rolled forward to `epoch`, in input order.
    async fn simulate_accounts(
        &self,
        public_keys: &[PublicKey],
        epoch: u64,
    ) -> Result<Vec<Commitment>, LedgerError>;

    /// Ciphertexts of an already confirmed transfer.
    async fn transfer_ciphertexts(
        &self,
        operation_id: &OperationId,
    ) -> Result<TransferCiphertexts, LedgerError>;

    /// Timestamp of a block in milliseconds.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError>;

    /// Subscribe to every event the contract emits.
    async fn subscribe_events(&self) -> Result<LedgerEventStream, LedgerError>;
}

/// Arguments of `proveTransfer`, in the order the proof service expects them.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatement {
    pub commitments_left: Vec<Point>,
    pub commitments_right: Vec<Point>,
    pub participants: Vec<PublicKey>,
    pub last_roll_over: u64,
    pub secret: SecretKey,
    pub value: u64,
    pub remaining_balance: u64,
    /// `(self_index, recipient_index)` inside `participants`.
    pub index: (usize, usize),
}

/// Arguments of `proveBurn`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnStatement {
    pub commitment_left: Point,
    pub commitment_right: Point,
    pub public_key: PublicKey,
    pub value: u64,
    pub last_roll_over: u64,
    pub secret: SecretKey,
    pub remaining_balance: u64,
}

/// Zero-knowledge proof generation. Opaque beyond its signature.
#[async_trait::async_trait]
pub trait ProofService: Send + Sync {
    async fn prove_transfer(&self, statement: TransferStatement)
    -> Result<TransferProof, LedgerError>;

    async fn prove_burn(&self, statement: BurnStatement) -> Result<Proof, LedgerError>;
}

/// Key generation and the few group operations the client needs locally.
#[async_trait::async_trait]
pub trait AccountCrypto: Send + Sync {
    async fn generate_keypair(&self) -> Result<Keypair, LedgerError>;

    /// Decrypt a balance ciphertext by bounded search over `[0, limit]`.
    async fn read_balance(
        &self,
        left: &Point,
        right: &Point,
        secret: &SecretKey,
        limit: u64,
    ) -> Result<u64, LedgerError>;

    /// Nonce generator for the given epoch.
    async fn epoch_tag(&self, epoch: u64) -> Result<EpochTag, LedgerError>;
}
