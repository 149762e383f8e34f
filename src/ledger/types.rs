//! Wire types shared by the ledger contract, the proof service and the event feed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An affine curve point, as the contract encodes it: a pair of hex coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point(pub String, pub String);

impl Point {
    pub fn new(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self(x.into(), y.into())
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.0, self.1)
    }
}

/// Public half of an account keypair.
pub type PublicKey = Point;

/// Secret scalar of an account keypair, hex encoded. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(hex_scalar: impl Into<String>) -> Self {
        Self(hex_scalar.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// ElGamal-style balance commitment as returned by `simulateAccounts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub left: Point,
    pub right: Point,
}

/// Opaque identifier the ledger assigns when it accepts an operation for inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Hex-encoded proof bytes produced by the proof service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proof(pub String);

/// Epoch-bound generator the contract uses to detect nonce reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochTag(pub Point);

/// Output of `proveTransfer`: the proof plus the ciphertexts it speaks about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProof {
    pub proof: Proof,
    /// One left ciphertext per participant, in anonymity-set order.
    #[serde(rename = "L")]
    pub left: Vec<Point>,
    /// Shared right ciphertext.
    #[serde(rename = "R")]
    pub right: Point,
}

/// Ciphertexts carried by a confirmed transfer, read back when an inbound
/// transfer must be decrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCiphertexts {
    #[serde(rename = "L")]
    pub left: Vec<Point>,
    #[serde(rename = "R")]
    pub right: Point,
}

/// Event kinds emitted by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    TransferOccurred,
    Other(String),
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "TransferOccurred" => EventKind::TransferOccurred,
            _ => EventKind::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        match value {
            EventKind::TransferOccurred => "TransferOccurred".to_string(),
            EventKind::Other(name) => name,
        }
    }
}

/// Event-specific fields. Only the parties of a transfer are consumed here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFields {
    #[serde(default)]
    pub parties: Vec<PublicKey>,
}

/// One event from the ledger's feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub operation_id: OperationId,
    pub event_kind: EventKind,
    pub block_number: u64,
    #[serde(default)]
    pub fields: EventFields,
}

/// Error types for ledger, event feed and proof server transport
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("No data returned")]
    NoData,

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Proof server error: {0}")]
    ProverError(String),
}
