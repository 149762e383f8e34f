use crate::ledger::{LedgerError, OperationId};
use crate::wallet::AddressError;

use std::fmt;

/// Stage of an operation at which an external call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchingChainState,
    Proving,
    Submitting,
    Decrypting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FetchingChainState => "fetching chain state",
            Stage::Proving => "proving",
            Stage::Submitting => "submitting",
            Stage::Decrypting => "decrypting",
        };
        f.write_str(name)
    }
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised before any external call; never retried automatically.
    Validation,
    /// An RPC to the ledger or the prover failed; the caller may retry.
    TransientChain,
    /// The session is misconfigured or not initialised.
    Setup,
}

/// Error type of every client operation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Account {index} not available: {count} account(s) held")]
    AccountNotFound { index: usize, count: usize },

    #[error("Requested amount of {requested} exceeds account balance of {balance}")]
    InsufficientBalance { requested: u64, balance: u64 },

    #[error("Name \"{0}\" is not in the friend directory")]
    UnknownName(String),

    #[error(
        "Anonymity set size {size} (including you and the recipient) must be a power of two: add {} or remove {}",
        gap(.next, .size),
        gap(.size, .previous)
    )]
    InvalidAnonymitySetSize {
        size: usize,
        previous: usize,
        next: usize,
    },

    #[error(
        "An anonymity set of size {size} might take longer than the epoch length of {epoch_length} ms to prove; use an epoch of at least {minimum} ms"
    )]
    EpochTooShort {
        size: usize,
        epoch_length: u64,
        minimum: u64,
    },

    #[error("Epoch length has not been read from the ledger yet")]
    EpochLengthUnknown,

    #[error("Invalid epoch length: {0}")]
    InvalidEpochLength(u64),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("{stage} failed{}: {source}", operation_suffix(.operation_id))]
    Chain {
        stage: Stage,
        operation_id: Option<OperationId>,
        source: LedgerError,
    },
}

fn gap(a: &usize, b: &usize) -> usize {
    a.abs_diff(*b)
}

fn operation_suffix(operation_id: &Option<OperationId>) -> String {
    match operation_id {
        Some(id) => format!(" for operation {}", id),
        None => String::new(),
    }
}

impl ClientError {
    pub fn chain(stage: Stage, source: LedgerError) -> Self {
        ClientError::Chain {
            stage,
            operation_id: None,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::AccountNotFound { .. }
            | ClientError::InsufficientBalance { .. }
            | ClientError::UnknownName(_)
            | ClientError::InvalidAnonymitySetSize { .. }
            | ClientError::EpochTooShort { .. }
            | ClientError::InvalidAddress(_) => ErrorKind::Validation,
            ClientError::Chain { .. } => ErrorKind::TransientChain,
            ClientError::EpochLengthUnknown | ClientError::InvalidEpochLength(_) => {
                ErrorKind::Setup
            }
        }
    }
}
