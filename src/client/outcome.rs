//! What a scheduler call tells its caller, immediately and later on.

use super::error::ClientError;
use crate::ledger::OperationId;
use crate::wallet::AccountState;

use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// The kinds of ledger operation the client initiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Register,
    Deposit,
    Transfer,
    Withdraw,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Register => "Registration",
            OperationKind::Deposit => "Deposit",
            OperationKind::Transfer => "Transfer",
            OperationKind::Withdraw => "Withdrawal",
        };
        f.write_str(name)
    }
}

/// Why an operation was deferred to the next epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReason {
    /// Part of the amount is still pending from this epoch.
    FundsPending,
    /// The account already spent its nonce this epoch.
    NonceUsed,
    /// Not enough of the epoch is left to finish proving.
    ProofWindow,
}

impl fmt::Display for QueueReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            QueueReason::FundsPending => "waiting for the release of pending funds",
            QueueReason::NonceUsed => "waiting for the next epoch",
            QueueReason::ProofWindow => "not enough time left in this epoch to prove",
        };
        f.write_str(text)
    }
}

/// Immediate answer to a scheduler call that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The operation is on its way to the ledger.
    Initiated,
    /// The operation will be re-validated after `retry_in`.
    Queued {
        reason: QueueReason,
        retry_in: Duration,
    },
}

impl Admission {
    pub fn is_queued(&self) -> bool {
        matches!(self, Admission::Queued { .. })
    }
}

/// Asynchronous progress of one intent, across all of its retries.
#[derive(Debug)]
pub enum OperationUpdate {
    /// A retry passed validation and the operation is on its way.
    Initiated,
    /// A retry was deferred again.
    Queued {
        reason: QueueReason,
        retry_in: Duration,
    },
    /// A retry failed validation. Terminal.
    Rejected(ClientError),
    /// The ledger accepted the operation.
    Submitted { operation_id: OperationId },
    /// Advisory: confirmation is taking longer than expected.
    Lagging { operation_id: OperationId },
    /// The confirmation arrived and was folded into the account. Terminal.
    Confirmed {
        operation_id: OperationId,
        state: AccountState,
    },
    /// An external call failed. Terminal; the caller decides whether to retry.
    Failed(ClientError),
}

impl From<Admission> for OperationUpdate {
    fn from(admission: Admission) -> Self {
        match admission {
            Admission::Initiated => OperationUpdate::Initiated,
            Admission::Queued { reason, retry_in } => OperationUpdate::Queued { reason, retry_in },
        }
    }
}

pub(crate) type UpdateSender = mpsc::UnboundedSender<OperationUpdate>;

/// Handle returned by every scheduler call.
#[derive(Debug)]
pub struct PendingIntent {
    pub account: usize,
    pub kind: OperationKind,
    pub admission: Admission,
    updates: mpsc::UnboundedReceiver<OperationUpdate>,
}

impl PendingIntent {
    pub(crate) fn new(
        account: usize,
        kind: OperationKind,
        admission: Admission,
        updates: mpsc::UnboundedReceiver<OperationUpdate>,
    ) -> Self {
        Self {
            account,
            kind,
            admission,
            updates,
        }
    }

    /// Next update for this intent; `None` once nothing more will be reported.
    pub async fn next_update(&mut self) -> Option<OperationUpdate> {
        self.updates.recv().await
    }

    /// Wait for a terminal update, skipping progress notices.
    pub async fn settled(&mut self) -> Option<OperationUpdate> {
        while let Some(update) = self.next_update().await {
            match update {
                OperationUpdate::Confirmed { .. }
                | OperationUpdate::Rejected(_)
                | OperationUpdate::Failed(_) => return Some(update),
                _ => continue,
            }
        }
        None
    }
}
