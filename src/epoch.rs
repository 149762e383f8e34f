//! Epoch arithmetic.
//!
//! The ledger slices time into fixed-length epochs; at most one nonce-consuming
//! operation per account is accepted in each. The length is read from the
//! contract once per session and never changes afterwards.

use crate::client::ClientError;
use std::sync::OnceLock;

/// `floor(timestamp_ms / epoch_length_ms)`.
pub fn epoch_index(timestamp_ms: u64, epoch_length_ms: u64) -> u64 {
    timestamp_ms / epoch_length_ms
}

/// Milliseconds until the next epoch boundary, in `[0, epoch_length_ms)`.
///
/// Zero exactly on a boundary.
pub fn time_to_next_boundary(now_ms: u64, epoch_length_ms: u64) -> u64 {
    (epoch_length_ms - now_ms % epoch_length_ms) % epoch_length_ms
}

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Session epoch clock. Unusable until the epoch length has been set.
#[derive(Debug, Default)]
pub struct EpochClock {
    epoch_length_ms: OnceLock<u64>,
}

impl EpochClock {
    /// A clock whose epoch length has not been fetched yet.
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn with_epoch_length(epoch_length_ms: u64) -> Result<Self, ClientError> {
        let clock = Self::unset();
        clock.set_epoch_length(epoch_length_ms)?;
        Ok(clock)
    }

    /// Record the ledger's epoch length. Only the first call has any effect;
    /// a later call with a different value is rejected.
    pub fn set_epoch_length(&self, epoch_length_ms: u64) -> Result<(), ClientError> {
        if epoch_length_ms == 0 {
            return Err(ClientError::InvalidEpochLength(epoch_length_ms));
        }
        let stored = *self.epoch_length_ms.get_or_init(|| epoch_length_ms);
        if stored != epoch_length_ms {
            return Err(ClientError::InvalidEpochLength(epoch_length_ms));
        }
        Ok(())
    }

    pub fn epoch_length(&self) -> Result<u64, ClientError> {
        self.epoch_length_ms
            .get()
            .copied()
            .ok_or(ClientError::EpochLengthUnknown)
    }

    pub fn epoch_index(&self, timestamp_ms: u64) -> Result<u64, ClientError> {
        Ok(epoch_index(timestamp_ms, self.epoch_length()?))
    }

    pub fn time_to_next_boundary(&self, now_ms: u64) -> Result<u64, ClientError> {
        Ok(time_to_next_boundary(now_ms, self.epoch_length()?))
    }
}
