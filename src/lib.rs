//! Client for a confidential-balance ledger.
//!
//! Accounts hold encrypted balances whose spendable part only changes at epoch
//! boundaries. The client keeps a local projection of every account, decides
//! whether an operation can go out in the current epoch, builds anonymity sets
//! for transfers, drives the proof service and the contract, and matches the
//! contract's events back to the operations it submitted.

pub mod client;
pub mod config;
pub mod epoch;
pub mod ledger;
pub mod transaction;
pub mod wallet;

pub use client::{ClientError, LedgerClient, PendingIntent, TransferRequest};
pub use config::ClientConfig;
