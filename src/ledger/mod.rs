//! Ledger integration module
//!
//! This module provides the interfaces and network clients for the confidential ledger
//! contract, its event feed, and the remote proof server. The client core depends only on
//! the traits in `contract`; the JSON-RPC and proof server clients are the production
//! implementations wired in by the binary.

/// JSON-RPC and websocket client for the ledger gateway
mod client;
/// Collaborator traits consumed by the client core
mod contract;
/// Remote proof server client
mod prover;
/// Wire types shared across the ledger surface
mod types;

pub use client::JsonRpcLedgerClient;
pub use contract::*;
pub use prover::RemoteProofServer;
pub use types::*;
