//! Environment-based configuration for the ledger client.
//!
//! # Environment Variables
//!
//! - `LEDGER_RPC_URL` - JSON-RPC endpoint of the ledger gateway
//! - `LEDGER_WS_URL` - websocket endpoint of the ledger event feed
//! - `PROVER_URL` - proof server endpoint
//! - `LEDGER_NETWORK` - network tag used in account addresses (optional)
//! - `LIVENESS_TIMEOUT_MS` - confirmation delay before a notice is logged
//! - `PROVER_MAX_ELAPSED_SECS` - total retry budget for one proof server request
//! - `RPC_TIMEOUT_SECS` - timeout of a single ledger request
//! - `BALANCE_SEARCH_LIMIT` - largest amount tried when decrypting inbound transfers
//! - `INITIAL_DEPOSIT` - amount the binary deposits into its new account (optional)

use crate::client::SessionConfig;

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ledger_rpc_url: String,
    pub ledger_ws_url: String,
    pub prover_url: String,
    pub network: Option<String>,
    pub liveness_timeout: Duration,
    pub prover_max_elapsed: Duration,
    pub rpc_timeout: Duration,
    pub balance_search_limit: u64,
    pub initial_deposit: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ledger_rpc_url: "http://localhost:8545".to_string(),
            ledger_ws_url: "ws://localhost:8546".to_string(),
            prover_url: "http://localhost:6300".to_string(),
            network: None,
            liveness_timeout: Duration::from_millis(5000),
            prover_max_elapsed: Duration::from_secs(600),
            rpc_timeout: Duration::from_secs(30),
            balance_search_limit: u64::from(u32::MAX),
            initial_deposit: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, defaulting what it does not return.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let liveness_timeout = parse_or(
            &lookup,
            "LIVENESS_TIMEOUT_MS",
            defaults.liveness_timeout,
            Duration::from_millis,
        )?;
        let prover_max_elapsed = parse_or(
            &lookup,
            "PROVER_MAX_ELAPSED_SECS",
            defaults.prover_max_elapsed,
            Duration::from_secs,
        )?;
        let rpc_timeout = parse_or(
            &lookup,
            "RPC_TIMEOUT_SECS",
            defaults.rpc_timeout,
            Duration::from_secs,
        )?;
        let balance_search_limit = parse_or(
            &lookup,
            "BALANCE_SEARCH_LIMIT",
            defaults.balance_search_limit,
            std::convert::identity,
        )?;
        let initial_deposit = parse_or(
            &lookup,
            "INITIAL_DEPOSIT",
            defaults.initial_deposit,
            Some::<u64>,
        )?
        .filter(|value| *value > 0);

        Ok(Self {
            ledger_rpc_url: lookup("LEDGER_RPC_URL").unwrap_or(defaults.ledger_rpc_url),
            ledger_ws_url: lookup("LEDGER_WS_URL").unwrap_or(defaults.ledger_ws_url),
            prover_url: lookup("PROVER_URL").unwrap_or(defaults.prover_url),
            network: lookup("LEDGER_NETWORK").filter(|network| !network.is_empty()),
            liveness_timeout,
            prover_max_elapsed,
            rpc_timeout,
            balance_search_limit,
            initial_deposit,
        })
    }

    /// The part of the configuration the session itself consumes.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            liveness_timeout: self.liveness_timeout,
            balance_search_limit: self.balance_search_limit,
        }
    }
}

fn parse_or<F, T, V>(lookup: &F, name: &str, default: V, convert: fn(T) -> V) -> Result<V, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(convert)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}: {}", raw, e))),
    }
}
