//!
//! Remote proof server integration.
//!
//! Provides a client for the proof server that produces transfer and burn proofs
//! and also performs the client-side group operations (key generation, balance
//! decryption, epoch tags) that the wallet delegates to it.

use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::contract::{AccountCrypto, BurnStatement, ProofService, TransferStatement};
use super::types::*;
use crate::wallet::Keypair;

/// Remote proof server client
pub struct RemoteProofServer {
	url: reqwest::Url,
	client: reqwest::Client,
	max_elapsed: Duration,
}

impl RemoteProofServer {
	/// Creates a new remote proof server client. Requests are retried with
	/// exponential backoff for at most `max_elapsed`.
	pub fn new(url: &str, max_elapsed: Duration) -> Result<Self, LedgerError> {
		let url = reqwest::Url::parse(url)
			.map_err(|e| LedgerError::ProverError(format!("invalid proof server URL: {}", e)))?;
		let client = reqwest::ClientBuilder::new()
			.pool_idle_timeout(None)
			.build()?;
		Ok(Self {
			url,
			client,
			max_elapsed,
		})
	}

	/// POST `body` to `endpoint`, retrying transient failures.
	async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, LedgerError>
	where
		B: Serialize + Sync,
		T: DeserializeOwned,
	{
		let url = self
			.url
			.join(endpoint)
			.map_err(|e| LedgerError::ProverError(format!("invalid endpoint {}: {}", endpoint, e)))?;

		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.max_elapsed),
			..ExponentialBackoff::default()
		};

		let response_bytes = retry(policy, || async {
			let resp = self
				.client
				.post(url.clone())
				.json(body)
				.send()
				.await
				.map_err(|e| {
					warn!("Proof server send error: {:?}", e);
					backoff::Error::transient(LedgerError::HttpError(e))
				})?;

			let status = resp.status();
			let resp_bytes = resp.bytes().await.map_err(|e| {
				warn!("Proof server to bytes error: {:?}", e);
				backoff::Error::transient(LedgerError::HttpError(e))
			})?;

			if status.is_client_error() {
				return Err(backoff::Error::permanent(LedgerError::ProverError(format!(
					"{} rejected the request ({}): {}",
					endpoint,
					status,
					String::from_utf8_lossy(&resp_bytes)
				))));
			}
			if !status.is_success() {
				warn!("Proof server response error: {}", status);
				return Err(backoff::Error::transient(LedgerError::ProverError(format!(
					"{} answered {}",
					endpoint, status
				))));
			}

			Ok::<Vec<u8>, backoff::Error<LedgerError>>(resp_bytes.to_vec())
		})
		.await?;

		if response_bytes.is_empty() {
			return Err(LedgerError::ProverError(format!(
				"{} returned an empty response",
				endpoint
			)));
		}
		debug!("{} returned {} bytes", endpoint, response_bytes.len());

		Ok(serde_json::from_slice(&response_bytes)?)
	}
}

#[async_trait]
impl ProofService for RemoteProofServer {
	async fn prove_transfer(
		&self,
		statement: TransferStatement,
	) -> Result<TransferProof, LedgerError> {
		self.post("prove-transfer", &statement).await
	}

	async fn prove_burn(&self, statement: BurnStatement) -> Result<Proof, LedgerError> {
		self.post("prove-burn", &statement).await
	}
}

#[async_trait]
impl AccountCrypto for RemoteProofServer {
	async fn generate_keypair(&self) -> Result<Keypair, LedgerError> {
		self.post("create-account", &json!({})).await
	}

	async fn read_balance(
		&self,
		left: &Point,
		right: &Point,
		secret: &SecretKey,
		limit: u64,
	) -> Result<u64, LedgerError> {
		self.post(
			"read-balance",
			&json!({ "L": left, "R": right, "x": secret, "limit": limit }),
		)
		.await
	}

	async fn epoch_tag(&self, epoch: u64) -> Result<EpochTag, LedgerError> {
		self.post("epoch-tag", &json!({ "epoch": epoch })).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_malformed_urls() {
		assert!(matches!(
			RemoteProofServer::new("not a url", Duration::from_secs(1)),
			Err(LedgerError::ProverError(_))
		));
	}

	#[test]
	fn transfer_statement_uses_camel_case_fields() {
		let statement = TransferStatement {
			commitments_left: vec![Point::new("0x1", "0x2")],
			commitments_right: vec![Point::new("0x3", "0x4")],
			participants: vec![Point::new("0x5", "0x6")],
			last_roll_over: 9,
			secret: SecretKey::new("0x7"),
			value: 10,
			remaining_balance: 5,
			index: (0, 1),
		};
		let value = serde_json::to_value(&statement).expect("serializable");
		assert_eq!(value["lastRollOver"], 9);
		assert_eq!(value["remainingBalance"], 5);
		assert_eq!(value["index"], json!([0, 1]));
		assert_eq!(value["secret"], "0x7");
	}
}
