//!
//! JSON-RPC client for the confidential ledger contract gateway.
//!
//! Sends and calls go over HTTP; the contract's event feed is a websocket
//! subscription that speaks the `connection_init` / `subscribe` / `next` framing.

use super::contract::{LedgerContract, LedgerEventStream};
use super::types::*;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_tungstenite::{
	connect_async,
	tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, error, info};

/// Ledger gateway client
pub struct JsonRpcLedgerClient {
	/// The underlying HTTP client for RPC requests.
	http_client: Client,
	/// The HTTP endpoint of the gateway.
	rpc_url: String,
	/// The WebSocket endpoint for the event feed.
	ws_url: String,
	/// Monotonic JSON-RPC request id.
	next_id: AtomicU64,
}

impl JsonRpcLedgerClient {
	/// Create a new ledger client.
	///
	/// # Arguments
	/// * `rpc_url` - The HTTP endpoint for sends and calls.
	/// * `ws_url` - The WebSocket endpoint for the event feed.
	/// * `timeout` - Per-request HTTP timeout.
	pub fn new(rpc_url: String, ws_url: String, timeout: Duration) -> Result<Self, LedgerError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			rpc_url,
			ws_url,
			next_id: AtomicU64::new(1),
		})
	}

	/// Execute a JSON-RPC request and decode its `result` field.
	///
	/// # Errors
	/// Returns `LedgerError` on transport failure, non-success status, an `error`
	/// member in the response, or a missing `result`.
	pub async fn execute<T: DeserializeOwned>(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<T, LedgerError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});
		debug!("RPC request {} -> {}", id, method);

		let response = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(LedgerError::RpcError(format!(
				"HTTP error: {}",
				response.status()
			)));
		}

		let mut response_json: serde_json::Value = response.json().await?;

		if let Some(error) = response_json.get("error") {
			return Err(LedgerError::RpcError(format!("{} failed: {}", method, error)));
		}

		let result = response_json
			.get_mut("result")
			.map(serde_json::Value::take)
			.ok_or(LedgerError::NoData)?;
		Ok(serde_json::from_value(result)?)
	}

	async fn send(&self, method: &str, params: serde_json::Value) -> Result<OperationId, LedgerError> {
		let operation_id: OperationId = self.execute(method, params).await?;
		info!("{} accepted as operation {}", method, operation_id);
		Ok(operation_id)
	}
}

#[async_trait]
impl LedgerContract for JsonRpcLedgerClient {
	async fn epoch_length(&self) -> Result<u64, LedgerError> {
		self.execute("epochLength", json!([])).await
	}

	async fn register(&self, public_key: &PublicKey) -> Result<OperationId, LedgerError> {
		self.send("register", json!([public_key])).await
	}

	async fn fund(&self, public_key: &PublicKey, value: u64) -> Result<OperationId, LedgerError> {
		self.send("fund", json!([public_key, value])).await
	}

	async fn transfer(
		&self,
		left: &[Point],
		right: &Point,
		participants: &[PublicKey],
		epoch_tag: &EpochTag,
		proof: &Proof,
	) -> Result<OperationId, LedgerError> {
		self.send(
			"transfer",
			json!([left, right, participants, epoch_tag, proof]),
		)
		.await
	}

	async fn burn(
		&self,
		public_key: &PublicKey,
		value: u64,
		epoch_tag: &EpochTag,
		proof: &Proof,
	) -> Result<OperationId, LedgerError> {
		self.send("burn", json!([public_key, value, epoch_tag, proof]))
			.await
	}

	async fn simulate_accounts(
		&self,
		public_keys: &[PublicKey],
		epoch: u64,
	) -> Result<Vec<Commitment>, LedgerError> {
		let raw: Vec<(Point, Point)> = self
			.execute("simulateAccounts", json!([public_keys, epoch]))
			.await?;
		if raw.len() != public_keys.len() {
			return Err(LedgerError::RpcError(format!(
				"simulateAccounts returned {} commitments for {} keys",
				raw.len(),
				public_keys.len()
			)));
		}
		Ok(raw
			.into_iter()
			.map(|(left, right)| Commitment { left, right })
			.collect())
	}

	async fn transfer_ciphertexts(
		&self,
		operation_id: &OperationId,
	) -> Result<TransferCiphertexts, LedgerError> {
		self.execute("transferCiphertexts", json!([operation_id]))
			.await
	}

	async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError> {
		self.execute("blockTimestamp", json!([block_number])).await
	}

	/// Subscribe to the contract's event feed.
	///
	/// # Errors
	/// Returns `LedgerError` if the WebSocket connection or the handshake fails.
	async fn subscribe_events(&self) -> Result<LedgerEventStream, LedgerError> {
		debug!("Attempting WebSocket connection to: {}", self.ws_url);

		let request = self.ws_url.clone().into_client_request()?;
		let (ws_stream, response) = connect_async(request).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		let init_message = json!({
			"type": "connection_init"
		});
		ws_sender
			.send(Message::Text(init_message.to_string()))
			.await?;

		// Wait for connection ack
		match ws_receiver.next().await {
			Some(msg) => match msg? {
				Message::Text(text) => {
					let parsed: serde_json::Value = serde_json::from_str(&text)?;
					if parsed.get("type").and_then(|t| t.as_str()) != Some("connection_ack") {
						return Err(LedgerError::SubscriptionError(
							"Connection not acknowledged".to_string(),
						));
					}
				}
				_ => {
					return Err(LedgerError::SubscriptionError(
						"Unexpected message type during handshake".to_string(),
					));
				}
			},
			None => {
				return Err(LedgerError::SubscriptionError(
					"Feed closed during handshake".to_string(),
				));
			}
		}

		let start_message = json!({
			"id": "ledger-events",
			"type": "subscribe",
			"payload": { "events": "all" }
		});
		ws_sender
			.send(Message::Text(start_message.to_string()))
			.await?;
		info!("Subscribed to ledger event feed");

		let stream = ws_receiver.filter_map(|msg| async move {
			match msg {
				Ok(Message::Text(text)) => parse_feed_message(&text),
				Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
				Ok(Message::Close(_)) => {
					debug!("Event feed closed by peer");
					None
				}
				Ok(_) => Some(Err(LedgerError::SubscriptionError(
					"Unexpected message type".to_string(),
				))),
				Err(e) => Some(Err(LedgerError::WebSocketError(e))),
			}
		});

		Ok(Box::pin(stream))
	}
}

/// Decode one text frame of the event feed. `None` means "nothing to deliver".
fn parse_feed_message(text: &str) -> Option<Result<LedgerEvent, LedgerError>> {
	let parsed = match serde_json::from_str::<serde_json::Value>(text) {
		Ok(parsed) => parsed,
		Err(e) => return Some(Err(LedgerError::JsonError(e))),
	};

	let Some(msg_type) = parsed.get("type").and_then(|t| t.as_str()) else {
		return Some(Err(LedgerError::SubscriptionError(
			"Message missing type field".to_string(),
		)));
	};

	match msg_type {
		"next" => {
			let Some(event_data) = parsed.get("payload").and_then(|p| p.get("event")) else {
				return Some(Err(LedgerError::NoData));
			};
			match serde_json::from_value::<LedgerEvent>(event_data.clone()) {
				Ok(event) => Some(Ok(event)),
				Err(e) => {
					error!("Failed to deserialize ledger event: {}", e);
					Some(Err(LedgerError::JsonError(e)))
				}
			}
		}
		"error" => {
			let error_msg = parsed
				.get("payload")
				.and_then(|p| p.get("message"))
				.and_then(|m| m.as_str())
				.unwrap_or("Unknown subscription error");
			Some(Err(LedgerError::SubscriptionError(error_msg.to_string())))
		}
		"complete" => {
			debug!("Event subscription completed");
			None
		}
		_ => {
			debug!("Ignoring message type: {}", msg_type);
			None
		}
	}
}
