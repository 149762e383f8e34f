use confidential_ledger_client::ClientConfig;
use confidential_ledger_client::client::{Collaborators, LedgerClient, OperationUpdate};
use confidential_ledger_client::epoch::SystemTimeSource;
use confidential_ledger_client::ledger::{JsonRpcLedgerClient, RemoteProofServer};

use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	// Initialize tracing subscriber with debug logging for this crate
	let filter = tracing_subscriber::EnvFilter::from_default_env()
		.add_directive(tracing::Level::INFO.into());
	let filter = match "confidential_ledger_client=debug".parse() {
		Ok(directive) => filter.add_directive(directive),
		Err(_) => filter,
	};
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting confidential ledger client");

	let config = match ClientConfig::from_env() {
		Ok(config) => config,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			return;
		}
	};

	let contract = match JsonRpcLedgerClient::new(
		config.ledger_rpc_url.clone(),
		config.ledger_ws_url.clone(),
		config.rpc_timeout,
	) {
		Ok(contract) => contract,
		Err(e) => {
			error!("Failed to create ledger client: {}", e);
			return;
		}
	};

	info!("Created ledger client");

	let prover = match RemoteProofServer::new(&config.prover_url, config.prover_max_elapsed) {
		Ok(prover) => Arc::new(prover),
		Err(e) => {
			error!("Failed to create proof server client: {}", e);
			return;
		}
	};

	info!("Created proof server client");

	let collaborators = Collaborators {
		contract: Arc::new(contract),
		prover: prover.clone(),
		crypto: prover,
	};
	let client =
		match LedgerClient::connect(collaborators, Arc::new(SystemTimeSource), config.session()).await {
			Ok(client) => client,
			Err(e) => {
				error!("Failed to start client session: {}", e);
				return;
			}
		};

	// confirmations arrive through the feed
	let feed = {
		let client = client.clone();
		tokio::spawn(async move { client.run_event_feed().await })
	};

	let mut registration = match client.new_account().await {
		Ok(intent) => intent,
		Err(e) => {
			error!("Failed to create account: {}", e);
			return;
		}
	};
	let account = registration.account;
	match client.address(account, config.network.as_deref()) {
		Ok(address) => info!("Account {} address: {}", account, address),
		Err(e) => warn!("Could not encode address of account {}: {}", account, e),
	}
	if !matches!(registration.settled().await, Some(OperationUpdate::Confirmed { .. })) {
		error!("Account {} was not registered", account);
		return;
	}

	if let Some(value) = config.initial_deposit {
		match client.deposit(account, value).await {
			Ok(mut intent) => match intent.settled().await {
				Some(OperationUpdate::Confirmed { state, .. }) => {
					info!("Deposit confirmed, account {} now holds {}", account, state.total())
				}
				other => warn!("Deposit did not confirm: {:?}", other),
			},
			Err(e) => error!("Failed to deposit: {}", e),
		}
	}

	match feed.await {
		Ok(Ok(stats)) => info!("Event feed closed: {}", stats.summary()),
		Ok(Err(e)) => error!("Event feed failed: {}", e),
		Err(e) => error!("Event feed task failed: {}", e),
	}
}
