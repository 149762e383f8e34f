//! Event handling for the ledger feed.
//!
//! Every event from the contract's feed goes through an `EventDispatcher`. The
//! confirmation router runs first and completes operations this client
//! submitted. Transfers it does not recognise fall through to the inbound
//! transfer detector, which credits locally held accounts that were a party.

use super::progress::{FeedProgress, FeedStats};
use super::{ClientError, LedgerClient, Stage, lock};
use crate::ledger::{EventKind, LedgerError, LedgerEvent, TransferCiphertexts};

use futures_util::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// A pending operation was completed.
    Confirmed,
    /// Funds were credited to this many local account positions.
    Credited(usize),
    /// Not for this handler.
    Ignored,
}

/// Trait for handling ledger events.
#[async_trait::async_trait]
pub trait LedgerEventHandler: Send + Sync {
    async fn handle(&mut self, event: &LedgerEvent) -> Result<EventOutcome, ClientError>;

    /// Name of this handler for logging.
    fn name(&self) -> &'static str;
}

/// Runs handlers in registration order until one of them claims the event.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn LedgerEventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dispatcher a session uses for its own feed.
    pub fn for_session(client: &LedgerClient) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register_handler(Box::new(ConfirmationRouter {
            client: client.clone(),
        }));
        dispatcher.register_handler(Box::new(InboundTransferDetector {
            client: client.clone(),
        }));
        dispatcher
    }

    pub fn register_handler(&mut self, handler: Box<dyn LedgerEventHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch an event. Handler errors are logged and the next handler runs.
    pub async fn dispatch(&mut self, event: &LedgerEvent) -> EventOutcome {
        for handler in &mut self.handlers {
            match handler.handle(event).await {
                Ok(EventOutcome::Ignored) => continue,
                Ok(outcome) => return outcome,
                Err(e) => {
                    error!(
                        "Handler {} failed to process event {}: {}",
                        handler.name(),
                        event.operation_id,
                        e
                    );
                }
            }
        }
        EventOutcome::Ignored
    }
}

/// Completes operations this session submitted.
struct ConfirmationRouter {
    client: LedgerClient,
}

#[async_trait::async_trait]
impl LedgerEventHandler for ConfirmationRouter {
    async fn handle(&mut self, event: &LedgerEvent) -> Result<EventOutcome, ClientError> {
        Ok(if self.client.dispatch_confirmation(&event.operation_id) {
            EventOutcome::Confirmed
        } else {
            EventOutcome::Ignored
        })
    }

    fn name(&self) -> &'static str {
        "ConfirmationRouter"
    }
}

/// Credits transfers sent to local accounts by someone else.
struct InboundTransferDetector {
    client: LedgerClient,
}

#[async_trait::async_trait]
impl LedgerEventHandler for InboundTransferDetector {
    async fn handle(&mut self, event: &LedgerEvent) -> Result<EventOutcome, ClientError> {
        if event.event_kind != EventKind::TransferOccurred {
            return Ok(EventOutcome::Ignored);
        }
        Ok(match self.client.credit_inbound_transfer(event).await? {
            0 => EventOutcome::Ignored,
            credited => EventOutcome::Credited(credited),
        })
    }

    fn name(&self) -> &'static str {
        "InboundTransferDetector"
    }
}

impl LedgerClient {
    /// Credit every local account that is a party of the transfer in `event`.
    ///
    /// Returns the number of party positions credited. A position whose amount
    /// cannot be decrypted is logged and skipped; the others are still credited.
    pub async fn credit_inbound_transfer(&self, event: &LedgerEvent) -> Result<usize, ClientError> {
        let matches: Vec<(usize, usize)> = {
            let accounts = lock(&self.inner.accounts);
            event
                .fields
                .parties
                .iter()
                .enumerate()
                .filter_map(|(position, party)| accounts.index_of(party).map(|account| (position, account)))
                .collect()
        };
        if matches.is_empty() {
            return Ok(0);
        }
        debug!(
            "Transfer {} involves {} local account position(s)",
            event.operation_id,
            matches.len()
        );

        let with_operation = |stage: Stage| {
            let operation_id = event.operation_id.clone();
            move |source: LedgerError| ClientError::Chain {
                stage,
                operation_id: Some(operation_id),
                source,
            }
        };
        let timestamp = self
            .contract()
            .block_timestamp(event.block_number)
            .await
            .map_err(with_operation(Stage::FetchingChainState))?;
        let ciphertexts = self
            .contract()
            .transfer_ciphertexts(&event.operation_id)
            .await
            .map_err(with_operation(Stage::FetchingChainState))?;

        // decrypt every position before committing any credit
        let mut credits = Vec::with_capacity(matches.len());
        for &(position, account) in &matches {
            match self
                .decrypt_position(&ciphertexts, position, account)
                .await
                .map_err(with_operation(Stage::Decrypting))
            {
                Ok(value) => credits.push((account, value)),
                Err(e) => warn!(
                    "Skipping position {} of transfer {} for account {}: {}",
                    position, event.operation_id, account, e
                ),
            }
        }

        let mut accounts = lock(&self.inner.accounts);
        for &(account, value) in &credits {
            let state = accounts.get_mut(account)?.confirm(&self.inner.clock, timestamp, |state| {
                state.apply_credit(value)
            })?;
            if value > 0 {
                info!(
                    "Transfer of {} received! Balance of account {} is {}.",
                    value,
                    account,
                    state.total()
                );
            }
        }
        Ok(credits.len())
    }

    async fn decrypt_position(
        &self,
        ciphertexts: &TransferCiphertexts,
        position: usize,
        account: usize,
    ) -> Result<u64, LedgerError> {
        let left = ciphertexts.left.get(position).ok_or(LedgerError::NoData)?;
        let secret = match lock(&self.inner.accounts).get(account) {
            Ok(entry) => entry.keypair.secret.clone(),
            Err(_) => return Err(LedgerError::NoData),
        };
        self.crypto()
            .read_balance(
                left,
                &ciphertexts.right,
                &secret,
                self.inner.config.balance_search_limit,
            )
            .await
    }

    /// Subscribe to the contract's event feed and process it until it ends.
    pub async fn run_event_feed(&self) -> Result<FeedStats, ClientError> {
        let events = self
            .contract()
            .subscribe_events()
            .await
            .map_err(|e| ClientError::chain(Stage::FetchingChainState, e))?;
        info!("Subscribed to ledger events");
        Ok(self.follow_events(events).await)
    }

    /// Process `events` until the stream ends.
    pub async fn follow_events<S>(&self, events: S) -> FeedStats
    where
        S: Stream<Item = Result<LedgerEvent, LedgerError>> + Send,
    {
        let mut dispatcher = EventDispatcher::for_session(self);
        let mut progress = FeedProgress::new();
        let mut events = std::pin::pin!(events);

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    let outcome = dispatcher.dispatch(&event).await;
                    progress.record(event.block_number, outcome);
                    progress.log_progress(false);
                }
                Err(e) => {
                    error!("Ledger event feed error: {}", e);
                    progress.record_error();
                }
            }
        }

        progress.log_progress(true);
        let stats = progress.stats();
        info!("Ledger event feed ended: {}", stats.summary());
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{Harness, funded};
    use crate::client::{OperationUpdate, TransferRequest};
    use crate::ledger::{EventFields, OperationId, Point};

    fn event(id: &str, kind: EventKind, block: u64, parties: Vec<Point>) -> LedgerEvent {
        LedgerEvent {
            operation_id: OperationId::from(id),
            event_kind: kind,
            block_number: block,
            fields: EventFields { parties },
        }
    }

    fn stranger(tag: u32) -> Point {
        Point::new(format!("0xe{}", tag), "0x2")
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_transfer_is_credited_to_pending() {
        let harness = Harness::start(10_000, 25_000).await;
        let account = harness.account_with(funded(10, 0));
        let ours = harness.client.public_key(account).unwrap();

        harness.ledger.set_block_timestamp(7, 24_000);
        harness.ledger.set_ciphertexts(
            "0xin",
            TransferCiphertexts {
                left: vec![stranger(1), Point::new("0xc", "0x1")],
                right: Point::new("0xd", "0x1"),
            },
        );
        harness.prover.set_balance(Point::new("0xc", "0x1"), 25);

        let credited = harness
            .client
            .credit_inbound_transfer(&event(
                "0xin",
                EventKind::TransferOccurred,
                7,
                vec![stranger(1), ours],
            ))
            .await
            .unwrap();
        assert_eq!(credited, 1);

        let state = harness.client.confirmed_state(account).unwrap();
        assert_eq!(state.available, 10);
        assert_eq!(state.pending, 25);
        assert_eq!(state.last_roll_over, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transfers_between_strangers_make_no_calls() {
        let harness = Harness::start(10_000, 1_000).await;
        harness.account_with(funded(10, 0));
        let credited = harness
            .client
            .credit_inbound_transfer(&event(
                "0xother",
                EventKind::TransferOccurred,
                3,
                vec![stranger(1), stranger(2)],
            ))
            .await
            .unwrap();
        assert_eq!(credited, 0);
        assert!(harness.ledger.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn feed_routes_confirmations_before_detection() {
        let harness = Harness::start(10_000, 1_000).await;
        let sender = harness.account_with(funded(100, 0));
        let receiver = harness.account_with(funded(0, 0));
        let receiver_key = harness.client.public_key(receiver).unwrap();
        harness.client.add_friend("bob", receiver_key.clone());

        let mut intent = harness
            .client
            .transfer(TransferRequest::new(sender, "bob", 30))
            .await
            .unwrap();
        let operation_id = match intent.next_update().await {
            Some(OperationUpdate::Submitted { operation_id }) => operation_id,
            other => panic!("unexpected: {:?}", other),
        };
        let sender_key = harness.client.public_key(sender).unwrap();

        let feed = futures_util::stream::iter(vec![
            Ok(event(
                &operation_id.0,
                EventKind::TransferOccurred,
                11,
                vec![sender_key, receiver_key],
            )),
            Ok(event("0xunrelated", EventKind::Other("Registered".into()), 12, vec![])),
            Err(LedgerError::SubscriptionError("dropped frame".into())),
        ]);
        let stats = harness.client.follow_events(feed).await;

        assert_eq!(stats.confirmations, 1);
        assert_eq!(stats.inbound_credits, 0);
        assert_eq!(stats.unrelated, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.highest_block, 12);
        assert!(matches!(
            intent.settled().await,
            Some(OperationUpdate::Confirmed { .. })
        ));
        // the router claimed the event, so detection never ran
        assert_eq!(harness.client.confirmed_state(receiver).unwrap().pending, 0);
        assert!(!harness.ledger.calls().contains(&"transfer_ciphertexts"));
    }

    #[tokio::test(start_paused = true)]
    async fn feed_credits_unmatched_transfers() {
        let harness = Harness::start(10_000, 1_000).await;
        let account = harness.account_with(funded(0, 0));
        let ours = harness.client.public_key(account).unwrap();
        harness.ledger.set_block_timestamp(4, 900);
        harness.ledger.set_ciphertexts(
            "0xgift",
            TransferCiphertexts {
                left: vec![Point::new("0x9", "0x9"), stranger(3)],
                right: Point::new("0xd", "0x1"),
            },
        );
        harness.prover.set_balance(Point::new("0x9", "0x9"), 12);

        let feed = futures_util::stream::iter(vec![Ok(event(
            "0xgift",
            EventKind::TransferOccurred,
            4,
            vec![ours, stranger(3)],
        ))]);
        let stats = harness.client.follow_events(feed).await;
        assert_eq!(stats.inbound_credits, 1);
        assert_eq!(harness.client.confirmed_state(account).unwrap().pending, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn detection_failure_is_logged_and_counted_unrelated() {
        let harness = Harness::start(10_000, 1_000).await;
        let account = harness.account_with(funded(0, 0));
        let ours = harness.client.public_key(account).unwrap();
        harness.ledger.fail_on("block_timestamp");

        let feed = futures_util::stream::iter(vec![Ok(event(
            "0xbroken",
            EventKind::TransferOccurred,
            9,
            vec![ours],
        ))]);
        let stats = harness.client.follow_events(feed).await;
        assert_eq!(stats.unrelated, 1);
        assert_eq!(harness.client.confirmed_state(account).unwrap().pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn undecryptable_position_does_not_block_the_others() {
        let harness = Harness::start(10_000, 25_000).await;
        let sender = harness.account_with(funded(50, 0));
        let receiver = harness.account_with(funded(0, 0));
        let sender_key = harness.client.public_key(sender).unwrap();
        let receiver_key = harness.client.public_key(receiver).unwrap();

        harness.ledger.set_block_timestamp(8, 24_500);
        harness.ledger.set_ciphertexts(
            "0xtx",
            TransferCiphertexts {
                left: vec![Point::new("0xa1", "0x1"), Point::new("0xb1", "0x1")],
                right: Point::new("0xd", "0x1"),
            },
        );
        harness.prover.fail_balance(Point::new("0xa1", "0x1"));
        harness.prover.set_balance(Point::new("0xb1", "0x1"), 25);

        let credited = harness
            .client
            .credit_inbound_transfer(&event(
                "0xtx",
                EventKind::TransferOccurred,
                8,
                vec![sender_key, receiver_key],
            ))
            .await
            .unwrap();
        assert_eq!(credited, 1);
        assert_eq!(harness.client.confirmed_state(receiver).unwrap().pending, 25);
        assert_eq!(harness.client.confirmed_state(sender).unwrap(), funded(50, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn key_at_several_positions_is_credited_per_position() {
        let harness = Harness::start(10_000, 1_000).await;
        let account = harness.account_with(funded(0, 0));
        let ours = harness.client.public_key(account).unwrap();
        harness.ledger.set_block_timestamp(5, 950);
        harness.ledger.set_ciphertexts(
            "0xtwice",
            TransferCiphertexts {
                left: vec![
                    Point::new("0x71", "0x1"),
                    stranger(4),
                    Point::new("0x72", "0x1"),
                ],
                right: Point::new("0xd", "0x1"),
            },
        );
        harness.prover.set_balance(Point::new("0x71", "0x1"), 8);
        harness.prover.set_balance(Point::new("0x72", "0x1"), 17);

        let mut dispatcher = EventDispatcher::for_session(&harness.client);
        let outcome = dispatcher
            .dispatch(&event(
                "0xtwice",
                EventKind::TransferOccurred,
                5,
                vec![ours.clone(), stranger(4), ours],
            ))
            .await;
        assert_eq!(outcome, EventOutcome::Credited(2));
        assert_eq!(harness.client.confirmed_state(account).unwrap().pending, 25);
    }
}
