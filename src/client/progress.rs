//! Progress tracking for the ledger event feed.

use super::events::EventOutcome;

use tracing::info;

/// Blocks between two periodic progress lines.
const LOG_INTERVAL_BLOCKS: u64 = 1000;

/// Counts what the feed consumer did with each event.
#[derive(Debug, Clone, Default)]
pub struct FeedProgress {
    /// The highest block number seen
    highest_block: u64,
    /// Whether any event arrived at all
    has_processed_events: bool,
    confirmations: usize,
    inbound_credits: usize,
    unrelated: usize,
    errors: usize,
    /// Block at which progress was last logged
    last_logged_block: u64,
}

impl FeedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event from `block` and what was done with it.
    pub fn record(&mut self, block: u64, outcome: EventOutcome) {
        self.highest_block = self.highest_block.max(block);
        self.has_processed_events = true;
        match outcome {
            EventOutcome::Confirmed => self.confirmations += 1,
            EventOutcome::Credited(_) => self.inbound_credits += 1,
            EventOutcome::Ignored => self.unrelated += 1,
        }
    }

    /// Record a feed item that could not be decoded.
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Log progress every `LOG_INTERVAL_BLOCKS` blocks, or now if forced.
    pub fn log_progress(&mut self, force: bool) {
        let blocks_since_last_log = self.highest_block.saturating_sub(self.last_logged_block);
        let should_log = force || blocks_since_last_log >= LOG_INTERVAL_BLOCKS;

        if should_log && self.has_processed_events {
            info!(
                "Feed progress: {} confirmations, {} inbound transfers up to block {}",
                self.confirmations, self.inbound_credits, self.highest_block
            );
            self.last_logged_block = self.highest_block;
        }
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            highest_block: self.highest_block,
            has_processed_events: self.has_processed_events,
            confirmations: self.confirmations,
            inbound_credits: self.inbound_credits,
            unrelated: self.unrelated,
            errors: self.errors,
        }
    }
}

/// Statistics of one run of the event feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStats {
    pub highest_block: u64,
    pub has_processed_events: bool,
    pub confirmations: usize,
    pub inbound_credits: usize,
    pub unrelated: usize,
    pub errors: usize,
}

impl FeedStats {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "up to block {}: {} confirmations, {} inbound transfers, {} unrelated events{}",
            self.highest_block,
            self.confirmations,
            self.inbound_credits,
            self.unrelated,
            if self.errors == 0 {
                String::new()
            } else {
                format!(" ({} feed errors)", self.errors)
            }
        )
    }
}
