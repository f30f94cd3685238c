//! Progress tracking for wallet synchronization.
//!
//! `SyncProgressTracker` records the block heights the gateway has delivered, counts transaction
//! events, and remembers how the last sync run ended. The orchestrator feeds it from every
//! gateway event and exposes a snapshot through `sync_stats()`.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Log at most once per this many blocks unless forced.
const LOG_INTERVAL_BLOCKS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// Height of the last persisted block when the orchestrator started
    start_height: u32,
    highest_block_height: u32,
    /// Heights of merkle blocks saved during this session
    block_heights: BTreeSet<u32>,
    transactions_added: usize,
    transactions_updated: usize,
    transactions_removed: usize,
    sync_runs: usize,
    syncing: bool,
    last_error: Option<String>,
    last_logged_height: u32,
}

impl SyncProgressTracker {
    pub fn new(start_height: u32) -> Self {
        Self {
            start_height,
            highest_block_height: start_height,
            block_heights: BTreeSet::new(),
            transactions_added: 0,
            transactions_updated: 0,
            transactions_removed: 0,
            sync_runs: 0,
            syncing: false,
            last_error: None,
            last_logged_height: start_height,
        }
    }

    pub fn record_block(&mut self, height: u32) {
        if height == 0 {
            return;
        }
        self.block_heights.insert(height);
        self.record_height(height);
    }

    /// Note a chain height reported without a block, e.g. from a new tip announcement.
    pub fn record_height(&mut self, height: u32) {
        self.highest_block_height = self.highest_block_height.max(height);
    }

    pub fn record_transaction_added(&mut self) {
        self.transactions_added += 1;
    }

    pub fn record_transactions_updated(&mut self, count: usize) {
        self.transactions_updated += count;
    }

    pub fn record_transactions_removed(&mut self, count: usize) {
        self.transactions_removed += count;
    }

    /// A reorg moved the tip back; heights above it no longer count.
    pub fn rewind_to(&mut self, height: u32) {
        self.block_heights.retain(|h| *h <= height);
        self.highest_block_height = height;
        self.last_logged_height = self.last_logged_height.min(height);
    }

    pub fn sync_started(&mut self) {
        self.sync_runs += 1;
        self.syncing = true;
    }

    pub fn sync_stopped(&mut self, error: Option<&str>) {
        self.syncing = false;
        self.last_error = error.map(str::to_string);
        if let Some(error) = error {
            warn!("Sync stopped with error: {}", error);
        }
        self.log_progress(true);
    }

    /// Returns (start, end) pairs of saved heights with missing blocks between them.
    pub fn check_for_gaps(&self) -> Vec<(u32, u32)> {
        let heights: Vec<u32> = self.block_heights.iter().copied().collect();
        heights
            .windows(2)
            .filter(|w| w[1] - w[0] > 1)
            .map(|w| (w[0], w[1]))
            .collect()
    }

    pub fn log_progress(&mut self, force: bool) {
        let since_last = self
            .highest_block_height
            .saturating_sub(self.last_logged_height);
        if force || since_last >= LOG_INTERVAL_BLOCKS {
            info!(
                "Sync progress: height {}, {} blocks saved, {} transactions added",
                self.highest_block_height,
                self.block_heights.len(),
                self.transactions_added
            );
            self.last_logged_height = self.highest_block_height;
        }
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_height: self.start_height,
            highest_block_height: self.highest_block_height,
            blocks_saved: self.block_heights.len(),
            transactions_added: self.transactions_added,
            transactions_updated: self.transactions_updated,
            transactions_removed: self.transactions_removed,
            sync_runs: self.sync_runs,
            syncing: self.syncing,
            last_error: self.last_error.clone(),
            gaps: self.check_for_gaps(),
        }
    }
}

/// Snapshot of a `SyncProgressTracker`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub start_height: u32,
    pub highest_block_height: u32,
    pub blocks_saved: usize,
    pub transactions_added: usize,
    pub transactions_updated: usize,
    pub transactions_removed: usize,
    pub sync_runs: usize,
    pub syncing: bool,
    pub last_error: Option<String>,
    pub gaps: Vec<(u32, u32)>,
}

impl SyncStats {
    pub fn summary(&self) -> String {
        format!(
            "Sync from {} to {}: {} blocks, {} added, {} updated, {} removed transactions{}",
            self.start_height,
            self.highest_block_height,
            self.blocks_saved,
            self.transactions_added,
            self.transactions_updated,
            self.transactions_removed,
            if self.gaps.is_empty() {
                String::new()
            } else {
                format!(" ({} gaps)", self.gaps.len())
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_between_saved_blocks_are_reported() {
        let mut tracker = SyncProgressTracker::new(0);
        for h in [1, 2, 3, 7, 8, 20] {
            tracker.record_block(h);
        }
        tracker.record_block(0);
        let stats = tracker.get_stats();
        assert_eq!(stats.gaps, vec![(3, 7), (8, 20)]);
        assert_eq!(stats.highest_block_height, 20);
        assert_eq!(stats.blocks_saved, 6);
        assert!(stats.summary().ends_with("(2 gaps)"));
    }

    #[test]
    fn rewind_forgets_heights_above_the_fork() {
        let mut tracker = SyncProgressTracker::new(0);
        for h in [10, 11, 12] {
            tracker.record_block(h);
        }
        tracker.rewind_to(10);
        let stats = tracker.get_stats();
        assert_eq!(stats.highest_block_height, 10);
        assert_eq!(stats.blocks_saved, 1);
    }

    #[test]
    fn run_state_follows_start_and_stop() {
        let mut tracker = SyncProgressTracker::new(5);
        tracker.sync_started();
        assert!(tracker.get_stats().syncing);
        tracker.sync_stopped(Some("peer timeout"));
        let stats = tracker.get_stats();
        assert!(!stats.syncing);
        assert_eq!(stats.sync_runs, 1);
        assert_eq!(stats.last_error.as_deref(), Some("peer timeout"));
        assert_eq!(stats.start_height, 5);
    }
}
