//! Wallet Synchronization Module
//!
//! Everything that keeps one sub-wallet's ledger in step with its peer network gateway:
//!
//! - `orchestrator`: owns the ledger, the gateway and the store, and applies gateway events in
//!   persist, ledger, notify order.
//! - `events`: listener traits and the `NotificationHub` that delivers to them off-thread.
//! - `reconnect`: the single reconnect timer.
//! - `repositories`: the `WalletStore` contract with in-memory and JSON file implementations.
//! - `state_persistence`: cold-start loading and record writes on top of a `WalletStore`.
//! - `transaction_processor`: conversion between chain types and stored records.
//! - `progress_tracker`: heights, gaps and counters for `sync_stats()`.

/// Listener traits and the notification hub
pub mod events;
/// Per-chain coordinator of ledger, gateway and store
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Single reconnect timer
pub mod reconnect;
/// Persistence contract and store implementations
pub mod repositories;
/// Loading and saving through a store
pub mod state_persistence;
/// Record conversion and validation
pub mod transaction_processor;

pub use events::{NotificationHub, PeerManagerListener, SyncEvent};
pub use orchestrator::WalletSyncOrchestrator;
pub use progress_tracker::SyncStats;
pub use reconnect::ReconnectState;
pub use repositories::{FileWalletStore, MemoryWalletStore, StoreError, WalletStore};
