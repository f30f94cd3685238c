//! SPV wallet ledger and sync orchestrator.
//!
//! A `Ledger` tracks one chain's transactions, UTXOs, assets and addresses. A
//! `WalletSyncOrchestrator` keeps it in step with a peer network gateway and a persistent
//! store, and the `WalletRegistry` manages one orchestrator per chain id.

pub mod config;
pub mod gateway;
pub mod ledger;
pub mod transaction;
pub mod types;
pub mod utils;
pub mod wallet;

pub use config::WalletConfig;
pub use ledger::Ledger;
pub use wallet::{SubWallet, SubWalletKind, WalletRegistry, WalletSyncOrchestrator};
