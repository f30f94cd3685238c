//! Notifications raised by ledger mutations.
//!
//! The ledger collects events while it holds its lock and hands them to a `WalletEventSink` only
//! after the lock is released, so sinks are free to call back into the ledger.

use crate::ledger::coinbase::CoinBaseUtxo;
use crate::types::{Asset, Transaction, Uint168, Uint256};

/// Application-facing ledger callbacks. Every method defaults to a no-op.
pub trait WalletListener: Send + Sync {
    fn balance_changed(&self, _asset_id: &Uint256, _balance: u128) {}

    fn on_coin_base_tx_added(&self, _utxo: &CoinBaseUtxo) {}

    fn on_coin_base_tx_updated(&self, _hashes: &[Uint256], _block_height: u32, _timestamp: u64) {}

    fn on_coin_base_spent(&self, _hashes: &[Uint256]) {}

    fn on_coin_base_tx_deleted(
        &self,
        _hash: &Uint256,
        _notify_user: bool,
        _recommend_rescan: bool,
    ) {
    }

    fn on_tx_added(&self, _tx: &Transaction) {}

    fn on_tx_updated(&self, _hashes: &[Uint256], _block_height: u32, _timestamp: u64) {}

    fn on_tx_deleted(&self, _hash: &Uint256, _notify_user: bool, _recommend_rescan: bool) {}

    fn on_asset_registered(&self, _asset: &Asset, _amount: u64, _controller: &Uint168) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    BalanceChanged {
        asset_id: Uint256,
        balance: u128,
    },
    CoinBaseTxAdded(CoinBaseUtxo),
    CoinBaseTxUpdated {
        hashes: Vec<Uint256>,
        block_height: u32,
        timestamp: u64,
    },
    CoinBaseSpent {
        hashes: Vec<Uint256>,
    },
    CoinBaseTxDeleted {
        hash: Uint256,
        notify_user: bool,
        recommend_rescan: bool,
    },
    TxAdded(Box<Transaction>),
    TxUpdated {
        hashes: Vec<Uint256>,
        block_height: u32,
        timestamp: u64,
    },
    TxDeleted {
        hash: Uint256,
        notify_user: bool,
        recommend_rescan: bool,
    },
    AssetRegistered {
        asset: Asset,
        amount: u64,
        controller: Uint168,
    },
}

impl WalletEvent {
    /// Invoke the matching callback on `listener`.
    pub fn deliver_to(&self, listener: &dyn WalletListener) {
        match self {
            WalletEvent::BalanceChanged { asset_id, balance } => {
                listener.balance_changed(asset_id, *balance)
            }
            WalletEvent::CoinBaseTxAdded(utxo) => listener.on_coin_base_tx_added(utxo),
            WalletEvent::CoinBaseTxUpdated {
                hashes,
                block_height,
                timestamp,
            } => listener.on_coin_base_tx_updated(hashes, *block_height, *timestamp),
            WalletEvent::CoinBaseSpent { hashes } => listener.on_coin_base_spent(hashes),
            WalletEvent::CoinBaseTxDeleted {
                hash,
                notify_user,
                recommend_rescan,
            } => listener.on_coin_base_tx_deleted(hash, *notify_user, *recommend_rescan),
            WalletEvent::TxAdded(tx) => listener.on_tx_added(tx),
            WalletEvent::TxUpdated {
                hashes,
                block_height,
                timestamp,
            } => listener.on_tx_updated(hashes, *block_height, *timestamp),
            WalletEvent::TxDeleted {
                hash,
                notify_user,
                recommend_rescan,
            } => listener.on_tx_deleted(hash, *notify_user, *recommend_rescan),
            WalletEvent::AssetRegistered {
                asset,
                amount,
                controller,
            } => listener.on_asset_registered(asset, *amount, controller),
        }
    }
}

/// Receives batches of ledger events in the order they were raised.
pub trait WalletEventSink: Send + Sync {
    fn deliver(&self, events: Vec<WalletEvent>);
}

/// Sink for ledgers nobody is listening to.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardEvents;

impl WalletEventSink for DiscardEvents {
    fn deliver(&self, _events: Vec<WalletEvent>) {}
}
