//! In-memory ledger for one chain: transaction set, UTXO partitions, assets and addresses.
//!
//! All state sits behind one mutex. Each public operation holds it for its whole duration and
//! releases it before the collected `WalletEvent`s are handed to the event sink.

pub mod address;
pub mod asset;
pub mod coinbase;
pub mod listener;
pub mod selection;
mod state;
pub mod utxo;

pub use address::{AccountSource, SeedAccount, SubAccount};
pub use asset::{BalanceType, GroupedAsset};
pub use coinbase::{COINBASE_MATURITY, CoinBaseUtxo};
pub use listener::{DiscardEvents, WalletEvent, WalletEventSink, WalletListener};
pub use utxo::{Utxo, UtxoPartitions, UtxoState};

use crate::config::LedgerConfig;
use crate::ledger::selection::{MAX_FEE_PER_KB, MIN_FEE_PER_KB};
use crate::types::{Address, Asset, Transaction, TransactionOutput, Uint256};
use serde::Serialize;
use state::LedgerState;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Reasons `create_transaction` refuses to build a candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("outputs must all carry the same asset")]
    MixedAssets,

    #[error("unknown asset {0}")]
    UnknownAsset(Uint256),

    #[error("output amount {amount} is below the dust threshold {threshold}")]
    DustOutput { amount: u64, threshold: u64 },

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("transaction size {size} exceeds the maximum transaction size")]
    TxTooLarge { size: usize },

    #[error("amount overflow")]
    AmountOverflow,

    #[error("fee per kB {0} is outside the relay policy range")]
    FeeOutOfRange(u64),
}

/// One entry of a removal cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemovedTransaction {
    pub hash: Uint256,
    /// The wallet sent funds in this transaction and it was valid.
    pub notify_user: bool,
    /// Additionally, every parent was confirmed, so the removal points at a chain problem.
    pub recommend_rescan: bool,
}

pub struct Ledger {
    state: Mutex<LedgerState>,
    sink: Arc<dyn WalletEventSink>,
}

impl Ledger {
    /// Create an empty ledger with the native asset installed and the first address batch derived.
    pub fn new(
        chain_id: impl Into<String>,
        account: Arc<dyn SubAccount>,
        config: LedgerConfig,
        sink: Arc<dyn WalletEventSink>,
    ) -> Self {
        Self {
            state: Mutex::new(LedgerState::new(chain_id.into(), account, config)),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock, then deliver whatever events it raised.
    fn mutate<R>(&self, f: impl FnOnce(&mut LedgerState, &mut Vec<WalletEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut state = self.lock();
            f(&mut state, &mut events)
        };
        if !events.is_empty() {
            self.sink.deliver(events);
        }
        result
    }

    pub fn chain_id(&self) -> String {
        self.lock().chain_id.clone()
    }

    /// Seed the ledger from persisted transactions without raising events.
    ///
    /// Records are retried until no more can be placed, so a child stored before its parent is
    /// still admitted once the parent is in. Returns how many were registered.
    pub fn load_transactions(&self, txs: Vec<Transaction>) -> usize {
        let mut state = self.lock();
        let mut discarded = Vec::new();
        let mut pending = txs;
        let mut registered = 0;
        loop {
            let before = registered;
            let mut rejected = Vec::new();
            for tx in pending {
                if state.register(tx.clone(), &mut discarded) || state.registers_known_asset(&tx) {
                    registered += 1;
                } else {
                    rejected.push(tx);
                }
            }
            if registered == before || rejected.is_empty() {
                if !rejected.is_empty() {
                    debug!(
                        "{} persisted transactions are not relevant to this wallet",
                        rejected.len()
                    );
                }
                break;
            }
            pending = rejected;
        }
        registered
    }

    // ---- transaction set ----

    /// Insert `tx` if it is new and relevant. Returns whether the set changed.
    pub fn register_transaction(&self, tx: Transaction) -> bool {
        self.mutate(|state, events| state.register(tx, events))
    }

    /// Register-asset transactions are kept in the store even when they pay nothing to the
    /// wallet: the asset they install only comes back on restart if they are loaded again.
    pub fn registers_known_asset(&self, tx: &Transaction) -> bool {
        self.lock().registers_known_asset(tx)
    }

    /// Remove `hash` and everything spending from it, children first.
    pub fn remove_transaction(&self, hash: &Uint256) -> Vec<RemovedTransaction> {
        self.mutate(|state, events| state.remove(hash, events))
    }

    /// Hashes `remove_transaction(hash)` would remove, children first.
    pub fn removal_set(&self, hash: &Uint256) -> Vec<Uint256> {
        self.lock().removal_set(hash)
    }

    pub fn update_transactions(&self, hashes: &[Uint256], block_height: u32, timestamp: u64) {
        self.mutate(|state, events| state.update(hashes, block_height, timestamp, events))
    }

    pub fn transaction_is_valid(&self, tx: &Transaction) -> bool {
        self.lock().is_valid(tx)
    }

    pub fn contains_transaction(&self, hash: &Uint256) -> bool {
        self.lock().contains(hash)
    }

    pub fn transaction_for_hash(&self, hash: &Uint256) -> Option<Transaction> {
        self.lock().transaction(hash).cloned()
    }

    pub fn coin_base_for_hash(&self, hash: &Uint256) -> Option<CoinBaseUtxo> {
        self.lock().coinbase_for_hash(hash).cloned()
    }

    /// All transactions in ascending order.
    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.lock().ordered().cloned().collect()
    }

    pub fn tx_unconfirmed_before(&self, block_height: u32) -> Vec<Transaction> {
        self.lock().unconfirmed_before(block_height)
    }

    pub fn set_tx_unconfirmed_after(&self, block_height: u32) {
        self.mutate(|state, events| state.set_unconfirmed_after(block_height, events))
    }

    /// Whether `a` must come after `b`: `a` spends from `b`, directly or transitively.
    pub fn tx_is_ascending(&self, a: &Uint256, b: &Uint256) -> bool {
        self.lock().tx_is_ascending(a, b)
    }

    pub fn tx_compare(&self, a: &Uint256, b: &Uint256) -> Ordering {
        self.lock().tx_compare(a, b)
    }

    pub fn amount_sent_by_tx(&self, tx: &Transaction) -> u128 {
        self.lock().amount_sent_by_tx(tx)
    }

    pub fn register_remark(&self, hash: &Uint256, remark: &str) {
        self.lock().register_remark(hash, remark)
    }

    pub fn get_remark(&self, hash: &Uint256) -> Option<String> {
        self.lock().remark(hash)
    }

    // ---- chain height ----

    pub fn block_height(&self) -> u32 {
        self.lock().block_height
    }

    pub fn set_block_height(&self, block_height: u32) {
        self.mutate(|state, events| state.set_block_height(block_height, events))
    }

    // ---- balances and outputs ----

    pub fn get_balance(&self, asset_id: &Uint256, kind: BalanceType) -> u128 {
        self.lock().balance(asset_id, kind, None)
    }

    pub fn get_balance_with_address(
        &self,
        asset_id: &Uint256,
        address: &Address,
        kind: BalanceType,
    ) -> u128 {
        self.lock().balance(asset_id, kind, Some(address))
    }

    /// Owned outputs no transaction in the set spends, reserved ones included.
    pub fn get_all_utxo(&self) -> Vec<Utxo> {
        let state = self.lock();
        state
            .grouped_assets()
            .flat_map(|ga| ga.utxos().iter().cloned())
            .collect()
    }

    pub fn get_all_coin_base_utxo(&self) -> Vec<CoinBaseUtxo> {
        self.lock().coinbase().to_vec()
    }

    pub fn utxo_partitions(&self) -> UtxoPartitions {
        self.lock().partitions()
    }

    pub fn get_balance_info(&self) -> serde_json::Value {
        let state = self.lock();
        let info: Vec<serde_json::Value> = state
            .grouped_assets()
            .map(|ga| {
                let id = ga.id();
                serde_json::json!({
                    "AssetID": id.to_hex(),
                    "Name": ga.asset().name,
                    "Summary": {
                        "Balance": state.balance(&id, BalanceType::Confirmed, None).to_string(),
                        "PendingBalance": state.balance(&id, BalanceType::Pending, None).to_string(),
                        "VotedBalance": state.balance(&id, BalanceType::Voted, None).to_string(),
                        "TotalBalance": state.balance(&id, BalanceType::Total, None).to_string(),
                    },
                    "UTXOCount": ga.utxos().len(),
                })
            })
            .collect();
        serde_json::Value::Array(info)
    }

    // ---- assets ----

    pub fn install_default_asset(&self) -> bool {
        self.lock().install_asset(Asset::native())
    }

    pub fn asset_name_exist(&self, name: &str) -> bool {
        self.lock().asset_name_exists(name)
    }

    pub fn get_asset(&self, asset_id: &Uint256) -> Option<Asset> {
        self.lock().asset(asset_id).cloned()
    }

    pub fn native_asset_id(&self) -> Uint256 {
        self.lock().native_id()
    }

    pub fn get_all_assets(&self) -> serde_json::Value {
        let state = self.lock();
        let assets: Vec<serde_json::Value> = state
            .grouped_assets()
            .map(|ga| {
                let mut value = serde_json::to_value(ga.asset()).unwrap_or(serde_json::Value::Null);
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("id".to_string(), serde_json::Value::String(ga.id().to_hex()));
                }
                value
            })
            .collect();
        serde_json::Value::Array(assets)
    }

    // ---- fees ----

    pub fn get_fee_per_kb(&self) -> u64 {
        self.lock().fee_per_kb
    }

    pub fn set_fee_per_kb(&self, fee_per_kb: u64) -> Result<(), LedgerError> {
        if !(MIN_FEE_PER_KB..=MAX_FEE_PER_KB).contains(&fee_per_kb) {
            return Err(LedgerError::FeeOutOfRange(fee_per_kb));
        }
        self.lock().fee_per_kb = fee_per_kb;
        Ok(())
    }

    pub fn get_default_fee_per_kb(&self) -> u64 {
        self.lock().config.fee_per_kb
    }

    // ---- addresses ----

    /// The next `gap_limit` unused addresses of a chain, deriving more as needed.
    pub fn unused_addresses(&self, gap_limit: u32, internal: bool) -> Vec<Address> {
        self.lock().addresses.unused_addresses(gap_limit, internal)
    }

    /// First unused receive address.
    pub fn get_receive_address(&self) -> Address {
        let mut state = self.lock();
        let gap = state.config.external_gap_limit.max(1);
        state.addresses.unused_addresses(gap, false)[0]
    }

    /// Derived addresses: the external chain, then the internal chain when asked for.
    pub fn get_all_addresses(
        &self,
        start: usize,
        count: usize,
        include_internal: bool,
    ) -> Vec<Address> {
        let state = self.lock();
        let internal: &[Address] = if include_internal {
            state.addresses.chain(true)
        } else {
            &[]
        };
        state
            .addresses
            .chain(false)
            .iter()
            .chain(internal)
            .skip(start)
            .take(count)
            .copied()
            .collect()
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        self.lock().is_ours(address)
    }

    pub fn address_is_used(&self, address: &Address) -> bool {
        self.lock().addresses.is_used(address)
    }

    /// Watch additional addresses that are not part of the derived chains.
    pub fn init_listening_addresses(&self, addresses: Vec<Address>) {
        self.lock().set_listening(addresses)
    }

    pub fn get_listening_addrs(&self) -> Vec<Address> {
        self.lock().listening().to_vec()
    }

    // ---- construction ----

    /// Build an unsigned candidate paying `outputs`, reserving the inputs it selects.
    pub fn create_transaction(
        &self,
        from: Option<&Address>,
        outputs: Vec<TransactionOutput>,
        memo: &str,
        use_voted_utxo: bool,
        auto_reduce_output_amount: bool,
    ) -> Result<Transaction, LedgerError> {
        let result = self.mutate(|state, events| {
            state.create_transaction(
                from,
                outputs,
                memo,
                use_voted_utxo,
                auto_reduce_output_amount,
                events,
            )
        });
        if let Err(e) = &result {
            debug!("Transaction creation rejected: {}", e);
        }
        result
    }

    /// Give back the inputs a candidate reserved. Returns how many were released.
    pub fn release_transaction(&self, tx: &Transaction) -> usize {
        self.mutate(|state, events| state.release(tx, events))
    }
}
