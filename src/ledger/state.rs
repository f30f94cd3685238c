//! Lock-protected ledger state. Every method here runs with the ledger mutex held.

use crate::config::LedgerConfig;
use crate::ledger::address::AddressChains;
use crate::ledger::asset::{BalanceType, BalanceView, GroupedAsset};
use crate::ledger::coinbase::CoinBaseUtxo;
use crate::ledger::listener::WalletEvent;
use crate::ledger::selection::{
    SelectionRequest, TX_MAX_SIZE, TX_MIN_OUTPUT_AMOUNT, estimate_size, select_coins,
};
use crate::ledger::utxo::{Utxo, UtxoPartitions};
use crate::ledger::{LedgerError, RemovedTransaction};
use crate::types::{
    Address, Asset, OutPoint, TX_UNCONFIRMED, Transaction, TransactionInput, TransactionOutput,
    TxPayload, Uint256,
};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

struct TxEntry {
    tx: Transaction,
    seq: u64,
}

pub(crate) struct LedgerState {
    pub chain_id: String,
    pub config: LedgerConfig,
    pub fee_per_kb: u64,
    pub block_height: u32,
    native_id: Uint256,
    assets: BTreeMap<Uint256, GroupedAsset>,
    txs: HashMap<Uint256, TxEntry>,
    /// Hashes in ascending order: parents before children, then height, then arrival.
    order: Vec<Uint256>,
    next_seq: u64,
    invalid: HashSet<Uint256>,
    removed: HashSet<Uint256>,
    spent: BTreeSet<OutPoint>,
    /// Outpoint reserved by a candidate transaction, keyed to the candidate's hash.
    spending: BTreeMap<OutPoint, Uint256>,
    coinbase: Vec<CoinBaseUtxo>,
    pub addresses: AddressChains,
    listening: Vec<Address>,
    remarks: HashMap<Uint256, String>,
}

impl LedgerState {
    pub fn new(
        chain_id: String,
        account: Arc<dyn crate::ledger::SubAccount>,
        config: LedgerConfig,
    ) -> Self {
        let mut state = Self {
            chain_id,
            fee_per_kb: config.fee_per_kb,
            config,
            block_height: 0,
            native_id: Asset::native_id(),
            assets: BTreeMap::new(),
            txs: HashMap::new(),
            order: Vec::new(),
            next_seq: 0,
            invalid: HashSet::new(),
            removed: HashSet::new(),
            spent: BTreeSet::new(),
            spending: BTreeMap::new(),
            coinbase: Vec::new(),
            addresses: AddressChains::new(account),
            listening: Vec::new(),
            remarks: HashMap::new(),
        };
        state.install_asset(Asset::native());
        state.extend_address_chains();
        state
    }

    pub fn native_id(&self) -> Uint256 {
        self.native_id
    }

    fn view(&self) -> BalanceView<'_> {
        BalanceView {
            chain_height: self.block_height,
            spending: &self.spending,
            coinbase: &self.coinbase,
        }
    }

    // ---- assets ----

    pub fn install_asset(&mut self, asset: Asset) -> bool {
        let id = asset.id();
        if self.assets.contains_key(&id) {
            return false;
        }
        self.assets.insert(id, GroupedAsset::new(asset));
        true
    }

    pub fn asset(&self, id: &Uint256) -> Option<&Asset> {
        self.assets.get(id).map(GroupedAsset::asset)
    }

    pub fn asset_name_exists(&self, name: &str) -> bool {
        self.assets.values().any(|ga| ga.asset().name == name)
    }

    pub fn grouped_assets(&self) -> impl Iterator<Item = &GroupedAsset> {
        self.assets.values()
    }

    pub fn balance(
        &self,
        asset_id: &Uint256,
        kind: BalanceType,
        address: Option<&Address>,
    ) -> u128 {
        let view = self.view();
        self.assets
            .get(asset_id)
            .map(|ga| ga.balance(kind, &view, address))
            .unwrap_or(0)
    }

    fn totals(&self) -> BTreeMap<Uint256, u128> {
        self.assets
            .keys()
            .map(|id| (*id, self.balance(id, BalanceType::Total, None)))
            .collect()
    }

    fn push_balance_changes(
        &self,
        before: &BTreeMap<Uint256, u128>,
        events: &mut Vec<WalletEvent>,
    ) {
        for (asset_id, balance) in self.totals() {
            if before.get(&asset_id).copied().unwrap_or(0) != balance {
                events.push(WalletEvent::BalanceChanged { asset_id, balance });
            }
        }
    }

    // ---- addresses ----

    pub fn is_ours(&self, address: &Address) -> bool {
        self.addresses.contains(address) || self.listening.contains(address)
    }

    fn extend_address_chains(&mut self) {
        let (external, internal) = (self.config.external_gap_limit, self.config.internal_gap_limit);
        self.addresses.unused_addresses(external, false);
        self.addresses.unused_addresses(internal, true);
    }

    fn mark_used(&mut self, tx: &Transaction) {
        let mut touched = false;
        for output in tx.outputs() {
            touched |= self.addresses.mark_used(&output.program_hash);
        }
        if touched {
            self.extend_address_chains();
        }
    }

    pub fn set_listening(&mut self, addresses: Vec<Address>) {
        self.listening = addresses;
        self.rebuild();
    }

    pub fn listening(&self) -> &[Address] {
        &self.listening
    }

    // ---- ordering ----

    fn sort_key(&self, hash: &Uint256) -> (u32, u64, Uint256) {
        match self.txs.get(hash) {
            Some(e) => (e.tx.block_height(), e.seq, *hash),
            None => (TX_UNCONFIRMED, u64::MAX, *hash),
        }
    }

    /// True when `a` spends, directly or through other transactions in the set, an output of `b`.
    pub fn tx_is_ascending(&self, a: &Uint256, b: &Uint256) -> bool {
        let Some(entry) = self.txs.get(a) else {
            return false;
        };
        let mut stack: Vec<Uint256> =
            entry.tx.inputs().iter().map(|i| i.previous.tx_hash).collect();
        let mut seen = HashSet::new();
        while let Some(parent) = stack.pop() {
            if parent == *b {
                return true;
            }
            if !seen.insert(parent) {
                continue;
            }
            if let Some(p) = self.txs.get(&parent) {
                stack.extend(p.tx.inputs().iter().map(|i| i.previous.tx_hash));
            }
        }
        false
    }

    pub fn tx_compare(&self, a: &Uint256, b: &Uint256) -> Ordering {
        if self.tx_is_ascending(a, b) {
            return Ordering::Greater;
        }
        if self.tx_is_ascending(b, a) {
            return Ordering::Less;
        }
        let (ha, sa, _) = self.sort_key(a);
        let (hb, sb, _) = self.sort_key(b);
        ha.cmp(&hb).then(sa.cmp(&sb))
    }

    /// Recompute `order` as a topological sort, breaking ties by height then arrival.
    fn resort(&mut self) {
        let mut pending: HashMap<Uint256, usize> = HashMap::with_capacity(self.txs.len());
        let mut children: HashMap<Uint256, Vec<Uint256>> = HashMap::new();
        for (hash, entry) in &self.txs {
            let parents: BTreeSet<Uint256> = entry
                .tx
                .inputs()
                .iter()
                .map(|i| i.previous.tx_hash)
                .filter(|p| p != hash && self.txs.contains_key(p))
                .collect();
            pending.insert(*hash, parents.len());
            for parent in parents {
                children.entry(parent).or_default().push(*hash);
            }
        }

        let mut ready: BinaryHeap<Reverse<(u32, u64, Uint256)>> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(h, _)| Reverse(self.sort_key(h)))
            .collect();
        let mut order = Vec::with_capacity(self.txs.len());
        while let Some(Reverse((_, _, hash))) = ready.pop() {
            order.push(hash);
            for child in children.get(&hash).into_iter().flatten() {
                if let Some(n) = pending.get_mut(child) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push(Reverse(self.sort_key(child)));
                    }
                }
            }
        }
        self.order = order;
    }

    // ---- partitions ----

    /// Recompute validity, spent outputs and per-asset UTXOs by replaying the ordered set.
    fn rebuild(&mut self) {
        for ga in self.assets.values_mut() {
            ga.clear();
        }
        self.spent.clear();
        self.invalid.clear();

        let order = self.order.clone();
        for hash in &order {
            let Some(entry) = self.txs.get(hash) else {
                continue;
            };
            let tx = &entry.tx;
            let conflicted = tx.inputs().iter().any(|i| {
                self.spent.contains(&i.previous) || self.invalid.contains(&i.previous.tx_hash)
            });
            if conflicted {
                self.invalid.insert(*hash);
                continue;
            }
            for input in tx.inputs() {
                self.spent.insert(input.previous);
            }
            for (index, output) in tx.outputs().iter().enumerate() {
                let Ok(index) = u16::try_from(index) else {
                    break;
                };
                if !(self.addresses.contains(&output.program_hash)
                    || self.listening.contains(&output.program_hash))
                {
                    continue;
                }
                if let Some(ga) = self.assets.get_mut(&output.asset_id) {
                    ga.add_utxo(Utxo {
                        outpoint: OutPoint::new(*hash, index),
                        amount: output.amount,
                        asset_id: output.asset_id,
                        address: output.program_hash,
                        block_height: tx.block_height(),
                        output_type: output.output_type,
                    });
                }
            }
        }

        let spent = &self.spent;
        let mut live: HashSet<OutPoint> = HashSet::new();
        for ga in self.assets.values_mut() {
            let stale: Vec<OutPoint> = ga
                .utxos()
                .iter()
                .filter(|u| spent.contains(&u.outpoint))
                .map(|u| u.outpoint)
                .collect();
            for outpoint in stale {
                ga.remove_utxo(&outpoint);
            }
            live.extend(ga.utxos().iter().map(|u| u.outpoint));
        }
        for cb in &mut self.coinbase {
            cb.spent = spent.contains(&cb.outpoint);
            if !cb.spent {
                live.insert(cb.outpoint);
            }
        }
        self.spending.retain(|outpoint, _| live.contains(outpoint));
    }

    fn spent_coinbase(&self) -> HashSet<Uint256> {
        self.coinbase.iter().filter(|cb| cb.spent).map(CoinBaseUtxo::tx_hash).collect()
    }

    pub fn partitions(&self) -> UtxoPartitions {
        let mut partitions = UtxoPartitions::default();
        for ga in self.assets.values() {
            for utxo in ga.utxos() {
                if self.spending.contains_key(&utxo.outpoint) {
                    partitions.spending.push(utxo.clone());
                } else {
                    partitions.unspent.push(utxo.clone());
                }
            }
        }
        for hash in &self.order {
            if self.invalid.contains(hash) {
                continue;
            }
            let Some(entry) = self.txs.get(hash) else {
                continue;
            };
            for (index, output) in entry.tx.outputs().iter().enumerate() {
                let Ok(index) = u16::try_from(index) else {
                    break;
                };
                let outpoint = OutPoint::new(*hash, index);
                if self.spent.contains(&outpoint)
                    && self.is_ours(&output.program_hash)
                    && self.assets.contains_key(&output.asset_id)
                {
                    partitions.spent.push(Utxo {
                        outpoint,
                        amount: output.amount,
                        asset_id: output.asset_id,
                        address: output.program_hash,
                        block_height: entry.tx.block_height(),
                        output_type: output.output_type,
                    });
                }
            }
        }
        partitions
    }

    // ---- transaction set ----

    pub fn contains(&self, hash: &Uint256) -> bool {
        self.txs.contains_key(hash) || self.coinbase_for_hash(hash).is_some()
    }

    pub fn transaction(&self, hash: &Uint256) -> Option<&Transaction> {
        self.txs.get(hash).map(|e| &e.tx)
    }

    pub fn coinbase_for_hash(&self, hash: &Uint256) -> Option<&CoinBaseUtxo> {
        self.coinbase.iter().find(|cb| cb.tx_hash() == *hash)
    }

    pub fn coinbase(&self) -> &[CoinBaseUtxo] {
        &self.coinbase
    }

    pub fn ordered(&self) -> impl Iterator<Item = &Transaction> {
        self.order.iter().filter_map(|h| self.txs.get(h).map(|e| &e.tx))
    }

    /// Owned output a given outpoint refers to, looking at the set and the coinbase list.
    fn owned_output(&self, outpoint: &OutPoint) -> Option<u64> {
        if let Some(parent) = self.txs.get(&outpoint.tx_hash) {
            let output = parent.tx.outputs().get(outpoint.index as usize)?;
            return self.is_ours(&output.program_hash).then_some(output.amount);
        }
        self.coinbase
            .iter()
            .find(|cb| cb.outpoint == *outpoint)
            .map(|cb| cb.amount)
    }

    fn is_relevant(&self, tx: &Transaction) -> bool {
        tx.outputs().iter().any(|o| self.is_ours(&o.program_hash))
            || tx.inputs().iter().any(|i| self.owned_output(&i.previous).is_some())
    }

    pub fn amount_sent_by_tx(&self, tx: &Transaction) -> u128 {
        tx.inputs()
            .iter()
            .filter_map(|i| self.owned_output(&i.previous))
            .map(u128::from)
            .sum()
    }

    pub fn is_valid(&self, tx: &Transaction) -> bool {
        let hash = tx.hash();
        if self.txs.contains_key(&hash) {
            return !self.invalid.contains(&hash);
        }

        let mut totals: HashMap<Uint256, u64> = HashMap::new();
        for output in tx.outputs() {
            let total = totals.entry(output.asset_id).or_insert(0);
            match total.checked_add(output.amount) {
                Some(sum) => *total = sum,
                None => return false,
            }
        }

        tx.inputs().iter().all(|i| {
            !self.spent.contains(&i.previous)
                && !self.invalid.contains(&i.previous.tx_hash)
                && self.spending.get(&i.previous).is_none_or(|owner| *owner == hash)
        })
    }

    /// Whether `tx` registers an asset this ledger has installed.
    pub fn registers_known_asset(&self, tx: &Transaction) -> bool {
        match tx.payload() {
            TxPayload::RegisterAsset(payload) => self.assets.contains_key(&payload.asset.id()),
            _ => false,
        }
    }

    pub fn register(&mut self, mut tx: Transaction, events: &mut Vec<WalletEvent>) -> bool {
        let hash = tx.hash();
        if self.removed.contains(&hash) {
            debug!("Ignoring transaction {} that was removed earlier", hash);
            return false;
        }
        if self.contains(&hash) {
            return false;
        }

        let before = self.totals();
        let coinbase_spent_before = self.spent_coinbase();

        let mut asset_installed = false;
        if let TxPayload::RegisterAsset(payload) = tx.payload() {
            if self.install_asset(payload.asset.clone()) {
                asset_installed = true;
                events.push(WalletEvent::AssetRegistered {
                    asset: payload.asset.clone(),
                    amount: payload.amount,
                    controller: payload.controller,
                });
            }
        }

        let inserted = if tx.is_coin_base() {
            self.register_coinbase(&tx, events)
        } else if self.is_relevant(&tx) {
            self.mark_used(&tx);
            if let Some(remark) = self.remarks.get(&hash) {
                tx.set_remark(remark.clone());
            }
            let seq = self.next_seq;
            self.next_seq += 1;
            self.txs.insert(hash, TxEntry { tx: tx.clone(), seq });
            self.resort();
            events.push(WalletEvent::TxAdded(Box::new(tx)));
            true
        } else {
            false
        };

        if !inserted && !asset_installed {
            return false;
        }

        self.rebuild();

        let newly_spent: Vec<Uint256> = self
            .spent_coinbase()
            .difference(&coinbase_spent_before)
            .copied()
            .collect();
        if !newly_spent.is_empty() {
            events.push(WalletEvent::CoinBaseSpent { hashes: newly_spent });
        }
        self.push_balance_changes(&before, events);
        inserted
    }

    fn register_coinbase(&mut self, tx: &Transaction, events: &mut Vec<WalletEvent>) -> bool {
        let owned = tx
            .outputs()
            .iter()
            .enumerate()
            .find_map(|(index, o)| {
                let index = u16::try_from(index).ok()?;
                self.is_ours(&o.program_hash).then_some((index, o))
            });
        let Some((index, output)) = owned else {
            return false;
        };

        let utxo = CoinBaseUtxo {
            outpoint: OutPoint::new(tx.hash(), index),
            amount: output.amount,
            asset_id: output.asset_id,
            address: output.program_hash,
            block_height: tx.block_height(),
            timestamp: tx.timestamp(),
            spent: false,
        };
        self.mark_used(tx);
        self.coinbase.push(utxo.clone());
        events.push(WalletEvent::CoinBaseTxAdded(utxo));
        true
    }

    /// The transaction and everything that transitively spends from it, children first.
    ///
    /// A coinbase root has no place in `order` and comes last.
    pub fn removal_set(&self, hash: &Uint256) -> Vec<Uint256> {
        let coinbase_root = !self.txs.contains_key(hash);
        if coinbase_root && self.coinbase_for_hash(hash).is_none() {
            return Vec::new();
        }
        let mut members: HashSet<Uint256> = HashSet::from([*hash]);
        let mut frontier = vec![*hash];
        while let Some(parent) = frontier.pop() {
            for (child, entry) in &self.txs {
                if !members.contains(child) && entry.tx.spends_from(&parent) {
                    members.insert(*child);
                    frontier.push(*child);
                }
            }
        }
        let mut doomed: Vec<Uint256> = self
            .order
            .iter()
            .rev()
            .filter(|h| members.contains(h))
            .copied()
            .collect();
        if coinbase_root {
            doomed.push(*hash);
        }
        doomed
    }

    fn removal_flags(&self, tx: &Transaction) -> (bool, bool) {
        let notify_user = self.amount_sent_by_tx(tx) > 0 && !self.invalid.contains(&tx.hash());
        let recommend_rescan = notify_user
            && tx.inputs().iter().all(|i| {
                let parent = &i.previous.tx_hash;
                self.txs.get(parent).is_some_and(|p| p.tx.is_confirmed())
                    || self
                        .coinbase_for_hash(parent)
                        .is_some_and(|cb| cb.block_height != TX_UNCONFIRMED)
            });
        (notify_user, recommend_rescan)
    }

    pub fn remove(
        &mut self,
        hash: &Uint256,
        events: &mut Vec<WalletEvent>,
    ) -> Vec<RemovedTransaction> {
        let doomed = self.removal_set(hash);
        if doomed.is_empty() {
            return Vec::new();
        }
        let before = self.totals();

        // Flags are taken before anything is deleted; they look at parents and coinbase outputs.
        let removed: Vec<RemovedTransaction> = doomed
            .iter()
            .map(|h| {
                let (notify_user, recommend_rescan) = match self.txs.get(h) {
                    Some(entry) => self.removal_flags(&entry.tx),
                    None => (false, false),
                };
                RemovedTransaction {
                    hash: *h,
                    notify_user,
                    recommend_rescan,
                }
            })
            .collect();

        let mut reorder = false;
        for r in &removed {
            self.remarks.remove(&r.hash);
            self.removed.insert(r.hash);
            if self.txs.remove(&r.hash).is_some() {
                reorder = true;
                events.push(WalletEvent::TxDeleted {
                    hash: r.hash,
                    notify_user: r.notify_user,
                    recommend_rescan: r.recommend_rescan,
                });
            } else {
                self.coinbase.retain(|cb| cb.tx_hash() != r.hash);
                events.push(WalletEvent::CoinBaseTxDeleted {
                    hash: r.hash,
                    notify_user: false,
                    recommend_rescan: false,
                });
            }
        }
        if reorder {
            self.resort();
        }
        self.rebuild();
        self.push_balance_changes(&before, events);
        removed
    }

    pub fn update(
        &mut self,
        hashes: &[Uint256],
        block_height: u32,
        timestamp: u64,
        events: &mut Vec<WalletEvent>,
    ) {
        let before = self.totals();
        let mut updated = Vec::new();
        let mut coinbase_updated = Vec::new();

        for hash in hashes {
            if let Some(entry) = self.txs.get_mut(hash) {
                entry.tx.set_block_height(block_height);
                entry.tx.set_timestamp(timestamp);
                updated.push(*hash);
            } else if let Some(cb) = self.coinbase.iter_mut().find(|cb| cb.tx_hash() == *hash) {
                cb.block_height = block_height;
                cb.timestamp = timestamp;
                coinbase_updated.push(*hash);
            }
        }

        if updated.is_empty() && coinbase_updated.is_empty() {
            return;
        }
        if !updated.is_empty() {
            self.resort();
            events.push(WalletEvent::TxUpdated {
                hashes: updated,
                block_height,
                timestamp,
            });
        }
        if !coinbase_updated.is_empty() {
            events.push(WalletEvent::CoinBaseTxUpdated {
                hashes: coinbase_updated,
                block_height,
                timestamp,
            });
        }
        self.rebuild();
        self.push_balance_changes(&before, events);
    }

    /// Transactions whose height is above `block_height`, unconfirmed ones included.
    pub fn unconfirmed_before(&self, block_height: u32) -> Vec<Transaction> {
        self.ordered()
            .filter(|tx| tx.block_height() > block_height)
            .cloned()
            .collect()
    }

    /// Roll every confirmation above `block_height` back to unconfirmed.
    pub fn set_unconfirmed_after(&mut self, block_height: u32, events: &mut Vec<WalletEvent>) {
        let before = self.totals();
        self.block_height = block_height;

        let mut hashes = Vec::new();
        for (hash, entry) in &mut self.txs {
            if entry.tx.is_confirmed() && entry.tx.block_height() > block_height {
                entry.tx.set_block_height(TX_UNCONFIRMED);
                entry.tx.set_timestamp(0);
                hashes.push(*hash);
            }
        }
        let mut coinbase_hashes = Vec::new();
        for cb in &mut self.coinbase {
            if cb.block_height != TX_UNCONFIRMED && cb.block_height > block_height {
                cb.block_height = TX_UNCONFIRMED;
                cb.timestamp = 0;
                coinbase_hashes.push(cb.tx_hash());
            }
        }

        if !hashes.is_empty() {
            hashes.sort();
            self.resort();
            events.push(WalletEvent::TxUpdated {
                hashes,
                block_height: TX_UNCONFIRMED,
                timestamp: 0,
            });
        }
        if !coinbase_hashes.is_empty() {
            events.push(WalletEvent::CoinBaseTxUpdated {
                hashes: coinbase_hashes,
                block_height: TX_UNCONFIRMED,
                timestamp: 0,
            });
        }
        self.rebuild();
        self.push_balance_changes(&before, events);
    }

    pub fn set_block_height(&mut self, block_height: u32, events: &mut Vec<WalletEvent>) {
        let before = self.totals();
        self.block_height = block_height;
        self.push_balance_changes(&before, events);
    }

    pub fn register_remark(&mut self, hash: &Uint256, remark: &str) {
        self.remarks.insert(*hash, remark.to_string());
        if let Some(entry) = self.txs.get_mut(hash) {
            entry.tx.set_remark(remark);
        }
    }

    pub fn remark(&self, hash: &Uint256) -> Option<String> {
        self.remarks.get(hash).cloned().or_else(|| {
            self.txs
                .get(hash)
                .map(|e| e.tx.remark().to_string())
                .filter(|r| !r.is_empty())
        })
    }

    // ---- transaction construction ----

    fn change_address(&mut self, from: Option<&Address>) -> Address {
        if let Some(from) = from {
            return *from;
        }
        let gap = self.config.internal_gap_limit.max(1);
        let internal = self.addresses.unused_addresses(gap, true);
        internal[0]
    }

    pub fn create_transaction(
        &mut self,
        from: Option<&Address>,
        mut outputs: Vec<TransactionOutput>,
        memo: &str,
        use_voted: bool,
        auto_reduce: bool,
        events: &mut Vec<WalletEvent>,
    ) -> Result<Transaction, LedgerError> {
        let asset_id = outputs.first().map(|o| o.asset_id).ok_or(LedgerError::NoOutputs)?;
        if outputs.iter().any(|o| o.asset_id != asset_id) {
            return Err(LedgerError::MixedAssets);
        }
        if !self.assets.contains_key(&asset_id) {
            return Err(LedgerError::UnknownAsset(asset_id));
        }
        if let Some(dust) = outputs.iter().find(|o| o.amount < TX_MIN_OUTPUT_AMOUNT) {
            return Err(LedgerError::DustOutput {
                amount: dust.amount,
                threshold: TX_MIN_OUTPUT_AMOUNT,
            });
        }
        let mut target = outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
            .ok_or(LedgerError::AmountOverflow)?;

        let before = self.totals();
        let native_id = self.native_id;
        let memo_len = memo.len();
        let change_to = self.change_address(from);

        let view = self.view();
        let native_candidates = self.assets[&native_id].spendable(&view, from, use_voted);

        let inputs = if asset_id == native_id {
            let request = SelectionRequest {
                target,
                pays_fee: true,
                prior_inputs: 0,
                outputs: outputs.len() + 1,
                memo_len,
                fee_per_kb: self.fee_per_kb,
            };
            let selection = select_coins(&native_candidates, &request)?;
            let shortfall = selection.shortfall(target);
            if shortfall > 0 {
                if !auto_reduce {
                    return Err(LedgerError::InsufficientFunds {
                        needed: selection.required(target),
                        available: selection.total,
                    });
                }
                reduce_last_output(&mut outputs, shortfall, selection.total)?;
                target -= shortfall;
            }
            let change = selection.total - target - selection.fee;
            if change >= TX_MIN_OUTPUT_AMOUNT {
                outputs.push(TransactionOutput::new(native_id, change, change_to));
            }
            selection.inputs
        } else {
            let candidates = self.assets[&asset_id].spendable(&view, from, use_voted);
            let request = SelectionRequest {
                target,
                pays_fee: false,
                prior_inputs: 0,
                outputs: outputs.len() + 2,
                memo_len,
                fee_per_kb: self.fee_per_kb,
            };
            let selection = select_coins(&candidates, &request)?;
            let shortfall = target.saturating_sub(selection.total);
            if shortfall > 0 {
                if !auto_reduce {
                    return Err(LedgerError::InsufficientFunds {
                        needed: target,
                        available: selection.total,
                    });
                }
                reduce_last_output(&mut outputs, shortfall, selection.total)?;
                target -= shortfall;
            }
            let asset_change = selection.total - target;
            if asset_change > 0 {
                outputs.push(TransactionOutput::new(asset_id, asset_change, change_to));
            }

            let fee_request = SelectionRequest {
                target: 0,
                pays_fee: true,
                prior_inputs: selection.inputs.len(),
                outputs: outputs.len() + 1,
                memo_len,
                fee_per_kb: self.fee_per_kb,
            };
            let fee_selection = select_coins(&native_candidates, &fee_request)?;
            if fee_selection.shortfall(0) > 0 {
                return Err(LedgerError::InsufficientFunds {
                    needed: fee_selection.fee,
                    available: fee_selection.total,
                });
            }
            let change = fee_selection.total - fee_selection.fee;
            if change >= TX_MIN_OUTPUT_AMOUNT {
                outputs.push(TransactionOutput::new(native_id, change, change_to));
            }
            let mut inputs = selection.inputs;
            inputs.extend(fee_selection.inputs);
            inputs
        };

        let size = estimate_size(inputs.len(), outputs.len(), memo_len);
        if size > TX_MAX_SIZE {
            return Err(LedgerError::TxTooLarge { size });
        }

        let tx_inputs = inputs
            .iter()
            .map(|u| TransactionInput::new(u.outpoint.tx_hash, u.outpoint.index))
            .collect();
        let tx = Transaction::new(TxPayload::TransferAsset, tx_inputs, outputs, 0, memo);
        for utxo in &inputs {
            self.spending.insert(utxo.outpoint, tx.hash());
        }
        self.push_balance_changes(&before, events);
        Ok(tx)
    }

    /// Return the reserved inputs of a discarded candidate to the unspent partition.
    pub fn release(&mut self, tx: &Transaction, events: &mut Vec<WalletEvent>) -> usize {
        let before = self.totals();
        let hash = tx.hash();
        let count = self.spending.len();
        self.spending.retain(|_, owner| *owner != hash);
        let released = count - self.spending.len();
        if released > 0 {
            self.push_balance_changes(&before, events);
        }
        released
    }
}

/// Take `shortfall` out of the last output, keeping it above the dust threshold.
fn reduce_last_output(
    outputs: &mut [TransactionOutput],
    shortfall: u64,
    available: u64,
) -> Result<(), LedgerError> {
    let insufficient = || LedgerError::InsufficientFunds {
        needed: available.saturating_add(shortfall),
        available,
    };
    let last = outputs.last_mut().ok_or(LedgerError::NoOutputs)?;
    let reduced = last.amount.checked_sub(shortfall).ok_or_else(insufficient)?;
    if reduced < TX_MIN_OUTPUT_AMOUNT {
        return Err(insufficient());
    }
    debug!("Reducing last output from {} to {}", last.amount, reduced);
    last.amount = reduced;
    Ok(())
}
