//! Per-asset grouping of owned outputs and the balance categories derived from it.

use crate::ledger::coinbase::CoinBaseUtxo;
use crate::ledger::utxo::Utxo;
use crate::types::{Address, Asset, OutPoint, OutputType, Uint256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceType {
    /// Unspent outputs confirmed at or below the chain height, plus mature rewards.
    Confirmed,
    /// Unspent outputs not yet confirmed, plus immature rewards.
    Pending,
    /// Confirmed outputs locked in a vote. A subset of `Confirmed`.
    Voted,
    Total,
}

/// Ledger-wide state a balance depends on besides the asset's own outputs.
pub(crate) struct BalanceView<'a> {
    pub chain_height: u32,
    pub spending: &'a BTreeMap<OutPoint, Uint256>,
    pub coinbase: &'a [CoinBaseUtxo],
}

#[derive(Debug, Clone)]
pub struct GroupedAsset {
    asset: Asset,
    id: Uint256,
    /// Owned outputs of valid transactions that no transaction in the set spends.
    utxos: Vec<Utxo>,
}

impl GroupedAsset {
    pub fn new(asset: Asset) -> Self {
        let id = asset.id();
        Self {
            asset,
            id,
            utxos: Vec::new(),
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn id(&self) -> Uint256 {
        self.id
    }

    pub fn utxos(&self) -> &[Utxo] {
        &self.utxos
    }

    pub(crate) fn clear(&mut self) {
        self.utxos.clear();
    }

    pub(crate) fn add_utxo(&mut self, utxo: Utxo) {
        self.utxos.push(utxo);
    }

    pub(crate) fn remove_utxo(&mut self, outpoint: &OutPoint) -> Option<Utxo> {
        let pos = self.utxos.iter().position(|u| u.outpoint == *outpoint)?;
        Some(self.utxos.remove(pos))
    }

    pub(crate) fn balance(
        &self,
        kind: BalanceType,
        view: &BalanceView<'_>,
        address: Option<&Address>,
    ) -> u128 {
        let matches_address = |a: &Address| address.is_none_or(|want| want == a);

        let outputs = self
            .utxos
            .iter()
            .filter(|u| !view.spending.contains_key(&u.outpoint) && matches_address(&u.address));
        let rewards = view.coinbase.iter().filter(|cb| {
            cb.asset_id == self.id
                && !cb.spent
                && !view.spending.contains_key(&cb.outpoint)
                && matches_address(&cb.address)
        });

        match kind {
            BalanceType::Confirmed => {
                let plain: u128 = outputs
                    .filter(|u| u.is_confirmed_at(view.chain_height))
                    .map(|u| u128::from(u.amount))
                    .sum();
                let mature: u128 = rewards
                    .filter(|cb| cb.is_mature_at(view.chain_height))
                    .map(|cb| u128::from(cb.amount))
                    .sum();
                plain + mature
            }
            BalanceType::Pending => {
                let plain: u128 = outputs
                    .filter(|u| !u.is_confirmed_at(view.chain_height))
                    .map(|u| u128::from(u.amount))
                    .sum();
                let immature: u128 = rewards
                    .filter(|cb| !cb.is_mature_at(view.chain_height))
                    .map(|cb| u128::from(cb.amount))
                    .sum();
                plain + immature
            }
            BalanceType::Voted => outputs
                .filter(|u| u.is_vote() && u.is_confirmed_at(view.chain_height))
                .map(|u| u128::from(u.amount))
                .sum(),
            BalanceType::Total => {
                self.balance(BalanceType::Confirmed, view, address)
                    + self.balance(BalanceType::Pending, view, address)
            }
        }
    }

    /// Outputs coin selection may use, largest first.
    pub(crate) fn spendable(
        &self,
        view: &BalanceView<'_>,
        from: Option<&Address>,
        use_voted: bool,
    ) -> Vec<Utxo> {
        let mut candidates: Vec<Utxo> = self
            .utxos
            .iter()
            .filter(|u| {
                !view.spending.contains_key(&u.outpoint)
                    && u.is_confirmed_at(view.chain_height)
                    && (use_voted || !u.is_vote())
                    && from.is_none_or(|f| *f == u.address)
            })
            .cloned()
            .collect();

        candidates.extend(
            view.coinbase
                .iter()
                .filter(|cb| {
                    cb.asset_id == self.id
                        && !cb.spent
                        && !view.spending.contains_key(&cb.outpoint)
                        && cb.is_mature_at(view.chain_height)
                        && from.is_none_or(|f| *f == cb.address)
                })
                .map(|cb| Utxo {
                    outpoint: cb.outpoint,
                    amount: cb.amount,
                    asset_id: cb.asset_id,
                    address: cb.address,
                    block_height: cb.block_height,
                    output_type: OutputType::Default,
                }),
        );

        candidates.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.outpoint.cmp(&b.outpoint)));
        candidates
    }
}
