//! Sub-wallets: one chain's orchestrator plus what its kind allows.

use crate::ledger::{BalanceType, Ledger};
use crate::transaction::{ELA_DECIMALS, TransactionBuilder};
use crate::types::Transaction;
use crate::utils::format_token_amount;
use crate::wallet::sync::WalletSyncOrchestrator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubWalletKind {
    Mainchain,
    Sidechain,
    IdChain,
    Normal,
}

/// Capabilities that differ between sub-wallet kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindBehavior {
    pub name: &'static str,
    /// May create vote outputs and spend voted outputs.
    pub supports_voting: bool,
    /// May move funds across chains: deposits from the main chain, withdrawals from a side chain.
    pub supports_deposit: bool,
}

const MAINCHAIN: KindBehavior = KindBehavior {
    name: "Mainchain",
    supports_voting: true,
    supports_deposit: true,
};

const SIDECHAIN: KindBehavior = KindBehavior {
    name: "Sidechain",
    supports_voting: false,
    supports_deposit: true,
};

const ID_CHAIN: KindBehavior = KindBehavior {
    name: "IdChain",
    supports_voting: false,
    supports_deposit: true,
};

const NORMAL: KindBehavior = KindBehavior {
    name: "Normal",
    supports_voting: false,
    supports_deposit: false,
};

impl SubWalletKind {
    pub fn behavior(self) -> &'static KindBehavior {
        match self {
            SubWalletKind::Mainchain => &MAINCHAIN,
            SubWalletKind::Sidechain => &SIDECHAIN,
            SubWalletKind::IdChain => &ID_CHAIN,
            SubWalletKind::Normal => &NORMAL,
        }
    }
}

pub struct SubWallet {
    kind: SubWalletKind,
    coin_index: u32,
    orchestrator: Arc<WalletSyncOrchestrator>,
}

impl SubWallet {
    pub(crate) fn new(
        kind: SubWalletKind,
        coin_index: u32,
        orchestrator: Arc<WalletSyncOrchestrator>,
    ) -> Self {
        Self {
            kind,
            coin_index,
            orchestrator,
        }
    }

    pub fn kind(&self) -> SubWalletKind {
        self.kind
    }

    pub fn behavior(&self) -> &'static KindBehavior {
        self.kind.behavior()
    }

    pub fn chain_id(&self) -> &str {
        self.orchestrator.chain_id()
    }

    pub fn coin_index(&self) -> u32 {
        self.coin_index
    }

    pub fn orchestrator(&self) -> &Arc<WalletSyncOrchestrator> {
        &self.orchestrator
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        self.orchestrator.ledger()
    }

    /// A builder that refuses voting unless this kind supports it.
    pub fn transaction_builder(&self) -> TransactionBuilder {
        TransactionBuilder::new(self.ledger().clone())
            .voting_allowed(self.behavior().supports_voting)
    }

    pub async fn publish_transaction(&self, tx: &Transaction) {
        self.orchestrator.publish_transaction(tx).await
    }

    /// Native balance of `kind`, formatted with the native precision.
    pub fn formatted_balance(&self, kind: BalanceType) -> String {
        let ledger = self.ledger();
        format_token_amount(ledger.get_balance(&ledger.native_asset_id(), kind), ELA_DECIMALS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_main_chain_votes() {
        let voting: Vec<&str> = [
            SubWalletKind::Mainchain,
            SubWalletKind::Sidechain,
            SubWalletKind::IdChain,
            SubWalletKind::Normal,
        ]
        .into_iter()
        .filter(|k| k.behavior().supports_voting)
        .map(|k| k.behavior().name)
        .collect();
        assert_eq!(voting, vec!["Mainchain"]);
        assert!(!SubWalletKind::Normal.behavior().supports_deposit);
    }
}
