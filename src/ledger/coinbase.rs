use crate::types::{Address, OutPoint, TX_UNCONFIRMED, Uint256};
use serde::{Deserialize, Serialize};

/// Blocks a coinbase output must wait after confirmation before it can be spent.
pub const COINBASE_MATURITY: u32 = 100;

/// Block reward paid to the wallet. Tracked apart from ordinary outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinBaseUtxo {
    pub outpoint: OutPoint,
    pub amount: u64,
    pub asset_id: Uint256,
    pub address: Address,
    pub block_height: u32,
    pub timestamp: u64,
    pub spent: bool,
}

impl CoinBaseUtxo {
    pub fn tx_hash(&self) -> Uint256 {
        self.outpoint.tx_hash
    }

    pub fn is_mature_at(&self, chain_height: u32) -> bool {
        self.block_height != TX_UNCONFIRMED
            && self.block_height.saturating_add(COINBASE_MATURITY) <= chain_height
    }
}
