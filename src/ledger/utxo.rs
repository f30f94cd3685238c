use crate::types::{Address, OutPoint, OutputType, TX_UNCONFIRMED, Uint256};
use serde::{Deserialize, Serialize};

/// An owned output together with the data needed to price and classify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub amount: u64,
    pub asset_id: Uint256,
    pub address: Address,
    pub block_height: u32,
    pub output_type: OutputType,
}

impl Utxo {
    /// Confirmed in a block the wallet has already reached.
    pub fn is_confirmed_at(&self, chain_height: u32) -> bool {
        self.block_height != TX_UNCONFIRMED && self.block_height <= chain_height
    }

    pub fn is_vote(&self) -> bool {
        self.output_type == OutputType::Vote
    }
}

/// Which partition an owned output currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoState {
    Unspent,
    /// Reserved by a candidate transaction that has not been registered yet.
    Spending,
    Spent,
}

/// Snapshot of every owned output grouped by partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UtxoPartitions {
    pub unspent: Vec<Utxo>,
    pub spending: Vec<Utxo>,
    pub spent: Vec<Utxo>,
}

impl UtxoPartitions {
    pub fn len(&self) -> usize {
        self.unspent.len() + self.spending.len() + self.spent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state_of(&self, outpoint: &OutPoint) -> Option<UtxoState> {
        if self.unspent.iter().any(|u| u.outpoint == *outpoint) {
            Some(UtxoState::Unspent)
        } else if self.spending.iter().any(|u| u.outpoint == *outpoint) {
            Some(UtxoState::Spending)
        } else if self.spent.iter().any(|u| u.outpoint == *outpoint) {
            Some(UtxoState::Spent)
        } else {
            None
        }
    }
}
