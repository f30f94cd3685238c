//! State persistence service for wallet synchronization.
//!
//! `StatePersistenceService` sits between the orchestrator and a `WalletStore`. It converts
//! transactions, merkle blocks and peers to their stored records and back, and restores what
//! one chain persisted when the orchestrator starts. Records that fail to decode are logged and
//! skipped so a single bad row cannot stop a wallet from opening.

use crate::types::{MerkleBlock, PeerInfo, Transaction, Uint256};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::repositories::{MerkleBlockEntity, PeerEntity, WalletStore};
use crate::wallet::sync::transaction_processor::TransactionProcessor;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything read back from the store at startup.
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    pub transactions: Vec<Transaction>,
    /// Ascending by height.
    pub blocks: Vec<MerkleBlock>,
    pub peers: Vec<PeerInfo>,
}

pub struct StatePersistenceService {
    chain_id: String,
    store: Arc<dyn WalletStore>,
    processor: TransactionProcessor,
}

impl StatePersistenceService {
    pub fn new(chain_id: impl Into<String>, store: Arc<dyn WalletStore>) -> Self {
        Self {
            chain_id: chain_id.into(),
            store,
            processor: TransactionProcessor::new(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Read transactions, blocks and peers for this chain.
    pub async fn restore_state(&self) -> Result<PersistedState, WalletSyncError> {
        let state = PersistedState {
            transactions: self.load_transactions().await?,
            blocks: self.load_blocks().await?,
            peers: self.load_peers().await?,
        };
        info!(
            "Restored {} transactions, {} blocks and {} peers for {}",
            state.transactions.len(),
            state.blocks.len(),
            state.peers.len(),
            self.chain_id
        );
        Ok(state)
    }

    pub async fn load_transactions(&self) -> Result<Vec<Transaction>, WalletSyncError> {
        let entities = self.store.get_all_transactions(&self.chain_id).await?;
        Ok(self.processor.process_transactions_batch(&entities))
    }

    pub async fn load_blocks(&self) -> Result<Vec<MerkleBlock>, WalletSyncError> {
        let entities = self.store.get_all_merkle_blocks(&self.chain_id).await?;
        Ok(entities
            .iter()
            .filter_map(|e| self.processor.parse_block(e).ok())
            .collect())
    }

    pub async fn load_peers(&self) -> Result<Vec<PeerInfo>, WalletSyncError> {
        let entities = self.store.get_all_peers(&self.chain_id).await?;
        Ok(entities
            .iter()
            .filter_map(|e| self.processor.parse_peer(e).ok())
            .collect())
    }

    pub async fn transactions_count(&self) -> Result<usize, WalletSyncError> {
        Ok(self.store.get_all_transactions_count(&self.chain_id).await?)
    }

    /// Store `tx` along with its remark. An existing record with the same hash is replaced.
    pub async fn save_transaction(&self, tx: &Transaction) -> Result<(), WalletSyncError> {
        let entity = self.processor.to_entity(tx);
        self.store.put_transaction(&self.chain_id, &entity).await?;
        Ok(())
    }

    /// Returns how many of `hashes` were stored.
    pub async fn update_transactions(
        &self,
        hashes: &[Uint256],
        block_height: u32,
        timestamp: u64,
    ) -> Result<usize, WalletSyncError> {
        let mut updated = 0;
        for hash in hashes {
            if self
                .store
                .update_transaction(&self.chain_id, &hash.to_hex(), block_height, timestamp)
                .await?
            {
                updated += 1;
            }
        }
        if updated != hashes.len() {
            debug!(
                "{} of {} confirmed transactions were not stored",
                hashes.len() - updated,
                hashes.len()
            );
        }
        Ok(updated)
    }

    /// Returns how many of `hashes` were stored.
    pub async fn delete_transactions(&self, hashes: &[Uint256]) -> Result<usize, WalletSyncError> {
        let mut deleted = 0;
        for hash in hashes {
            if self.store.delete_tx_by_hash(&self.chain_id, &hash.to_hex()).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Store merkle blocks, dropping everything stored first when `replace` is set.
    /// Blocks at height 0 are never stored. Returns how many were written.
    pub async fn save_blocks(
        &self,
        replace: bool,
        blocks: &[MerkleBlock],
    ) -> Result<usize, WalletSyncError> {
        if replace {
            self.store.delete_all_blocks(&self.chain_id).await?;
        }
        let entities: Vec<MerkleBlockEntity> = blocks
            .iter()
            .filter(|b| b.height != 0)
            .map(|b| self.processor.block_to_entity(b))
            .collect();
        if !entities.is_empty() {
            self.store.put_merkle_blocks(&self.chain_id, &entities).await?;
        }
        Ok(entities.len())
    }

    /// Store peers, dropping everything stored first when `replace` is set.
    pub async fn save_peers(
        &self,
        replace: bool,
        peers: &[PeerInfo],
    ) -> Result<usize, WalletSyncError> {
        if replace {
            self.store.delete_all_peers(&self.chain_id).await?;
        }
        let entities: Vec<PeerEntity> = peers
            .iter()
            .map(|p| self.processor.peer_to_entity(p))
            .collect();
        if !entities.is_empty() {
            self.store.put_peers(&self.chain_id, &entities).await?;
        }
        Ok(entities.len())
    }
}
