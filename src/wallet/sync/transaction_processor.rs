use crate::types::{Decodable, Encodable, MerkleBlock, PeerInfo, Transaction, Uint256};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::repositories::{MerkleBlockEntity, PeerEntity, TransactionEntity};
use std::net::IpAddr;
use tracing::{debug, error};

/// Converts between chain types and the records a `WalletStore` keeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionProcessor;

impl TransactionProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn to_entity(&self, tx: &Transaction) -> TransactionEntity {
        TransactionEntity {
            buffer: tx.to_bytes(),
            block_height: tx.block_height(),
            timestamp: tx.timestamp(),
            remark: tx.remark().to_string(),
            tx_hash: tx.hash().to_hex(),
        }
    }

    /// Decode a stored transaction and restore the fields kept beside its encoding.
    pub fn parse_transaction(
        &self,
        entity: &TransactionEntity,
    ) -> Result<Transaction, WalletSyncError> {
        let mut tx = Transaction::from_bytes(&entity.buffer).map_err(|e| {
            error!("[PARSE_TRANSACTION] Failed to decode {}: {}", entity.tx_hash, e);
            WalletSyncError::ParseError(format!(
                "Failed to decode transaction {}: {}",
                entity.tx_hash, e
            ))
        })?;

        let stored_hash = Uint256::from_hex(&entity.tx_hash)?;
        if stored_hash != tx.hash() {
            error!(
                "[PARSE_TRANSACTION] Stored hash {} does not match content hash {}",
                entity.tx_hash,
                tx.hash()
            );
            return Err(WalletSyncError::ParseError(format!(
                "Hash mismatch for transaction {}",
                entity.tx_hash
            )));
        }

        tx.set_block_height(entity.block_height);
        tx.set_timestamp(entity.timestamp);
        tx.set_remark(entity.remark.clone());
        Ok(tx)
    }

    /// Parse every record, skipping the ones that fail.
    pub fn process_transactions_batch(&self, entities: &[TransactionEntity]) -> Vec<Transaction> {
        let processed: Vec<Transaction> = entities
            .iter()
            .filter_map(|e| self.parse_transaction(e).ok())
            .collect();
        if processed.len() != entities.len() {
            debug!(
                "Skipped {} of {} stored transactions",
                entities.len() - processed.len(),
                entities.len()
            );
        }
        processed
    }

    pub fn block_to_entity(&self, block: &MerkleBlock) -> MerkleBlockEntity {
        MerkleBlockEntity {
            block_bytes: block.to_bytes(),
            block_height: block.height,
        }
    }

    pub fn parse_block(&self, entity: &MerkleBlockEntity) -> Result<MerkleBlock, WalletSyncError> {
        MerkleBlock::from_record(&entity.block_bytes, entity.block_height).map_err(|e| {
            error!("Block deserialize failed at height {}: {}", entity.block_height, e);
            WalletSyncError::ParseError(format!(
                "Failed to decode block at height {}: {}",
                entity.block_height, e
            ))
        })
    }

    pub fn peer_to_entity(&self, peer: &PeerInfo) -> PeerEntity {
        PeerEntity {
            address: peer.address.to_string(),
            port: peer.port,
            timestamp: peer.timestamp,
        }
    }

    pub fn parse_peer(&self, entity: &PeerEntity) -> Result<PeerInfo, WalletSyncError> {
        let address: IpAddr = entity.address.parse().map_err(|e| {
            error!("Invalid peer address {:?}: {}", entity.address, e);
            WalletSyncError::ParseError(format!("Invalid peer address {:?}: {}", entity.address, e))
        })?;
        Ok(PeerInfo::new(address, entity.port, entity.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Asset, TransactionInput, TransactionOutput, TxPayload, Uint168};

    fn transaction() -> Transaction {
        Transaction::new(
            TxPayload::TransferAsset,
            vec![TransactionInput::new(Uint256([3u8; 32]), 1)],
            vec![TransactionOutput::new(
                Asset::native_id(),
                5_000,
                Uint168::with_prefix(0x21, &[1; 20]),
            )],
            0,
            "memo",
        )
        .with_block(12, 1_700_000_000)
    }

    #[test]
    fn entities_restore_bookkeeping_fields() {
        let processor = TransactionProcessor::new();
        let mut tx = transaction();
        tx.set_remark("rent");

        let entity = processor.to_entity(&tx);
        assert_eq!(entity.block_height, 12);
        assert_eq!(entity.remark, "rent");

        let restored = processor.parse_transaction(&entity).expect("parse");
        assert_eq!(restored, tx);
    }

    #[test]
    fn tampered_records_are_rejected() {
        let processor = TransactionProcessor::new();
        let mut entity = processor.to_entity(&transaction());
        entity.tx_hash = Uint256([9u8; 32]).to_hex();
        assert!(matches!(
            processor.parse_transaction(&entity),
            Err(WalletSyncError::ParseError(_))
        ));

        let mut truncated = processor.to_entity(&transaction());
        truncated.buffer.truncate(10);
        assert_eq!(processor.process_transactions_batch(&[truncated, entity]).len(), 0);
    }

    #[test]
    fn peers_round_trip_through_text_addresses() {
        let processor = TransactionProcessor::new();
        let peer = PeerInfo::new("10.0.0.7".parse().unwrap(), 20866, 99);
        let entity = processor.peer_to_entity(&peer);
        assert_eq!(processor.parse_peer(&entity).unwrap(), peer);

        let bad = PeerEntity {
            address: "not-an-ip".to_string(),
            ..entity
        };
        assert!(processor.parse_peer(&bad).is_err());
    }
}
