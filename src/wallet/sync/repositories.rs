//! Chain-scoped persistence for transactions, merkle blocks and peers.
//!
//! `WalletStore` is the contract the orchestrator writes through. Every method takes the chain id
//! the records belong to; an unknown chain simply has empty tables. `put_*` calls insert or
//! replace by primary key (transaction hash, block height, peer address and port).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage IO error: {0}")]
    Io(String),

    #[error("Storage serialization error: {0}")]
    Serialization(String),
}

/// A persisted transaction. `buffer` is the consensus encoding; height, timestamp and remark
/// live beside it because they are not part of the hashed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEntity {
    #[serde(with = "hex::serde")]
    pub buffer: Vec<u8>,
    pub block_height: u32,
    pub timestamp: u64,
    #[serde(default)]
    pub remark: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleBlockEntity {
    #[serde(with = "hex::serde")]
    pub block_bytes: Vec<u8>,
    pub block_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntity {
    pub address: String,
    pub port: u16,
    pub timestamp: u64,
}

/// Repository for everything a sub-wallet persists
#[async_trait::async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_all_transactions(
        &self,
        chain_id: &str,
    ) -> Result<Vec<TransactionEntity>, StoreError>;
    async fn get_all_transactions_count(&self, chain_id: &str) -> Result<usize, StoreError>;
    async fn put_transaction(
        &self,
        chain_id: &str,
        tx: &TransactionEntity,
    ) -> Result<(), StoreError>;
    /// Set height and timestamp of a stored transaction. Returns false if it is not stored.
    async fn update_transaction(
        &self,
        chain_id: &str,
        tx_hash: &str,
        block_height: u32,
        timestamp: u64,
    ) -> Result<bool, StoreError>;
    async fn delete_tx_by_hash(&self, chain_id: &str, tx_hash: &str) -> Result<bool, StoreError>;
    async fn delete_all_transactions(&self, chain_id: &str) -> Result<(), StoreError>;

    /// Blocks in ascending height order.
    async fn get_all_merkle_blocks(
        &self,
        chain_id: &str,
    ) -> Result<Vec<MerkleBlockEntity>, StoreError>;
    async fn put_merkle_blocks(
        &self,
        chain_id: &str,
        blocks: &[MerkleBlockEntity],
    ) -> Result<(), StoreError>;
    async fn delete_all_blocks(&self, chain_id: &str) -> Result<(), StoreError>;

    async fn get_all_peers(&self, chain_id: &str) -> Result<Vec<PeerEntity>, StoreError>;
    async fn put_peers(&self, chain_id: &str, peers: &[PeerEntity]) -> Result<(), StoreError>;
    async fn delete_all_peers(&self, chain_id: &str) -> Result<(), StoreError>;
}

fn upsert_transaction(rows: &mut Vec<TransactionEntity>, entity: TransactionEntity) {
    match rows.iter_mut().find(|r| r.tx_hash == entity.tx_hash) {
        Some(row) => *row = entity,
        None => rows.push(entity),
    }
}

fn update_transaction(
    rows: &mut [TransactionEntity],
    tx_hash: &str,
    block_height: u32,
    timestamp: u64,
) -> bool {
    match rows.iter_mut().find(|r| r.tx_hash == tx_hash) {
        Some(row) => {
            row.block_height = block_height;
            row.timestamp = timestamp;
            true
        }
        None => false,
    }
}

fn delete_transaction(rows: &mut Vec<TransactionEntity>, tx_hash: &str) -> bool {
    let before = rows.len();
    rows.retain(|r| r.tx_hash != tx_hash);
    rows.len() != before
}

fn upsert_blocks(rows: &mut Vec<MerkleBlockEntity>, blocks: &[MerkleBlockEntity]) {
    for block in blocks {
        match rows.iter_mut().find(|r| r.block_height == block.block_height) {
            Some(row) => *row = block.clone(),
            None => rows.push(block.clone()),
        }
    }
    rows.sort_by_key(|r| r.block_height);
}

fn upsert_peers(rows: &mut Vec<PeerEntity>, peers: &[PeerEntity]) {
    for peer in peers {
        match rows
            .iter_mut()
            .find(|r| r.address == peer.address && r.port == peer.port)
        {
            Some(row) => *row = peer.clone(),
            None => rows.push(peer.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct ChainTables {
    transactions: Vec<TransactionEntity>,
    blocks: Vec<MerkleBlockEntity>,
    peers: Vec<PeerEntity>,
}

/// Volatile store for tests and throwaway wallets.
#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    chains: Mutex<HashMap<String, ChainTables>>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_chain<R>(&self, chain_id: &str, f: impl FnOnce(&mut ChainTables) -> R) -> R {
        let mut chains = self.chains.lock().await;
        f(chains.entry(chain_id.to_string()).or_default())
    }
}

#[async_trait::async_trait]
impl WalletStore for MemoryWalletStore {
    async fn get_all_transactions(
        &self,
        chain_id: &str,
    ) -> Result<Vec<TransactionEntity>, StoreError> {
        Ok(self.with_chain(chain_id, |t| t.transactions.clone()).await)
    }

    async fn get_all_transactions_count(&self, chain_id: &str) -> Result<usize, StoreError> {
        Ok(self.with_chain(chain_id, |t| t.transactions.len()).await)
    }

    async fn put_transaction(
        &self,
        chain_id: &str,
        tx: &TransactionEntity,
    ) -> Result<(), StoreError> {
        let tx = tx.clone();
        self.with_chain(chain_id, |t| upsert_transaction(&mut t.transactions, tx))
            .await;
        Ok(())
    }

    async fn update_transaction(
        &self,
        chain_id: &str,
        tx_hash: &str,
        block_height: u32,
        timestamp: u64,
    ) -> Result<bool, StoreError> {
        Ok(self
            .with_chain(chain_id, |t| {
                update_transaction(&mut t.transactions, tx_hash, block_height, timestamp)
            })
            .await)
    }

    async fn delete_tx_by_hash(&self, chain_id: &str, tx_hash: &str) -> Result<bool, StoreError> {
        Ok(self
            .with_chain(chain_id, |t| delete_transaction(&mut t.transactions, tx_hash))
            .await)
    }

    async fn delete_all_transactions(&self, chain_id: &str) -> Result<(), StoreError> {
        self.with_chain(chain_id, |t| t.transactions.clear()).await;
        Ok(())
    }

    async fn get_all_merkle_blocks(
        &self,
        chain_id: &str,
    ) -> Result<Vec<MerkleBlockEntity>, StoreError> {
        Ok(self.with_chain(chain_id, |t| t.blocks.clone()).await)
    }

    async fn put_merkle_blocks(
        &self,
        chain_id: &str,
        blocks: &[MerkleBlockEntity],
    ) -> Result<(), StoreError> {
        self.with_chain(chain_id, |t| upsert_blocks(&mut t.blocks, blocks))
            .await;
        Ok(())
    }

    async fn delete_all_blocks(&self, chain_id: &str) -> Result<(), StoreError> {
        self.with_chain(chain_id, |t| t.blocks.clear()).await;
        Ok(())
    }

    async fn get_all_peers(&self, chain_id: &str) -> Result<Vec<PeerEntity>, StoreError> {
        Ok(self.with_chain(chain_id, |t| t.peers.clone()).await)
    }

    async fn put_peers(&self, chain_id: &str, peers: &[PeerEntity]) -> Result<(), StoreError> {
        self.with_chain(chain_id, |t| upsert_peers(&mut t.peers, peers))
            .await;
        Ok(())
    }

    async fn delete_all_peers(&self, chain_id: &str) -> Result<(), StoreError> {
        self.with_chain(chain_id, |t| t.peers.clear()).await;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Transactions,
    MerkleBlocks,
    Peers,
}

impl Table {
    fn file_name(self) -> &'static str {
        match self {
            Table::Transactions => "transactions.json",
            Table::MerkleBlocks => "merkle_blocks.json",
            Table::Peers => "peers.json",
        }
    }
}

/// File-based implementation of WalletStore.
///
/// Layout: `<data_dir>/<chain_id>/{transactions,merkle_blocks,peers}.json` plus a
/// `store.meta.json` recording when each table was last written. Tables are JSON arrays with
/// byte buffers as hex. A record that no longer parses is logged and skipped on read.
pub struct FileWalletStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileWalletStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            write_lock: Mutex::new(()),
        }
    }

    fn chain_dir(&self, chain_id: &str) -> PathBuf {
        let name: String = chain_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.data_dir.join(name)
    }

    fn table_path(&self, chain_id: &str, table: Table) -> PathBuf {
        self.chain_dir(chain_id).join(table.file_name())
    }

    async fn read_table<T: DeserializeOwned>(
        &self,
        chain_id: &str,
        table: Table,
    ) -> Result<Vec<T>, StoreError> {
        read_rows(&self.table_path(chain_id, table)).await
    }

    /// Read-modify-write one table under the store's write lock.
    async fn modify<T, R>(
        &self,
        chain_id: &str,
        table: Table,
        f: impl FnOnce(&mut Vec<T>) -> R + Send,
    ) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Send,
        R: Send,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.table_path(chain_id, table);
        let mut rows: Vec<T> = read_rows(&path).await?;
        let result = f(&mut rows);
        write_rows(&path, &rows).await?;
        self.write_metadata(chain_id, table, rows.len()).await?;
        Ok(result)
    }

    async fn write_metadata(
        &self,
        chain_id: &str,
        table: Table,
        rows: usize,
    ) -> Result<(), StoreError> {
        let path = self.chain_dir(chain_id).join("store.meta.json");
        let mut metadata = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<serde_json::Value>(&content)
                .unwrap_or_else(|_| serde_json::json!({})),
            Err(_) => serde_json::json!({}),
        };
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert("chain_id".to_string(), serde_json::json!(chain_id));
            obj.insert(
                table.file_name().to_string(),
                serde_json::json!({
                    "rows": rows,
                    "updated_at": chrono::Utc::now().to_rfc3339(),
                }),
            );
        }
        let content = serde_json::to_string_pretty(&metadata).map_err(|e| {
            StoreError::Serialization(format!("Failed to serialize store metadata: {}", e))
        })?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| {
                StoreError::Io(format!("Failed to write store metadata {:?}: {}", path, e))
            })
    }
}

async fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::Io(format!("Failed to read {:?}: {}", path, e))),
    };

    let values: Vec<serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| StoreError::Serialization(format!("Failed to parse {:?}: {}", path, e)))?;

    let mut rows = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(row) => rows.push(row),
            Err(e) => error!("Skipping corrupt record {} in {:?}: {}", index, path, e),
        }
    }
    Ok(rows)
}

async fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::Io(format!("Failed to create {:?}: {}", dir, e)))?;
    }
    let content = serde_json::to_string_pretty(rows)
        .map_err(|e| StoreError::Serialization(format!("Failed to serialize {:?}: {}", path, e)))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| StoreError::Io(format!("Failed to write {:?}: {}", tmp, e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::Io(format!("Failed to replace {:?}: {}", path, e)))?;

    debug!("Wrote {} records to {:?}", rows.len(), path);
    Ok(())
}

#[async_trait::async_trait]
impl WalletStore for FileWalletStore {
    async fn get_all_transactions(
        &self,
        chain_id: &str,
    ) -> Result<Vec<TransactionEntity>, StoreError> {
        self.read_table(chain_id, Table::Transactions).await
    }

    async fn get_all_transactions_count(&self, chain_id: &str) -> Result<usize, StoreError> {
        let rows: Vec<TransactionEntity> = self.read_table(chain_id, Table::Transactions).await?;
        Ok(rows.len())
    }

    async fn put_transaction(
        &self,
        chain_id: &str,
        tx: &TransactionEntity,
    ) -> Result<(), StoreError> {
        let tx = tx.clone();
        self.modify(chain_id, Table::Transactions, |rows: &mut Vec<TransactionEntity>| {
            upsert_transaction(rows, tx)
        })
            .await
    }

    async fn update_transaction(
        &self,
        chain_id: &str,
        tx_hash: &str,
        block_height: u32,
        timestamp: u64,
    ) -> Result<bool, StoreError> {
        self.modify(chain_id, Table::Transactions, |rows: &mut Vec<TransactionEntity>| {
            update_transaction(rows, tx_hash, block_height, timestamp)
        })
        .await
    }

    async fn delete_tx_by_hash(&self, chain_id: &str, tx_hash: &str) -> Result<bool, StoreError> {
        self.modify(chain_id, Table::Transactions, |rows: &mut Vec<TransactionEntity>| {
            delete_transaction(rows, tx_hash)
        })
            .await
    }

    async fn delete_all_transactions(&self, chain_id: &str) -> Result<(), StoreError> {
        self.modify(chain_id, Table::Transactions, |rows: &mut Vec<TransactionEntity>| rows.clear())
            .await
    }

    async fn get_all_merkle_blocks(
        &self,
        chain_id: &str,
    ) -> Result<Vec<MerkleBlockEntity>, StoreError> {
        let mut rows: Vec<MerkleBlockEntity> =
            self.read_table(chain_id, Table::MerkleBlocks).await?;
        rows.sort_by_key(|r| r.block_height);
        Ok(rows)
    }

    async fn put_merkle_blocks(
        &self,
        chain_id: &str,
        blocks: &[MerkleBlockEntity],
    ) -> Result<(), StoreError> {
        self.modify(chain_id, Table::MerkleBlocks, |rows: &mut Vec<MerkleBlockEntity>| {
            upsert_blocks(rows, blocks)
        })
            .await
    }

    async fn delete_all_blocks(&self, chain_id: &str) -> Result<(), StoreError> {
        self.modify(chain_id, Table::MerkleBlocks, |rows: &mut Vec<MerkleBlockEntity>| rows.clear())
            .await
    }

    async fn get_all_peers(&self, chain_id: &str) -> Result<Vec<PeerEntity>, StoreError> {
        self.read_table(chain_id, Table::Peers).await
    }

    async fn put_peers(&self, chain_id: &str, peers: &[PeerEntity]) -> Result<(), StoreError> {
        self.modify(chain_id, Table::Peers, |rows: &mut Vec<PeerEntity>| upsert_peers(rows, peers))
            .await
    }

    async fn delete_all_peers(&self, chain_id: &str) -> Result<(), StoreError> {
        self.modify(chain_id, Table::Peers, |rows: &mut Vec<PeerEntity>| rows.clear())
            .await
    }
}
