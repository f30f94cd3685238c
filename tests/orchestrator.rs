use async_trait::async_trait;
use spv_wallet_sync::config::{LedgerConfig, SyncConfig};
use spv_wallet_sync::gateway::{
    ConnectStatus, GatewayError, GatewayEvent, GatewayEventSender, GatewaySeed,
    OfflineGatewayFactory, PeerGatewayFactory, PeerNetworkGateway,
};
use spv_wallet_sync::ledger::{BalanceType, SeedAccount, SubAccount, WalletListener};
use spv_wallet_sync::types::{
    Address, Asset, MerkleBlock, TX_UNCONFIRMED, Transaction, TransactionInput, TransactionOutput,
    RegisterAssetPayload, TxPayload, Uint168, Uint256,
};
use spv_wallet_sync::wallet::sync::repositories::{
    MerkleBlockEntity, PeerEntity, StoreError, TransactionEntity,
};
use spv_wallet_sync::wallet::sync::transaction_processor::TransactionProcessor;
use spv_wallet_sync::wallet::sync::{
    MemoryWalletStore, PeerManagerListener, ReconnectState, WalletStore,
};
use spv_wallet_sync::wallet::WalletSyncOrchestrator;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

struct MockGateway {
    log: Log,
    status: Mutex<ConnectStatus>,
    events: GatewayEventSender,
    seed: GatewaySeed,
    reject_publish: bool,
}

#[async_trait]
impl PeerNetworkGateway for MockGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        push(&self.log, "gateway:connect");
        *self.status.lock().unwrap() = ConnectStatus::Connected;
        Ok(())
    }

    async fn disconnect(&self) {
        push(&self.log, "gateway:disconnect");
        *self.status.lock().unwrap() = ConnectStatus::Disconnected;
    }

    fn connect_status(&self) -> ConnectStatus {
        *self.status.lock().unwrap()
    }

    async fn publish_transaction(&self, _tx: &Transaction) -> Result<(), GatewayError> {
        push(&self.log, "gateway:publish");
        if self.reject_publish {
            Err(GatewayError::Rejected("double spend".to_string()))
        } else {
            Ok(())
        }
    }

    async fn rescan(&self) -> Result<(), GatewayError> {
        push(&self.log, "gateway:rescan");
        Ok(())
    }
}

struct MockFactory {
    log: Log,
    reject_publish: bool,
    created: Mutex<Option<Arc<MockGateway>>>,
}

impl PeerGatewayFactory for MockFactory {
    fn create(&self, seed: GatewaySeed, events: GatewayEventSender) -> Arc<dyn PeerNetworkGateway> {
        let gateway = Arc::new(MockGateway {
            log: self.log.clone(),
            status: Mutex::new(ConnectStatus::Disconnected),
            events,
            seed,
            reject_publish: self.reject_publish,
        });
        *self.created.lock().unwrap() = Some(gateway.clone());
        gateway
    }
}

/// Memory store that records every write in the shared log.
struct RecordingStore {
    inner: MemoryWalletStore,
    log: Log,
}

#[async_trait]
impl WalletStore for RecordingStore {
    async fn get_all_transactions(
        &self,
        chain_id: &str,
    ) -> Result<Vec<TransactionEntity>, StoreError> {
        self.inner.get_all_transactions(chain_id).await
    }

    async fn get_all_transactions_count(&self, chain_id: &str) -> Result<usize, StoreError> {
        self.inner.get_all_transactions_count(chain_id).await
    }

    async fn put_transaction(
        &self,
        chain_id: &str,
        tx: &TransactionEntity,
    ) -> Result<(), StoreError> {
        push(&self.log, "store:put_transaction");
        self.inner.put_transaction(chain_id, tx).await
    }

    async fn update_transaction(
        &self,
        chain_id: &str,
        tx_hash: &str,
        block_height: u32,
        timestamp: u64,
    ) -> Result<bool, StoreError> {
        push(&self.log, "store:update_transaction");
        self.inner
            .update_transaction(chain_id, tx_hash, block_height, timestamp)
            .await
    }

    async fn delete_tx_by_hash(&self, chain_id: &str, tx_hash: &str) -> Result<bool, StoreError> {
        push(&self.log, "store:delete_tx_by_hash");
        self.inner.delete_tx_by_hash(chain_id, tx_hash).await
    }

    async fn delete_all_transactions(&self, chain_id: &str) -> Result<(), StoreError> {
        self.inner.delete_all_transactions(chain_id).await
    }

    async fn get_all_merkle_blocks(
        &self,
        chain_id: &str,
    ) -> Result<Vec<MerkleBlockEntity>, StoreError> {
        self.inner.get_all_merkle_blocks(chain_id).await
    }

    async fn put_merkle_blocks(
        &self,
        chain_id: &str,
        blocks: &[MerkleBlockEntity],
    ) -> Result<(), StoreError> {
        push(&self.log, "store:put_merkle_blocks");
        self.inner.put_merkle_blocks(chain_id, blocks).await
    }

    async fn delete_all_blocks(&self, chain_id: &str) -> Result<(), StoreError> {
        push(&self.log, "store:delete_all_blocks");
        self.inner.delete_all_blocks(chain_id).await
    }

    async fn get_all_peers(&self, chain_id: &str) -> Result<Vec<PeerEntity>, StoreError> {
        self.inner.get_all_peers(chain_id).await
    }

    async fn put_peers(&self, chain_id: &str, peers: &[PeerEntity]) -> Result<(), StoreError> {
        push(&self.log, "store:put_peers");
        self.inner.put_peers(chain_id, peers).await
    }

    async fn delete_all_peers(&self, chain_id: &str) -> Result<(), StoreError> {
        self.inner.delete_all_peers(chain_id).await
    }
}

/// Records the notifications that reach listeners.
struct Recorder {
    log: Log,
}

impl WalletListener for Recorder {
    fn on_tx_added(&self, _tx: &Transaction) {
        push(&self.log, "notify:tx_added");
    }

    fn on_tx_updated(&self, hashes: &[Uint256], block_height: u32, _timestamp: u64) {
        push(&self.log, format!("notify:tx_updated {} @{}", hashes.len(), block_height));
    }

    fn on_tx_deleted(&self, _hash: &Uint256, notify_user: bool, _recommend_rescan: bool) {
        push(&self.log, format!("notify:tx_deleted notify_user={}", notify_user));
    }
}

impl PeerManagerListener for Recorder {
    fn save_blocks(&self, replace: bool, blocks: &[MerkleBlock]) {
        push(&self.log, format!("notify:save_blocks {} replace={}", blocks.len(), replace));
    }

    fn tx_published(&self, _hash: &Uint256, error: Option<&str>) {
        push(&self.log, format!("notify:tx_published {:?}", error));
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

struct Harness {
    orchestrator: Arc<WalletSyncOrchestrator>,
    gateway: Arc<MockGateway>,
    store: Arc<RecordingStore>,
    log: Log,
    account: SeedAccount,
}

impl Harness {
    fn receive(&self, index: u32) -> Address {
        self.account.derive_address(false, index)
    }

    fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    async fn flush(&self) {
        assert!(self.orchestrator.hub().flush(Duration::from_secs(1)).await);
    }
}

async fn open(store: MemoryWalletStore, reject_publish: bool) -> Harness {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let account = SeedAccount::new([3; 32]);
    let store = Arc::new(RecordingStore {
        inner: store,
        log: log.clone(),
    });
    let factory = MockFactory {
        log: log.clone(),
        reject_publish,
        created: Mutex::new(None),
    };
    let config = SyncConfig {
        reconnect_seconds: 30,
        drain_timeout_ms: 500,
        earliest_peer_time: 0,
    };
    let orchestrator = WalletSyncOrchestrator::new(
        "ELA",
        Arc::new(account.clone()),
        LedgerConfig::default(),
        config,
        store.clone(),
        &factory,
    )
    .await
    .expect("orchestrator");

    let recorder = Arc::new(Recorder { log: log.clone() });
    orchestrator.hub().register_wallet_listener(recorder.clone());
    orchestrator.hub().register_peer_listener(recorder);

    let gateway = factory.created.lock().unwrap().take().expect("gateway created");
    Harness {
        orchestrator,
        gateway,
        store,
        log,
        account,
    }
}

fn pay(to: Address, amount: u64, nonce: u8) -> Transaction {
    Transaction::new(
        TxPayload::TransferAsset,
        vec![TransactionInput::new(Uint256([nonce; 32]), 0)],
        vec![TransactionOutput::new(Asset::native_id(), amount, to)],
        0,
        "",
    )
}

fn spend(parent: &Transaction, to: Address, amount: u64) -> Transaction {
    Transaction::new(
        TxPayload::TransferAsset,
        vec![TransactionInput::new(parent.hash(), 0)],
        vec![TransactionOutput::new(Asset::native_id(), amount, to)],
        0,
        "",
    )
}

fn stranger() -> Address {
    Uint168::with_prefix(0x21, &[0x99; 20])
}

fn block(height: u32) -> MerkleBlock {
    MerkleBlock {
        version: 1,
        prev_block: Uint256([height as u8; 32]),
        merkle_root: Uint256([0x11; 32]),
        timestamp: 1_600_000_000 + height,
        bits: 0x1d00_ffff,
        nonce: height,
        total_transactions: 1,
        hashes: vec![Uint256([0x22; 32])],
        flags: vec![1],
        height,
    }
}

#[tokio::test]
async fn cold_start_rebuilds_the_ledger_from_the_store() {
    let account = SeedAccount::new([3; 32]);
    let processor = TransactionProcessor::new();
    let store = MemoryWalletStore::new();

    let funding = pay(account.derive_address(false, 0), 500_000, 1).with_block(5, 1_700_000_000);
    let pending = pay(account.derive_address(false, 1), 70_000, 2);
    store.put_transaction("ELA", &processor.to_entity(&funding)).await.unwrap();
    store.put_transaction("ELA", &processor.to_entity(&pending)).await.unwrap();
    let mut corrupt = processor.to_entity(&pay(account.derive_address(false, 2), 1_000, 3));
    corrupt.buffer.truncate(7);
    store.put_transaction("ELA", &corrupt).await.unwrap();
    store
        .put_merkle_blocks(
            "ELA",
            &[processor.block_to_entity(&block(5)), processor.block_to_entity(&block(9))],
        )
        .await
        .unwrap();

    let h = open(store, false).await;
    let ledger = h.orchestrator.ledger();
    assert_eq!(ledger.get_all_transactions().len(), 2);
    assert_eq!(ledger.block_height(), 9);
    assert_eq!(ledger.get_balance(&Asset::native_id(), BalanceType::Confirmed), 500_000);
    assert_eq!(ledger.get_balance(&Asset::native_id(), BalanceType::Total), 570_000);

    assert_eq!(h.gateway.seed.tip_height(), 9);
    assert_eq!(h.gateway.seed.blocks.len(), 2);
    assert_eq!(h.orchestrator.sync_stats().start_height, 9);
    assert_eq!(h.orchestrator.reconnect_state(), ReconnectState::Disconnected);
    assert!(h.log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn events_persist_before_the_ledger_and_notify_after() {
    let h = open(MemoryWalletStore::new(), false).await;
    let tx = pay(h.receive(0), 200_000, 1);

    h.orchestrator
        .handle_gateway_event(GatewayEvent::TxAdded(Box::new(tx.clone())))
        .await
        .unwrap();
    h.flush().await;
    let log = entries(&h.log);
    let put = log.iter().position(|e| e == "store:put_transaction").unwrap();
    let added = log.iter().position(|e| e == "notify:tx_added").unwrap();
    assert!(put < added);
    assert!(h.orchestrator.ledger().contains_transaction(&tx.hash()));

    h.clear();
    h.orchestrator
        .handle_gateway_event(GatewayEvent::TxUpdated {
            hashes: vec![tx.hash()],
            block_height: 12,
            timestamp: 1_700_000_100,
        })
        .await
        .unwrap();
    h.flush().await;
    assert_eq!(
        entries(&h.log),
        vec!["store:update_transaction", "notify:tx_updated 1 @12"]
    );
    let stored = h.orchestrator.get_transactions(|t| t.hash() == tx.hash()).await.unwrap();
    assert_eq!(stored[0].block_height(), 12);
    assert_eq!(h.orchestrator.sync_stats().transactions_updated, 1);
}

#[tokio::test]
async fn irrelevant_transactions_do_not_stay_in_the_store() {
    let h = open(MemoryWalletStore::new(), false).await;
    h.orchestrator
        .handle_gateway_event(GatewayEvent::TxAdded(Box::new(pay(stranger(), 1_000, 4))))
        .await
        .unwrap();
    assert_eq!(h.orchestrator.get_all_transactions_count().await.unwrap(), 0);
    assert!(h.orchestrator.ledger().get_all_transactions().is_empty());
}

#[tokio::test]
async fn deletion_cascades_through_store_and_ledger() {
    let h = open(MemoryWalletStore::new(), false).await;
    let parent = pay(h.receive(0), 300_000, 1);
    let child = spend(&parent, h.receive(1), 250_000);
    for tx in [&parent, &child] {
        h.orchestrator
            .handle_gateway_event(GatewayEvent::TxAdded(Box::new(tx.clone())))
            .await
            .unwrap();
    }
    assert_eq!(h.orchestrator.get_all_transactions_count().await.unwrap(), 2);

    h.orchestrator
        .handle_gateway_event(GatewayEvent::TxDeleted { hash: parent.hash() })
        .await
        .unwrap();
    h.flush().await;

    assert_eq!(h.orchestrator.get_all_transactions_count().await.unwrap(), 0);
    assert!(h.orchestrator.ledger().get_all_transactions().is_empty());
    let deletes = entries(&h.log)
        .iter()
        .filter(|e| e.starts_with("notify:tx_deleted"))
        .count();
    assert_eq!(deletes, 2);
    assert_eq!(h.orchestrator.sync_stats().transactions_removed, 2);
}

#[tokio::test]
async fn blocks_skip_genesis_and_fan_out_unchanged() {
    let h = open(MemoryWalletStore::new(), false).await;
    h.orchestrator
        .handle_gateway_event(GatewayEvent::SaveBlocks {
            replace: true,
            blocks: vec![block(0), block(1), block(2)],
        })
        .await
        .unwrap();
    h.flush().await;

    assert_eq!(
        entries(&h.log),
        vec![
            "store:delete_all_blocks",
            "store:put_merkle_blocks",
            "notify:save_blocks 3 replace=true",
        ]
    );
    let stored = h.store.get_all_merkle_blocks("ELA").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(h.orchestrator.sync_stats().highest_block_height, 2);
}

#[tokio::test]
async fn reorg_unconfirms_in_store_and_ledger() {
    let h = open(MemoryWalletStore::new(), false).await;
    let early = pay(h.receive(0), 100_000, 1).with_block(10, 1);
    let late = pay(h.receive(1), 100_000, 2).with_block(30, 2);
    for tx in [&early, &late] {
        h.orchestrator
            .handle_gateway_event(GatewayEvent::TxAdded(Box::new(tx.clone())))
            .await
            .unwrap();
    }
    h.orchestrator
        .handle_gateway_event(GatewayEvent::TxUnconfirmedAfter(20))
        .await
        .unwrap();

    let stored = h.orchestrator.get_transactions(|_| true).await.unwrap();
    let late_stored = stored.iter().find(|t| t.hash() == late.hash()).unwrap();
    let early_stored = stored.iter().find(|t| t.hash() == early.hash()).unwrap();
    assert_eq!(late_stored.block_height(), TX_UNCONFIRMED);
    assert_eq!(early_stored.block_height(), 10);
    assert_eq!(h.orchestrator.ledger().block_height(), 20);
    assert!(
        !h.orchestrator
            .ledger()
            .transaction_for_hash(&late.hash())
            .unwrap()
            .is_confirmed()
    );
}

#[tokio::test]
async fn events_sent_through_the_gateway_are_applied_in_order() {
    let h = open(MemoryWalletStore::new(), false).await;
    let tx = pay(h.receive(0), 200_000, 1);
    h.gateway.events.send(GatewayEvent::TxAdded(Box::new(tx.clone())));
    h.gateway.events.send(GatewayEvent::TxUpdated {
        hashes: vec![tx.hash()],
        block_height: 8,
        timestamp: 3,
    });
    h.gateway.events.send(GatewayEvent::BlockHeightIncreased(8));

    for _ in 0..100 {
        if h.orchestrator.ledger().block_height() == 8 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.orchestrator.ledger().block_height(), 8);
    assert_eq!(
        h.orchestrator
            .ledger()
            .get_balance(&Asset::native_id(), BalanceType::Confirmed),
        200_000
    );
}

#[tokio::test(start_paused = true)]
async fn at_most_one_reconnect_timer() {
    let h = open(MemoryWalletStore::new(), false).await;
    h.orchestrator.start().await.unwrap();
    h.orchestrator.sync_is_inactive().await;
    assert_eq!(h.orchestrator.reconnect_state(), ReconnectState::TimerArmed);
    assert_eq!(h.orchestrator.live_reconnect_timers(), 1);

    // already disconnected, so nothing new is armed
    h.orchestrator.sync_is_inactive().await;
    assert_eq!(h.orchestrator.live_reconnect_timers(), 1);
    assert_eq!(h.orchestrator.pending_reconnect_tasks(), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.orchestrator.reconnect_state(), ReconnectState::Connected);
    assert_eq!(h.orchestrator.live_reconnect_timers(), 0);
    assert_eq!(h.orchestrator.pending_reconnect_tasks(), 0);

    h.orchestrator.sync_is_inactive().await;
    assert!(h.orchestrator.reset_reconnect());
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(h.orchestrator.reconnect_state(), ReconnectState::TimerArmed);
    assert!(h.orchestrator.live_reconnect_timers() <= 1);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.orchestrator.reconnect_state(), ReconnectState::Connected);

    let connects = entries(&h.log)
        .iter()
        .filter(|e| *e == "gateway:connect")
        .count();
    assert_eq!(connects, 3);
}

#[tokio::test(start_paused = true)]
async fn publishing_while_disconnected_cancels_the_timer_and_connects_first() {
    let h = open(MemoryWalletStore::new(), false).await;
    h.orchestrator.start().await.unwrap();
    h.orchestrator.sync_is_inactive().await;
    h.clear();

    let mut tx = pay(stranger(), 10_000, 9);
    tx.set_remark("rent");
    h.orchestrator.publish_transaction(&tx).await;
    assert_eq!(entries(&h.log), vec!["gateway:connect", "gateway:publish"]);
    assert_eq!(h.orchestrator.ledger().get_remark(&tx.hash()).as_deref(), Some("rent"));

    // the cancelled timer must not connect again
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(entries(&h.log), vec!["gateway:connect", "gateway:publish"]);
    assert_eq!(h.orchestrator.live_reconnect_timers(), 0);
    assert_eq!(h.orchestrator.pending_reconnect_tasks(), 0);
}

#[tokio::test]
async fn rejected_publish_is_reported_to_listeners() {
    let h = open(MemoryWalletStore::new(), true).await;
    h.orchestrator.start().await.unwrap();
    h.clear();

    h.orchestrator
        .publish_transaction(&pay(stranger(), 10_000, 9))
        .await;
    h.flush().await;
    assert_eq!(
        entries(&h.log),
        vec![
            "gateway:publish",
            "notify:tx_published Some(\"Transaction rejected: double spend\")",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_cancels_reconnects() {
    let h = open(MemoryWalletStore::new(), false).await;
    h.orchestrator.stop().await;
    h.orchestrator.stop().await;
    assert_eq!(
        entries(&h.log),
        vec!["gateway:disconnect", "gateway:disconnect"]
    );

    h.orchestrator.start().await.unwrap();
    h.orchestrator.sync_is_inactive().await;
    h.orchestrator.stop().await;
    assert_eq!(h.orchestrator.reconnect_state(), ReconnectState::Disconnected);
    h.clear();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(entries(&h.log).is_empty());

    h.orchestrator.shutdown().await;
    assert!(!h.orchestrator.hub().is_running());
}

#[tokio::test]
async fn recover_extends_addresses_and_rescans() {
    let h = open(MemoryWalletStore::new(), false).await;
    let before = h.orchestrator.ledger().get_all_addresses(0, 1000, true).len();
    h.orchestrator.recover(10).await.unwrap();
    assert_eq!(entries(&h.log), vec!["gateway:rescan"]);
    assert!(h.orchestrator.ledger().get_all_addresses(0, 1000, true).len() >= before);
}

#[tokio::test]
async fn offline_publish_reaches_listeners_instead_of_the_caller() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = WalletSyncOrchestrator::new(
        "ELA",
        Arc::new(SeedAccount::new([3; 32])),
        LedgerConfig::default(),
        SyncConfig::default(),
        Arc::new(MemoryWalletStore::new()),
        &OfflineGatewayFactory,
    )
    .await
    .expect("orchestrator");
    orchestrator
        .hub()
        .register_peer_listener(Arc::new(Recorder { log: log.clone() }));

    let tx = pay(stranger(), 10_000, 9);
    orchestrator.publish_transaction(&tx).await;
    assert!(orchestrator.hub().flush(Duration::from_secs(1)).await);
    let published: Vec<String> = entries(&log)
        .into_iter()
        .filter(|e| e.starts_with("notify:tx_published"))
        .collect();
    assert_eq!(published.len(), 1);
    assert!(published[0].contains("offline gateway cannot broadcast"));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn coinbase_deletion_removes_its_spenders_from_the_store() {
    let h = open(MemoryWalletStore::new(), false).await;
    let reward = Transaction::new(
        TxPayload::CoinBase { data: vec![7] },
        vec![],
        vec![TransactionOutput::new(Asset::native_id(), 400_000, h.receive(0))],
        0,
        "",
    )
    .with_block(10, 1);
    let child = spend(&reward, stranger(), 350_000);
    for tx in [&reward, &child] {
        h.orchestrator
            .handle_gateway_event(GatewayEvent::TxAdded(Box::new(tx.clone())))
            .await
            .unwrap();
    }
    assert_eq!(h.orchestrator.get_all_transactions_count().await.unwrap(), 2);

    h.orchestrator
        .handle_gateway_event(GatewayEvent::TxDeleted { hash: reward.hash() })
        .await
        .unwrap();
    assert_eq!(h.orchestrator.get_all_transactions_count().await.unwrap(), 0);
    let ledger = h.orchestrator.ledger();
    assert!(!ledger.contains_transaction(&child.hash()));
    assert!(ledger.get_all_coin_base_utxo().is_empty());
}

#[tokio::test]
async fn registered_assets_survive_a_restart() {
    let h = open(MemoryWalletStore::new(), false).await;
    let token = Asset::new("TOKEN", "test token", 4);
    let token_id = token.id();
    let register = Transaction::new(
        TxPayload::RegisterAsset(RegisterAssetPayload {
            asset: token,
            amount: 1_000_000,
            controller: stranger(),
        }),
        vec![TransactionInput::new(Uint256([0x31; 32]), 0)],
        vec![TransactionOutput::new(token_id, 1_000_000, stranger())],
        0,
        "",
    )
    .with_block(4, 1);
    let payment = Transaction::new(
        TxPayload::TransferAsset,
        vec![TransactionInput::new(register.hash(), 0)],
        vec![TransactionOutput::new(token_id, 5_000, h.receive(0))],
        0,
        "",
    )
    .with_block(5, 2);
    for tx in [&register, &payment] {
        h.orchestrator
            .handle_gateway_event(GatewayEvent::TxAdded(Box::new(tx.clone())))
            .await
            .unwrap();
    }
    assert_eq!(
        h.orchestrator.ledger().get_balance(&token_id, BalanceType::Total),
        5_000
    );
    assert_eq!(h.orchestrator.get_all_transactions_count().await.unwrap(), 2);

    let reopened = MemoryWalletStore::new();
    for entity in h.store.get_all_transactions("ELA").await.unwrap() {
        reopened.put_transaction("ELA", &entity).await.unwrap();
    }
    h.orchestrator.shutdown().await;

    let restarted = open(reopened, false).await;
    let ledger = restarted.orchestrator.ledger();
    assert!(ledger.get_asset(&token_id).is_some());
    assert_eq!(ledger.get_balance(&token_id, BalanceType::Total), 5_000);
    assert!(!ledger.contains_transaction(&register.hash()));
}
