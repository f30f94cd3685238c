//! Wallet sync orchestrator for one chain.
//!
//! `WalletSyncOrchestrator` owns a sub-wallet's `Ledger`, its peer network gateway and the
//! store that survives restarts. Gateway events are handled one at a time by a pump task, and
//! each one follows the same order:
//! - persist the change through the `StatePersistenceService`
//! - apply it to the `Ledger`
//! - fan the resulting notifications out through the `NotificationHub`
//!
//! The orchestrator also drives reconnection. When the gateway reports that syncing stalled,
//! it disconnects and arms the single reconnect timer; the timer callback reconnects unless
//! something else already did.

use crate::config::{LedgerConfig, SyncConfig};
use crate::gateway::{
    ConnectStatus, GatewayEvent, GatewayEventSender, GatewaySeed, PeerGatewayFactory,
    PeerNetworkGateway,
};
use crate::ledger::{Ledger, SubAccount};
use crate::types::{MerkleBlock, PeerInfo, TX_UNCONFIRMED, Transaction, Uint256};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::{
    events::{NotificationHub, SyncEvent},
    progress_tracker::{SyncProgressTracker, SyncStats},
    reconnect::{ReconnectState, Reconnector, TimerCancelled},
    repositories::WalletStore,
    state_persistence::StatePersistenceService,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Drives one chain's wallet: turns gateway events into store writes, ledger changes and
/// listener notifications, in that order, and owns the reconnect timer.
pub struct WalletSyncOrchestrator {
    /// Chain this orchestrator syncs, also the store partition key.
    chain_id: String,
    ledger: Arc<Ledger>,
    /// Shared with the ledger, which publishes its events here.
    hub: Arc<NotificationHub>,
    /// Every gateway event is written through this before the ledger sees it.
    persistence: StatePersistenceService,
    gateway: Arc<dyn PeerNetworkGateway>,
    /// At most one reconnect timer.
    reconnector: Reconnector,
    progress: Mutex<SyncProgressTracker>,
    config: SyncConfig,
    /// Task draining gateway events into `handle_gateway_event`.
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl WalletSyncOrchestrator {
    /// Build the ledger from what `store` holds for `chain_id` and create the gateway.
    ///
    /// Nothing connects until `start()` is called.
    pub async fn new(
        chain_id: impl Into<String>,
        account: Arc<dyn SubAccount>,
        ledger_config: LedgerConfig,
        config: SyncConfig,
        store: Arc<dyn WalletStore>,
        factory: &dyn PeerGatewayFactory,
    ) -> Result<Arc<Self>, WalletSyncError> {
        let chain_id = chain_id.into();
        let hub = Arc::new(NotificationHub::new());
        let ledger = Arc::new(Ledger::new(
            chain_id.clone(),
            account,
            ledger_config,
            hub.clone(),
        ));

        let persistence = StatePersistenceService::new(chain_id.clone(), store);
        let persisted = persistence.restore_state().await?;
        let stored = persisted.transactions.len();
        let loaded = ledger.load_transactions(persisted.transactions);
        if loaded != stored {
            warn!(
                "{} of {} stored transactions for {} were not loaded",
                stored - loaded,
                stored,
                chain_id
            );
        }

        let seed = GatewaySeed {
            chain_id: chain_id.clone(),
            blocks: persisted.blocks,
            peers: persisted.peers,
            earliest_peer_time: config.earliest_peer_time,
        };
        let tip = seed.tip_height();
        if tip > 0 {
            ledger.set_block_height(tip);
        }
        info!(
            "Opened {} with {} transactions at height {}",
            chain_id, loaded, tip
        );

        let (events, rx) = GatewayEventSender::channel();
        let gateway = factory.create(seed, events);

        let orchestrator = Arc::new(Self {
            chain_id,
            ledger,
            hub,
            persistence,
            gateway,
            reconnector: Reconnector::new(config.reconnect_interval()),
            progress: Mutex::new(SyncProgressTracker::new(tip)),
            config,
            pump: Mutex::new(None),
        });
        let pump = tokio::spawn(pump_events(Arc::downgrade(&orchestrator), rx));
        *orchestrator.pump_slot() = Some(pump);
        Ok(orchestrator)
    }

    fn pump_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn progress(&self) -> MutexGuard<'_, SyncProgressTracker> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// The in-memory wallet state for this chain.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Where listeners register.
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Connection state as the gateway reports it.
    pub fn connect_status(&self) -> ConnectStatus {
        self.gateway.connect_status()
    }

    /// Connection state refined with whether a reconnect timer is armed.
    pub fn reconnect_state(&self) -> ReconnectState {
        match self.gateway.connect_status() {
            ConnectStatus::Connected => ReconnectState::Connected,
            ConnectStatus::Connecting => ReconnectState::Connecting,
            ConnectStatus::Disconnected if self.reconnector.is_armed() => {
                ReconnectState::TimerArmed
            }
            ConnectStatus::Disconnected => ReconnectState::Disconnected,
        }
    }

    /// Reconnect timers currently waiting. Never more than one.
    pub fn live_reconnect_timers(&self) -> usize {
        self.reconnector.live_timers()
    }

    /// Reconnect callbacks queued since the last one ran.
    pub fn pending_reconnect_tasks(&self) -> u32 {
        self.reconnector.pending_tasks()
    }

    /// Counters for events handled and blocks saved since construction.
    pub fn sync_stats(&self) -> SyncStats {
        self.progress().get_stats()
    }

    /// Polls the registered peer listeners.
    pub fn network_is_reachable(&self) -> bool {
        self.hub.network_is_reachable()
    }

    // ---- lifecycle ----

    /// Connect the gateway. A no-op when already connected.
    pub async fn start(&self) -> Result<(), WalletSyncError> {
        if self.gateway.connect_status() == ConnectStatus::Connected {
            debug!("{} is already connected", self.chain_id);
            return Ok(());
        }
        info!("Starting sync for {}", self.chain_id);
        self.gateway.connect().await?;
        Ok(())
    }

    /// Cancel any reconnect, disconnect, and wait a bounded time for queued notifications.
    /// Safe to call repeatedly and without a prior `start()`.
    pub async fn stop(&self) {
        if self.reconnector.cancel() {
            debug!("Cancelled pending reconnect for {}", self.chain_id);
        }
        self.gateway.disconnect().await;
        if !self.hub.flush(self.config.drain_timeout()).await {
            warn!("Stopped {} with notifications still queued", self.chain_id);
        }
        info!("Stopped sync for {}", self.chain_id);
    }

    /// Stop, then tear down the notification worker and the event pump.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.hub.shutdown(self.config.drain_timeout()).await;
        if let Some(pump) = self.pump_slot().take() {
            pump.abort();
        }
        info!("{}", self.sync_stats().summary());
    }

    // ---- reconnection ----

    /// The download peer went quiet: drop the connection and schedule a reconnect.
    pub async fn sync_is_inactive(self: &Arc<Self>) {
        if self.gateway.connect_status() == ConnectStatus::Connected {
            self.gateway.disconnect().await;
            self.start_reconnect();
        }
    }

    fn start_reconnect(self: &Arc<Self>) {
        info!(
            "Reconnecting {} in {}s",
            self.chain_id,
            self.reconnector.interval().as_secs()
        );
        let orchestrator = Arc::downgrade(self);
        self.reconnector.arm(move |result| async move {
            if let Some(orchestrator) = orchestrator.upgrade() {
                orchestrator.async_connect(result).await;
            }
        });
    }

    /// Push the pending reconnect back by one interval. Returns false if none is pending.
    pub fn reset_reconnect(&self) -> bool {
        self.reconnector.extend()
    }

    /// Reconnect timer callback.
    pub async fn async_connect(&self, fired: Result<(), TimerCancelled>) {
        match fired {
            Ok(()) => {
                if self.gateway.connect_status() != ConnectStatus::Connected {
                    info!("Reconnecting {}", self.chain_id);
                    if let Err(e) = self.gateway.connect().await {
                        warn!("Reconnect of {} failed: {}", self.chain_id, e);
                    }
                }
            }
            Err(e) => warn!("Reconnect of {} skipped: {}", self.chain_id, e),
        }
        if self.reconnector.pending_tasks() > 0 {
            self.reconnector.reset_task_count();
        }
    }

    // ---- publishing ----

    /// Broadcast a signed transaction, connecting first if needed, and remember its remark.
    ///
    /// Network failures are not returned. They reach peer listeners as `tx_published` with
    /// the error text, the same way a rejection reported later by the peers does.
    pub async fn publish_transaction(&self, tx: &Transaction) {
        if self.gateway.connect_status() != ConnectStatus::Connected {
            self.reconnector.cancel();
            if let Err(e) = self.gateway.connect().await {
                warn!("Connecting {} to publish failed: {}", self.chain_id, e);
            }
        }

        let hash = tx.hash();
        let published = self.gateway.publish_transaction(tx).await;
        if !tx.remark().is_empty() {
            self.ledger.register_remark(&hash, tx.remark());
        }
        match published {
            Ok(()) => info!("Published {} on {}", hash, self.chain_id),
            Err(e) => {
                warn!("Publishing {} on {} failed: {}", hash, self.chain_id, e);
                self.hub.publish(SyncEvent::TxPublished {
                    hash,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    // ---- read-through ----

    /// Stored transactions matching `filter`, decoded from the store rather than the ledger.
    pub async fn get_transactions(
        &self,
        filter: impl Fn(&Transaction) -> bool,
    ) -> Result<Vec<Transaction>, WalletSyncError> {
        let txs = self.persistence.load_transactions().await?;
        Ok(txs.into_iter().filter(|tx| filter(tx)).collect())
    }

    /// Number of stored transaction rows for this chain.
    pub async fn get_all_transactions_count(&self) -> Result<usize, WalletSyncError> {
        self.persistence.transactions_count().await
    }

    /// Extend both address chains by `limit_gap` unused addresses and download the chain again.
    pub async fn recover(&self, limit_gap: u32) -> Result<(), WalletSyncError> {
        let external = self.ledger.unused_addresses(limit_gap, false);
        let internal = self.ledger.unused_addresses(limit_gap, true);
        info!(
            "Recovering {} with {} receive and {} change addresses",
            self.chain_id,
            external.len(),
            internal.len()
        );
        self.gateway.rescan().await?;
        Ok(())
    }

    // ---- gateway events ----

    /// Apply one gateway event. The pump calls this for every event the gateway sends.
    pub async fn handle_gateway_event(
        self: &Arc<Self>,
        event: GatewayEvent,
    ) -> Result<(), WalletSyncError> {
        debug!("{}: {}", self.chain_id, event.kind());
        match event {
            GatewayEvent::TxAdded(tx) => self.on_tx_added(*tx).await?,
            GatewayEvent::TxUpdated {
                hashes,
                block_height,
                timestamp,
            } => self.on_tx_updated(&hashes, block_height, timestamp).await?,
            GatewayEvent::TxDeleted { hash } => self.on_tx_deleted(&hash).await?,
            GatewayEvent::SaveBlocks { replace, blocks } => {
                self.save_blocks(replace, blocks).await?
            }
            GatewayEvent::SavePeers { replace, peers } => self.save_peers(replace, peers).await?,
            GatewayEvent::SyncStarted => {
                self.progress().sync_started();
                self.hub.publish(SyncEvent::SyncStarted);
            }
            GatewayEvent::SyncStopped { error } => {
                self.progress().sync_stopped(error.as_deref());
                self.hub.publish(SyncEvent::SyncStopped { error });
            }
            GatewayEvent::TxStatusUpdate => self.hub.publish(SyncEvent::TxStatusUpdate),
            GatewayEvent::TxPublished { hash, error } => {
                self.hub.publish(SyncEvent::TxPublished { hash, error })
            }
            GatewayEvent::BlockHeightIncreased(block_height) => {
                self.ledger.set_block_height(block_height);
                {
                    let mut progress = self.progress();
                    progress.record_height(block_height);
                    progress.log_progress(false);
                }
                self.hub.publish(SyncEvent::BlockHeightIncreased(block_height));
            }
            GatewayEvent::SyncIsInactive => self.sync_is_inactive().await,
            GatewayEvent::TxUnconfirmedAfter(block_height) => {
                self.on_tx_unconfirmed_after(block_height).await?
            }
        }
        Ok(())
    }

    async fn on_tx_added(&self, mut tx: Transaction) -> Result<(), WalletSyncError> {
        let hash = tx.hash();
        if let Some(remark) = self.ledger.get_remark(&hash) {
            tx.set_remark(remark);
        }
        self.persistence.save_transaction(&tx).await?;

        if self.ledger.register_transaction(tx.clone()) {
            self.progress().record_transaction_added();
        } else if !self.ledger.contains_transaction(&hash)
            && !self.ledger.registers_known_asset(&tx)
        {
            debug!("{} is not relevant to {}, dropping it", hash, self.chain_id);
            self.persistence.delete_transactions(&[hash]).await?;
        }
        Ok(())
    }

    async fn on_tx_updated(
        &self,
        hashes: &[Uint256],
        block_height: u32,
        timestamp: u64,
    ) -> Result<(), WalletSyncError> {
        self.persistence
            .update_transactions(hashes, block_height, timestamp)
            .await?;
        self.ledger.update_transactions(hashes, block_height, timestamp);
        self.progress().record_transactions_updated(hashes.len());
        Ok(())
    }

    async fn on_tx_deleted(&self, hash: &Uint256) -> Result<(), WalletSyncError> {
        let mut doomed = self.ledger.removal_set(hash);
        if doomed.is_empty() {
            doomed.push(*hash);
        }
        self.persistence.delete_transactions(&doomed).await?;

        let removed = self.ledger.remove_transaction(hash);
        for r in removed.iter().filter(|r| r.notify_user) {
            warn!(
                "{} removed from {} (rescan recommended: {})",
                r.hash, self.chain_id, r.recommend_rescan
            );
        }
        self.progress().record_transactions_removed(removed.len());
        Ok(())
    }

    async fn save_blocks(
        &self,
        replace: bool,
        blocks: Vec<MerkleBlock>,
    ) -> Result<(), WalletSyncError> {
        let saved = self.persistence.save_blocks(replace, &blocks).await?;
        debug!("Saved {} blocks for {} (replace: {})", saved, self.chain_id, replace);
        {
            let mut progress = self.progress();
            for block in &blocks {
                progress.record_block(block.height);
            }
        }
        self.hub.publish(SyncEvent::SaveBlocks { replace, blocks });
        Ok(())
    }

    async fn save_peers(&self, replace: bool, peers: Vec<PeerInfo>) -> Result<(), WalletSyncError> {
        self.persistence.save_peers(replace, &peers).await?;
        self.hub.publish(SyncEvent::SavePeers { replace, peers });
        Ok(())
    }

    async fn on_tx_unconfirmed_after(&self, block_height: u32) -> Result<(), WalletSyncError> {
        let mut rolled_back: Vec<Uint256> = self
            .ledger
            .tx_unconfirmed_before(block_height)
            .iter()
            .filter(|tx| tx.is_confirmed())
            .map(Transaction::hash)
            .collect();
        rolled_back.extend(
            self.ledger
                .get_all_coin_base_utxo()
                .iter()
                .filter(|cb| cb.block_height != TX_UNCONFIRMED && cb.block_height > block_height)
                .map(|cb| cb.tx_hash()),
        );
        rolled_back.sort();
        rolled_back.dedup();

        info!(
            "Chain for {} rolled back to {}, {} transactions unconfirmed",
            self.chain_id,
            block_height,
            rolled_back.len()
        );
        self.persistence
            .update_transactions(&rolled_back, TX_UNCONFIRMED, 0)
            .await?;
        self.ledger.set_tx_unconfirmed_after(block_height);
        self.progress().rewind_to(block_height);
        Ok(())
    }
}

async fn pump_events(
    orchestrator: Weak<WalletSyncOrchestrator>,
    mut rx: mpsc::UnboundedReceiver<GatewayEvent>,
) {
    while let Some(event) = rx.recv().await {
        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };
        let kind = event.kind();
        if let Err(e) = orchestrator.handle_gateway_event(event).await {
            error!(
                "Failed to handle {} for {}: {}",
                kind, orchestrator.chain_id, e
            );
        }
    }
    debug!("Gateway event pump stopped");
}
