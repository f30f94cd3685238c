//! A gateway with no peers.
//!
//! Watch-only wallets and the demo binary run against persisted state alone. Connecting
//! "succeeds" immediately and reports a sync that ends at the last persisted block; publishing
//! always fails.

use super::types::*;
use crate::types::Transaction;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub struct OfflineGateway {
    seed: GatewaySeed,
    events: GatewayEventSender,
    status: Mutex<ConnectStatus>,
}

impl OfflineGateway {
    pub fn new(seed: GatewaySeed, events: GatewayEventSender) -> Self {
        Self {
            seed,
            events,
            status: Mutex::new(ConnectStatus::Disconnected),
        }
    }

    fn set_status(&self, status: ConnectStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn replay_sync(&self) {
        self.events.send(GatewayEvent::SyncStarted);
        let tip = self.seed.tip_height();
        if tip > 0 {
            self.events.send(GatewayEvent::BlockHeightIncreased(tip));
        }
        self.events.send(GatewayEvent::SyncStopped { error: None });
    }
}

#[async_trait::async_trait]
impl PeerNetworkGateway for OfflineGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        info!(
            "Offline gateway for {}: {} persisted blocks, {} known peers",
            self.seed.chain_id,
            self.seed.blocks.len(),
            self.seed.peers.len()
        );
        self.set_status(ConnectStatus::Connected);
        self.replay_sync();
        Ok(())
    }

    async fn disconnect(&self) {
        debug!("Offline gateway for {} disconnected", self.seed.chain_id);
        self.set_status(ConnectStatus::Disconnected);
    }

    fn connect_status(&self) -> ConnectStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn publish_transaction(&self, tx: &Transaction) -> Result<(), GatewayError> {
        Err(GatewayError::Unreachable(format!(
            "offline gateway cannot broadcast {}",
            tx.hash()
        )))
    }

    async fn rescan(&self) -> Result<(), GatewayError> {
        self.replay_sync();
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGatewayFactory;

impl PeerGatewayFactory for OfflineGatewayFactory {
    fn create(&self, seed: GatewaySeed, events: GatewayEventSender) -> Arc<dyn PeerNetworkGateway> {
        Arc::new(OfflineGateway::new(seed, events))
    }
}
