//! Types shared between the sync orchestrator and peer network gateways.

use crate::types::{MerkleBlock, PeerInfo, Transaction, Uint256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connection state as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything a gateway needs to resume where the last session stopped.
#[derive(Debug, Clone, Default)]
pub struct GatewaySeed {
    pub chain_id: String,
    /// Persisted merkle blocks in height order.
    pub blocks: Vec<MerkleBlock>,
    pub peers: Vec<PeerInfo>,
    /// Peers last seen before this unix time are not worth dialing.
    pub earliest_peer_time: u64,
}

impl GatewaySeed {
    /// Height of the last persisted block, or 0 when starting from scratch.
    pub fn tip_height(&self) -> u32 {
        self.blocks.iter().map(|b| b.height).max().unwrap_or(0)
    }
}

/// Verified results and status changes reported by a gateway.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum GatewayEvent {
    /// A transaction relevant to the wallet was seen, confirmed or not.
    TxAdded(Box<Transaction>),
    /// Transactions were confirmed in a block, or unconfirmed when the height is the sentinel.
    TxUpdated {
        hashes: Vec<Uint256>,
        block_height: u32,
        timestamp: u64,
    },
    /// Peers rejected a transaction, e.g. because it double spends.
    TxDeleted { hash: Uint256 },
    SaveBlocks {
        replace: bool,
        blocks: Vec<MerkleBlock>,
    },
    SavePeers {
        replace: bool,
        peers: Vec<PeerInfo>,
    },
    SyncStarted,
    SyncStopped { error: Option<String> },
    TxStatusUpdate,
    TxPublished {
        hash: Uint256,
        error: Option<String>,
    },
    BlockHeightIncreased(u32),
    /// The download peer went quiet while connected.
    SyncIsInactive,
    /// A reorg rolled the chain back to this height.
    TxUnconfirmedAfter(u32),
}

impl GatewayEvent {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::TxAdded(_) => "TxAdded",
            GatewayEvent::TxUpdated { .. } => "TxUpdated",
            GatewayEvent::TxDeleted { .. } => "TxDeleted",
            GatewayEvent::SaveBlocks { .. } => "SaveBlocks",
            GatewayEvent::SavePeers { .. } => "SavePeers",
            GatewayEvent::SyncStarted => "SyncStarted",
            GatewayEvent::SyncStopped { .. } => "SyncStopped",
            GatewayEvent::TxStatusUpdate => "TxStatusUpdate",
            GatewayEvent::TxPublished { .. } => "TxPublished",
            GatewayEvent::BlockHeightIncreased(_) => "BlockHeightIncreased",
            GatewayEvent::SyncIsInactive => "SyncIsInactive",
            GatewayEvent::TxUnconfirmedAfter(_) => "TxUnconfirmedAfter",
        }
    }
}

/// Cloneable handle a gateway uses to report events to its orchestrator.
#[derive(Debug, Clone)]
pub struct GatewayEventSender {
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl GatewayEventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an event. Returns false once the orchestrator has shut down.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Error types for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("No reachable peers: {0}")]
    Unreachable(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Gateway is shut down")]
    Closed,
}

/// Connections to the peer network for one chain.
///
/// Callbacks arrive through the `GatewayEventSender` the factory was given and may race with
/// any call made here.
#[async_trait::async_trait]
pub trait PeerNetworkGateway: Send + Sync {
    /// Start connecting. Completes once the attempt has been started, not once peers answer.
    async fn connect(&self) -> Result<(), GatewayError>;

    async fn disconnect(&self);

    fn connect_status(&self) -> ConnectStatus;

    /// Hand a signed transaction to the peers. The outcome is reported as `TxPublished`.
    async fn publish_transaction(&self, tx: &Transaction) -> Result<(), GatewayError>;

    /// Download the chain again from the last checkpoint.
    async fn rescan(&self) -> Result<(), GatewayError>;
}

pub trait PeerGatewayFactory: Send + Sync {
    fn create(&self, seed: GatewaySeed, events: GatewayEventSender) -> Arc<dyn PeerNetworkGateway>;
}
