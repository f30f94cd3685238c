//! Event fan-out for wallet synchronization.
//!
//! Listeners never run on the caller's thread. Ledger events and orchestrator status events
//! are queued on the `NotificationHub`, and one background worker delivers them in the order
//! they were published, to every subscriber in the order it registered. A listener that panics
//! is logged and skipped; the remaining listeners still see the event.

use crate::ledger::{WalletEvent, WalletEventSink, WalletListener};
use crate::types::{MerkleBlock, PeerInfo, Uint256};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Application-facing sync callbacks. Every method defaults to a no-op.
pub trait PeerManagerListener: Send + Sync {
    /// The orchestrator began catching up with the chain.
    fn sync_started(&self) {}

    /// Sync ended; `error` is set when it ended because of a failure.
    fn sync_stopped(&self, _error: Option<&str>) {}

    fn tx_status_update(&self) {}

    /// Blocks to persist. `replace` means the list supersedes everything saved before.
    fn save_blocks(&self, _replace: bool, _blocks: &[MerkleBlock]) {}

    /// Peers to persist, with the same `replace` meaning as `save_blocks`.
    fn save_peers(&self, _replace: bool, _peers: &[PeerInfo]) {}

    /// Polled before reconnecting. See `NotificationHub::network_is_reachable`.
    fn network_is_reachable(&self) -> bool {
        true
    }

    /// Outcome of a broadcast. `error` is `None` on success.
    fn tx_published(&self, _hash: &Uint256, _error: Option<&str>) {}

    /// The best known chain height moved to `block_height`.
    fn block_height_increased(&self, _block_height: u32) {}

    /// Name used in log lines.
    fn name(&self) -> &'static str {
        "listener"
    }
}

/// Everything the hub delivers.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A ledger change, delivered to wallet listeners only.
    Wallet(WalletEvent),
    SyncStarted,
    SyncStopped {
        /// Failure text; `None` for a clean stop.
        error: Option<String>,
    },
    TxStatusUpdate,
    SaveBlocks {
        replace: bool,
        blocks: Vec<MerkleBlock>,
    },
    SavePeers {
        replace: bool,
        peers: Vec<PeerInfo>,
    },
    /// Result of `publish_transaction`, or a rejection the peers reported later.
    TxPublished {
        hash: Uint256,
        /// Rejection or transport error; `None` when the broadcast was accepted.
        error: Option<String>,
    },
    /// New best chain height.
    BlockHeightIncreased(u32),
}

impl SyncEvent {
    fn deliver_to_peer_listener(&self, listener: &dyn PeerManagerListener) {
        match self {
            SyncEvent::Wallet(_) => {}
            SyncEvent::SyncStarted => listener.sync_started(),
            SyncEvent::SyncStopped { error } => listener.sync_stopped(error.as_deref()),
            SyncEvent::TxStatusUpdate => listener.tx_status_update(),
            SyncEvent::SaveBlocks { replace, blocks } => listener.save_blocks(*replace, blocks),
            SyncEvent::SavePeers { replace, peers } => listener.save_peers(*replace, peers),
            SyncEvent::TxPublished { hash, error } => listener.tx_published(hash, error.as_deref()),
            SyncEvent::BlockHeightIncreased(height) => listener.block_height_increased(*height),
        }
    }
}

#[derive(Clone)]
enum Subscriber {
    Wallet(Arc<dyn WalletListener>),
    Peer(Arc<dyn PeerManagerListener>),
}

enum HubMessage {
    Event(SyncEvent),
    /// Answered once every message queued before it has been delivered.
    Flush(oneshot::Sender<()>),
}

type Subscribers = Arc<RwLock<Vec<Subscriber>>>;

/// Ordered, asynchronous delivery of `SyncEvent`s to wallet and peer listeners.
pub struct NotificationHub {
    /// Registration order is delivery order.
    subscribers: Subscribers,
    /// Feeds the worker; closed once the worker stops.
    queue: mpsc::UnboundedSender<HubMessage>,
    /// Set to `true` to stop the worker after the current message.
    cancel: watch::Sender<bool>,
    /// Taken by `shutdown`.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationHub {
    /// Create the hub and spawn its delivery worker on the current runtime.
    pub fn new() -> Self {
        let subscribers: Subscribers = Arc::new(RwLock::new(Vec::new()));
        let (queue, rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);
        let worker = tokio::spawn(run_worker(rx, cancel_rx, Arc::clone(&subscribers)));
        Self {
            subscribers,
            queue,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Subscribe to ledger events. Takes effect from the next delivered event.
    pub fn register_wallet_listener(&self, listener: Arc<dyn WalletListener>) {
        self.subscribe(Subscriber::Wallet(listener));
    }

    /// Subscribe to sync status events and reachability polls.
    pub fn register_peer_listener(&self, listener: Arc<dyn PeerManagerListener>) {
        self.subscribe(Subscriber::Peer(listener));
    }

    /// Queue an event for delivery. Events published after shutdown are dropped.
    pub fn publish(&self, event: SyncEvent) {
        if self.queue.send(HubMessage::Event(event)).is_err() {
            debug!("Notification hub is shut down, dropping event");
        }
    }

    /// Ask every peer listener whether the network is reachable.
    ///
    /// The votes are OR-ed onto an initial `true`, so the answer is always `true`. Every
    /// listener is still asked.
    // TODO: settle with the application layer whether a single `false` should win.
    pub fn network_is_reachable(&self) -> bool {
        self.snapshot()
            .iter()
            .filter_map(|s| match s {
                Subscriber::Peer(listener) => Some(listener),
                Subscriber::Wallet(_) => None,
            })
            .fold(true, |reachable, listener| reachable | listener.network_is_reachable())
    }

    /// Wait until everything published so far has been delivered, or `timeout` passes.
    /// Returns whether the queue drained in time.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let (done, drained) = oneshot::channel();
        if self.queue.send(HubMessage::Flush(done)).is_err() {
            return true;
        }
        match tokio::time::timeout(timeout, drained).await {
            Ok(_) => true,
            Err(_) => {
                warn!("Notification queue did not drain within {:?}", timeout);
                false
            }
        }
    }

    /// Drain what is queued, then stop the worker. Bounded by `timeout` overall.
    pub async fn shutdown(&self, timeout: Duration) {
        let started = tokio::time::Instant::now();
        self.flush(timeout).await;
        let _ = self.cancel.send(true);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut worker) = worker {
            let remaining = timeout.saturating_sub(started.elapsed());
            if tokio::time::timeout(remaining, &mut worker).await.is_err() {
                warn!("Notification worker did not stop in time, aborting it");
                worker.abort();
            }
        }
    }

    /// Whether the delivery worker is still alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    fn snapshot(&self) -> Vec<Subscriber> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletEventSink for NotificationHub {
    fn deliver(&self, events: Vec<WalletEvent>) {
        for event in events {
            self.publish(SyncEvent::Wallet(event));
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<HubMessage>,
    mut cancel: watch::Receiver<bool>,
    subscribers: Subscribers,
) {
    loop {
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            message = rx.recv() => match message {
                Some(HubMessage::Event(event)) => deliver(&event, &subscribers),
                Some(HubMessage::Flush(done)) => {
                    let _ = done.send(());
                }
                None => break,
            },
        }
    }
    debug!("Notification worker stopped");
}

fn deliver(event: &SyncEvent, subscribers: &Subscribers) {
    // Listeners may register more listeners, so never call them under the lock.
    let snapshot = subscribers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    for subscriber in &snapshot {
        let outcome = catch_unwind(AssertUnwindSafe(|| match (subscriber, event) {
            (Subscriber::Wallet(listener), SyncEvent::Wallet(wallet_event)) => {
                wallet_event.deliver_to(listener.as_ref())
            }
            (Subscriber::Peer(listener), event) => {
                event.deliver_to_peer_listener(listener.as_ref())
            }
            (Subscriber::Wallet(_), _) => {}
        }));
        if outcome.is_err() {
            let name = match subscriber {
                Subscriber::Wallet(_) => "wallet listener",
                Subscriber::Peer(listener) => listener.name(),
            };
            error!("Handler {} panicked while processing event {:?}", name, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
        reachable: bool,
    }

    impl Log {
        fn push(&self, what: String) {
            self.seen.lock().unwrap().push(format!("{}:{}", self.tag, what));
        }
    }

    impl PeerManagerListener for Log {
        fn sync_started(&self) {
            self.push("started".to_string());
        }

        fn block_height_increased(&self, block_height: u32) {
            if block_height == 13 {
                panic!("unlucky height");
            }
            self.push(format!("height {}", block_height));
        }

        fn network_is_reachable(&self) -> bool {
            self.push("asked".to_string());
            self.reachable
        }
    }

    impl WalletListener for Log {
        fn on_tx_updated(&self, hashes: &[Uint256], block_height: u32, _timestamp: u64) {
            self.push(format!("updated {} at {}", hashes.len(), block_height));
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_and_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hub = NotificationHub::new();
        hub.register_peer_listener(Arc::new(Log {
            tag: "a",
            seen: Arc::clone(&seen),
            ..Log::default()
        }));
        hub.register_wallet_listener(Arc::new(Log {
            tag: "w",
            seen: Arc::clone(&seen),
            ..Log::default()
        }));
        hub.register_peer_listener(Arc::new(Log {
            tag: "b",
            seen: Arc::clone(&seen),
            ..Log::default()
        }));

        hub.publish(SyncEvent::SyncStarted);
        hub.deliver(vec![WalletEvent::TxUpdated {
            hashes: vec![Uint256([1; 32])],
            block_height: 7,
            timestamp: 0,
        }]);
        hub.publish(SyncEvent::BlockHeightIncreased(13));
        hub.publish(SyncEvent::BlockHeightIncreased(14));
        assert!(hub.flush(Duration::from_secs(1)).await);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "a:started",
                "b:started",
                "w:updated 1 at 7",
                "a:height 14",
                "b:height 14",
            ]
        );
    }

    #[tokio::test]
    async fn reachability_asks_everyone_and_stays_true() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hub = NotificationHub::new();
        for tag in ["a", "b"] {
            hub.register_peer_listener(Arc::new(Log {
                tag,
                seen: Arc::clone(&seen),
                reachable: false,
            }));
        }
        assert!(hub.network_is_reachable());
        assert_eq!(*seen.lock().unwrap(), vec!["a:asked", "b:asked"]);
    }

    #[tokio::test]
    async fn shutdown_stops_the_worker() {
        let hub = NotificationHub::new();
        assert!(hub.is_running());
        hub.shutdown(Duration::from_secs(1)).await;
        assert!(!hub.is_running());
        hub.publish(SyncEvent::TxStatusUpdate);
        assert!(hub.flush(Duration::from_millis(10)).await);
    }
}
