//! The single reconnect timer of an orchestrator.
//!
//! Arming replaces whatever timer was pending, so there is never more than one. A timer that
//! is cancelled or replaced still runs its callback, with `Err(TimerCancelled)`, so the
//! callback can always reset the reconnect bookkeeping.

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Connection state of an orchestrator as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconnectState {
    Disconnected,
    /// Disconnected, with a reconnect scheduled.
    TimerArmed,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("reconnect timer cancelled")]
pub struct TimerCancelled;

#[derive(Default)]
struct Slot {
    generation: u64,
    deadline: Option<Instant>,
    cancel: Option<oneshot::Sender<()>>,
}

pub struct Reconnector {
    interval: Duration,
    slot: Arc<Mutex<Slot>>,
    live: Arc<AtomicUsize>,
    task_count: Arc<AtomicU32>,
}

impl Reconnector {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slot: Arc::new(Mutex::new(Slot::default())),
            live: Arc::new(AtomicUsize::new(0)),
            task_count: Arc::new(AtomicU32::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Schedule `on_fire` one interval from now, cancelling any pending timer first.
    pub fn arm<F, Fut>(&self, on_fire: F)
    where
        F: FnOnce(Result<(), TimerCancelled>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let generation = {
            let mut slot = self.lock();
            if let Some(previous) = slot.cancel.take() {
                let _ = previous.send(());
            }
            slot.generation += 1;
            slot.deadline = Some(Instant::now() + self.interval);
            slot.cancel = Some(cancel_tx);
            slot.generation
        };
        self.task_count.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);

        let slot = Arc::clone(&self.slot);
        let live = Arc::clone(&self.live);
        tokio::spawn(async move {
            let result = loop {
                let deadline = {
                    let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    match slot.deadline {
                        Some(deadline) if slot.generation == generation => deadline,
                        _ => break Err(TimerCancelled),
                    }
                };
                tokio::select! {
                    _ = &mut cancel_rx => break Err(TimerCancelled),
                    _ = tokio::time::sleep_until(deadline) => {
                        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                        // an extension moved the deadline while we slept
                        if slot.generation == generation && slot.deadline == Some(deadline) {
                            slot.deadline = None;
                            slot.cancel = None;
                            break Ok(());
                        }
                    }
                }
            };
            live.fetch_sub(1, Ordering::SeqCst);
            debug!("Reconnect timer {} finished: {:?}", generation, result);
            on_fire(result).await;
        });
    }

    /// Push a pending deadline back by one interval. Returns false if nothing is armed.
    pub fn extend(&self) -> bool {
        let mut slot = self.lock();
        match slot.deadline.as_mut() {
            Some(deadline) => {
                *deadline += self.interval;
                true
            }
            None => false,
        }
    }

    /// Cancel the pending timer, if any. Its callback still runs with `Err(TimerCancelled)`.
    pub fn cancel(&self) -> bool {
        let mut slot = self.lock();
        slot.deadline = None;
        match slot.cancel.take() {
            Some(cancel) => {
                let _ = cancel.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.lock().deadline.is_some()
    }

    /// Timer tasks that have not yet finished waiting.
    pub fn live_timers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Reconnect attempts scheduled since the counter was last reset.
    pub fn pending_tasks(&self) -> u32 {
        self.task_count.load(Ordering::SeqCst)
    }

    pub fn reset_task_count(&self) {
        self.task_count.store(0, Ordering::SeqCst);
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        self.cancel();
    }
}
