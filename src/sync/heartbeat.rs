use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::warn;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::dispatcher::CallbackDispatcher;
use crate::core::{SyncConfig, SyncEvent};

/// Master half of the heartbeat: pushes a liveness event through the
/// dispatcher on a fixed period, subject to the same per-replica queuing
/// and eviction rules as any other event.
pub struct HeartbeatEmitter {
    handle: JoinHandle<()>,
}

impl HeartbeatEmitter {
    pub fn start(dispatcher: Arc<CallbackDispatcher>, config: &SyncConfig) -> Self {
        let period = config.heartbeat_period;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                dispatcher.notify_all(SyncEvent::Heartbeat).await;
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Replica half of the heartbeat: counts check intervals that passed
/// without a heartbeat arriving, and past the threshold fires the one-shot
/// connection-lost signal and stops checking. The session is void after
/// that; there is no automatic reconnect.
pub struct HeartbeatWatcher {
    missed: Arc<AtomicU32>,
    handle: JoinHandle<()>,
}

impl HeartbeatWatcher {
    pub fn start(config: &SyncConfig) -> (Self, oneshot::Receiver<()>) {
        let missed = Arc::new(AtomicU32::new(0));
        let (lost_tx, lost_rx) = oneshot::channel();
        let period = config.check_period;
        let threshold = config.max_missed_checks;
        let counter = Arc::clone(&missed);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let missed_now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if missed_now > threshold {
                    warn!("no heartbeat for {missed_now} checks, declaring connection lost");
                    let _ = lost_tx.send(());
                    break;
                }
            }
        });
        (
            Self {
                missed,
                handle,
            },
            lost_rx,
        )
    }

    /// Record a heartbeat arrival.
    pub fn beat(&self) {
        self.missed.store(0, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for HeartbeatWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
