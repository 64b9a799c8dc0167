use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use tokio::sync::{Mutex, RwLock};

use super::CallbackChannel;
use crate::core::{SyncConfig, SyncEvent};

/// Handle identifying one attached replica session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

struct ReplicaOutbound {
    channel: Arc<dyn CallbackChannel>,
    state: Mutex<DeliveryState>,
}

#[derive(Default)]
struct DeliveryState {
    backlog: VecDeque<SyncEvent>,
    unreachable: bool,
}

/// Fans confirmed facts out to every attached replica, isolating one
/// replica's delivery trouble from the others.
///
/// Each replica owns an outbound queue: a failed delivery parks the event
/// there, a later attempt flushes the backlog in order first. A backlog
/// growing past the configured bound marks the replica permanently
/// unreachable and discards the queue; there is no reconnection path, the
/// replica must establish a fresh session to participate again.
pub struct CallbackDispatcher {
    replicas: RwLock<HashMap<SessionId, Arc<ReplicaOutbound>>>,
    next_session: AtomicU64,
    max_queued: usize,
}

impl CallbackDispatcher {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            replicas: RwLock::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            max_queued: config.max_queued_events,
        }
    }

    /// Attach a replica's callback channel.
    pub async fn register(&self, channel: Arc<dyn CallbackChannel>) -> SessionId {
        let session = SessionId(self.next_session.fetch_add(1, Ordering::SeqCst));
        let outbound = Arc::new(ReplicaOutbound {
            channel,
            state: Mutex::new(DeliveryState::default()),
        });
        self.replicas.write().await.insert(session, outbound);
        debug!("{session} attached");
        session
    }

    /// Detach a replica on clean disconnect.
    pub async fn unregister(&self, session: SessionId) {
        if self.replicas.write().await.remove(&session).is_some() {
            debug!("{session} detached");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.replicas.read().await.len()
    }

    /// Whether a session has been evicted for exceeding its queue bound.
    pub async fn is_unreachable(&self, session: SessionId) -> bool {
        match self.replicas.read().await.get(&session) {
            Some(outbound) => outbound.state.lock().await.unreachable,
            None => false,
        }
    }

    /// Fan one event out to every attached replica.
    ///
    /// Deliveries are spawned independently: one replica's slow or failing
    /// channel never blocks another, and never blocks the caller. Ordering
    /// across successive calls is therefore best-effort; only a replica's
    /// failure backlog is strictly FIFO. Replicas tolerate reordering
    /// because event application is idempotent and reconciles by
    /// identifier.
    pub async fn notify_all(&self, event: SyncEvent) {
        let targets: Vec<(SessionId, Arc<ReplicaOutbound>)> = self
            .replicas
            .read()
            .await
            .iter()
            .map(|(session, outbound)| (*session, Arc::clone(outbound)))
            .collect();
        for (session, outbound) in targets {
            let event = event.clone();
            let max_queued = self.max_queued;
            tokio::spawn(async move {
                deliver(session, &outbound, event, max_queued).await;
            });
        }
    }

    /// Deliver one event to a single attached replica, awaiting the
    /// attempt. Unknown sessions are ignored.
    pub async fn notify_session(&self, session: SessionId, event: SyncEvent) {
        let target = self.replicas.read().await.get(&session).map(Arc::clone);
        if let Some(outbound) = target {
            deliver(session, &outbound, event, self.max_queued).await;
        }
    }
}

async fn deliver(
    session: SessionId,
    outbound: &ReplicaOutbound,
    event: SyncEvent,
    max_queued: usize,
) {
    let mut state = outbound.state.lock().await;
    if state.unreachable {
        return;
    }

    // Flush the backlog first; later events may depend on earlier ones
    // having been applied.
    while let Some(parked) = state.backlog.front() {
        if outbound.channel.deliver(parked.clone()).await.is_err() {
            park(session, &mut state, event, max_queued);
            return;
        }
        state.backlog.pop_front();
    }

    if outbound.channel.deliver(event.clone()).await.is_err() {
        park(session, &mut state, event, max_queued);
    }
}

fn park(session: SessionId, state: &mut DeliveryState, event: SyncEvent, max_queued: usize) {
    state.backlog.push_back(event);
    if state.backlog.len() > max_queued {
        warn!("{session} exceeded {max_queued} undelivered events, marking unreachable");
        state.unreachable = true;
        state.backlog.clear();
    }
}
