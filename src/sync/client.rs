use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio::sync::oneshot;

use super::ForwardChannel;
use super::heartbeat::HeartbeatWatcher;
use crate::coordinator::Coordinator;
use crate::core::{Result, SyncConfig, SyncEvent};

/// Replica-side session: a replica coordinator bound to a forward channel,
/// plus the liveness watcher for the callback direction.
///
/// Create with [`ReplicaSession::new`], make the callback path live (attach
/// to the master, or start the transport read loop), then call
/// [`ReplicaSession::bootstrap`] to replay the master's snapshot. Events
/// arriving during the replay are safe: application is idempotent and
/// reconciles by identifier.
pub struct ReplicaSession {
    coordinator: Arc<Coordinator>,
    forward: Arc<dyn ForwardChannel>,
    watcher: HeartbeatWatcher,
}

impl ReplicaSession {
    /// Build the session and the one-shot connection-lost signal. The
    /// session should be considered void once the signal fires.
    pub fn new(
        forward: Arc<dyn ForwardChannel>,
        config: &SyncConfig,
    ) -> (Arc<Self>, oneshot::Receiver<()>) {
        let coordinator = Coordinator::new_replica(Arc::clone(&forward));
        let (watcher, lost) = HeartbeatWatcher::start(config);
        (
            Arc::new(Self {
                coordinator,
                forward,
                watcher,
            }),
            lost,
        )
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Bulk-initialize from the master: fetch users, roles, and the
    /// membership relation, and replay them through the local apply
    /// operations.
    pub async fn bootstrap(&self) -> Result<()> {
        let users = self.forward.fetch_users().await?;
        let roles = self.forward.fetch_roles().await?;
        let (user_count, role_count) = (users.len(), roles.len());
        for (id, name) in users {
            self.coordinator.add_user(&name, Some(id)).await?;
        }
        for (id, name) in roles {
            self.coordinator.add_role(&name, Some(id)).await?;
        }
        for (user, role) in self.forward.fetch_user_roles().await? {
            self.coordinator.set_role(user, role, true).await;
        }
        info!("replica bootstrapped: {user_count} users, {role_count} roles");
        Ok(())
    }

    /// Handle one event pushed by the master. Heartbeats feed the watcher;
    /// everything else is a confirmed fact applied to local state.
    pub async fn handle_event(&self, event: SyncEvent) -> Result<()> {
        match event {
            SyncEvent::Heartbeat => {
                self.watcher.beat();
                Ok(())
            }
            fact => self.coordinator.apply_event(fact).await,
        }
    }

    /// Stop the liveness watcher; used on deliberate shutdown.
    pub fn close(&self) {
        self.watcher.stop();
    }
}

/// Adapter exposing a session as the callback channel the master pushes
/// to; used by in-process transports.
pub struct SessionCallback {
    session: Arc<ReplicaSession>,
}

impl SessionCallback {
    pub fn new(session: Arc<ReplicaSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl super::CallbackChannel for SessionCallback {
    async fn deliver(&self, event: SyncEvent) -> Result<()> {
        self.session.handle_event(event).await
    }
}
