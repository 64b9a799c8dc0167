use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use super::dispatcher::{CallbackDispatcher, SessionId};
use super::heartbeat::HeartbeatEmitter;
use super::{CallbackChannel, ForwardChannel};
use crate::coordinator::Coordinator;
use crate::core::{ActionResult, EntityId, Result, SyncConfig, SyncError};

/// Master-side service: owns the authoritative coordinator, the callback
/// dispatcher, and the heartbeat emitter, and answers forward requests.
///
/// Implements [`ForwardChannel`] itself, so an in-process replica can use
/// it directly as its forward channel; transports delegate to the same
/// methods.
pub struct MasterService {
    coordinator: Arc<Coordinator>,
    dispatcher: Arc<CallbackDispatcher>,
    _heartbeat: HeartbeatEmitter,
}

impl MasterService {
    pub fn start(config: &SyncConfig) -> Arc<Self> {
        let dispatcher = Arc::new(CallbackDispatcher::new(config));
        let coordinator = Coordinator::new_master(Arc::clone(&dispatcher));
        let heartbeat = HeartbeatEmitter::start(Arc::clone(&dispatcher), config);
        info!("master service started");
        Arc::new(Self {
            coordinator,
            dispatcher,
            _heartbeat: heartbeat,
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn dispatcher(&self) -> &Arc<CallbackDispatcher> {
        &self.dispatcher
    }

    /// Attach a replica's callback channel; confirmed facts and heartbeats
    /// flow to it until eviction or detach.
    pub async fn attach_replica(&self, channel: Arc<dyn CallbackChannel>) -> SessionId {
        self.dispatcher.register(channel).await
    }

    pub async fn detach_replica(&self, session: SessionId) {
        self.dispatcher.unregister(session).await;
    }
}

#[async_trait]
impl ForwardChannel for MasterService {
    async fn create_user(&self, name: &str) -> Result<EntityId> {
        self.coordinator.add_user(name, None).await?.ok_or_else(|| {
            SyncError::ProtocolInconsistency(format!(
                "master produced no identifier for user '{name}'"
            ))
        })
    }

    async fn create_role(&self, name: &str) -> Result<EntityId> {
        self.coordinator.add_role(name, None).await?.ok_or_else(|| {
            SyncError::ProtocolInconsistency(format!(
                "master produced no identifier for role '{name}'"
            ))
        })
    }

    async fn set_role(
        &self,
        user: EntityId,
        role: EntityId,
        present: bool,
    ) -> Result<ActionResult> {
        Ok(self.coordinator.set_role(user, role, present).await)
    }

    async fn delete_user(&self, user: EntityId) -> Result<ActionResult> {
        Ok(if self.coordinator.delete_user(user).await {
            ActionResult::Success
        } else {
            ActionResult::UnknownUser
        })
    }

    async fn delete_role(&self, role: EntityId) -> Result<ActionResult> {
        Ok(if self.coordinator.delete_role(role).await {
            ActionResult::Success
        } else {
            ActionResult::UnknownRole
        })
    }

    async fn fetch_users(&self) -> Result<Vec<(EntityId, String)>> {
        Ok(self.coordinator.fetch_users().await)
    }

    async fn fetch_roles(&self) -> Result<Vec<(EntityId, String)>> {
        Ok(self.coordinator.fetch_roles().await)
    }

    async fn fetch_user_roles(&self) -> Result<Vec<(EntityId, EntityId)>> {
        Ok(self.coordinator.fetch_user_roles().await)
    }
}
