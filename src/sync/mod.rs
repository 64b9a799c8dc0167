pub mod client;
pub mod dispatcher;
pub mod heartbeat;
pub mod loopback;
pub mod server;

use async_trait::async_trait;

use crate::core::{ActionResult, EntityId, Result, SyncEvent};

pub use client::{ReplicaSession, SessionCallback};
pub use dispatcher::{CallbackDispatcher, SessionId};
pub use heartbeat::{HeartbeatEmitter, HeartbeatWatcher};
pub use server::MasterService;

/// The request path a replica uses to ask the master for a mutation or a
/// bulk snapshot. Transport-agnostic; a failed call surfaces as
/// [`crate::SyncError::CommunicationFault`].
#[async_trait]
pub trait ForwardChannel: Send + Sync {
    async fn create_user(&self, name: &str) -> Result<EntityId>;

    async fn create_role(&self, name: &str) -> Result<EntityId>;

    async fn set_role(
        &self,
        user: EntityId,
        role: EntityId,
        present: bool,
    ) -> Result<ActionResult>;

    async fn delete_user(&self, user: EntityId) -> Result<ActionResult>;

    async fn delete_role(&self, role: EntityId) -> Result<ActionResult>;

    async fn fetch_users(&self) -> Result<Vec<(EntityId, String)>>;

    async fn fetch_roles(&self) -> Result<Vec<(EntityId, String)>>;

    async fn fetch_user_roles(&self) -> Result<Vec<(EntityId, EntityId)>>;
}

/// The push path a replica exposes for the master to deliver confirmed
/// facts and heartbeats.
#[async_trait]
pub trait CallbackChannel: Send + Sync {
    /// Deliver one event. A transport failure must surface as
    /// [`crate::SyncError::CommunicationFault`] so the dispatcher can queue
    /// the event for a later attempt.
    async fn deliver(&self, event: SyncEvent) -> Result<()>;
}
