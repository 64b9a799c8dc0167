use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique identifier assigned to an entity by the master.
///
/// Random 128-bit tokens; no ordering or monotonicity is guaranteed or
/// provided, only an effectively-zero collision probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two entity kinds the directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Role,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Role => write!(f, "role"),
        }
    }
}

/// Explicit outcome of an identifier-addressed operation.
///
/// `UnknownUser`/`UnknownRole` are ordinary results, not errors: the
/// identifier simply no longer (or never) resolved to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionResult {
    Success,
    UnknownUser,
    UnknownRole,
}

impl ActionResult {
    pub fn is_success(self) -> bool {
        matches!(self, ActionResult::Success)
    }
}

/// A confirmed fact broadcast by the master, plus the liveness signal.
///
/// Replicas re-apply these through the same coordinator entry points used
/// for local mutations, so application must be idempotent: a replica that
/// caused a mutation also receives its own echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEvent {
    UserAdded { id: EntityId, name: String },
    RoleAdded { id: EntityId, name: String },
    UserRoleChanged { user: EntityId, role: EntityId, present: bool },
    UserRemoved { id: EntityId },
    RoleRemoved { id: EntityId },
    Heartbeat,
}
