//! Wire format of the TCP transport: one JSON object per line, requests
//! answered strictly in order, pushes interleaved on the same connection.

use serde::{Deserialize, Serialize};

use crate::core::{ActionResult, EntityId, SyncEvent};

/// A forward-channel request, replica to master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    CreateUser { name: String },
    CreateRole { name: String },
    SetRole {
        user: EntityId,
        role: EntityId,
        present: bool,
    },
    DeleteUser { user: EntityId },
    DeleteRole { role: EntityId },
    FetchUsers,
    FetchRoles,
    FetchUserRoles,
}

/// The master's answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Created { id: EntityId },
    Acted { result: ActionResult },
    Entities { entries: Vec<(EntityId, String)> },
    Pairs { entries: Vec<(EntityId, EntityId)> },
    Error { message: String },
}

/// Master-to-replica frames: in-order replies plus asynchronous pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Reply(Response),
    Push(SyncEvent),
}
