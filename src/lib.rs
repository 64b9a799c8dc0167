// ============================================================================
// orgsync Library
// ============================================================================

//! Master/replica replication for a small users-and-roles directory.
//!
//! One process is either the master (it owns identifiers and broadcasts
//! confirmed facts) or a replica (it mirrors the master, applies local
//! edits optimistically, and forwards them upstream).
//!
//! Master, in process:
//!
//! ```no_run
//! use orgsync::{MasterService, SyncConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> orgsync::Result<()> {
//! let master = MasterService::start(&SyncConfig::new());
//! let directory = master.coordinator();
//!
//! let admin = directory.add_role("Admin", None).await?;
//! let alice = directory.add_user("alice", None).await?;
//! if let (Some(user), Some(role)) = (alice, admin) {
//!     directory.set_role(user, role, true).await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A replica joins over TCP with [`net::connect`], or in process with
//! [`sync::loopback::connect`], and then drives the same coordinator API.

pub mod coordinator;
pub mod core;
pub mod net;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use coordinator::{Coordinator, UserView};
pub use core::{ActionResult, EntityId, EntityKind, Result, SyncConfig, SyncError, SyncEvent};
pub use store::IdState;
pub use sync::{CallbackChannel, ForwardChannel, MasterService, ReplicaSession, SessionId};
