pub mod config;
pub mod error;
pub mod types;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use types::{ActionResult, EntityId, EntityKind, SyncEvent};
