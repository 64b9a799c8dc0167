pub mod entity;
pub mod store;

pub use entity::{EntityRecord, IdState, RoleRecord, UserRecord};
pub use store::{EntityStore, InsertOutcome, RegisterOutcome, StoreState};
