use std::collections::HashMap;

use tokio::sync::{Mutex, MutexGuard};

use super::entity::{EntityRecord, IdState};
use crate::core::{EntityId, Result, SyncError};

/// Result of [`StoreState::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New record without an identifier; a replica-originated optimistic add.
    CreatedPending,
    /// New record with a confirmed identifier.
    CreatedConfirmed(EntityId),
    /// The name already existed as pending; the given identifier was
    /// registered on it. This is how a replica's optimistic local add is
    /// reconciled with the master's later-confirmed identical add.
    Registered(EntityId),
    /// The name already existed and nothing changed.
    Unchanged,
}

/// Result of [`StoreState::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Pending record moved to confirmed.
    Registered,
    /// The record already held this identifier.
    Noop,
    /// No record with that name; the entity was deleted while the
    /// confirmation was in flight. Silent no-op.
    Missing,
}

/// Thread-safe bookkeeping for one entity kind.
///
/// Keyed simultaneously by name (the natural key) and by the optionally
/// absent confirmed identifier; both mappings are injective. All operations
/// on one store instance are atomic with respect to each other: a single
/// mutual-exclusion domain per store.
pub struct EntityStore<T: EntityRecord> {
    inner: Mutex<StoreState<T>>,
}

impl<T: EntityRecord> EntityStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreState::new()),
        }
    }

    /// Take the store lock. Compound operations spanning both stores must
    /// always take the role-store guard before the user-store guard.
    pub async fn lock(&self) -> MutexGuard<'_, StoreState<T>> {
        self.inner.lock().await
    }

    pub async fn insert(&self, name: &str, id: Option<EntityId>) -> Result<InsertOutcome> {
        self.inner.lock().await.insert(name, id)
    }

    pub async fn register(&self, name: &str, id: EntityId) -> Result<RegisterOutcome> {
        self.inner.lock().await.register(name, id)
    }

    pub async fn remove_by_id(&self, id: EntityId) -> Option<T> {
        self.inner.lock().await.remove_by_id(id)
    }

    pub async fn id_of(&self, name: &str) -> Option<IdState> {
        self.inner.lock().await.id_of(name)
    }

    /// Ordered `(identifier, name)` sequence of confirmed records, for bulk
    /// sync handed to newly joining replicas.
    pub async fn snapshot(&self) -> Vec<(EntityId, String)> {
        self.inner.lock().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

impl<T: EntityRecord> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The state behind an [`EntityStore`] lock.
pub struct StoreState<T: EntityRecord> {
    by_name: HashMap<String, T>,
    id_index: HashMap<EntityId, String>,
    order: Vec<String>,
}

impl<T: EntityRecord> StoreState<T> {
    fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            id_index: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Insert a record by name.
    ///
    /// An existing name without an identifier is a no-op; an existing name
    /// with an identifier registers it on the existing record instead of
    /// creating a duplicate.
    pub fn insert(&mut self, name: &str, id: Option<EntityId>) -> Result<InsertOutcome> {
        if self.by_name.contains_key(name) {
            return match id {
                None => Ok(InsertOutcome::Unchanged),
                Some(id) => match self.register(name, id)? {
                    RegisterOutcome::Registered => Ok(InsertOutcome::Registered(id)),
                    RegisterOutcome::Noop | RegisterOutcome::Missing => {
                        Ok(InsertOutcome::Unchanged)
                    }
                },
            };
        }

        if let Some(id) = id {
            if let Some(holder) = self.id_index.get(&id) {
                return Err(SyncError::ProtocolInconsistency(format!(
                    "identifier {id} is already bound to '{holder}', cannot bind '{name}'"
                )));
            }
            self.id_index.insert(id, name.to_string());
        }
        self.by_name
            .insert(name.to_string(), T::new(name.to_string(), id));
        self.order.push(name.to_string());

        Ok(match id {
            Some(id) => InsertOutcome::CreatedConfirmed(id),
            None => InsertOutcome::CreatedPending,
        })
    }

    /// Move a pending record to confirmed.
    ///
    /// Registering the identifier a record already holds is a no-op; a
    /// different identifier is a protocol inconsistency. A missing name
    /// means the record was deleted while the confirmation was in flight.
    pub fn register(&mut self, name: &str, id: EntityId) -> Result<RegisterOutcome> {
        let Some(record) = self.by_name.get_mut(name) else {
            return Ok(RegisterOutcome::Missing);
        };
        match record.id_state() {
            IdState::Pending => {
                if let Some(holder) = self.id_index.get(&id) {
                    return Err(SyncError::ProtocolInconsistency(format!(
                        "identifier {id} is already bound to '{holder}', cannot bind '{name}'"
                    )));
                }
                *record.id_state_mut() = IdState::Confirmed(id);
                self.id_index.insert(id, name.to_string());
                Ok(RegisterOutcome::Registered)
            }
            IdState::Confirmed(existing) if existing == id => Ok(RegisterOutcome::Noop),
            IdState::Confirmed(existing) => Err(SyncError::ProtocolInconsistency(format!(
                "'{name}' is already confirmed as {existing}, refusing re-registration as {id}"
            ))),
        }
    }

    /// Remove by confirmed identifier, the only externally-triggered delete
    /// path. Returns the removed record, or `None` for an unknown id.
    pub fn remove_by_id(&mut self, id: EntityId) -> Option<T> {
        let name = self.id_index.remove(&id)?;
        let record = self.by_name.remove(&name);
        self.order.retain(|held| *held != name);
        record
    }

    /// Remove by name; also handles pending records, which have no
    /// identifier to address them by.
    pub fn remove_by_name(&mut self, name: &str) -> Option<T> {
        let record = self.by_name.remove(name)?;
        if let IdState::Confirmed(id) = record.id_state() {
            self.id_index.remove(&id);
        }
        self.order.retain(|held| held != name);
        Some(record)
    }

    pub fn get_by_id(&self, id: EntityId) -> Option<&T> {
        self.id_index.get(&id).and_then(|name| self.by_name.get(name))
    }

    pub fn get_mut_by_id(&mut self, id: EntityId) -> Option<&mut T> {
        match self.id_index.get(&id) {
            Some(name) => self.by_name.get_mut(name.as_str()),
            None => None,
        }
    }

    pub fn id_of(&self, name: &str) -> Option<IdState> {
        self.by_name.get(name).map(|record| record.id_state())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn contains_id(&self, id: EntityId) -> bool {
        self.id_index.contains_key(&id)
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.by_name.values_mut()
    }

    pub fn snapshot(&self) -> Vec<(EntityId, String)> {
        self.records()
            .filter_map(|record| {
                record
                    .id_state()
                    .confirmed()
                    .map(|id| (id, record.name().to_string()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entity::UserRecord;

    #[tokio::test]
    async fn test_double_add_by_name_is_idempotent() {
        let store: EntityStore<UserRecord> = EntityStore::new();

        let first = store.insert("alice", None).await.unwrap();
        let second = store.insert("alice", None).await.unwrap();

        assert_eq!(first, InsertOutcome::CreatedPending);
        assert_eq!(second, InsertOutcome::Unchanged);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_with_id_reconciles_pending_record() {
        let store: EntityStore<UserRecord> = EntityStore::new();
        let id = EntityId::generate();

        store.insert("alice", None).await.unwrap();
        let outcome = store.insert("alice", Some(id)).await.unwrap();

        assert_eq!(outcome, InsertOutcome::Registered(id));
        assert_eq!(store.id_of("alice").await, Some(IdState::Confirmed(id)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_same_id_is_noop() {
        let store: EntityStore<UserRecord> = EntityStore::new();
        let id = EntityId::generate();

        store.insert("alice", Some(id)).await.unwrap();
        let outcome = store.register("alice", id).await.unwrap();

        assert_eq!(outcome, RegisterOutcome::Noop);
    }

    #[tokio::test]
    async fn test_register_different_id_is_inconsistency() {
        let store: EntityStore<UserRecord> = EntityStore::new();

        store.insert("alice", Some(EntityId::generate())).await.unwrap();
        let result = store.register("alice", EntityId::generate()).await;

        assert!(matches!(result, Err(SyncError::ProtocolInconsistency(_))));
    }

    #[tokio::test]
    async fn test_register_on_deleted_record_is_silent_noop() {
        let store: EntityStore<UserRecord> = EntityStore::new();

        store.insert("alice", None).await.unwrap();
        store.lock().await.remove_by_name("alice");

        let outcome = store.register("alice", EntityId::generate()).await.unwrap();
        assert_eq!(outcome, RegisterOutcome::Missing);
    }

    #[tokio::test]
    async fn test_remove_by_id() {
        let store: EntityStore<UserRecord> = EntityStore::new();
        let id = EntityId::generate();

        store.insert("alice", Some(id)).await.unwrap();
        assert!(store.remove_by_id(id).await.is_some());
        assert!(store.remove_by_id(id).await.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_snapshot_keeps_insertion_order_and_skips_pending() {
        let store: EntityStore<UserRecord> = EntityStore::new();
        let first = EntityId::generate();
        let second = EntityId::generate();

        store.insert("alice", Some(first)).await.unwrap();
        store.insert("pending", None).await.unwrap();
        store.insert("bob", Some(second)).await.unwrap();
        assert!(store.id_of("pending").await.unwrap().is_pending());

        let snapshot = store.snapshot().await;
        assert_eq!(
            snapshot,
            vec![(first, "alice".to_string()), (second, "bob".to_string())]
        );
    }

    #[tokio::test]
    async fn test_duplicate_confirmed_id_rejected() {
        let store: EntityStore<UserRecord> = EntityStore::new();
        let id = EntityId::generate();

        store.insert("alice", Some(id)).await.unwrap();
        let result = store.insert("bob", Some(id)).await;

        assert!(matches!(result, Err(SyncError::ProtocolInconsistency(_))));
    }
}
