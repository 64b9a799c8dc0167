pub mod identity;

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::Mutex;

use crate::core::{ActionResult, EntityId, EntityKind, Result, SyncEvent};
use crate::store::{
    EntityRecord, EntityStore, IdState, InsertOutcome, RegisterOutcome, RoleRecord, UserRecord,
};
use crate::sync::ForwardChannel;
use crate::sync::dispatcher::CallbackDispatcher;
use identity::IdentityAuthority;

/// What this node is: the authority itself, or a mirror of one.
pub enum NodeRole {
    Master {
        dispatcher: Arc<CallbackDispatcher>,
        identity: IdentityAuthority,
    },
    Replica {
        forward: Arc<dyn ForwardChannel>,
    },
}

/// Local view of one user for a front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserView {
    pub name: String,
    /// `None` while the record is still pending confirmation.
    pub id: Option<EntityId>,
    pub roles: Vec<String>,
}

/// The central authority every state mutation passes through.
///
/// Owns both entity stores and the user-role relation, and is the only
/// component that knows whether this node is the master or a replica. On a
/// replica, locally-originated mutations are applied optimistically and
/// forwarded to the master fire-and-forget; a confirmation arriving later
/// only reconciles identifiers, it never rolls back an applied mutation.
///
/// Lock discipline, system-wide: any operation touching both stores takes
/// the role-store lock before the user-store lock, and fan-out is only ever
/// issued after every store lock has been released.
pub struct Coordinator {
    users: EntityStore<UserRecord>,
    roles: EntityStore<RoleRecord>,
    role: NodeRole,
    /// Names deleted locally while their create forward was still in
    /// flight; the delete is forwarded once the identifier arrives.
    deferred_deletes: Mutex<HashSet<(EntityKind, String)>>,
}

impl Coordinator {
    pub fn new_master(dispatcher: Arc<CallbackDispatcher>) -> Arc<Self> {
        Arc::new(Self {
            users: EntityStore::new(),
            roles: EntityStore::new(),
            role: NodeRole::Master {
                dispatcher,
                identity: IdentityAuthority::new(),
            },
            deferred_deletes: Mutex::new(HashSet::new()),
        })
    }

    pub fn new_replica(forward: Arc<dyn ForwardChannel>) -> Arc<Self> {
        Arc::new(Self {
            users: EntityStore::new(),
            roles: EntityStore::new(),
            role: NodeRole::Replica { forward },
            deferred_deletes: Mutex::new(HashSet::new()),
        })
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, NodeRole::Master { .. })
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Add a user by name.
    ///
    /// `id` is `None` for a locally-originated add and `Some` when applying
    /// a confirmed fact. Returns the confirmed identifier, or `None` while
    /// the record is pending the master's confirmation.
    pub async fn add_user(
        self: &Arc<Self>,
        name: &str,
        id: Option<EntityId>,
    ) -> Result<Option<EntityId>> {
        self.add_record(&self.users, EntityKind::User, name, id)
            .await
    }

    /// Add a role by name. Same contract as [`Coordinator::add_user`].
    pub async fn add_role(
        self: &Arc<Self>,
        name: &str,
        id: Option<EntityId>,
    ) -> Result<Option<EntityId>> {
        self.add_record(&self.roles, EntityKind::Role, name, id)
            .await
    }

    async fn add_record<T: EntityRecord>(
        self: &Arc<Self>,
        store: &EntityStore<T>,
        kind: EntityKind,
        name: &str,
        id: Option<EntityId>,
    ) -> Result<Option<EntityId>> {
        let (result, event, forward_create) = {
            let mut state = store.lock().await;
            // The master assigns identifiers synchronously, but only for a
            // genuinely new name; an existing name keeps its identifier.
            let assigned = match (&self.role, id) {
                (NodeRole::Master { identity, .. }, None) if !state.contains_name(name) => {
                    Some(identity.mint())
                }
                _ => id,
            };
            match state.insert(name, assigned)? {
                InsertOutcome::CreatedConfirmed(id) => {
                    let event = self
                        .is_master()
                        .then(|| added_event(kind, id, name));
                    (Some(id), event, false)
                }
                InsertOutcome::CreatedPending => (None, None, true),
                InsertOutcome::Registered(id) => (Some(id), None, false),
                InsertOutcome::Unchanged => (
                    state.id_of(name).and_then(IdState::confirmed),
                    None,
                    false,
                ),
            }
        };

        if forward_create {
            self.spawn_forward_create(kind, name.to_string());
        }
        if let Some(event) = event {
            self.fan_out(event).await;
        }
        Ok(result)
    }

    /// Register the identifier the master confirmed for a locally-pending
    /// record. Called from the forwarding task when the create returns.
    ///
    /// A missing record means the name was deleted while the create was in
    /// flight; the parked delete travels onward with the minted identifier.
    pub async fn register_confirmed(
        &self,
        kind: EntityKind,
        name: &str,
        id: EntityId,
    ) -> Result<()> {
        let outcome = match kind {
            EntityKind::User => self.users.register(name, id).await?,
            EntityKind::Role => self.roles.register(name, id).await?,
        };
        if outcome == RegisterOutcome::Missing && self.take_deferred_delete(kind, name).await {
            debug!("{kind} '{name}' was deleted before confirmation, forwarding the delete");
            self.spawn_forward_delete(kind, id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete a user by name (front-end path).
    ///
    /// A still-pending record is removed locally at once and its delete
    /// forwarded later, when the in-flight create confirmation returns.
    pub async fn delete_user_by_name(&self, name: &str) {
        match self.users.id_of(name).await {
            None => {}
            Some(IdState::Confirmed(id)) => {
                self.delete_user(id).await;
                if !self.is_master() {
                    self.spawn_forward_delete(EntityKind::User, id);
                }
            }
            Some(IdState::Pending) => self.delete_pending_user(name).await,
        }
    }

    /// Delete a role by name (front-end path). Same pending-record policy
    /// as [`Coordinator::delete_user_by_name`].
    pub async fn delete_role_by_name(&self, name: &str) {
        match self.roles.id_of(name).await {
            None => {}
            Some(IdState::Confirmed(id)) => {
                self.delete_role(id).await;
                if !self.is_master() {
                    self.spawn_forward_delete(EntityKind::Role, id);
                }
            }
            Some(IdState::Pending) => self.delete_pending_role(name).await,
        }
    }

    /// Remove a pending record. Parks the name before touching the store:
    /// the create confirmation consults the parked set when it finds the
    /// record gone, so the delete can never fall between the removal and
    /// the parking.
    async fn delete_pending_user(&self, name: &str) {
        self.defer_delete(EntityKind::User, name).await;
        let state = {
            let mut users = self.users.lock().await;
            match users.id_of(name) {
                Some(IdState::Pending) => {
                    users.remove_by_name(name);
                    Some(IdState::Pending)
                }
                other => other,
            }
        };
        match state {
            Some(IdState::Pending) => {}
            Some(IdState::Confirmed(id)) => {
                // the confirmation won the race; retract the parked delete
                // and take the confirmed path
                self.take_deferred_delete(EntityKind::User, name).await;
                self.delete_user(id).await;
                if !self.is_master() {
                    self.spawn_forward_delete(EntityKind::User, id);
                }
            }
            None => {
                self.take_deferred_delete(EntityKind::User, name).await;
            }
        }
    }

    /// Role twin of [`Coordinator::delete_pending_user`].
    async fn delete_pending_role(&self, name: &str) {
        self.defer_delete(EntityKind::Role, name).await;
        let state = {
            let mut roles = self.roles.lock().await;
            match roles.id_of(name) {
                Some(IdState::Pending) => {
                    roles.remove_by_name(name);
                    Some(IdState::Pending)
                }
                other => other,
            }
        };
        match state {
            Some(IdState::Pending) => {}
            Some(IdState::Confirmed(id)) => {
                self.take_deferred_delete(EntityKind::Role, name).await;
                self.delete_role(id).await;
                if !self.is_master() {
                    self.spawn_forward_delete(EntityKind::Role, id);
                }
            }
            None => {
                self.take_deferred_delete(EntityKind::Role, name).await;
            }
        }
    }

    /// Delete a user by confirmed identifier. Returns false for an unknown
    /// identifier.
    pub async fn delete_user(&self, id: EntityId) -> bool {
        let removed = self.users.remove_by_id(id).await.is_some();
        if removed && self.is_master() {
            self.fan_out(SyncEvent::UserRemoved { id }).await;
        }
        removed
    }

    /// Delete a role by confirmed identifier, removing it from every user's
    /// role set in the same critical section. Returns false for an unknown
    /// identifier.
    pub async fn delete_role(&self, id: EntityId) -> bool {
        let removed = {
            let mut roles = self.roles.lock().await;
            match roles.remove_by_id(id) {
                None => false,
                Some(_) => {
                    let mut users = self.users.lock().await;
                    for user in users.records_mut() {
                        user.revoke(id);
                    }
                    true
                }
            }
        };
        if removed && self.is_master() {
            self.fan_out(SyncEvent::RoleRemoved { id }).await;
        }
        removed
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Flip a user-role membership by identifier.
    ///
    /// Idempotent: granting a held role or revoking an absent one succeeds
    /// without side effects, and only an actual membership flip fans out.
    pub async fn set_role(
        &self,
        user: EntityId,
        role: EntityId,
        present: bool,
    ) -> ActionResult {
        let changed = {
            let roles = self.roles.lock().await;
            if !roles.contains_id(role) {
                return ActionResult::UnknownRole;
            }
            let mut users = self.users.lock().await;
            let Some(record) = users.get_mut_by_id(user) else {
                return ActionResult::UnknownUser;
            };
            if present {
                record.grant(role)
            } else {
                record.revoke(role)
            }
        };
        if changed && self.is_master() {
            self.fan_out(SyncEvent::UserRoleChanged {
                user,
                role,
                present,
            })
            .await;
        }
        ActionResult::Success
    }

    /// Grant a role to a user by name (front-end path).
    pub async fn add_role_to_user(&self, user_name: &str, role_name: &str) -> ActionResult {
        self.change_role_by_name(user_name, role_name, true).await
    }

    /// Revoke a role from a user by name (front-end path).
    pub async fn remove_role_from_user(
        &self,
        user_name: &str,
        role_name: &str,
    ) -> ActionResult {
        self.change_role_by_name(user_name, role_name, false).await
    }

    async fn change_role_by_name(
        &self,
        user_name: &str,
        role_name: &str,
        present: bool,
    ) -> ActionResult {
        // Resolve both names under the fixed role-before-user lock order.
        let resolved = {
            let roles = self.roles.lock().await;
            let Some(role_state) = roles.id_of(role_name) else {
                return ActionResult::UnknownRole;
            };
            let users = self.users.lock().await;
            let Some(user_state) = users.id_of(user_name) else {
                return ActionResult::UnknownUser;
            };
            match (user_state.confirmed(), role_state.confirmed()) {
                (Some(user), Some(role)) => Some((user, role)),
                _ => None,
            }
        };
        // Membership needs confirmed identifiers on both ends; until then
        // the change is dropped, like any other best-effort local edit.
        let Some((user, role)) = resolved else {
            debug!(
                "membership change '{user_name}'/'{role_name}' dropped, record still pending"
            );
            return ActionResult::Success;
        };

        let result = self.set_role(user, role, present).await;
        if result.is_success() && !self.is_master() {
            self.spawn_forward_set_role(user, role, present);
        }
        result
    }

    // ------------------------------------------------------------------
    // Bulk sync and local views
    // ------------------------------------------------------------------

    /// Ordered `(identifier, name)` pairs of confirmed users.
    pub async fn fetch_users(&self) -> Vec<(EntityId, String)> {
        self.users.snapshot().await
    }

    /// Ordered `(identifier, name)` pairs of confirmed roles.
    pub async fn fetch_roles(&self) -> Vec<(EntityId, String)> {
        self.roles.snapshot().await
    }

    /// Ordered `(user, role)` membership pairs.
    ///
    /// Only the master has the authority to hand out the relation; a
    /// replica returns an empty sequence.
    pub async fn fetch_user_roles(&self) -> Vec<(EntityId, EntityId)> {
        if !self.is_master() {
            return Vec::new();
        }
        let _roles = self.roles.lock().await;
        let users = self.users.lock().await;
        let mut pairs = Vec::new();
        for user in users.records() {
            if let Some(user_id) = user.id_state().confirmed() {
                for role_id in user.roles() {
                    pairs.push((user_id, *role_id));
                }
            }
        }
        pairs
    }

    /// Local users, pending records included, with role names resolved.
    pub async fn list_users(&self) -> Vec<UserView> {
        let roles = self.roles.lock().await;
        let users = self.users.lock().await;
        users
            .records()
            .map(|user| UserView {
                name: user.name().to_string(),
                id: user.id_state().confirmed(),
                roles: user
                    .roles()
                    .iter()
                    .filter_map(|id| roles.get_by_id(*id).map(|role| role.name().to_string()))
                    .collect(),
            })
            .collect()
    }

    /// Local roles, pending records included.
    pub async fn list_roles(&self) -> Vec<(String, Option<EntityId>)> {
        let roles = self.roles.lock().await;
        roles
            .records()
            .map(|role| (role.name().to_string(), role.id_state().confirmed()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Confirmed-fact application
    // ------------------------------------------------------------------

    /// Apply one pushed fact through the regular mutation entry points.
    pub async fn apply_event(self: &Arc<Self>, event: SyncEvent) -> Result<()> {
        match event {
            SyncEvent::UserAdded { id, name } => {
                self.add_user(&name, Some(id)).await?;
            }
            SyncEvent::RoleAdded { id, name } => {
                self.add_role(&name, Some(id)).await?;
            }
            SyncEvent::UserRoleChanged {
                user,
                role,
                present,
            } => {
                self.set_role(user, role, present).await;
            }
            SyncEvent::UserRemoved { id } => {
                self.delete_user(id).await;
            }
            SyncEvent::RoleRemoved { id } => {
                self.delete_role(id).await;
            }
            SyncEvent::Heartbeat => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fan-out and forwarding
    // ------------------------------------------------------------------

    async fn fan_out(&self, event: SyncEvent) {
        if let NodeRole::Master { dispatcher, .. } = &self.role {
            dispatcher.notify_all(event).await;
        }
    }

    /// Confirm a locally-originated creation with the master, off the
    /// caller's path. At-most-once, no retry: if the forward fails, the
    /// local record stays pending.
    fn spawn_forward_create(self: &Arc<Self>, kind: EntityKind, name: String) {
        let NodeRole::Replica { forward } = &self.role else {
            return;
        };
        let forward = Arc::clone(forward);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let created = match kind {
                EntityKind::User => forward.create_user(&name).await,
                EntityKind::Role => forward.create_role(&name).await,
            };
            match created {
                Ok(id) => {
                    if let Err(e) = this.register_confirmed(kind, &name, id).await {
                        error!("identifier registration for {kind} '{name}' failed: {e}");
                    }
                }
                Err(e) => {
                    warn!("create forward for {kind} '{name}' failed, record stays pending: {e}");
                }
            }
        });
    }

    fn spawn_forward_delete(&self, kind: EntityKind, id: EntityId) {
        let NodeRole::Replica { forward } = &self.role else {
            return;
        };
        let forward = Arc::clone(forward);
        tokio::spawn(async move {
            let result = match kind {
                EntityKind::User => forward.delete_user(id).await,
                EntityKind::Role => forward.delete_role(id).await,
            };
            if let Err(e) = result {
                warn!("delete forward for {kind} {id} failed: {e}");
            }
        });
    }

    fn spawn_forward_set_role(&self, user: EntityId, role: EntityId, present: bool) {
        let NodeRole::Replica { forward } = &self.role else {
            return;
        };
        let forward = Arc::clone(forward);
        tokio::spawn(async move {
            if let Err(e) = forward.set_role(user, role, present).await {
                warn!("membership forward for {user}/{role} failed: {e}");
            }
        });
    }

    async fn defer_delete(&self, kind: EntityKind, name: &str) {
        self.deferred_deletes
            .lock()
            .await
            .insert((kind, name.to_string()));
    }

    async fn take_deferred_delete(&self, kind: EntityKind, name: &str) -> bool {
        self.deferred_deletes
            .lock()
            .await
            .remove(&(kind, name.to_string()))
    }
}

fn added_event(kind: EntityKind, id: EntityId, name: &str) -> SyncEvent {
    match kind {
        EntityKind::User => SyncEvent::UserAdded {
            id,
            name: name.to_string(),
        },
        EntityKind::Role => SyncEvent::RoleAdded {
            id,
            name: name.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SyncConfig;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn master() -> Arc<Coordinator> {
        let dispatcher = Arc::new(CallbackDispatcher::new(&SyncConfig::new()));
        Coordinator::new_master(dispatcher)
    }

    /// Forward stub standing in for a master: mints identifiers itself and
    /// records what was forwarded.
    #[derive(Default)]
    struct RecordingForward {
        gate: Option<Arc<Notify>>,
        created: Mutex<Vec<(EntityKind, String, EntityId)>>,
        deleted: Mutex<Vec<(EntityKind, EntityId)>>,
        memberships: Mutex<Vec<(EntityId, EntityId, bool)>>,
    }

    impl RecordingForward {
        async fn create(&self, kind: EntityKind, name: &str) -> Result<EntityId> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let id = EntityId::generate();
            self.created
                .lock()
                .await
                .push((kind, name.to_string(), id));
            Ok(id)
        }
    }

    #[async_trait]
    impl ForwardChannel for RecordingForward {
        async fn create_user(&self, name: &str) -> Result<EntityId> {
            self.create(EntityKind::User, name).await
        }

        async fn create_role(&self, name: &str) -> Result<EntityId> {
            self.create(EntityKind::Role, name).await
        }

        async fn set_role(
            &self,
            user: EntityId,
            role: EntityId,
            present: bool,
        ) -> Result<ActionResult> {
            self.memberships.lock().await.push((user, role, present));
            Ok(ActionResult::Success)
        }

        async fn delete_user(&self, user: EntityId) -> Result<ActionResult> {
            self.deleted.lock().await.push((EntityKind::User, user));
            Ok(ActionResult::Success)
        }

        async fn delete_role(&self, role: EntityId) -> Result<ActionResult> {
            self.deleted.lock().await.push((EntityKind::Role, role));
            Ok(ActionResult::Success)
        }

        async fn fetch_users(&self) -> Result<Vec<(EntityId, String)>> {
            Ok(Vec::new())
        }

        async fn fetch_roles(&self) -> Result<Vec<(EntityId, String)>> {
            Ok(Vec::new())
        }

        async fn fetch_user_roles(&self) -> Result<Vec<(EntityId, EntityId)>> {
            Ok(Vec::new())
        }
    }

    async fn eventually<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_master_role_user_membership_scenario() {
        let coordinator = master();

        let admin = coordinator.add_role("Admin", None).await.unwrap().unwrap();
        assert_eq!(
            coordinator.fetch_roles().await,
            vec![(admin, "Admin".to_string())]
        );

        let alice = coordinator.add_user("alice", None).await.unwrap().unwrap();
        assert_eq!(
            coordinator.set_role(alice, admin, true).await,
            ActionResult::Success
        );
        assert_eq!(coordinator.fetch_user_roles().await, vec![(alice, admin)]);

        assert!(coordinator.delete_role(admin).await);
        assert!(coordinator.fetch_user_roles().await.is_empty());
        assert!(coordinator.fetch_roles().await.is_empty());
        assert_eq!(
            coordinator.set_role(alice, admin, true).await,
            ActionResult::UnknownRole
        );
    }

    #[tokio::test]
    async fn test_set_role_is_idempotent() {
        let coordinator = master();
        let admin = coordinator.add_role("Admin", None).await.unwrap().unwrap();
        let alice = coordinator.add_user("alice", None).await.unwrap().unwrap();

        assert!(coordinator.set_role(alice, admin, true).await.is_success());
        assert!(coordinator.set_role(alice, admin, true).await.is_success());
        assert_eq!(coordinator.fetch_user_roles().await.len(), 1);

        assert!(coordinator.set_role(alice, admin, false).await.is_success());
        assert!(coordinator.set_role(alice, admin, false).await.is_success());
        assert!(coordinator.fetch_user_roles().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_role_unknown_endpoints() {
        let coordinator = master();
        let admin = coordinator.add_role("Admin", None).await.unwrap().unwrap();
        let alice = coordinator.add_user("alice", None).await.unwrap().unwrap();

        assert_eq!(
            coordinator
                .set_role(alice, EntityId::generate(), true)
                .await,
            ActionResult::UnknownRole
        );
        assert_eq!(
            coordinator
                .set_role(EntityId::generate(), admin, true)
                .await,
            ActionResult::UnknownUser
        );
    }

    #[tokio::test]
    async fn test_master_duplicate_add_returns_existing_identifier() {
        let coordinator = master();

        let first = coordinator.add_user("alice", None).await.unwrap();
        let second = coordinator.add_user("alice", None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(coordinator.fetch_users().await.len(), 1);
    }

    #[tokio::test]
    async fn test_replica_add_forwards_and_reconciles() {
        let forward = Arc::new(RecordingForward::default());
        let coordinator = Coordinator::new_replica(forward.clone());

        let pending = coordinator.add_user("bob", None).await.unwrap();
        assert_eq!(pending, None);
        // visible immediately, identifier still absent
        assert_eq!(coordinator.list_users().await[0].id, None);

        eventually(|| {
            let coordinator = Arc::clone(&coordinator);
            async move { !coordinator.fetch_users().await.is_empty() }
        })
        .await;

        let created = forward.created.lock().await;
        assert_eq!(created.len(), 1);
        let (_, _, id) = created[0];
        assert_eq!(coordinator.fetch_users().await, vec![(id, "bob".to_string())]);
    }

    #[tokio::test]
    async fn test_replica_reconciles_own_echo() {
        let forward = Arc::new(RecordingForward::default());
        let coordinator = Coordinator::new_replica(forward.clone());

        coordinator.add_user("bob", None).await.unwrap();
        eventually(|| {
            let forward = Arc::clone(&forward);
            async move { !forward.created.lock().await.is_empty() }
        })
        .await;
        let id = forward.created.lock().await[0].2;

        // the echo of our own creation arrives via the callback channel
        coordinator
            .apply_event(SyncEvent::UserAdded {
                id,
                name: "bob".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(coordinator.fetch_users().await, vec![(id, "bob".to_string())]);
        assert_eq!(coordinator.list_users().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_delete_is_deferred_until_confirmation() {
        let gate = Arc::new(Notify::new());
        let forward = Arc::new(RecordingForward {
            gate: Some(Arc::clone(&gate)),
            ..RecordingForward::default()
        });
        let coordinator = Coordinator::new_replica(forward.clone());

        coordinator.add_user("bob", None).await.unwrap();
        coordinator.delete_user_by_name("bob").await;
        assert!(coordinator.list_users().await.is_empty());

        // let the in-flight create return its identifier
        gate.notify_one();

        eventually(|| {
            let forward = Arc::clone(&forward);
            async move { !forward.deleted.lock().await.is_empty() }
        })
        .await;
        let minted = forward.created.lock().await[0].2;
        assert_eq!(
            forward.deleted.lock().await.as_slice(),
            &[(EntityKind::User, minted)]
        );
        assert!(coordinator.fetch_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_after_local_removal_forwards_parked_delete() {
        let gate = Arc::new(Notify::new());
        let forward = Arc::new(RecordingForward {
            gate: Some(Arc::clone(&gate)),
            ..RecordingForward::default()
        });
        let coordinator = Coordinator::new_replica(forward.clone());

        coordinator.add_user("bob", None).await.unwrap();
        coordinator.delete_user_by_name("bob").await;
        assert!(coordinator.list_users().await.is_empty());

        // the confirmation lands only after the record is already gone
        let id = EntityId::generate();
        coordinator
            .register_confirmed(EntityKind::User, "bob", id)
            .await
            .unwrap();

        eventually(|| {
            let forward = Arc::clone(&forward);
            async move { !forward.deleted.lock().await.is_empty() }
        })
        .await;
        assert_eq!(
            forward.deleted.lock().await.as_slice(),
            &[(EntityKind::User, id)]
        );
        // nothing resurrects the record
        assert!(coordinator.list_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_replica_membership_change_forwards() {
        let forward = Arc::new(RecordingForward::default());
        let coordinator = Coordinator::new_replica(forward.clone());
        let user = EntityId::generate();
        let role = EntityId::generate();

        // confirmed facts as pushed by a master
        coordinator.add_user("alice", Some(user)).await.unwrap();
        coordinator.add_role("Admin", Some(role)).await.unwrap();

        assert!(
            coordinator
                .add_role_to_user("alice", "Admin")
                .await
                .is_success()
        );
        eventually(|| {
            let forward = Arc::clone(&forward);
            async move { !forward.memberships.lock().await.is_empty() }
        })
        .await;
        assert_eq!(
            forward.memberships.lock().await.as_slice(),
            &[(user, role, true)]
        );
    }

    #[tokio::test]
    async fn test_role_delete_cascades_into_role_sets() {
        let coordinator = master();
        let admin = coordinator.add_role("Admin", None).await.unwrap().unwrap();
        let dev = coordinator.add_role("Dev", None).await.unwrap().unwrap();
        let alice = coordinator.add_user("alice", None).await.unwrap().unwrap();
        let bob = coordinator.add_user("bob", None).await.unwrap().unwrap();

        coordinator.set_role(alice, admin, true).await;
        coordinator.set_role(alice, dev, true).await;
        coordinator.set_role(bob, admin, true).await;

        assert!(coordinator.delete_role(admin).await);

        let views = coordinator.list_users().await;
        assert_eq!(views[0].roles, vec!["Dev".to_string()]);
        assert!(views[1].roles.is_empty());
        assert_eq!(coordinator.fetch_user_roles().await, vec![(alice, dev)]);
    }
}

