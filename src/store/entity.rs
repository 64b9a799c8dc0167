use crate::core::EntityId;

/// Identifier assignment state of a record.
///
/// A record is `Pending` only on the node that locally originated it, only
/// until the master's confirmation arrives. The master itself never holds
/// pending records; it assigns identifiers synchronously at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdState {
    Pending,
    Confirmed(EntityId),
}

impl IdState {
    pub fn confirmed(self) -> Option<EntityId> {
        match self {
            IdState::Confirmed(id) => Some(id),
            IdState::Pending => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, IdState::Pending)
    }
}

/// One record kind held by an [`super::EntityStore`].
///
/// The name is the immutable natural key; the identifier state moves from
/// pending to confirmed at most once (the store enforces the transition).
pub trait EntityRecord: Send + 'static {
    fn new(name: String, id: Option<EntityId>) -> Self;
    fn name(&self) -> &str;
    fn id_state(&self) -> IdState;
    fn id_state_mut(&mut self) -> &mut IdState;
}

fn initial_state(id: Option<EntityId>) -> IdState {
    match id {
        Some(id) => IdState::Confirmed(id),
        None => IdState::Pending,
    }
}

/// A user: name, identifier state, and an insertion-ordered set of the
/// confirmed role identifiers it holds. Membership is by identifier, not by
/// name, so it is unaffected by anything but role deletion.
#[derive(Debug, Clone)]
pub struct UserRecord {
    name: String,
    id: IdState,
    roles: Vec<EntityId>,
}

impl UserRecord {
    pub fn roles(&self) -> &[EntityId] {
        &self.roles
    }

    pub fn has_role(&self, role: EntityId) -> bool {
        self.roles.contains(&role)
    }

    /// Returns true if the membership actually changed.
    pub fn grant(&mut self, role: EntityId) -> bool {
        if self.roles.contains(&role) {
            return false;
        }
        self.roles.push(role);
        true
    }

    /// Returns true if the membership actually changed.
    pub fn revoke(&mut self, role: EntityId) -> bool {
        let before = self.roles.len();
        self.roles.retain(|held| *held != role);
        self.roles.len() != before
    }
}

impl EntityRecord for UserRecord {
    fn new(name: String, id: Option<EntityId>) -> Self {
        Self {
            name,
            id: initial_state(id),
            roles: Vec::new(),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id_state(&self) -> IdState {
        self.id
    }

    fn id_state_mut(&mut self) -> &mut IdState {
        &mut self.id
    }
}

/// A role carries no attributes beyond its name and identifier state.
#[derive(Debug, Clone)]
pub struct RoleRecord {
    name: String,
    id: IdState,
}

impl EntityRecord for RoleRecord {
    fn new(name: String, id: Option<EntityId>) -> Self {
        Self {
            name,
            id: initial_state(id),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id_state(&self) -> IdState {
        self.id
    }

    fn id_state_mut(&mut self) -> &mut IdState {
        &mut self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_is_idempotent() {
        let mut user = UserRecord::new("alice".to_string(), Some(EntityId::generate()));
        let role = EntityId::generate();

        assert!(user.grant(role));
        assert!(!user.grant(role));
        assert!(user.has_role(role));
        assert_eq!(user.roles().len(), 1);
    }

    #[test]
    fn test_revoke_absent_is_noop() {
        let mut user = UserRecord::new("alice".to_string(), None);
        let role = EntityId::generate();

        assert!(!user.revoke(role));
        assert!(user.grant(role));
        assert!(user.revoke(role));
        assert!(user.roles().is_empty());
    }

    #[test]
    fn test_roles_keep_insertion_order() {
        let mut user = UserRecord::new("alice".to_string(), None);
        let first = EntityId::generate();
        let second = EntityId::generate();

        user.grant(first);
        user.grant(second);
        assert_eq!(user.roles(), &[first, second]);
    }
}
