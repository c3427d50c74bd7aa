//! Permission checks
//!
//! The tablespace subsystem only consumes yes/no answers. [`RoleRegistry`] is
//! the in-process role table used by the binary and the tests; it can be
//! shared by every node of a local cluster so role ids agree everywhere.

use crate::types::{RoleId, TablespaceId, BOOTSTRAP_SUPERUSER_ID, FIRST_NORMAL_OID};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

pub trait AclCheck: Send + Sync {
    fn is_superuser(&self, role: RoleId) -> bool;

    /// Whether `role` was granted CREATE on `tablespace`
    ///
    /// Owners and superusers are handled by the caller.
    fn has_tablespace_create(&self, role: RoleId, tablespace: TablespaceId) -> bool;

    fn get_role_oid(&self, name: &str) -> Option<RoleId>;

    fn get_role_name(&self, role: RoleId) -> Option<String>;
}

#[derive(Debug, Clone)]
struct RoleEntry {
    name: String,
    superuser: bool,
}

pub struct RoleRegistry {
    roles: RwLock<HashMap<RoleId, RoleEntry>>,
    create_grants: RwLock<HashSet<(RoleId, TablespaceId)>>,
    next_role_id: RwLock<RoleId>,
}

impl RoleRegistry {
    pub const BOOTSTRAP_SUPERUSER_NAME: &'static str = "aistore";

    /// A registry holding only the bootstrap superuser
    pub fn new() -> Self {
        let mut roles = HashMap::new();
        roles.insert(
            BOOTSTRAP_SUPERUSER_ID,
            RoleEntry {
                name: Self::BOOTSTRAP_SUPERUSER_NAME.to_string(),
                superuser: true,
            },
        );
        Self {
            roles: RwLock::new(roles),
            create_grants: RwLock::new(HashSet::new()),
            next_role_id: RwLock::new(FIRST_NORMAL_OID),
        }
    }

    pub fn create_role(&self, name: &str, superuser: bool) -> RoleId {
        let id = {
            let mut next = self.next_role_id.write();
            let id = *next;
            *next += 1;
            id
        };
        self.roles.write().insert(
            id,
            RoleEntry {
                name: name.to_string(),
                superuser,
            },
        );
        id
    }

    pub fn grant_create(&self, role: RoleId, tablespace: TablespaceId) {
        self.create_grants.write().insert((role, tablespace));
    }

    pub fn revoke_create(&self, role: RoleId, tablespace: TablespaceId) {
        self.create_grants.write().remove(&(role, tablespace));
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AclCheck for RoleRegistry {
    fn is_superuser(&self, role: RoleId) -> bool {
        self.roles.read().get(&role).is_some_and(|entry| entry.superuser)
    }

    fn has_tablespace_create(&self, role: RoleId, tablespace: TablespaceId) -> bool {
        self.create_grants.read().contains(&(role, tablespace))
    }

    fn get_role_oid(&self, name: &str) -> Option<RoleId> {
        self.roles
            .read()
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
    }

    fn get_role_name(&self, role: RoleId) -> Option<String> {
        self.roles.read().get(&role).map(|entry| entry.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_registry() {
        let registry = RoleRegistry::new();
        assert!(registry.is_superuser(BOOTSTRAP_SUPERUSER_ID));
        assert_eq!(
            registry.get_role_oid(RoleRegistry::BOOTSTRAP_SUPERUSER_NAME),
            Some(BOOTSTRAP_SUPERUSER_ID)
        );

        let alice = registry.create_role("alice", false);
        assert_ne!(alice, BOOTSTRAP_SUPERUSER_ID);
        assert!(!registry.is_superuser(alice));
        assert_eq!(registry.get_role_name(alice).as_deref(), Some("alice"));
        assert_eq!(registry.get_role_oid("bob"), None);
    }

    #[test]
    fn test_tablespace_create_grants() {
        let registry = RoleRegistry::new();
        let alice = registry.create_role("alice", false);

        assert!(!registry.has_tablespace_create(alice, 16384));
        registry.grant_create(alice, 16384);
        assert!(registry.has_tablespace_create(alice, 16384));
        assert!(!registry.has_tablespace_create(alice, 16385));
        registry.revoke_create(alice, 16384);
        assert!(!registry.has_tablespace_create(alice, 16384));
    }
}
