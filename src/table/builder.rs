//! RelationBuilder for fluent relation construction
//!
//! Provides a builder pattern for creating pg_class rows with:
//! - Oid and relfilenode assignment
//! - Namespace, kind and persistence
//! - Validation before build

use crate::table::Relation;
use crate::types::{
    DatabaseId, NamespaceKind, Oid, Persistence, RelKind, RelationId, RoleId, TablespaceId,
    BOOTSTRAP_SUPERUSER_ID, GLOBAL_TABLESPACE_OID, INVALID_OID, NAMEDATALEN,
};

/// Builder for constructing Relation instances
///
/// # Example
/// ```
/// use aistore_tblspc::table::RelationBuilder;
/// use aistore_tblspc::types::RelKind;
///
/// let rel = RelationBuilder::new(16390, "orders")
///     .database(5)
///     .kind(RelKind::Table)
///     .tablespace(16384)
///     .try_build()
///     .unwrap();
/// assert_eq!(rel.relfilenode, 16390);
/// ```
#[derive(Debug)]
pub struct RelationBuilder {
    oid: RelationId,
    name: String,
    namespace: NamespaceKind,
    kind: RelKind,
    owner: RoleId,
    database: DatabaseId,
    tablespace: TablespaceId,
    shared: bool,
    relfilenode: Option<Oid>,
    persistence: Persistence,
}

impl RelationBuilder {
    /// Create a new relation builder with required fields
    pub fn new(oid: RelationId, name: impl Into<String>) -> Self {
        Self {
            oid,
            name: name.into(),
            namespace: NamespaceKind::User,
            kind: RelKind::Table,
            owner: BOOTSTRAP_SUPERUSER_ID,
            database: INVALID_OID,
            tablespace: INVALID_OID,
            shared: false,
            relfilenode: None,
            persistence: Persistence::Permanent,
        }
    }

    pub fn namespace(mut self, namespace: NamespaceKind) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn kind(mut self, kind: RelKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn owner(mut self, owner: RoleId) -> Self {
        self.owner = owner;
        self
    }

    pub fn database(mut self, database: DatabaseId) -> Self {
        self.database = database;
        self
    }

    /// Set the tablespace (`0` for the database default)
    pub fn tablespace(mut self, tablespace: TablespaceId) -> Self {
        self.tablespace = tablespace;
        self
    }

    /// Mark as a shared catalog; implies the global tablespace
    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Defaults to the oid
    pub fn relfilenode(mut self, relfilenode: Oid) -> Self {
        self.relfilenode = Some(relfilenode);
        self
    }

    /// Temporary persistence also moves the relation to the temp schema
    pub fn persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        if persistence == Persistence::Temporary {
            self.namespace = NamespaceKind::Temp;
        }
        self
    }

    /// Build with validation
    pub fn try_build(self) -> Result<Relation, String> {
        if self.name.is_empty() {
            return Err("relation name cannot be empty".to_string());
        }
        if self.name.len() >= NAMEDATALEN {
            return Err(format!(
                "relation name \"{}\" is too long (maximum is {} characters)",
                self.name,
                NAMEDATALEN - 1
            ));
        }

        let (database, tablespace) = if self.shared {
            (INVALID_OID, GLOBAL_TABLESPACE_OID)
        } else {
            if self.tablespace == GLOBAL_TABLESPACE_OID {
                return Err(
                    "only shared relations can be placed in pg_global tablespace".to_string()
                );
            }
            if self.database == INVALID_OID {
                return Err("database must be set for a non-shared relation".to_string());
            }
            if !self.kind.has_storage() && self.tablespace != INVALID_OID {
                return Err(format!(
                    "tablespace cannot be specified for view \"{}\"",
                    self.name
                ));
            }
            (self.database, self.tablespace)
        };

        Ok(Relation {
            oid: self.oid,
            name: self.name,
            namespace: self.namespace,
            kind: self.kind,
            owner: self.owner,
            database,
            tablespace,
            shared: self.shared,
            relfilenode: self.relfilenode.unwrap_or(self.oid),
            persistence: self.persistence,
        })
    }
}
