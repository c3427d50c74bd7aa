//! Relation catalog (pg_class)
//!
//! Transactional relation metadata with the lookups the tablespace subsystem
//! needs:
//! - Find: by schema-qualified name within a database
//! - Scan: every relation of a database bound to a tablespace
//! - Insert / Update / Delete through the caller's write set

use crate::catalog::{CatalogResult, CatalogStore, WriteSet};
use crate::table::{Relation, RelationKey};
use crate::types::{
    DatabaseId, NamespaceKind, Oid, RelationId, TablespaceId, TransactionId, FIRST_NORMAL_OID,
};
use std::path::Path;

pub struct RelationCatalog {
    store: CatalogStore<Relation>,
}

impl RelationCatalog {
    pub const FILE_NAME: &'static str = "pg_class";

    /// Open `<global_dir>/pg_class`
    pub fn open(global_dir: impl AsRef<Path>) -> CatalogResult<Self> {
        Ok(Self {
            store: CatalogStore::open(global_dir.as_ref().join(Self::FILE_NAME), FIRST_NORMAL_OID)?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: CatalogStore::in_memory(FIRST_NORMAL_OID),
        }
    }

    /// Generate and reserve the next relation oid (also used for new relfilenodes)
    pub fn allocate_oid(&self) -> Oid {
        self.store.allocate_oid()
    }

    pub fn get(&self, ws: &WriteSet<Relation>, oid: RelationId) -> Option<Relation> {
        self.store.get(ws, oid)
    }

    pub fn find(
        &self,
        ws: &WriteSet<Relation>,
        database: DatabaseId,
        namespace: NamespaceKind,
        name: &str,
    ) -> Option<Relation> {
        let key = RelationKey {
            database,
            namespace,
            name: name.to_string(),
        };
        self.store.find_by_key(ws, &key)
    }

    /// Relations of `database` whose tablespace column equals `tablespace`
    pub fn scan_tablespace(
        &self,
        ws: &WriteSet<Relation>,
        database: DatabaseId,
        tablespace: TablespaceId,
    ) -> Vec<Relation> {
        self.store
            .scan(ws, |rel| rel.database == database && rel.tablespace == tablespace)
    }

    pub fn list(&self, ws: &WriteSet<Relation>) -> Vec<Relation> {
        self.store.scan(ws, |_| true)
    }

    pub fn insert(
        &self,
        ws: &mut WriteSet<Relation>,
        xid: TransactionId,
        relation: Relation,
    ) -> CatalogResult<()> {
        self.store.insert(ws, xid, relation)
    }

    pub fn update(
        &self,
        ws: &mut WriteSet<Relation>,
        xid: TransactionId,
        relation: Relation,
    ) -> CatalogResult<()> {
        self.store.update(ws, xid, relation)
    }

    pub fn delete(&self, ws: &mut WriteSet<Relation>, oid: RelationId) -> CatalogResult<Relation> {
        self.store.delete(ws, oid)
    }

    pub fn commit(&self, ws: &mut WriteSet<Relation>, xid: TransactionId) -> CatalogResult<()> {
        self.store.commit(ws, xid)
    }

    pub fn abort(&self, ws: &mut WriteSet<Relation>, xid: TransactionId) {
        self.store.abort(ws, xid)
    }
}
