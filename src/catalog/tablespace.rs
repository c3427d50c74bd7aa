//! pg_tablespace: one row per tablespace
//!
//! The location is not stored here; it only exists as the target of the
//! tablespace's symlink.

use crate::catalog::error::{CatalogError, CatalogResult};
use crate::catalog::store::{escape_field, parse_oid, unescape_field, CatalogRow, CatalogStore, WriteSet};
use crate::lock::{LockError, LockManager, LockMode, LockTag, LockWait};
use crate::types::{
    CatalogKind, RoleId, TablespaceId, TransactionId, BOOTSTRAP_SUPERUSER_ID,
    DEFAULT_TABLESPACE_OID, FIRST_NORMAL_OID, GLOBAL_TABLESPACE_OID, INVALID_OID,
};
use linked_hash_map::LinkedHashMap;
use std::path::Path;

/// Ordered tablespace options
pub type TablespaceOptions = LinkedHashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablespaceRow {
    pub id: TablespaceId,
    pub name: String,
    pub owner: RoleId,
    pub options: TablespaceOptions,
}

impl TablespaceRow {
    pub fn new(id: TablespaceId, name: impl Into<String>, owner: RoleId) -> Self {
        Self {
            id,
            name: name.into(),
            owner,
            options: TablespaceOptions::new(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.id == DEFAULT_TABLESPACE_OID || self.id == GLOBAL_TABLESPACE_OID
    }
}

impl CatalogRow for TablespaceRow {
    const KIND: CatalogKind = CatalogKind::Tablespace;

    type Key = String;

    fn oid(&self) -> TablespaceId {
        self.id
    }

    fn key(&self) -> String {
        self.name.clone()
    }

    fn encode(&self) -> String {
        let options: Vec<String> = self
            .options
            .iter()
            .map(|(k, v)| format!("{}={}", escape_field(k), escape_field(v)))
            .collect();
        format!(
            "{}|{}|{}|{}",
            self.id,
            escape_field(&self.name),
            self.owner,
            options.join(",")
        )
    }

    fn decode(line: &str) -> CatalogResult<Self> {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 4 {
            return Err(CatalogError::ParseError(format!(
                "Invalid pg_tablespace row: {}",
                line
            )));
        }

        let mut options = TablespaceOptions::new();
        for option in parts[3].split(',').filter(|s| !s.is_empty()) {
            let (key, value) = option.split_once('=').ok_or_else(|| {
                CatalogError::ParseError(format!("Invalid tablespace option: {}", option))
            })?;
            options.insert(unescape_field(key)?, unescape_field(value)?);
        }

        Ok(Self {
            id: parse_oid(parts[0])?,
            name: unescape_field(parts[1])?,
            owner: parse_oid(parts[2])?,
            options,
        })
    }
}

pub struct TablespaceCatalog {
    store: CatalogStore<TablespaceRow>,
}

impl TablespaceCatalog {
    pub const FILE_NAME: &'static str = "pg_tablespace";

    /// Open `<global_dir>/pg_tablespace`, creating the built-in rows on first use
    pub fn open(global_dir: impl AsRef<Path>) -> CatalogResult<Self> {
        let store = CatalogStore::open(global_dir.as_ref().join(Self::FILE_NAME), FIRST_NORMAL_OID)?;
        let catalog = Self { store };
        if catalog.store.is_empty() {
            catalog.bootstrap()?;
        }
        Ok(catalog)
    }

    pub fn in_memory() -> CatalogResult<Self> {
        let catalog = Self {
            store: CatalogStore::in_memory(FIRST_NORMAL_OID),
        };
        catalog.bootstrap()?;
        Ok(catalog)
    }

    fn bootstrap(&self) -> CatalogResult<()> {
        log::debug!("bootstrapping pg_tablespace");
        self.store.bootstrap(vec![
            TablespaceRow::new(DEFAULT_TABLESPACE_OID, "pg_default", BOOTSTRAP_SUPERUSER_ID),
            TablespaceRow::new(GLOBAL_TABLESPACE_OID, "pg_global", BOOTSTRAP_SUPERUSER_ID),
        ])
    }

    /// Resolve `name` to an id, locking the row against concurrent drop
    ///
    /// The key-share lock is held by `xid` until it ends. A row that is being
    /// deleted or was deleted under us is a serialization failure; with
    /// `missing_ok` an absent name yields [`INVALID_OID`].
    pub fn lookup_id(
        &self,
        ws: &WriteSet<TablespaceRow>,
        locks: &LockManager,
        xid: TransactionId,
        name: &str,
        missing_ok: bool,
    ) -> CatalogResult<TablespaceId> {
        let row = match self.store.find_by_key(ws, &name.to_string()) {
            Some(row) => row,
            None if missing_ok => return Ok(INVALID_OID),
            None => {
                return Err(CatalogError::NotFound {
                    catalog: CatalogKind::Tablespace,
                    key: name.to_string(),
                });
            }
        };

        locks
            .acquire(xid, LockTag::tablespace(row.id), LockMode::KeyShare, LockWait::NoWait)
            .map_err(|err: LockError| {
                log::debug!("key-share lock on tablespace {} refused: {}", row.id, err);
                CatalogError::SerializationFailure {
                    catalog: CatalogKind::Tablespace,
                    oid: row.id,
                }
            })?;

        // deleted between the scan and the lock
        if self.store.get(ws, row.id).is_none() {
            return Err(CatalogError::SerializationFailure {
                catalog: CatalogKind::Tablespace,
                oid: row.id,
            });
        }
        Ok(row.id)
    }

    pub fn lookup_name(&self, ws: &WriteSet<TablespaceRow>, id: TablespaceId) -> Option<String> {
        self.store.get(ws, id).map(|row| row.name)
    }

    pub fn get(&self, ws: &WriteSet<TablespaceRow>, id: TablespaceId) -> Option<TablespaceRow> {
        self.store.get(ws, id)
    }

    /// Unlocked lookup by name
    pub fn find_by_name(&self, ws: &WriteSet<TablespaceRow>, name: &str) -> Option<TablespaceRow> {
        self.store.find_by_key(ws, &name.to_string())
    }

    pub fn list(&self, ws: &WriteSet<TablespaceRow>) -> Vec<TablespaceRow> {
        self.store.scan(ws, |_| true)
    }

    /// Insert a new row, with `id` when preassigned or a fresh oid otherwise
    pub fn insert(
        &self,
        ws: &mut WriteSet<TablespaceRow>,
        xid: TransactionId,
        id: Option<TablespaceId>,
        name: &str,
        owner: RoleId,
        options: TablespaceOptions,
    ) -> CatalogResult<TablespaceId> {
        if self.store.find_by_key(ws, &name.to_string()).is_some() {
            return Err(CatalogError::DuplicateKey {
                catalog: CatalogKind::Tablespace,
                key: name.to_string(),
            });
        }
        let id = id.unwrap_or_else(|| self.store.allocate_oid());
        let row = TablespaceRow {
            id,
            name: name.to_string(),
            owner,
            options,
        };
        self.store.insert(ws, xid, row)?;
        Ok(id)
    }

    pub fn update_name(
        &self,
        ws: &mut WriteSet<TablespaceRow>,
        xid: TransactionId,
        id: TablespaceId,
        new_name: &str,
    ) -> CatalogResult<()> {
        let mut row = self.require(ws, id)?;
        row.name = new_name.to_string();
        self.store.update(ws, xid, row)
    }

    pub fn update_options(
        &self,
        ws: &mut WriteSet<TablespaceRow>,
        xid: TransactionId,
        id: TablespaceId,
        options: TablespaceOptions,
    ) -> CatalogResult<()> {
        let mut row = self.require(ws, id)?;
        row.options = options;
        self.store.update(ws, xid, row)
    }

    pub fn delete(&self, ws: &mut WriteSet<TablespaceRow>, id: TablespaceId) -> CatalogResult<()> {
        self.store.delete(ws, id).map(|_| ())
    }

    pub fn commit(&self, ws: &mut WriteSet<TablespaceRow>, xid: TransactionId) -> CatalogResult<()> {
        self.store.commit(ws, xid)
    }

    pub fn abort(&self, ws: &mut WriteSet<TablespaceRow>, xid: TransactionId) {
        self.store.abort(ws, xid)
    }

    /// Keep a preassigned id from ever being handed out again
    pub fn reserve_oid(&self, id: TablespaceId) {
        self.store.advance_oid_past(id)
    }

    pub fn peek_next_oid(&self) -> TablespaceId {
        self.store.peek_next_oid()
    }

    fn require(&self, ws: &WriteSet<TablespaceRow>, id: TablespaceId) -> CatalogResult<TablespaceRow> {
        self.store.get(ws, id).ok_or_else(|| CatalogError::NotFound {
            catalog: CatalogKind::Tablespace,
            key: format!("oid {}", id),
        })
    }
}
