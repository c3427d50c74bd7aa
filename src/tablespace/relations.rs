//! Relations living in tablespaces
//!
//! Just enough of table DDL to put files into tablespaces, fill them, lock
//! them and drop them again. File creation and row data reach the WAL before
//! the file does, so replay can rebuild them.

use crate::cdb::{DispatchFlags, UtilityStatement};
use crate::lock::{LockMode, LockTag, LockWait};
use crate::session::Session;
use crate::smgr::PendingDelete;
use crate::table::{Relation, RelationBuilder};
use crate::tablespace::{
    current_txn, lock_not_available, TablespaceError, TablespaceManager, TablespaceResult,
};
use crate::catalog::WriteSet;
use crate::types::{
    DatabaseId, NamespaceKind, Persistence, RelKind, RelationId, GLOBAL_TABLESPACE_OID, INVALID_OID,
};
use crate::wal::{SmgrWalRecord, WalSink, RM_SMGR_ID};
use crate::xact::Transaction;

const RELATION_DISPATCH: DispatchFlags = DispatchFlags::CANCEL_ON_ERROR
    .union(DispatchFlags::WITH_SNAPSHOT)
    .union(DispatchFlags::NEED_TWO_PHASE);

/// `CREATE [TEMP] TABLE|INDEX ... [TABLESPACE name]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRelationStmt {
    /// `name` or `schema.name`
    pub name: String,
    pub kind: RelKind,
    pub tablespace: Option<String>,
    pub persistence: Persistence,
    /// Shared catalog, placed in pg_global
    pub shared: bool,
}

impl CreateRelationStmt {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelKind::Table,
            tablespace: None,
            persistence: Persistence::Permanent,
            shared: false,
        }
    }

    pub fn index(name: impl Into<String>) -> Self {
        Self {
            kind: RelKind::Index,
            ..Self::table(name)
        }
    }

    pub fn kind(mut self, kind: RelKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn tablespace(mut self, tablespace: impl Into<String>) -> Self {
        self.tablespace = Some(tablespace.into());
        self
    }

    pub fn temporary(mut self) -> Self {
        self.persistence = Persistence::Temporary;
        self
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRelationStmt {
    pub name: String,
    pub missing_ok: bool,
}

/// Split `schema.name`; an unqualified name goes to the user schema, or the
/// temp schema for temporary relations
fn parse_relation_name(
    name: &str,
    persistence: Persistence,
) -> TablespaceResult<(NamespaceKind, String)> {
    let Some((schema, relname)) = name.split_once('.') else {
        let namespace = if persistence == Persistence::Temporary {
            NamespaceKind::Temp
        } else {
            NamespaceKind::User
        };
        return Ok((namespace, name.to_string()));
    };

    let namespace = [
        NamespaceKind::User,
        NamespaceKind::System,
        NamespaceKind::Toast,
        NamespaceKind::Temp,
    ]
    .into_iter()
    .find(|ns| ns.name() == schema)
    .ok_or_else(|| {
        TablespaceError::InvalidParameter(format!("schema \"{}\" does not exist", schema))
    })?;
    Ok((namespace, relname.to_string()))
}

impl TablespaceManager {
    pub fn create_relation(
        &self,
        session: &mut Session,
        stmt: &CreateRelationStmt,
    ) -> TablespaceResult<RelationId> {
        self.execute(session, |mgr, s| mgr.do_create_relation(s, stmt))
    }

    pub fn drop_relation(&self, session: &mut Session, stmt: &DropRelationStmt) -> TablespaceResult<()> {
        self.execute(session, |mgr, s| mgr.do_drop_relation(s, stmt))
    }

    /// Append `rows` to the relation's file; returns the new file size
    pub fn insert_rows(&self, session: &mut Session, name: &str, rows: &[&[u8]]) -> TablespaceResult<u64> {
        self.execute(session, |mgr, s| {
            let rel = mgr.open_relation(s, name, LockMode::AccessShare, mgr.lock_wait())?;
            if !rel.has_storage() {
                return Err(TablespaceError::InvalidParameter(format!(
                    "cannot insert into \"{}\": relation has no storage",
                    name
                )));
            }

            let locator = rel.locator(s.database_tablespace);
            let path = mgr.layout.relation_path(locator.spc, locator.db, locator.relfilenode);
            let size = mgr.smgr.size(&path).map_err(|err| {
                TablespaceError::fs(format!("could not open file \"{}\"", path.display()), err)
            })?;
            let data = rows.concat();
            if data.is_empty() {
                return Ok(size);
            }
            if rel.persistence.logs_data() {
                let record = SmgrWalRecord::Write {
                    locator,
                    offset: size,
                    data: data.clone(),
                };
                mgr.log_smgr(current_txn(s)?, &record)?;
            }
            mgr.smgr.write_at(&path, size, &data).map_err(|err| {
                TablespaceError::fs(format!("could not extend file \"{}\"", path.display()), err)
            })
        })
    }

    /// Contents of the relation's file
    pub fn read_relation(&self, session: &mut Session, name: &str) -> TablespaceResult<Vec<u8>> {
        self.execute(session, |mgr, s| {
            let rel = mgr.open_relation(s, name, LockMode::AccessShare, mgr.lock_wait())?;
            if !rel.has_storage() {
                return Ok(Vec::new());
            }
            let locator = rel.locator(s.database_tablespace);
            let path = mgr.layout.relation_path(locator.spc, locator.db, locator.relfilenode);
            mgr.smgr.read(&path).map_err(|err| {
                TablespaceError::fs(format!("could not read file \"{}\"", path.display()), err)
            })
        })
    }

    /// WAL-log a change to a relation file inside the current transaction
    pub(crate) fn log_smgr(&self, txn: &mut Transaction, record: &SmgrWalRecord) -> TablespaceResult<()> {
        let lsn = self.wal.append(RM_SMGR_ID, record.info(), &record.encode())?;
        txn.wal_logged(lsn);
        Ok(())
    }

    /// `LOCK TABLE name IN mode MODE [NOWAIT]`; the lock is held until the
    /// transaction ends
    pub fn lock_relation(
        &self,
        session: &mut Session,
        name: &str,
        mode: LockMode,
        nowait: bool,
    ) -> TablespaceResult<()> {
        if !session.transaction().is_some_and(|txn| txn.is_block()) {
            return Err(TablespaceError::InvalidTransactionState(
                "LOCK TABLE can only be used in transaction blocks".to_string(),
            ));
        }
        let wait = if nowait {
            LockWait::NoWait
        } else {
            self.lock_wait()
        };
        self.execute(session, |mgr, s| mgr.open_relation(s, name, mode, wait).map(|_| ()))
    }

    /// Relation named `name` as the session currently sees it
    pub fn get_relation(&self, session: &Session, name: &str) -> TablespaceResult<Option<Relation>> {
        let empty = WriteSet::default();
        let ws = session.transaction().map_or(&empty, |txn| &txn.relations);
        self.resolve_relation(ws, session.database, name)
    }

    /// Unqualified names search the user schema, then the temp schema;
    /// shared catalogs are found from any database
    fn resolve_relation(
        &self,
        ws: &WriteSet<Relation>,
        database: DatabaseId,
        name: &str,
    ) -> TablespaceResult<Option<Relation>> {
        let (namespace, relname) = parse_relation_name(name, Persistence::Permanent)?;
        let namespaces: &[NamespaceKind] = if name.contains('.') {
            &[namespace]
        } else {
            &[NamespaceKind::User, NamespaceKind::Temp]
        };
        let found = namespaces.iter().find_map(|&ns| {
            self.relations
                .find(ws, database, ns, &relname)
                .or_else(|| self.relations.find(ws, INVALID_OID, ns, &relname))
        });
        Ok(found)
    }

    pub(crate) fn do_create_relation(
        &self,
        session: &mut Session,
        stmt: &CreateRelationStmt,
    ) -> TablespaceResult<RelationId> {
        let (namespace, relname) = parse_relation_name(&stmt.name, stmt.persistence)?;
        let allow_system_table_mods = session.settings.allow_system_table_mods;

        if namespace == NamespaceKind::System && !allow_system_table_mods {
            return Err(TablespaceError::PermissionDenied(format!(
                "permission denied to create \"{}.{}\"",
                namespace.name(),
                relname
            )));
        }
        if stmt.shared && !allow_system_table_mods {
            return Err(TablespaceError::PermissionDenied(format!(
                "permission denied to create shared relation \"{}\"",
                relname
            )));
        }

        if !stmt.kind.has_storage() && stmt.tablespace.is_some() {
            return Err(TablespaceError::InvalidParameter(format!(
                "tablespace cannot be specified for view \"{}\"",
                relname
            )));
        }

        let tablespace = if stmt.shared {
            GLOBAL_TABLESPACE_OID
        } else if !stmt.kind.has_storage() {
            INVALID_OID
        } else {
            let id = match &stmt.tablespace {
                Some(name) => self.lookup_tablespace(session, name, false)?,
                None => self.default_tablespace_in_txn(session, stmt.persistence)?,
            };
            if id == GLOBAL_TABLESPACE_OID {
                return Err(TablespaceError::InvalidParameter(
                    "only shared relations can be placed in pg_global tablespace".to_string(),
                ));
            }
            if id == session.database_tablespace {
                INVALID_OID
            } else {
                id
            }
        };

        let role = session.role;
        let database = session.database;
        let session_tablespace = session.database_tablespace;

        let txn = current_txn(session)?;
        let xid = txn.xid();
        if tablespace != INVALID_OID && tablespace != GLOBAL_TABLESPACE_OID {
            let row = self.tablespaces.get(&txn.tablespaces, tablespace).ok_or_else(|| {
                TablespaceError::NotFound(format!("oid {}", tablespace))
            })?;
            if !self.has_create_privilege(role, &row) {
                return Err(TablespaceError::PermissionDenied(format!(
                    "permission denied for tablespace {}",
                    row.name
                )));
            }
        }

        let oid = self.relations.allocate_oid();
        let relation = RelationBuilder::new(oid, relname)
            .namespace(namespace)
            .kind(stmt.kind)
            .owner(role)
            .database(database)
            .tablespace(tablespace)
            .shared(stmt.shared)
            .persistence(stmt.persistence)
            .try_build()
            .map_err(TablespaceError::InvalidParameter)?;

        let qualified_name = relation.qualified_name();
        let has_storage = relation.has_storage();
        let locator = relation.locator(session_tablespace);
        self.relations.insert(&mut txn.relations, xid, relation)?;

        if has_storage {
            self.dirs.create_dbspace(locator.spc, locator.db, false)?;
            let path = self.layout.relation_path(locator.spc, locator.db, locator.relfilenode);
            let mut pending = PendingDelete::on_abort(locator, path.clone());
            if stmt.persistence.logs_file() {
                self.log_smgr(txn, &SmgrWalRecord::Create { locator })?;
            } else {
                pending = pending.without_wal();
            }
            self.smgr.create(&path).map_err(|err| {
                TablespaceError::fs(format!("could not create file \"{}\"", path.display()), err)
            })?;
            txn.pending_deletes.push(pending);
        }
        log::debug!(
            "created relation {} ({}) in tablespace {}",
            qualified_name,
            oid,
            locator.spc
        );

        self.dispatch_statement(
            session,
            UtilityStatement::CreateRelation(stmt.clone()),
            RELATION_DISPATCH,
            Vec::new(),
        )?;
        Ok(oid)
    }

    pub(crate) fn do_drop_relation(
        &self,
        session: &mut Session,
        stmt: &DropRelationStmt,
    ) -> TablespaceResult<()> {
        let rel = match self.open_relation(session, &stmt.name, LockMode::AccessExclusive, self.lock_wait()) {
            Ok(rel) => rel,
            Err(TablespaceError::RelationNotFound(_)) if stmt.missing_ok => {
                session.notice(format!("table \"{}\" does not exist, skipping", stmt.name));
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if !self.is_owner(session.role, rel.owner) {
            return Err(TablespaceError::PermissionDenied(format!(
                "must be owner of table {}",
                rel.name
            )));
        }

        let locator = rel.locator(session.database_tablespace);
        let txn = current_txn(session)?;
        self.relations.delete(&mut txn.relations, rel.oid)?;
        if rel.has_storage() {
            let path = self.layout.relation_path(locator.spc, locator.db, locator.relfilenode);
            let pending = PendingDelete::on_commit(locator, path);
            txn.pending_deletes.push(if rel.persistence.logs_file() {
                pending
            } else {
                pending.without_wal()
            });
        }
        log::debug!("dropped relation {} ({})", rel.qualified_name(), rel.oid);

        self.dispatch_statement(
            session,
            UtilityStatement::DropRelation(stmt.clone()),
            RELATION_DISPATCH,
            Vec::new(),
        )
    }

    /// Look up `name` and lock it in `mode`
    fn open_relation(
        &self,
        session: &mut Session,
        name: &str,
        mode: LockMode,
        wait: LockWait,
    ) -> TablespaceResult<Relation> {
        let database = session.database;
        let txn = current_txn(session)?;
        let xid = txn.xid();
        let rel = self
            .resolve_relation(&txn.relations, database, name)?
            .ok_or_else(|| TablespaceError::RelationNotFound(name.to_string()))?;

        self.locks
            .acquire(xid, LockTag::relation(rel.database, rel.oid), mode, wait)
            .map_err(|err| {
                lock_not_available(
                    err,
                    format!("could not obtain lock on relation \"{}\"", rel.qualified_name()),
                )
            })?;

        // dropped or replaced while we waited
        let txn = current_txn(session)?;
        self.relations
            .get(&txn.relations, rel.oid)
            .ok_or_else(|| TablespaceError::RelationNotFound(name.to_string()))
    }
}
