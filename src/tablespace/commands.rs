//! Tablespace DDL
//!
//! Each public entry point runs in the session's transaction (an implicit one
//! when none is open). The `do_*` bodies assume the transaction exists; the
//! dispatch layer calls them directly on workers.

use crate::catalog::{TablespaceOptions, TablespaceRow};
use crate::cdb::{DispatchFlags, UtilityStatement};
use crate::infrastructure::lwlock::LwLockMode;
use crate::layout::{canonicalize_path, is_absolute_path};
use crate::lock::{LockMode, LockTag, LockWait};
use crate::session::Session;
use crate::smgr::PendingDelete;
use crate::table::Relation;
use crate::tablespace::options::{transform_options, validate_options, DefElem};
use crate::tablespace::{
    current_txn, lock_not_available, TablespaceError, TablespaceManager, TablespaceResult,
};
use crate::types::{
    is_reserved_name, ContentId, NamespaceKind, RelFileLocator, RelKind, TablespaceId,
    GLOBAL_TABLESPACE_OID, INVALID_OID,
};
use crate::wal::{SmgrWalRecord, TablespaceWalRecord, WalSink, RM_TBLSPC_ID};

/// `CREATE TABLESPACE name [OWNER role] LOCATION 'dir' [WITH (...)]`
///
/// Options named `content<N>` override the location on partition `N`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateTablespaceStmt {
    pub name: String,
    pub owner: Option<String>,
    pub location: String,
    pub options: Vec<DefElem>,
}

impl CreateTablespaceStmt {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push(DefElem::new(name, value));
        self
    }

    /// Location used on partition `content`
    pub fn content_location(mut self, content: ContentId, location: impl Into<String>) -> Self {
        self.options
            .push(DefElem::new(format!("content{}", content), location));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTablespaceStmt {
    pub name: String,
    pub missing_ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameStmt {
    pub old_name: String,
    pub new_name: String,
}

/// `ALTER TABLESPACE name SET (...)` or, with `reset`, `RESET (...)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterOptionsStmt {
    pub name: String,
    pub options: Vec<DefElem>,
    pub reset: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveObjectKind {
    All,
    Table,
    Index,
    MaterializedView,
}

impl MoveObjectKind {
    pub fn matches(self, kind: RelKind) -> bool {
        match self {
            MoveObjectKind::All => kind.has_storage_in_tablespace(),
            MoveObjectKind::Table => kind == RelKind::Table,
            MoveObjectKind::Index => kind == RelKind::Index,
            MoveObjectKind::MaterializedView => kind == RelKind::MaterializedView,
        }
    }
}

/// `ALTER TABLE ALL IN TABLESPACE orig [OWNED BY ...] SET TABLESPACE new [NOWAIT]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveStmt {
    pub orig_name: String,
    pub new_name: String,
    pub object_kind: MoveObjectKind,
    pub roles: Vec<String>,
    pub nowait: bool,
}

impl MoveStmt {
    pub fn new(orig_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            orig_name: orig_name.into(),
            new_name: new_name.into(),
            object_kind: MoveObjectKind::All,
            roles: Vec::new(),
            nowait: false,
        }
    }

    pub fn kind(mut self, kind: MoveObjectKind) -> Self {
        self.object_kind = kind;
        self
    }

    pub fn owned_by(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn nowait(mut self) -> Self {
        self.nowait = true;
        self
    }
}

const DDL_DISPATCH: DispatchFlags =
    DispatchFlags::CANCEL_ON_ERROR.union(DispatchFlags::WITH_SNAPSHOT);
const DDL_DISPATCH_TWO_PHASE: DispatchFlags = DDL_DISPATCH.union(DispatchFlags::NEED_TWO_PHASE);

impl TablespaceManager {
    pub fn create_tablespace(
        &self,
        session: &mut Session,
        stmt: &CreateTablespaceStmt,
    ) -> TablespaceResult<TablespaceId> {
        prevent_transaction_block(session, "CREATE TABLESPACE")?;
        self.execute(session, |mgr, s| mgr.do_create_tablespace(s, stmt))
    }

    pub fn drop_tablespace(
        &self,
        session: &mut Session,
        stmt: &DropTablespaceStmt,
    ) -> TablespaceResult<()> {
        prevent_transaction_block(session, "DROP TABLESPACE")?;
        self.execute(session, |mgr, s| mgr.do_drop_tablespace(s, stmt))
    }

    pub fn rename_tablespace(&self, session: &mut Session, stmt: &RenameStmt) -> TablespaceResult<()> {
        self.execute(session, |mgr, s| mgr.do_rename_tablespace(s, stmt))
    }

    pub fn alter_tablespace_options(
        &self,
        session: &mut Session,
        stmt: &AlterOptionsStmt,
    ) -> TablespaceResult<()> {
        self.execute(session, |mgr, s| mgr.do_alter_tablespace_options(s, stmt))
    }

    /// Returns how many relations were moved
    pub fn alter_tablespace_move(&self, session: &mut Session, stmt: &MoveStmt) -> TablespaceResult<usize> {
        self.execute(session, |mgr, s| mgr.do_alter_tablespace_move(s, stmt))
    }

    /// Apply a dispatched statement in the session's open transaction
    pub(crate) fn apply(&self, session: &mut Session, stmt: &UtilityStatement) -> TablespaceResult<()> {
        match stmt {
            UtilityStatement::CreateTablespace(stmt) => {
                self.do_create_tablespace(session, stmt).map(|_| ())
            }
            UtilityStatement::DropTablespace(stmt) => self.do_drop_tablespace(session, stmt),
            UtilityStatement::RenameTablespace(stmt) => self.do_rename_tablespace(session, stmt),
            UtilityStatement::AlterTablespaceOptions(stmt) => {
                self.do_alter_tablespace_options(session, stmt)
            }
            UtilityStatement::AlterTablespaceMove(stmt) => {
                self.do_alter_tablespace_move(session, stmt).map(|_| ())
            }
            UtilityStatement::CreateRelation(stmt) => {
                self.do_create_relation(session, stmt).map(|_| ())
            }
            UtilityStatement::DropRelation(stmt) => self.do_drop_relation(session, stmt),
        }
    }

    fn do_create_tablespace(
        &self,
        session: &mut Session,
        stmt: &CreateTablespaceStmt,
    ) -> TablespaceResult<TablespaceId> {
        if !self.acl.is_superuser(session.role) {
            return Err(TablespaceError::PermissionDenied(format!(
                "permission denied to create tablespace \"{}\"",
                stmt.name
            )));
        }

        let owner = match &stmt.owner {
            Some(name) => self
                .acl
                .get_role_oid(name)
                .ok_or_else(|| TablespaceError::RoleNotFound(name.clone()))?,
            None => session.role,
        };

        let (location, options) = self.resolve_location(stmt)?;
        let location = canonicalize_path(&location);

        if location.contains('\'') {
            return Err(TablespaceError::InvalidPath(
                "tablespace location cannot contain single quotes".to_string(),
            ));
        }
        if !is_absolute_path(&location) {
            return Err(TablespaceError::InvalidPath(
                "tablespace location must be an absolute path".to_string(),
            ));
        }
        if !self.layout.location_fits(&location) {
            return Err(TablespaceError::InvalidPath(format!(
                "tablespace location \"{}\" is too long",
                location
            )));
        }
        if location.starts_with(&self.layout.data_root().display().to_string()) {
            log::warn!("tablespace location \"{}\" is inside the data directory", location);
        }

        if !session.settings.allow_system_table_mods && is_reserved_name(&stmt.name) {
            return Err(TablespaceError::ReservedName(stmt.name.clone()));
        }

        let options = transform_options(&TablespaceOptions::new(), &options, false)?;
        validate_options(&options)?;

        let preassigned = session.take_preassigned_oid(&stmt.name);
        let txn = current_txn(session)?;
        let xid = txn.xid();
        let id = self.tablespaces.insert(
            &mut txn.tablespaces,
            xid,
            preassigned,
            &stmt.name,
            owner,
            options,
        )?;

        {
            let _guard = self.dirs.create_lock().acquire(LwLockMode::Exclusive);
            self.dirs.create_directories(&location, id, false)?;
        }
        txn.created_tablespaces.push(id);

        let record = TablespaceWalRecord::Create {
            ts_id: id,
            location: location.clone(),
        };
        let lsn = self.wal.append(RM_TBLSPC_ID, record.info(), &record.encode())?;
        txn.wal_logged(lsn);

        log::debug!("created tablespace \"{}\" ({}) at \"{}\"", stmt.name, id, location);

        self.dispatch_statement(
            session,
            UtilityStatement::CreateTablespace(stmt.clone()),
            DDL_DISPATCH_TWO_PHASE,
            vec![(stmt.name.clone(), id)],
        )?;
        Ok(id)
    }

    /// Pick this node's location and strip the per-partition overrides
    fn resolve_location(
        &self,
        stmt: &CreateTablespaceStmt,
    ) -> TablespaceResult<(String, Vec<DefElem>)> {
        let mut location = stmt.location.clone();
        let mut options = Vec::with_capacity(stmt.options.len());

        for option in &stmt.options {
            let Some(suffix) = option.name.strip_prefix("content") else {
                options.push(option.clone());
                continue;
            };
            if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(TablespaceError::InvalidParameter(
                    "invalid segment specification".to_string(),
                ));
            }
            let content: ContentId = suffix.parse().map_err(|_| {
                TablespaceError::InvalidParameter("invalid segment specification".to_string())
            })?;
            let value = option.value.clone().unwrap_or_default();

            if self.is_coordinator() {
                if content as u32 >= self.config.segment_count {
                    return Err(TablespaceError::PartitionNotFound(content));
                }
            } else if content == self.content_id() {
                location = value;
            }
        }

        Ok((location, options))
    }

    fn do_drop_tablespace(
        &self,
        session: &mut Session,
        stmt: &DropTablespaceStmt,
    ) -> TablespaceResult<()> {
        let Some(row) = self.find_tablespace(session, &stmt.name)? else {
            return self.missing_tablespace(session, &stmt.name, stmt.missing_ok);
        };

        let xid = current_txn(session)?.xid();
        self.locks
            .acquire(
                xid,
                LockTag::tablespace(row.id),
                LockMode::Exclusive,
                self.lock_wait(),
            )
            .map_err(|err| {
                lock_not_available(
                    err,
                    format!("could not obtain lock on tablespace \"{}\"", stmt.name),
                )
            })?;

        // dropped while we waited
        if self.find_tablespace(session, &stmt.name)?.map(|r| r.id) != Some(row.id) {
            return self.missing_tablespace(session, &stmt.name, stmt.missing_ok);
        }

        if !self.is_owner(session.role, row.owner) {
            return Err(TablespaceError::PermissionDenied(format!(
                "must be owner of tablespace {}",
                stmt.name
            )));
        }
        if row.is_builtin() {
            return Err(TablespaceError::ObjectInUse(format!(
                "cannot drop tablespace {} because it is required by the database system",
                stmt.name
            )));
        }

        let txn = current_txn(session)?;
        self.tablespaces.delete(&mut txn.tablespaces, row.id)?;

        {
            let _guard = self.dirs.create_lock().acquire(LwLockMode::Exclusive);
            if !self.dirs.destroy_directories(row.id, false)? {
                // files of dropped relations stay around until the next checkpoint
                log::debug!("tablespace {} not empty, requesting checkpoint", row.id);
                self.checkpointer.request_checkpoint()?;
                if !self.dirs.destroy_directories(row.id, false)? {
                    return Err(TablespaceError::NotEmpty(stmt.name.clone()));
                }
            }
        }

        let record = TablespaceWalRecord::Drop { ts_id: row.id };
        let lsn = self.wal.append(RM_TBLSPC_ID, record.info(), &record.encode())?;
        txn.wal_logged(lsn);

        log::debug!("dropped tablespace \"{}\" ({})", stmt.name, row.id);

        self.dispatch_statement(
            session,
            UtilityStatement::DropTablespace(stmt.clone()),
            DDL_DISPATCH,
            Vec::new(),
        )
    }

    fn do_rename_tablespace(&self, session: &mut Session, stmt: &RenameStmt) -> TablespaceResult<()> {
        let row = self.lock_for_update(session, &stmt.old_name)?;

        if !self.is_owner(session.role, row.owner) {
            return Err(TablespaceError::PermissionDenied(format!(
                "must be owner of tablespace {}",
                stmt.old_name
            )));
        }
        if row.is_builtin() {
            return Err(TablespaceError::ObjectInUse(format!(
                "cannot rename tablespace {} because it is required by the database system",
                stmt.old_name
            )));
        }
        if !session.settings.allow_system_table_mods && is_reserved_name(&stmt.new_name) {
            return Err(TablespaceError::ReservedName(stmt.new_name.clone()));
        }
        if self.find_tablespace(session, &stmt.new_name)?.is_some() {
            return Err(TablespaceError::AlreadyExists(stmt.new_name.clone()));
        }

        let txn = current_txn(session)?;
        let xid = txn.xid();
        self.tablespaces
            .update_name(&mut txn.tablespaces, xid, row.id, &stmt.new_name)?;
        log::debug!("renamed tablespace {} to \"{}\"", row.id, stmt.new_name);

        self.dispatch_statement(
            session,
            UtilityStatement::RenameTablespace(stmt.clone()),
            DDL_DISPATCH_TWO_PHASE,
            Vec::new(),
        )
    }

    fn do_alter_tablespace_options(
        &self,
        session: &mut Session,
        stmt: &AlterOptionsStmt,
    ) -> TablespaceResult<()> {
        let row = self.lock_for_update(session, &stmt.name)?;

        if !self.is_owner(session.role, row.owner) {
            return Err(TablespaceError::PermissionDenied(format!(
                "must be owner of tablespace {}",
                stmt.name
            )));
        }

        let options = transform_options(&row.options, &stmt.options, stmt.reset)?;
        validate_options(&options)?;

        let txn = current_txn(session)?;
        let xid = txn.xid();
        self.tablespaces
            .update_options(&mut txn.tablespaces, xid, row.id, options)?;

        self.dispatch_statement(
            session,
            UtilityStatement::AlterTablespaceOptions(stmt.clone()),
            DDL_DISPATCH_TWO_PHASE,
            Vec::new(),
        )
    }

    fn do_alter_tablespace_move(&self, session: &mut Session, stmt: &MoveStmt) -> TablespaceResult<usize> {
        let orig_id = self.lookup_tablespace(session, &stmt.orig_name, false)?;
        let new_id = self.lookup_tablespace(session, &stmt.new_name, false)?;

        if orig_id == GLOBAL_TABLESPACE_OID || new_id == GLOBAL_TABLESPACE_OID {
            return Err(TablespaceError::InvalidParameter(
                "cannot move relations in to or out of pg_global tablespace".to_string(),
            ));
        }

        let role = session.role;
        let database = session.database;
        let database_tablespace = session.database_tablespace;

        // the database default is always allowed
        if new_id != database_tablespace {
            let txn = current_txn(session)?;
            let allowed = self
                .tablespaces
                .get(&txn.tablespaces, new_id)
                .is_some_and(|row| self.has_create_privilege(role, &row));
            if !allowed {
                return Err(TablespaceError::PermissionDenied(format!(
                    "permission denied for tablespace {}",
                    stmt.new_name
                )));
            }
        }

        let normalize = |id: TablespaceId| {
            if id == database_tablespace {
                INVALID_OID
            } else {
                id
            }
        };
        let orig = normalize(orig_id);
        let new = normalize(new_id);
        if orig == new {
            return Ok(0);
        }

        let role_ids = stmt
            .roles
            .iter()
            .map(|name| {
                self.acl
                    .get_role_oid(name)
                    .ok_or_else(|| TablespaceError::RoleNotFound(name.clone()))
            })
            .collect::<TablespaceResult<Vec<_>>>()?;

        let txn = current_txn(session)?;
        let xid = txn.xid();
        let mut candidates: Vec<Relation> = self
            .relations
            .scan_tablespace(&txn.relations, database, orig)
            .into_iter()
            .filter(|rel| {
                !matches!(
                    rel.namespace,
                    NamespaceKind::System | NamespaceKind::Toast | NamespaceKind::Temp
                ) && !rel.shared
                    && !rel.is_temp()
                    && stmt.object_kind.matches(rel.kind)
                    && (role_ids.is_empty() || role_ids.contains(&rel.owner))
            })
            .collect();
        candidates.sort_by_key(|rel| rel.oid);

        // lock everything before touching anything
        let wait = if stmt.nowait {
            LockWait::NoWait
        } else {
            self.lock_wait()
        };
        for rel in &candidates {
            if !self.is_owner(role, rel.owner) {
                return Err(TablespaceError::PermissionDenied(format!(
                    "must be owner of table {}",
                    rel.name
                )));
            }
            self.locks
                .acquire(
                    xid,
                    LockTag::relation(rel.database, rel.oid),
                    LockMode::AccessExclusive,
                    wait,
                )
                .map_err(|err| {
                    lock_not_available(
                        err,
                        format!(
                            "aborting because lock on relation \"{}\" is not available",
                            rel.qualified_name()
                        ),
                    )
                })?;
        }

        if candidates.is_empty() {
            let shown = if orig == INVALID_OID {
                "(database default)"
            } else {
                stmt.orig_name.as_str()
            };
            session.notice(format!("no matching relations in tablespace \"{}\" found", shown));
        }

        let moved = candidates.len();
        for rel in candidates {
            self.relocate_relation(session, rel, new)?;
        }

        self.dispatch_statement(
            session,
            UtilityStatement::AlterTablespaceMove(stmt.clone()),
            DDL_DISPATCH,
            Vec::new(),
        )?;
        Ok(moved)
    }

    /// Copy a relation's file into `new` under a fresh relfilenode
    fn relocate_relation(
        &self,
        session: &mut Session,
        rel: Relation,
        new: TablespaceId,
    ) -> TablespaceResult<()> {
        let database_tablespace = session.database_tablespace;
        let old = rel.locator(database_tablespace);
        let old_spc = old.spc;
        let new_spc = if new == INVALID_OID {
            database_tablespace
        } else {
            new
        };
        let relfilenode = self.relations.allocate_oid();
        let target = RelFileLocator::new(new_spc, rel.database, relfilenode);

        self.dirs.create_dbspace(new_spc, rel.database, false)?;
        let old_path = self.layout.relation_path(old.spc, old.db, old.relfilenode);
        let new_path = self.layout.relation_path(target.spc, target.db, target.relfilenode);
        let data = self.smgr.read(&old_path).map_err(|err| {
            TablespaceError::fs(format!("could not read file \"{}\"", old_path.display()), err)
        })?;

        let txn = current_txn(session)?;
        let logged = rel.persistence.logs_file();
        if logged {
            self.log_smgr(txn, &SmgrWalRecord::Create { locator: target })?;
        }
        let (created, dropped) = (
            PendingDelete::on_abort(target, new_path.clone()),
            PendingDelete::on_commit(old, old_path),
        );
        let (created, dropped) = if logged {
            (created, dropped)
        } else {
            (created.without_wal(), dropped.without_wal())
        };
        self.smgr.create(&new_path).map_err(|err| {
            TablespaceError::fs(format!("could not create file \"{}\"", new_path.display()), err)
        })?;
        txn.pending_deletes.push(created);

        if rel.persistence.logs_data() && !data.is_empty() {
            let record = SmgrWalRecord::Write {
                locator: target,
                offset: 0,
                data: data.clone(),
            };
            self.log_smgr(txn, &record)?;
        }
        self.smgr.write_at(&new_path, 0, &data).map_err(|err| {
            TablespaceError::fs(
                format!(
                    "could not copy file \"{}\" to \"{}\"",
                    dropped.path.display(),
                    new_path.display()
                ),
                err,
            )
        })?;
        txn.pending_deletes.push(dropped);

        log::debug!(
            "moving {} from tablespace {} to {}",
            rel.qualified_name(),
            old_spc,
            new_spc
        );
        let moved = Relation {
            tablespace: new,
            relfilenode,
            ..rel
        };
        let xid = txn.xid();
        self.relations.update(&mut txn.relations, xid, moved)?;
        Ok(())
    }

    /// Unlocked lookup in the session's view of the catalog
    fn find_tablespace(&self, session: &mut Session, name: &str) -> TablespaceResult<Option<TablespaceRow>> {
        let txn = current_txn(session)?;
        Ok(self.tablespaces.find_by_name(&txn.tablespaces, name))
    }

    fn missing_tablespace(&self, session: &mut Session, name: &str, missing_ok: bool) -> TablespaceResult<()> {
        if !missing_ok {
            return Err(TablespaceError::NotFound(name.to_string()));
        }
        session.notice(format!("tablespace \"{}\" does not exist, skipping", name));
        Ok(())
    }

    /// Find `name` and take the row lock in-place updates need
    fn lock_for_update(&self, session: &mut Session, name: &str) -> TablespaceResult<TablespaceRow> {
        let row = self
            .find_tablespace(session, name)?
            .ok_or_else(|| TablespaceError::NotFound(name.to_string()))?;
        let xid = current_txn(session)?.xid();
        self.locks
            .acquire(
                xid,
                LockTag::tablespace(row.id),
                LockMode::NoKeyExclusive,
                self.lock_wait(),
            )
            .map_err(|err| {
                lock_not_available(err, format!("could not obtain lock on tablespace \"{}\"", name))
            })?;

        let txn = current_txn(session)?;
        self.tablespaces
            .get(&txn.tablespaces, row.id)
            .ok_or_else(|| TablespaceError::NotFound(name.to_string()))
    }
}

fn prevent_transaction_block(session: &Session, command: &str) -> TablespaceResult<()> {
    if session.transaction().is_some_and(|txn| txn.is_block()) {
        return Err(TablespaceError::InvalidTransactionState(format!(
            "{} cannot run inside a transaction block",
            command
        )));
    }
    Ok(())
}
