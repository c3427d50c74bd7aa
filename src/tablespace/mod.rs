//! Tablespace lifecycle manager
//!
//! A [`TablespaceManager`] owns one node's view of the cluster: its data
//! directory, the tablespace and relation catalogs, the lock table, the WAL
//! and the control file. Operations run on behalf of a [`Session`]:
//!
//! - Create / Drop / Rename / AlterOptions / Move ([`commands`])
//! - Relation bookkeeping that lives in tablespaces ([`relations`])
//! - Default and temporary tablespace choice ([`defaults`])
//! - WAL replay of the two tablespace record types ([`redo`])

pub mod collaborators;
pub mod commands;
pub mod defaults;
pub mod directory;
pub mod error;
pub mod options;
pub mod redo;
pub mod relations;

pub use collaborators::{Checkpointer, LocalCheckpointer, NoStandbyConflicts, RecoveryConflictResolver};
pub use commands::{
    AlterOptionsStmt, CreateTablespaceStmt, DropTablespaceStmt, MoveObjectKind, MoveStmt,
    RenameStmt,
};
pub use directory::DirectoryManager;
pub use error::{TablespaceError, TablespaceResult};
pub use options::DefElem;
pub use relations::{CreateRelationStmt, DropRelationStmt};

use crate::acl::AclCheck;
use crate::catalog::{TablespaceCatalog, TablespaceRow, WriteSet};
use crate::cdb::SegmentWorker;
use crate::config::EngineConfig;
use crate::controlfile::{ControlFile, DbState};
use crate::layout::{DirectoryLayout, BASE_DIR, GLOBAL_DIR};
use crate::lock::{LockError, LockManager, LockWait};
use crate::session::Session;
use crate::smgr::StorageManager;
use crate::table::RelationCatalog;
use crate::types::{
    ContentId, NodeRole, RoleId, TablespaceId, TransactionId, DEFAULT_TABLESPACE_OID,
    GLOBAL_TABLESPACE_OID, TABLESPACE_NAMESPACE_DIR,
};
use crate::vfs::{LocalFs, VfsInterface};
use crate::wal::WalWriter;
use crate::xact::Transaction;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// First transaction id handed out after startup
const FIRST_NORMAL_XID: TransactionId = 3;

pub struct TablespaceManager {
    pub(crate) config: EngineConfig,
    pub(crate) layout: DirectoryLayout,
    pub(crate) dirs: DirectoryManager,
    pub(crate) tablespaces: TablespaceCatalog,
    pub(crate) relations: RelationCatalog,
    pub(crate) locks: LockManager,
    pub(crate) wal: Arc<WalWriter>,
    pub(crate) control: Arc<ControlFile>,
    pub(crate) smgr: Arc<StorageManager>,
    pub(crate) acl: Arc<dyn AclCheck>,
    pub(crate) checkpointer: Arc<dyn Checkpointer>,
    pub(crate) conflict_resolver: Arc<dyn RecoveryConflictResolver>,
    pub(crate) workers: RwLock<Vec<Arc<dyn SegmentWorker>>>,
    pub(crate) next_xid: AtomicU64,
    pub(crate) in_recovery: AtomicBool,
}

impl TablespaceManager {
    /// Open the node described by `config` on the local filesystem
    pub fn open(config: EngineConfig, acl: Arc<dyn AclCheck>) -> TablespaceResult<Self> {
        Self::open_with_vfs(config, acl, Arc::new(LocalFs::new()))
    }

    pub fn open_with_vfs(
        config: EngineConfig,
        acl: Arc<dyn AclCheck>,
        vfs: Arc<dyn VfsInterface>,
    ) -> TablespaceResult<Self> {
        config
            .validate()
            .map_err(|err| TablespaceError::InvalidParameter(err.to_string()))?;

        let layout = DirectoryLayout::new(&config.data_dir, config.node_id);
        let data_root = layout.data_root().to_path_buf();
        for dir in [
            data_root.clone(),
            data_root.join(GLOBAL_DIR),
            data_root.join(BASE_DIR),
            data_root.join(TABLESPACE_NAMESPACE_DIR),
        ] {
            match vfs.create_dir(&dir, directory::DIR_CREATE_MODE) {
                Err(err) if !err.is_already_exists() => {
                    return Err(TablespaceError::fs(
                        format!("could not create directory \"{}\"", dir.display()),
                        err,
                    ));
                }
                _ => {}
            }
        }

        let global = data_root.join(GLOBAL_DIR);
        let tablespaces = TablespaceCatalog::open(&global)?;
        let relations = RelationCatalog::open(&global)?;
        let wal = Arc::new(WalWriter::open(vfs.as_ref(), &data_root)?);
        let control = Arc::new(ControlFile::open(&global)?);
        let smgr = Arc::new(StorageManager::new(Arc::clone(&vfs)));
        let checkpointer = Arc::new(LocalCheckpointer::new(
            Arc::clone(&smgr),
            Arc::clone(&wal),
            Arc::clone(&control),
        ));

        log::info!(
            "opened {} node {} (content {}) at \"{}\"",
            config.node_role,
            config.node_id,
            config.content_id,
            data_root.display()
        );

        Ok(Self {
            dirs: DirectoryManager::new(layout.clone(), vfs),
            layout,
            tablespaces,
            relations,
            locks: LockManager::new(),
            wal,
            control,
            smgr,
            acl,
            checkpointer,
            conflict_resolver: Arc::new(NoStandbyConflicts),
            workers: RwLock::new(Vec::new()),
            next_xid: AtomicU64::new(FIRST_NORMAL_XID),
            in_recovery: AtomicBool::new(false),
            config,
        })
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    pub fn with_conflict_resolver(mut self, resolver: Arc<dyn RecoveryConflictResolver>) -> Self {
        self.conflict_resolver = resolver;
        self
    }

    /// Workers this coordinator forwards statements to
    pub fn attach_workers(&self, workers: Vec<Arc<dyn SegmentWorker>>) {
        *self.workers.write() = workers;
    }

    pub fn is_coordinator(&self) -> bool {
        self.config.node_role == NodeRole::Coordinator
    }

    pub fn content_id(&self) -> ContentId {
        self.config.content_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    pub fn in_recovery(&self) -> bool {
        self.in_recovery.load(Ordering::SeqCst)
    }

    pub fn control_state(&self) -> DbState {
        self.control.data().state
    }

    pub fn checkpoint(&self) -> TablespaceResult<()> {
        self.checkpointer.request_checkpoint()
    }

    /// Checkpoint and mark the node cleanly shut down
    pub fn shutdown(&self) -> TablespaceResult<()> {
        self.checkpoint()?;
        self.control.set_state(DbState::ShutDown)?;
        log::info!("node {} shut down", self.config.node_id);
        Ok(())
    }

    /// Resolve a tablespace name, locking it against drop for the rest of
    /// the transaction
    pub fn get_tablespace_oid(
        &self,
        session: &mut Session,
        name: &str,
        missing_ok: bool,
    ) -> TablespaceResult<TablespaceId> {
        self.execute(session, |mgr, s| mgr.lookup_tablespace(s, name, missing_ok))
    }

    pub fn get_tablespace_name(&self, session: &Session, id: TablespaceId) -> Option<String> {
        let empty = WriteSet::default();
        let ws = session.transaction().map_or(&empty, |txn| &txn.tablespaces);
        self.tablespaces.lookup_name(ws, id)
    }

    /// Every tablespace visible to the session, by id
    pub fn list_tablespaces(&self, session: &Session) -> Vec<TablespaceRow> {
        let empty = WriteSet::default();
        let ws = session.transaction().map_or(&empty, |txn| &txn.tablespaces);
        self.tablespaces.list(ws)
    }

    /// Committed tablespaces, built-ins included
    pub fn tablespace_count(&self) -> usize {
        self.tablespaces.list(&WriteSet::default()).len()
    }

    /// Directory the tablespace link points at; empty for built-ins
    pub fn tablespace_location(&self, id: TablespaceId) -> TablespaceResult<String> {
        if id == DEFAULT_TABLESPACE_OID || id == GLOBAL_TABLESPACE_OID {
            return Ok(String::new());
        }
        let link = self.layout.link_path(id);
        self.dirs
            .vfs()
            .read_link(&link)
            .map(|target| target.display().to_string())
            .map_err(|err| {
                TablespaceError::fs(
                    format!("could not read symbolic link \"{}\"", link.display()),
                    err,
                )
            })
    }

    pub(crate) fn lookup_tablespace(
        &self,
        session: &mut Session,
        name: &str,
        missing_ok: bool,
    ) -> TablespaceResult<TablespaceId> {
        let txn = current_txn(session)?;
        let id = self.tablespaces.lookup_id(
            &txn.tablespaces,
            &self.locks,
            txn.xid(),
            name,
            missing_ok,
        )?;
        Ok(id)
    }

    /// Superuser, owner, or granted CREATE
    pub(crate) fn has_create_privilege(&self, role: RoleId, row: &TablespaceRow) -> bool {
        self.acl.is_superuser(role)
            || row.owner == role
            || self.acl.has_tablespace_create(role, row.id)
    }

    pub(crate) fn is_owner(&self, role: RoleId, owner: RoleId) -> bool {
        owner == role || self.acl.is_superuser(role)
    }

    /// Wait policy for blocking lock requests
    pub(crate) fn lock_wait(&self) -> LockWait {
        LockWait::Block(self.config.lock_timeout())
    }
}

/// The open transaction of `session`
pub(crate) fn current_txn(session: &mut Session) -> TablespaceResult<&mut Transaction> {
    session.txn.as_mut().ok_or_else(|| {
        TablespaceError::InvalidTransactionState("no transaction in progress".to_string())
    })
}

/// A refused or timed out lock request
pub(crate) fn lock_not_available(err: LockError, message: String) -> TablespaceError {
    log::debug!("{}: {}", message, err);
    TablespaceError::ObjectInUse(message)
}
