//! Coordinator to worker dispatch
//!
//! The coordinator applies a utility statement locally, then forwards the
//! identical statement to every worker inside one distributed transaction.
//! Each worker runs everything it receives for a distributed transaction in a
//! single local transaction, which stays open until the coordinator decides:
//!
//! ```text
//! Proposed --prepare--> Prepared --commit--> Committed
//!     |                     |
//!     +-------abort---------+----abort-----> Aborted
//! ```
//!
//! Without `NEED_TWO_PHASE` the prepare round is skipped and workers commit
//! straight from `Proposed`.

use crate::session::{Session, SessionSettings};
use crate::tablespace::commands::{
    AlterOptionsStmt, CreateTablespaceStmt, DropTablespaceStmt, MoveStmt, RenameStmt,
};
use crate::tablespace::relations::{CreateRelationStmt, DropRelationStmt};
use crate::tablespace::{TablespaceError, TablespaceManager, TablespaceResult};
use crate::types::{ContentId, DatabaseId, RoleId, TablespaceId, TransactionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// Dispatch behaviour flags
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchFlags(u8);

impl DispatchFlags {
    pub const NONE: DispatchFlags = DispatchFlags(0);
    /// First worker error cancels the statement everywhere
    pub const CANCEL_ON_ERROR: DispatchFlags = DispatchFlags(1);
    /// Workers run under the coordinator's snapshot
    pub const WITH_SNAPSHOT: DispatchFlags = DispatchFlags(1 << 1);
    /// Workers must prepare before the coordinator commits
    pub const NEED_TWO_PHASE: DispatchFlags = DispatchFlags(1 << 2);

    pub const fn union(self, other: DispatchFlags) -> DispatchFlags {
        DispatchFlags(self.0 | other.0)
    }

    pub fn contains(self, other: DispatchFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DispatchFlags {
    type Output = DispatchFlags;

    fn bitor(self, rhs: DispatchFlags) -> DispatchFlags {
        DispatchFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DispatchFlags {
    fn bitor_assign(&mut self, rhs: DispatchFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for DispatchFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (DispatchFlags::CANCEL_ON_ERROR, "CANCEL_ON_ERROR"),
            (DispatchFlags::WITH_SNAPSHOT, "WITH_SNAPSHOT"),
            (DispatchFlags::NEED_TWO_PHASE, "NEED_TWO_PHASE"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        write!(f, "DispatchFlags({})", names.join(" | "))
    }
}

/// A statement forwarded to the workers
#[derive(Debug, Clone)]
pub enum UtilityStatement {
    CreateTablespace(CreateTablespaceStmt),
    DropTablespace(DropTablespaceStmt),
    RenameTablespace(RenameStmt),
    AlterTablespaceOptions(AlterOptionsStmt),
    AlterTablespaceMove(MoveStmt),
    CreateRelation(CreateRelationStmt),
    DropRelation(DropRelationStmt),
}

impl UtilityStatement {
    /// Command tag for messages
    pub fn tag(&self) -> &'static str {
        match self {
            UtilityStatement::CreateTablespace(_) => "CREATE TABLESPACE",
            UtilityStatement::DropTablespace(_) => "DROP TABLESPACE",
            UtilityStatement::RenameTablespace(_) => "ALTER TABLESPACE RENAME",
            UtilityStatement::AlterTablespaceOptions(_) => "ALTER TABLESPACE SET",
            UtilityStatement::AlterTablespaceMove(_) => "ALTER TABLE ALL IN TABLESPACE",
            UtilityStatement::CreateRelation(_) => "CREATE TABLE",
            UtilityStatement::DropRelation(_) => "DROP TABLE",
        }
    }
}

/// Session state shipped along with a statement
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Distributed transaction identifier
    pub gid: String,
    pub role: RoleId,
    pub database: DatabaseId,
    pub database_tablespace: TablespaceId,
    pub settings: SessionSettings,
    /// Tablespace oids the coordinator assigned, by name
    pub preassigned: Vec<(String, TablespaceId)>,
    /// Coordinator transaction whose snapshot workers run under
    pub snapshot: Option<TransactionId>,
}

/// One partition as seen from the coordinator
pub trait SegmentWorker: Send + Sync {
    fn content_id(&self) -> ContentId;

    /// Apply `stmt` in the worker transaction belonging to `ctx.gid`
    ///
    /// On error the worker has already rolled its transaction back.
    fn execute(&self, ctx: &DispatchContext, stmt: &UtilityStatement) -> TablespaceResult<()>;

    fn prepare(&self, gid: &str) -> TablespaceResult<()>;

    /// Commit the transaction of `gid`, prepared or not
    fn commit_prepared(&self, gid: &str) -> TablespaceResult<()>;

    fn abort_prepared(&self, gid: &str) -> TablespaceResult<()>;
}

/// A worker running in this process on its own data directory
pub struct LocalSegment {
    manager: Arc<TablespaceManager>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl LocalSegment {
    pub fn new(manager: Arc<TablespaceManager>) -> Self {
        Self {
            manager,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &Arc<TablespaceManager> {
        &self.manager
    }

    /// Distributed transactions with an open local transaction
    pub fn in_progress(&self) -> Vec<String> {
        let mut gids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        gids.sort();
        gids
    }

    fn take_session(&self, gid: &str) -> TablespaceResult<Session> {
        self.sessions.lock().remove(gid).ok_or_else(|| {
            TablespaceError::InvalidTransactionState(format!(
                "prepared transaction with identifier \"{}\" does not exist",
                gid
            ))
        })
    }
}

impl SegmentWorker for LocalSegment {
    fn content_id(&self) -> ContentId {
        self.manager.content_id()
    }

    fn execute(&self, ctx: &DispatchContext, stmt: &UtilityStatement) -> TablespaceResult<()> {
        // run outside the map lock; the statement may wait on heavyweight locks
        let existing = self.sessions.lock().remove(&ctx.gid);
        let mut session = match existing {
            Some(session) => session,
            None => {
                let mut session = Session::new(ctx.role, ctx.database)
                    .with_database_tablespace(ctx.database_tablespace)
                    .with_settings(ctx.settings.clone());
                self.manager.start_transaction(&mut session, false)?;
                session
            }
        };
        for (name, oid) in &ctx.preassigned {
            session.preassign_tablespace_oid(*oid, name);
        }

        log::debug!(
            "seg{} executing {} for {} (snapshot {:?})",
            self.content_id(),
            stmt.tag(),
            ctx.gid,
            ctx.snapshot
        );

        match self.manager.apply(&mut session, stmt) {
            Ok(()) => {
                session.take_notices();
                self.sessions.lock().insert(ctx.gid.clone(), session);
                Ok(())
            }
            Err(err) => {
                self.manager.abort(&mut session);
                Err(err)
            }
        }
    }

    fn prepare(&self, gid: &str) -> TablespaceResult<()> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(gid).ok_or_else(|| {
            TablespaceError::InvalidTransactionState(format!(
                "transaction with identifier \"{}\" does not exist",
                gid
            ))
        })?;
        match self.manager.prepare(session) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(mut session) = sessions.remove(gid) {
                    self.manager.abort(&mut session);
                }
                Err(err)
            }
        }
    }

    fn commit_prepared(&self, gid: &str) -> TablespaceResult<()> {
        let mut session = self.take_session(gid)?;
        self.manager.commit(&mut session)
    }

    fn abort_prepared(&self, gid: &str) -> TablespaceResult<()> {
        let mut session = self.take_session(gid)?;
        self.manager.abort(&mut session);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Proposed,
    Prepared,
    Committed,
    Aborted,
}

/// The distributed side of one coordinator transaction
pub struct TwoPhaseDispatch {
    gid: String,
    flags: DispatchFlags,
    state: DispatchState,
    participants: Vec<Arc<dyn SegmentWorker>>,
}

impl TwoPhaseDispatch {
    pub fn new(gid: impl Into<String>) -> Self {
        Self {
            gid: gid.into(),
            flags: DispatchFlags::NONE,
            state: DispatchState::Proposed,
            participants: Vec::new(),
        }
    }

    pub fn gid(&self) -> &str {
        &self.gid
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Flags accumulated over every statement dispatched so far
    pub fn flags(&self) -> DispatchFlags {
        self.flags
    }

    /// Content ids of the workers holding an open transaction for us
    pub fn participants(&self) -> Vec<ContentId> {
        self.participants.iter().map(|w| w.content_id()).collect()
    }

    /// Send `stmt` to every worker
    pub fn dispatch(
        &mut self,
        workers: &[Arc<dyn SegmentWorker>],
        ctx: &DispatchContext,
        stmt: &UtilityStatement,
        flags: DispatchFlags,
    ) -> TablespaceResult<()> {
        if self.state != DispatchState::Proposed {
            return Err(TablespaceError::InvalidTransactionState(format!(
                "cannot dispatch {} in distributed transaction {} ({:?})",
                stmt.tag(),
                self.gid,
                self.state
            )));
        }
        self.flags |= flags;

        let mut first_error = None;
        for worker in workers {
            let content_id = worker.content_id();
            match worker.execute(ctx, stmt) {
                Ok(()) => {
                    if !self.participants.iter().any(|p| p.content_id() == content_id) {
                        self.participants.push(Arc::clone(worker));
                    }
                }
                Err(err) => {
                    log::warn!("{} failed on seg{}: {}", stmt.tag(), content_id, err);
                    // the worker rolled back on its own
                    self.participants.retain(|p| p.content_id() != content_id);
                    let err = TablespaceError::Dispatch {
                        content_id,
                        source: Box::new(err),
                    };
                    if flags.contains(DispatchFlags::CANCEL_ON_ERROR) {
                        return Err(err);
                    }
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// First phase; a no-op unless some statement needed two-phase commit
    pub fn prepare(&mut self) -> TablespaceResult<()> {
        if !self.flags.contains(DispatchFlags::NEED_TWO_PHASE) {
            return Ok(());
        }
        for worker in &self.participants {
            worker
                .prepare(&self.gid)
                .map_err(|err| TablespaceError::Dispatch {
                    content_id: worker.content_id(),
                    source: Box::new(err),
                })?;
        }
        self.state = DispatchState::Prepared;
        log::debug!("prepared {} on {} workers", self.gid, self.participants.len());
        Ok(())
    }

    /// Second phase; worker failures can no longer change the outcome
    pub fn commit(&mut self) {
        for worker in &self.participants {
            if let Err(err) = worker.commit_prepared(&self.gid) {
                log::warn!(
                    "could not commit {} on seg{}: {}",
                    self.gid,
                    worker.content_id(),
                    err
                );
            }
        }
        self.state = DispatchState::Committed;
    }

    pub fn abort(&mut self) {
        if self.state == DispatchState::Committed {
            return;
        }
        for worker in &self.participants {
            if let Err(err) = worker.abort_prepared(&self.gid) {
                log::warn!(
                    "could not abort {} on seg{}: {}",
                    self.gid,
                    worker.content_id(),
                    err
                );
            }
        }
        self.state = DispatchState::Aborted;
    }
}

impl TablespaceManager {
    /// Forward `stmt` to the workers when this node is the coordinator
    pub(crate) fn dispatch_statement(
        &self,
        session: &mut Session,
        stmt: UtilityStatement,
        flags: DispatchFlags,
        preassigned: Vec<(String, TablespaceId)>,
    ) -> TablespaceResult<()> {
        if !self.is_coordinator() {
            return Ok(());
        }
        let workers = self.workers.read().clone();
        if workers.is_empty() {
            return Ok(());
        }

        let ctx_base = (
            session.role,
            session.database,
            session.database_tablespace,
            session.settings.clone(),
        );
        let node_id = self.config.node_id;
        let txn = session.txn.as_mut().ok_or_else(|| {
            TablespaceError::InvalidTransactionState(format!(
                "{} must run inside a transaction",
                stmt.tag()
            ))
        })?;
        let xid = txn.xid();
        let dispatch = txn
            .dispatch
            .get_or_insert_with(|| TwoPhaseDispatch::new(format!("{}-{}", node_id, xid)));

        let ctx = DispatchContext {
            gid: dispatch.gid().to_string(),
            role: ctx_base.0,
            database: ctx_base.1,
            database_tablespace: ctx_base.2,
            settings: ctx_base.3,
            preassigned,
            snapshot: flags.contains(DispatchFlags::WITH_SNAPSHOT).then_some(xid),
        };
        dispatch.dispatch(&workers, &ctx, &stmt, flags)
    }
}
