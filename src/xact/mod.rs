//! Transactions
//!
//! A transaction carries the private catalog write sets, the files to clean
//! up when it ends, the temporary tablespace list and the distributed half of
//! the transaction. Commit and abort run the same steps in a fixed order:
//!
//! - commit: prepare workers, flush WAL (when forced), publish catalogs,
//!   log and run pending deletes, release locks, commit workers
//! - abort: discard catalogs, pending deletes, remove tablespaces created
//!   here, release locks, abort workers

use crate::catalog::{TablespaceRow, WriteSet};
use crate::cdb::TwoPhaseDispatch;
use crate::infrastructure::lwlock::LwLockMode;
use crate::session::Session;
use crate::smgr::PendingDelete;
use crate::table::Relation;
use crate::tablespace::{TablespaceError, TablespaceManager, TablespaceResult};
use crate::types::{Lsn, TablespaceId, TransactionId, INVALID_OID};
use crate::wal::{SmgrWalRecord, TablespaceWalRecord, WalSink, RM_SMGR_ID, RM_TBLSPC_ID};
use rand::Rng;
use std::sync::atomic::Ordering;

/// Temporary tablespaces resolved for one transaction, handed out round-robin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempTablespaces {
    ids: Vec<TablespaceId>,
    next: usize,
}

impl TempTablespaces {
    /// Start at a random position so concurrent sessions spread out
    pub fn new(ids: Vec<TablespaceId>) -> Self {
        let next = if ids.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..ids.len())
        };
        Self { ids, next }
    }

    pub fn ids(&self) -> &[TablespaceId] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Next id in turn; [`INVALID_OID`] when the list is empty
    pub fn next_id(&mut self) -> TablespaceId {
        if self.ids.is_empty() {
            return INVALID_OID;
        }
        self.next = (self.next + 1) % self.ids.len();
        self.ids[self.next]
    }
}

pub struct Transaction {
    xid: TransactionId,
    /// Opened with an explicit BEGIN
    block: bool,
    prepared: bool,
    pub(crate) tablespaces: WriteSet<TablespaceRow>,
    pub(crate) relations: WriteSet<Relation>,
    pub(crate) pending_deletes: Vec<PendingDelete>,
    /// Tablespaces whose directories this transaction created
    pub(crate) created_tablespaces: Vec<TablespaceId>,
    pub(crate) force_sync_commit: bool,
    pub(crate) last_lsn: Lsn,
    pub(crate) temp_tablespaces: Option<TempTablespaces>,
    pub(crate) dispatch: Option<TwoPhaseDispatch>,
}

impl Transaction {
    fn new(xid: TransactionId, block: bool) -> Self {
        Self {
            xid,
            block,
            prepared: false,
            tablespaces: WriteSet::default(),
            relations: WriteSet::default(),
            pending_deletes: Vec::new(),
            created_tablespaces: Vec::new(),
            force_sync_commit: false,
            last_lsn: 0,
            temp_tablespaces: None,
            dispatch: None,
        }
    }

    pub fn xid(&self) -> TransactionId {
        self.xid
    }

    pub fn is_block(&self) -> bool {
        self.block
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn temp_tablespaces(&self) -> Option<&TempTablespaces> {
        self.temp_tablespaces.as_ref()
    }

    pub fn dispatch(&self) -> Option<&TwoPhaseDispatch> {
        self.dispatch.as_ref()
    }

    pub(crate) fn wal_logged(&mut self, lsn: Lsn) {
        self.last_lsn = self.last_lsn.max(lsn);
        self.force_sync_commit = true;
    }
}

impl TablespaceManager {
    /// BEGIN
    pub fn begin(&self, session: &mut Session) -> TablespaceResult<()> {
        if session.in_transaction() {
            return Err(TablespaceError::InvalidTransactionState(
                "there is already a transaction in progress".to_string(),
            ));
        }
        self.start_transaction(session, true)
    }

    pub(crate) fn start_transaction(
        &self,
        session: &mut Session,
        block: bool,
    ) -> TablespaceResult<()> {
        if session.in_transaction() {
            return Err(TablespaceError::InvalidTransactionState(
                "there is already a transaction in progress".to_string(),
            ));
        }
        let xid = self.next_xid.fetch_add(1, Ordering::SeqCst);
        log::trace!("begin transaction {} (block: {})", xid, block);
        session.txn = Some(Transaction::new(xid, block));
        Ok(())
    }

    /// COMMIT; on failure the transaction is rolled back instead
    pub fn commit(&self, session: &mut Session) -> TablespaceResult<()> {
        let Some(mut txn) = session.txn.take() else {
            log::warn!("there is no transaction in progress");
            return Ok(());
        };
        let xid = txn.xid;

        if let Some(dispatch) = txn.dispatch.as_mut() {
            if let Err(err) = dispatch.prepare() {
                self.abort_transaction(txn);
                return Err(err);
            }
        }

        if txn.force_sync_commit && !txn.prepared {
            if let Err(err) = self.wal.flush(txn.last_lsn) {
                self.abort_transaction(txn);
                return Err(err.into());
            }
        }

        if let Err(err) = self.tablespaces.commit(&mut txn.tablespaces, xid) {
            self.abort_transaction(txn);
            return Err(err.into());
        }
        if let Err(err) = self.relations.commit(&mut txn.relations, xid) {
            self.abort_transaction(txn);
            return Err(err.into());
        }

        self.log_pending_unlinks(&txn.pending_deletes, true);
        self.smgr
            .do_pending_deletes(std::mem::take(&mut txn.pending_deletes), true);
        self.locks.release_all(xid);

        if let Some(mut dispatch) = txn.dispatch.take() {
            dispatch.commit();
        }
        log::trace!("committed transaction {}", xid);
        Ok(())
    }

    /// ROLLBACK
    pub fn abort(&self, session: &mut Session) {
        match session.txn.take() {
            Some(txn) => self.abort_transaction(txn),
            None => log::warn!("there is no transaction in progress"),
        }
    }

    /// First phase of a distributed commit
    pub fn prepare(&self, session: &mut Session) -> TablespaceResult<()> {
        let txn = session.txn.as_mut().ok_or_else(|| {
            TablespaceError::InvalidTransactionState(
                "there is no transaction in progress".to_string(),
            )
        })?;
        if txn.force_sync_commit {
            self.wal.flush(txn.last_lsn)?;
        }
        txn.prepared = true;
        log::trace!("prepared transaction {}", txn.xid);
        Ok(())
    }

    /// Run `f` inside the session's transaction, opening an implicit one
    /// when none is open
    ///
    /// An error rolls back the whole transaction, explicit or not.
    pub fn execute<T>(
        &self,
        session: &mut Session,
        f: impl FnOnce(&Self, &mut Session) -> TablespaceResult<T>,
    ) -> TablespaceResult<T> {
        let implicit = !session.in_transaction();
        if implicit {
            self.start_transaction(session, false)?;
        }

        match f(self, session) {
            Ok(value) => {
                if implicit {
                    self.commit(session)?;
                }
                Ok(value)
            }
            Err(err) => {
                self.abort(session);
                Err(err)
            }
        }
    }

    fn abort_transaction(&self, mut txn: Transaction) {
        let xid = txn.xid;
        self.tablespaces.abort(&mut txn.tablespaces, xid);
        self.relations.abort(&mut txn.relations, xid);
        self.log_pending_unlinks(&txn.pending_deletes, false);
        self.smgr
            .do_pending_deletes(std::mem::take(&mut txn.pending_deletes), false);

        for spc in txn.created_tablespaces.iter().rev() {
            self.remove_created_tablespace(*spc);
        }

        self.locks.release_all(xid);
        if let Some(mut dispatch) = txn.dispatch.take() {
            dispatch.abort();
        }
        log::trace!("aborted transaction {}", xid);
    }

    /// Log the file removals this transaction outcome triggers, so replay
    /// does not bring the files back
    fn log_pending_unlinks(&self, pending: &[PendingDelete], is_commit: bool) {
        let mut last = None;
        for delete in pending.iter().filter(|d| d.at_commit == is_commit && d.wal_logged) {
            let record = SmgrWalRecord::Unlink {
                locator: delete.locator,
            };
            match self.wal.append(RM_SMGR_ID, record.info(), &record.encode()) {
                Ok(lsn) => last = Some(lsn),
                Err(err) => log::warn!("could not log removal of file \"{}\": {}", delete.path.display(), err),
            }
        }
        if let Some(lsn) = last {
            if let Err(err) = self.wal.flush(lsn) {
                log::warn!("could not flush WAL: {}", err);
            }
        }
    }

    /// Undo the directories of a tablespace whose creation rolled back
    fn remove_created_tablespace(&self, spc: TablespaceId) {
        let _guard = self.dirs.create_lock().acquire(LwLockMode::Exclusive);
        match self.dirs.destroy_directories(spc, false) {
            Ok(true) => {
                let record = TablespaceWalRecord::Drop { ts_id: spc };
                let logged = self
                    .wal
                    .append(RM_TBLSPC_ID, record.info(), &record.encode())
                    .and_then(|lsn| self.wal.flush(lsn));
                if let Err(err) = logged {
                    log::warn!("could not log removal of tablespace {}: {}", spc, err);
                }
            }
            Ok(false) => {
                log::warn!(
                    "directories of aborted tablespace {} are not empty, leaving them in place",
                    spc
                );
            }
            Err(err) => {
                log::warn!("could not remove directories of aborted tablespace {}: {}", spc, err);
            }
        }
    }
}
