//! Services the tablespace subsystem calls out to

use crate::controlfile::ControlFile;
use crate::smgr::StorageManager;
use crate::tablespace::TablespaceResult;
use crate::types::TablespaceId;
use crate::wal::{WalSink, WalWriter};
use std::sync::Arc;

/// "Request an immediate checkpoint"
pub trait Checkpointer: Send + Sync {
    fn request_checkpoint(&self) -> TablespaceResult<()>;
}

/// Checkpoints the local node synchronously
///
/// Flushes the WAL, unlinks relation files whose drop has committed and moves
/// the redo point in the control file to the end of the WAL.
pub struct LocalCheckpointer {
    smgr: Arc<StorageManager>,
    wal: Arc<WalWriter>,
    control: Arc<ControlFile>,
}

impl LocalCheckpointer {
    pub fn new(smgr: Arc<StorageManager>, wal: Arc<WalWriter>, control: Arc<ControlFile>) -> Self {
        Self { smgr, wal, control }
    }
}

impl Checkpointer for LocalCheckpointer {
    fn request_checkpoint(&self) -> TablespaceResult<()> {
        let redo = self.wal.end_lsn();
        self.wal.flush(redo)?;
        let removed = self.smgr.process_unlink_requests();
        self.control.record_checkpoint(redo)?;
        log::debug!("checkpoint complete: redo {}, {} files removed", redo, removed);
        Ok(())
    }
}

/// "Resolve recovery conflicts for tablespace X"
///
/// Called during redo of a drop when the directories are still in use.
pub trait RecoveryConflictResolver: Send + Sync {
    fn resolve_tablespace_conflict(&self, spc: TablespaceId);
}

/// Nothing to cancel on a node without hot-standby readers
#[derive(Debug, Default)]
pub struct NoStandbyConflicts;

impl RecoveryConflictResolver for NoStandbyConflicts {
    fn resolve_tablespace_conflict(&self, spc: TablespaceId) {
        log::debug!("no standby sessions to cancel for tablespace {}", spc);
    }
}
