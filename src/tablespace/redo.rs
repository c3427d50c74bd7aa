//! WAL replay of tablespace and relation file records
//!
//! Replay only touches directories and relation files; the catalog rows are
//! persisted by their own commit. Every record kind can be applied any number
//! of times. A record whose filesystem work fails is logged and skipped so
//! one bad location cannot keep the node from starting.

use crate::controlfile::DbState;
use crate::infrastructure::lwlock::LwLockMode;
use crate::tablespace::{TablespaceError, TablespaceManager, TablespaceResult};
use crate::types::Lsn;
use crate::wal::{SmgrWalRecord, TablespaceWalRecord, WalRecord, RM_SMGR_ID, RM_TBLSPC_ID};
use std::sync::atomic::Ordering;

impl TablespaceManager {
    /// Apply one WAL record; records of other resource managers are ignored
    pub fn replay(&self, record: &WalRecord) -> TablespaceResult<()> {
        match record.rmid {
            RM_TBLSPC_ID => {
                let decoded = TablespaceWalRecord::decode(record.rmid, record.info, &record.payload)?;
                self.replay_tablespace(decoded)
            }
            RM_SMGR_ID => {
                let decoded = SmgrWalRecord::decode(record.rmid, record.info, &record.payload)?;
                self.replay_smgr(decoded, record.lsn);
                Ok(())
            }
            _ => {
                log::trace!("skipping rmid {} record at {}", record.rmid, record.lsn);
                Ok(())
            }
        }
    }

    fn replay_tablespace(&self, record: TablespaceWalRecord) -> TablespaceResult<()> {
        match record {
            TablespaceWalRecord::Create { ts_id, location } => {
                let _guard = self.dirs.create_lock().acquire(LwLockMode::Exclusive);
                match self.dirs.create_directories(&location, ts_id, true) {
                    Ok(()) => log::debug!("redo create tablespace {} at \"{}\"", ts_id, location),
                    Err(err) => log::warn!(
                        "could not recreate directories of tablespace {} at \"{}\": {}",
                        ts_id,
                        location,
                        err
                    ),
                }
            }
            TablespaceWalRecord::Drop { ts_id } => {
                let _guard = self.dirs.create_lock().acquire(LwLockMode::Exclusive);
                if !self.dirs.destroy_directories(ts_id, true)? {
                    // standby readers may still hold temp files there
                    self.conflict_resolver.resolve_tablespace_conflict(ts_id);
                    if !self.dirs.destroy_directories(ts_id, true)? {
                        log::info!(
                            "directories for tablespace {} could not be removed; you can remove the directories manually if necessary",
                            ts_id
                        );
                    }
                }
                log::debug!("redo drop tablespace {}", ts_id);
            }
        }
        Ok(())
    }

    fn replay_smgr(&self, record: SmgrWalRecord, lsn: Lsn) {
        let locator = record.locator();
        let path = self.layout.relation_path(locator.spc, locator.db, locator.relfilenode);
        let result = match &record {
            SmgrWalRecord::Create { .. } => {
                self.dirs.create_dbspace(locator.spc, locator.db, true).and_then(|()| {
                    self.smgr.create_redo(&path).map_err(|err| {
                        TablespaceError::fs(format!("could not create file \"{}\"", path.display()), err)
                    })
                })
            }
            SmgrWalRecord::Write { offset, data, .. } => {
                self.dirs.create_dbspace(locator.spc, locator.db, true).and_then(|()| {
                    self.smgr.write_redo(&path, *offset, data).map_err(|err| {
                        TablespaceError::fs(format!("could not write file \"{}\"", path.display()), err)
                    })
                })
            }
            SmgrWalRecord::Unlink { .. } => self.smgr.unlink_redo(&path).map_err(|err| {
                TablespaceError::fs(format!("could not remove file \"{}\"", path.display()), err)
            }),
        };
        match result {
            Ok(()) => log::trace!(
                "redo relation file record 0x{:02X} for {} at {}",
                record.info(),
                locator,
                lsn
            ),
            Err(err) => log::warn!(
                "could not replay change to relation file {} at {}: {}",
                locator,
                lsn,
                err
            ),
        }
    }

    /// Replay the WAL from the last checkpoint and return to production
    ///
    /// Returns the number of records read.
    pub fn startup_recovery(&self) -> TablespaceResult<usize> {
        let redo = self.control.data().checkpoint_redo;
        self.in_recovery.store(true, Ordering::SeqCst);
        self.control.set_state(DbState::InCrashRecovery)?;

        let result = self.replay_from(redo);
        self.in_recovery.store(false, Ordering::SeqCst);
        let replayed = result?;

        self.checkpoint()?;
        self.control.set_state(DbState::InProduction)?;
        log::info!("recovery complete: {} records replayed from {}", replayed, redo);
        Ok(replayed)
    }

    fn replay_from(&self, redo: Lsn) -> TablespaceResult<usize> {
        let records = self.wal.read_from(redo)?;
        for record in &records {
            self.replay(record)?;
        }
        Ok(records.len())
    }
}
