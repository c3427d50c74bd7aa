//! Storage manager
//!
//! Relation files live at `<per-database dir>/<relfilenode>`. Files are never
//! removed inside the transaction that drops them: the drop registers a
//! pending delete; at commit the file is truncated and queued for unlinking at
//! the next checkpoint, at abort nothing happens. Files created by a
//! transaction that aborts are removed immediately.
//!
//! Creating, extending and removing files is WAL-logged by the callers; the
//! `*_redo` helpers here apply those records and tolerate files that are
//! already there or already gone.

use crate::types::RelFileLocator;
use crate::vfs::{VfsInterface, VfsResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file to remove when the owning transaction ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub locator: RelFileLocator,
    pub path: PathBuf,
    /// Remove at commit (dropped file) or at abort (newly created file)
    pub at_commit: bool,
    /// Log the removal so replay drops the file too
    pub wal_logged: bool,
}

impl PendingDelete {
    pub fn on_commit(locator: RelFileLocator, path: PathBuf) -> Self {
        Self {
            locator,
            path,
            at_commit: true,
            wal_logged: true,
        }
    }

    pub fn on_abort(locator: RelFileLocator, path: PathBuf) -> Self {
        Self {
            locator,
            path,
            at_commit: false,
            wal_logged: true,
        }
    }

    /// Temporary relations never reach the WAL
    pub fn without_wal(mut self) -> Self {
        self.wal_logged = false;
        self
    }
}

pub struct StorageManager {
    vfs: Arc<dyn VfsInterface>,
    unlink_requests: Mutex<Vec<PathBuf>>,
}

impl StorageManager {
    pub fn new(vfs: Arc<dyn VfsInterface>) -> Self {
        Self {
            vfs,
            unlink_requests: Mutex::new(Vec::new()),
        }
    }

    /// Create an empty relation file
    pub fn create(&self, path: &Path) -> VfsResult<()> {
        let handle = self.vfs.create_file(path)?;
        handle.close()
    }

    /// Append `data` to a relation file, returning its new length
    pub fn append(&self, path: &Path, data: &[u8]) -> VfsResult<u64> {
        let handle = self.vfs.open_file(path)?;
        let mut offset = handle.len()?;
        let mut written = 0;
        while written < data.len() {
            let n = handle.pwrite(&data[written..], offset)?;
            written += n;
            offset += n as u64;
        }
        handle.sync()?;
        handle.close()?;
        Ok(offset)
    }

    /// Write `data` at `offset`, growing the file as needed
    pub fn write_at(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u64> {
        let handle = self.vfs.open_file(path)?;
        let mut offset = offset;
        let mut written = 0;
        while written < data.len() {
            let n = handle.pwrite(&data[written..], offset)?;
            written += n;
            offset += n as u64;
        }
        handle.sync()?;
        handle.close()?;
        Ok(offset)
    }

    /// Whole contents of a relation file
    pub fn read(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let handle = self.vfs.open_file(path)?;
        let mut buf = vec![0u8; handle.len()? as usize];
        let mut done = 0;
        while done < buf.len() {
            let n = handle.pread(&mut buf[done..], done as u64)?;
            if n == 0 {
                buf.truncate(done);
                break;
            }
            done += n;
        }
        handle.close()?;
        Ok(buf)
    }

    /// Replay of a file creation: an existing file keeps its contents
    pub fn create_redo(&self, path: &Path) -> VfsResult<()> {
        match self.vfs.open_file(path) {
            Ok(handle) => handle.close(),
            Err(err) if err.is_not_found() => self.create(path),
            Err(err) => Err(err),
        }
    }

    /// Replay of a write; the file is created when an earlier record for it
    /// fell before the redo point
    pub fn write_redo(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<()> {
        self.create_redo(path)?;
        self.write_at(path, offset, data).map(|_| ())
    }

    /// Replay of a file removal; a file that is already gone is fine
    pub fn unlink_redo(&self, path: &Path) -> VfsResult<()> {
        match self.vfs.unlink(path) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    pub fn size(&self, path: &Path) -> VfsResult<u64> {
        let handle = self.vfs.open_file(path)?;
        handle.len()
    }

    /// Run the pending deletes that apply to this transaction outcome
    pub fn do_pending_deletes(&self, pending: Vec<PendingDelete>, is_commit: bool) {
        for delete in pending.into_iter().filter(|d| d.at_commit == is_commit) {
            if is_commit {
                self.register_unlink(&delete.path);
            } else if let Err(err) = self.vfs.unlink(&delete.path) {
                if !err.is_not_found() {
                    log::warn!("could not remove file \"{}\": {}", delete.path.display(), err);
                }
            }
        }
    }

    /// Truncate now, unlink at the next checkpoint
    fn register_unlink(&self, path: &Path) {
        if let Err(err) = self.vfs.truncate(path, 0) {
            if err.is_not_found() {
                return;
            }
            log::warn!("could not truncate file \"{}\": {}", path.display(), err);
        }
        log::debug!("unlink of \"{}\" deferred to next checkpoint", path.display());
        self.unlink_requests.lock().push(path.to_path_buf());
    }

    /// Unlink every file queued by committed drops; returns how many went away
    pub fn process_unlink_requests(&self) -> usize {
        let requests = std::mem::take(&mut *self.unlink_requests.lock());
        let mut removed = 0;
        for path in requests {
            match self.vfs.unlink(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.is_not_found() => {}
                Err(err) => log::warn!("could not remove file \"{}\": {}", path.display(), err),
            }
        }
        removed
    }

    pub fn pending_unlinks(&self) -> usize {
        self.unlink_requests.lock().len()
    }
}
