//! Control file
//!
//! `global/pg_control` records where crash recovery has to start replaying the
//! WAL. It is rewritten atomically at every checkpoint.

use crate::types::Lsn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Cluster state as of the last control file write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbState {
    ShutDown,
    InCrashRecovery,
    InProduction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFileData {
    pub state: DbState,
    /// Replay starts here
    pub checkpoint_redo: Lsn,
    /// Seconds since the epoch
    pub checkpoint_time: u64,
}

impl Default for ControlFileData {
    fn default() -> Self {
        Self {
            state: DbState::ShutDown,
            checkpoint_redo: 0,
            checkpoint_time: 0,
        }
    }
}

#[derive(Debug)]
pub enum ControlFileError {
    IoError(std::io::Error),
    ParseError(serde_json::Error),
}

impl fmt::Display for ControlFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlFileError::IoError(err) => write!(f, "could not access control file: {}", err),
            ControlFileError::ParseError(err) => write!(f, "invalid control file: {}", err),
        }
    }
}

impl std::error::Error for ControlFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlFileError::IoError(err) => Some(err),
            ControlFileError::ParseError(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ControlFileError {
    fn from(err: std::io::Error) -> Self {
        ControlFileError::IoError(err)
    }
}

impl From<serde_json::Error> for ControlFileError {
    fn from(err: serde_json::Error) -> Self {
        ControlFileError::ParseError(err)
    }
}

pub type ControlFileResult<T> = Result<T, ControlFileError>;

pub struct ControlFile {
    path: PathBuf,
    data: Mutex<ControlFileData>,
}

impl ControlFile {
    pub const FILE_NAME: &'static str = "pg_control";

    /// Load `<global_dir>/pg_control`, writing a fresh one if absent
    pub fn open(global_dir: impl AsRef<Path>) -> ControlFileResult<Self> {
        let path = global_dir.as_ref().join(Self::FILE_NAME);
        let data = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            let data = ControlFileData::default();
            write_atomic(&path, &data)?;
            data
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn data(&self) -> ControlFileData {
        self.data.lock().clone()
    }

    pub fn set_state(&self, state: DbState) -> ControlFileResult<()> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        next.state = state;
        write_atomic(&self.path, &next)?;
        *data = next;
        Ok(())
    }

    /// Record a completed checkpoint whose redo point is `redo`
    pub fn record_checkpoint(&self, redo: Lsn) -> ControlFileResult<()> {
        let mut data = self.data.lock();
        let mut next = data.clone();
        next.checkpoint_redo = redo;
        next.checkpoint_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        write_atomic(&self.path, &next)?;
        *data = next;
        Ok(())
    }
}

fn write_atomic(path: &Path, data: &ControlFileData) -> ControlFileResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_string_pretty(data)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
