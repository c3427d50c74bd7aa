//! WAL error definitions

use crate::vfs::VfsError;
use std::error::Error;
use std::fmt;

/// WAL error types
#[derive(Debug)]
pub enum WalError {
    /// Underlying file operation failed
    Io(VfsError),
    /// Payload does not decode as the record it claims to be
    Corrupt(String),
    /// Record type not owned by the decoder
    UnknownRecord { rmid: u8, info: u8 },
}

impl fmt::Display for WalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalError::Io(err) => write!(f, "WAL I/O error: {}", err),
            WalError::Corrupt(msg) => write!(f, "corrupt WAL record: {}", msg),
            WalError::UnknownRecord { rmid, info } => {
                write!(f, "unknown WAL record: rmgr {} info 0x{:02X}", rmid, info)
            }
        }
    }
}

impl Error for WalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WalError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<VfsError> for WalError {
    fn from(err: VfsError) -> Self {
        WalError::Io(err)
    }
}

/// Result type for WAL operations
pub type WalResult<T> = Result<T, WalError>;
