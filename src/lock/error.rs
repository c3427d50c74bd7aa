//! Lock manager error definitions

use crate::lock::LockTag;
use std::error::Error;
use std::fmt;

/// Lock manager error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// A conflicting lock is held and the caller asked not to wait
    NotAvailable(LockTag),
    /// The wait exceeded the configured lock timeout
    Timeout(LockTag),
}

impl LockError {
    pub fn tag(&self) -> LockTag {
        match self {
            LockError::NotAvailable(tag) | LockError::Timeout(tag) => *tag,
        }
    }
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::NotAvailable(tag) => write!(f, "could not obtain lock on {}", tag),
            LockError::Timeout(tag) => {
                write!(f, "canceling statement due to lock timeout on {}", tag)
            }
        }
    }
}

impl Error for LockError {}

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;
