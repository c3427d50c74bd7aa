//! VFS error definitions

use std::error::Error;
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

/// VFS error types
#[derive(Debug)]
pub enum VfsError {
    /// Permission denied error
    PermissionDenied(String),
    /// File or directory not found error
    NotFound(String),
    /// File already exists error
    AlreadyExists(String),
    /// Directory still has entries
    NotEmpty(String),
    /// Invalid argument error
    InvalidArgument(String),
    /// I/O error
    IoError(std::io::Error),
    /// System call error with error code
    SystemError(i32, String),
}

impl VfsError {
    /// Classify an errno from a failed system call on `path`
    pub fn from_errno(errno: i32, op: &str, path: &Path) -> Self {
        let path_str = path.display().to_string();
        match errno {
            libc::ENOENT => VfsError::NotFound(path_str),
            libc::EEXIST => VfsError::AlreadyExists(path_str),
            libc::EACCES | libc::EPERM => VfsError::PermissionDenied(path_str),
            libc::ENOTEMPTY => VfsError::NotEmpty(path_str),
            _ => VfsError::SystemError(errno, format!("{} failed for path '{}'", op, path_str)),
        }
    }

    /// Classify a std I/O error raised while operating on `path`
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        if let Some(errno) = err.raw_os_error() {
            if errno == libc::ENOTEMPTY {
                return VfsError::NotEmpty(path.display().to_string());
            }
        }
        match err.kind() {
            ErrorKind::NotFound => VfsError::NotFound(path.display().to_string()),
            ErrorKind::AlreadyExists => VfsError::AlreadyExists(path.display().to_string()),
            ErrorKind::PermissionDenied => VfsError::PermissionDenied(path.display().to_string()),
            _ => VfsError::IoError(err),
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }

    #[inline]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, VfsError::AlreadyExists(_))
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::PermissionDenied(path) => write!(f, "Permission denied: {}", path),
            VfsError::NotFound(path) => write!(f, "File or directory not found: {}", path),
            VfsError::AlreadyExists(path) => {
                write!(f, "File or directory already exists: {}", path)
            }
            VfsError::NotEmpty(path) => write!(f, "Directory not empty: {}", path),
            VfsError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            VfsError::IoError(err) => write!(f, "I/O error: {}", err),
            VfsError::SystemError(errno, msg) => {
                write!(f, "System error (errno {}): {}", errno, msg)
            }
        }
    }
}

impl Error for VfsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            VfsError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        VfsError::IoError(err)
    }
}

impl From<std::ffi::NulError> for VfsError {
    fn from(err: std::ffi::NulError) -> Self {
        VfsError::InvalidArgument(err.to_string())
    }
}

/// Result type for VFS operations
pub type VfsResult<T> = Result<T, VfsError>;
