//! Tablespace error definitions

use crate::catalog::CatalogError;
use crate::controlfile::ControlFileError;
use crate::types::{CatalogKind, ContentId};
use crate::vfs::VfsError;
use crate::wal::WalError;
use std::error::Error;
use std::fmt;

/// Tablespace error types
///
/// Messages follow the wording users of the engine see; the variant carries
/// the classification.
#[derive(Debug)]
pub enum TablespaceError {
    /// Not privileged or not the owner; holds the full message
    PermissionDenied(String),
    /// Relative, too long, or quoted location; holds the full message
    InvalidPath(String),
    /// Name starts with a reserved system prefix
    ReservedName(String),
    /// Tablespace name already taken
    AlreadyExists(String),
    /// Unknown tablespace name
    NotFound(String),
    /// Unknown role name
    RoleNotFound(String),
    /// Unknown relation name
    RelationNotFound(String),
    /// Lock unavailable, location already used, or built-in tablespace
    ObjectInUse(String),
    /// Physical directory still holds files
    NotEmpty(String),
    /// Row lock contention with a concurrent update
    SerializationConflict(String),
    /// I/O failure, with the operation and path
    Filesystem { context: String, source: VfsError },
    /// Per-node location override names a partition that does not exist
    PartitionNotFound(ContentId),
    /// Bad option, list syntax or override key
    InvalidParameter(String),
    /// Command issued in the wrong transaction state
    InvalidTransactionState(String),
    Catalog(CatalogError),
    Wal(WalError),
    ControlFile(ControlFileError),
    /// A worker failed while applying a dispatched statement
    Dispatch {
        content_id: ContentId,
        source: Box<TablespaceError>,
    },
}

impl TablespaceError {
    /// Wrap a filesystem error with the failed operation
    pub fn fs(context: impl Into<String>, source: VfsError) -> Self {
        TablespaceError::Filesystem {
            context: context.into(),
            source,
        }
    }

    /// Error of the worker that failed, unwrapping dispatch layers
    pub fn root_cause(&self) -> &TablespaceError {
        match self {
            TablespaceError::Dispatch { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl fmt::Display for TablespaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TablespaceError::PermissionDenied(msg)
            | TablespaceError::InvalidPath(msg)
            | TablespaceError::ObjectInUse(msg)
            | TablespaceError::SerializationConflict(msg)
            | TablespaceError::InvalidParameter(msg)
            | TablespaceError::InvalidTransactionState(msg) => f.write_str(msg),
            TablespaceError::ReservedName(name) => write!(
                f,
                "unacceptable tablespace name \"{}\": the prefixes \"pg_\" and \"gp_\" are reserved for system tablespaces",
                name
            ),
            TablespaceError::AlreadyExists(name) => {
                write!(f, "tablespace \"{}\" already exists", name)
            }
            TablespaceError::NotFound(name) => write!(f, "tablespace \"{}\" does not exist", name),
            TablespaceError::RoleNotFound(name) => write!(f, "role \"{}\" does not exist", name),
            TablespaceError::RelationNotFound(name) => {
                write!(f, "relation \"{}\" does not exist", name)
            }
            TablespaceError::NotEmpty(name) => write!(f, "tablespace \"{}\" is not empty", name),
            TablespaceError::Filesystem { context, source } => write!(f, "{}: {}", context, source),
            TablespaceError::PartitionNotFound(content) => {
                write!(f, "segment with content id {} does not exist", content)
            }
            TablespaceError::Catalog(err) => write!(f, "{}", err),
            TablespaceError::Wal(err) => write!(f, "{}", err),
            TablespaceError::ControlFile(err) => write!(f, "{}", err),
            TablespaceError::Dispatch { content_id, source } => {
                write!(f, "{} (seg{})", source, content_id)
            }
        }
    }
}

impl Error for TablespaceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TablespaceError::Filesystem { source, .. } => Some(source),
            TablespaceError::Catalog(err) => Some(err),
            TablespaceError::Wal(err) => Some(err),
            TablespaceError::ControlFile(err) => Some(err),
            TablespaceError::Dispatch { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<CatalogError> for TablespaceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DuplicateKey {
                catalog: CatalogKind::Tablespace,
                key,
            } => TablespaceError::AlreadyExists(key),
            CatalogError::NotFound {
                catalog: CatalogKind::Tablespace,
                key,
            } => TablespaceError::NotFound(key),
            CatalogError::SerializationFailure { .. } => {
                TablespaceError::SerializationConflict(err.to_string())
            }
            other => TablespaceError::Catalog(other),
        }
    }
}

impl From<WalError> for TablespaceError {
    fn from(err: WalError) -> Self {
        TablespaceError::Wal(err)
    }
}

impl From<ControlFileError> for TablespaceError {
    fn from(err: ControlFileError) -> Self {
        TablespaceError::ControlFile(err)
    }
}

/// Result type for tablespace operations
pub type TablespaceResult<T> = Result<T, TablespaceError>;
