//! Catalog error definitions

use crate::types::{CatalogKind, Oid};
use std::error::Error;
use std::fmt;

/// Catalog error types
///
/// Represents all possible errors that can occur during catalog operations
/// such as row insertion, lookup, commit and persistence.
#[derive(Debug)]
pub enum CatalogError {
    /// Unique key already taken by a live or in-flight row
    DuplicateKey { catalog: CatalogKind, key: String },
    /// Row not found
    NotFound { catalog: CatalogKind, key: String },
    /// Row was concurrently updated or deleted while being locked
    SerializationFailure { catalog: CatalogKind, oid: Oid },
    /// I/O error during catalog operation
    IoError(std::io::Error),
    /// Error parsing catalog data
    ParseError(String),
    /// Invalid argument provided
    InvalidArgument(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::DuplicateKey { catalog, key } => {
                write!(f, "duplicate key value violates unique constraint on {}: {}", catalog, key)
            }
            CatalogError::NotFound { catalog, key } => {
                write!(f, "{} row not found: {}", catalog, key)
            }
            CatalogError::SerializationFailure { .. } => {
                write!(f, "could not serialize access due to concurrent update")
            }
            CatalogError::IoError(err) => write!(f, "I/O error: {}", err),
            CatalogError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            CatalogError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CatalogError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::IoError(err)
    }
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::DuplicateKey {
            catalog: CatalogKind::Tablespace,
            key: "ts1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "duplicate key value violates unique constraint on pg_tablespace: ts1"
        );

        let err = CatalogError::SerializationFailure {
            catalog: CatalogKind::Tablespace,
            oid: 16384,
        };
        assert_eq!(
            err.to_string(),
            "could not serialize access due to concurrent update"
        );
    }

    #[test]
    fn test_catalog_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let catalog_err: CatalogError = io_err.into();
        assert!(matches!(catalog_err, CatalogError::IoError(_)));
    }
}
