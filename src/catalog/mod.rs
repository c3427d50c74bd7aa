//! System catalogs
//!
//! [`store`] holds the transactional row store shared by every catalog;
//! [`tablespace`] is pg_tablespace on top of it. The relation catalog lives in
//! [`crate::table`].

pub mod error;
pub mod store;
pub mod tablespace;

pub use error::{CatalogError, CatalogResult};
pub use store::{CatalogRow, CatalogStore, WriteSet};
pub use tablespace::{TablespaceCatalog, TablespaceOptions, TablespaceRow};

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
