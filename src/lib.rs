//! Aistore tablespace lifecycle manager
//!
//! Named storage locations for one node of a coordinator/worker cluster:
//! create, drop, rename, re-option and relocate tablespaces, keep their
//! on-disk directories consistent with the catalog across crashes, and pick
//! default and temporary tablespaces for new objects.

// Global type definitions
pub mod types;

pub mod acl;
pub mod catalog;
pub mod cdb;
pub mod config;
pub mod controlfile;
pub mod infrastructure;
pub mod layout;
pub mod lock;
pub mod session;
pub mod smgr;
pub mod table;
pub mod tablespace;
pub mod vfs;
pub mod wal;
pub mod xact;

// Re-export the entry points
pub use config::EngineConfig;
pub use session::Session;
pub use tablespace::{TablespaceError, TablespaceManager, TablespaceResult};

// Re-export vfs items for easier access
pub use vfs::VfsError;
pub use vfs::VfsInterface;
