use std::fmt;

/// Global type definitions
///
/// Stores identifiers, reserved object ids and enumerations shared by the
/// tablespace subsystem and its collaborators.
/// Object identifier type
pub type Oid = u32;

/// Invalid / sentinel object id ("use the database default")
pub const INVALID_OID: Oid = 0;

/// Tablespace ID type
pub type TablespaceId = Oid;

/// Database ID type
pub type DatabaseId = Oid;

/// Role ID type
pub type RoleId = Oid;

/// Relation ID type
pub type RelationId = Oid;

/// Transaction ID type
pub type TransactionId = u64;

/// Log sequence number (byte offset into the WAL)
pub type Lsn = u64;

/// Partition (content) identifier of a node; the coordinator uses -1
pub type ContentId = i32;

/// Content id of the coordinator process
pub const COORDINATOR_CONTENT_ID: ContentId = -1;

/// Built-in tablespace holding every database's objects by default
pub const DEFAULT_TABLESPACE_OID: TablespaceId = 1663;

/// Built-in tablespace holding shared catalogs
pub const GLOBAL_TABLESPACE_OID: TablespaceId = 1664;

/// First oid handed out to user-created objects
pub const FIRST_NORMAL_OID: Oid = 16384;

/// Bootstrap superuser
pub const BOOTSTRAP_SUPERUSER_ID: RoleId = 10;

/// Maximum length of any filesystem path the engine builds
pub const MAXPGPATH: usize = 1024;

/// Characters needed to print an oid
pub const OIDCHARS: usize = 10;

/// Characters needed to print a fork name suffix
pub const FORKNAMECHARS: usize = 4;

/// Maximum identifier length
pub const NAMEDATALEN: usize = 64;

/// Prefixes reserved for system-created tablespaces
pub const RESERVED_NAME_PREFIXES: [&str; 2] = ["pg_", "gp_"];

/// Directory under the data root holding one symlink per tablespace
pub const TABLESPACE_NAMESPACE_DIR: &str = "pg_tblspc";

/// Catalog version tag embedded in tablespace version directories
pub const TABLESPACE_VERSION_TAG: &str = "AIS_1_202610171";

/// Catalog kinds, used to key row-level advisory locks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    /// pg_tablespace
    Tablespace,
    /// pg_class
    Relation,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKind::Tablespace => write!(f, "pg_tablespace"),
            CatalogKind::Relation => write!(f, "pg_class"),
        }
    }
}

/// Relation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelKind {
    /// Ordinary table
    Table,
    /// Index
    Index,
    /// Materialized view
    MaterializedView,
    /// View (no storage)
    View,
    /// Sequence
    Sequence,
    /// TOAST table
    Toast,
}

impl RelKind {
    /// Whether objects of this kind own a file
    pub fn has_storage(&self) -> bool {
        *self != RelKind::View
    }

    /// Whether objects of this kind live in a tablespace
    pub fn has_storage_in_tablespace(&self) -> bool {
        matches!(
            self,
            RelKind::Table | RelKind::Index | RelKind::MaterializedView
        )
    }
}

/// Relation persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persistence {
    /// Regular, WAL-logged relation
    Permanent,
    /// Unlogged relation
    Unlogged,
    /// Session-local temporary relation
    Temporary,
}

impl Persistence {
    /// Whether row data written to the relation is WAL-logged
    pub fn logs_data(&self) -> bool {
        *self == Persistence::Permanent
    }

    /// Whether the relation's file must come back after a crash
    pub fn logs_file(&self) -> bool {
        *self != Persistence::Temporary
    }
}

/// Kind of namespace a relation lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// User schema
    User,
    /// pg_catalog and friends
    System,
    /// pg_toast
    Toast,
    /// Temporary schema
    Temp,
}

impl NamespaceKind {
    /// Printable schema name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            NamespaceKind::User => "public",
            NamespaceKind::System => "pg_catalog",
            NamespaceKind::Toast => "pg_toast",
            NamespaceKind::Temp => "pg_temp",
        }
    }
}

/// Role of this process in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NodeRole {
    /// Accepts statements and fans them out to workers
    Coordinator,
    /// Holds one partition of the data
    Worker,
    /// Stand-alone, no dispatch
    Utility,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Coordinator => write!(f, "coordinator"),
            NodeRole::Worker => write!(f, "worker"),
            NodeRole::Utility => write!(f, "utility"),
        }
    }
}

/// Physical identity of a relation file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelFileLocator {
    /// Tablespace the file lives in, never the `0` sentinel
    pub spc: TablespaceId,
    pub db: DatabaseId,
    pub relfilenode: Oid,
}

impl RelFileLocator {
    pub fn new(spc: TablespaceId, db: DatabaseId, relfilenode: Oid) -> Self {
        Self {
            spc,
            db,
            relfilenode,
        }
    }
}

impl fmt::Display for RelFileLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.spc, self.db, self.relfilenode)
    }
}

/// Whether `name` begins with a reserved system prefix
pub fn is_reserved_name(name: &str) -> bool {
    reserved_prefix(name).is_some()
}

/// The reserved prefix `name` begins with, if any
pub fn reserved_prefix(name: &str) -> Option<&'static str> {
    RESERVED_NAME_PREFIXES
        .iter()
        .copied()
        .find(|prefix| name.starts_with(prefix))
}
