//! Directory layout resolver
//!
//! Pure mapping from (tablespace, database, node) to filesystem paths:
//!
//! ```text
//! <data_root>/pg_tblspc/<spc>                        -> symlink to <location>
//! <location>/<version_tag>_db<node_id>               version directory
//! <location>/<version_tag>_db<node_id>/<db>          per-database directory
//! <location>/<version_tag>_db<node_id>/<db>/<file>   relation file
//! ```
//!
//! The built-in tablespaces are special-cased: the global tablespace lives in
//! `<data_root>/global`, the default one in `<data_root>/base/<db>`.
//! Embedding the node id keeps co-located nodes that share a location apart.

use crate::types::{
    DatabaseId, Oid, TablespaceId, DEFAULT_TABLESPACE_OID, FORKNAMECHARS, GLOBAL_TABLESPACE_OID,
    MAXPGPATH, OIDCHARS, TABLESPACE_NAMESPACE_DIR, TABLESPACE_VERSION_TAG,
};
use std::path::{Path, PathBuf};

/// Directory of the global tablespace below the data root
pub const GLOBAL_DIR: &str = "global";

/// Directory of the default tablespace below the data root
pub const BASE_DIR: &str = "base";

#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    data_root: PathBuf,
    node_id: u32,
}

impl DirectoryLayout {
    pub fn new(data_root: impl AsRef<Path>, node_id: u32) -> Self {
        Self {
            data_root: data_root.as_ref().to_path_buf(),
            node_id,
        }
    }

    #[inline]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    #[inline]
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Name of the per-node version directory inside every tablespace location
    pub fn version_dir_name(&self) -> String {
        format!("{}_db{}", TABLESPACE_VERSION_TAG, self.node_id)
    }

    /// `<data_root>/pg_tblspc`
    pub fn tablespace_namespace(&self) -> PathBuf {
        self.data_root.join(TABLESPACE_NAMESPACE_DIR)
    }

    /// Canonical symlink location for a tablespace
    pub fn link_path(&self, spc: TablespaceId) -> PathBuf {
        self.tablespace_namespace().join(spc.to_string())
    }

    /// Version directory below a user-supplied location
    pub fn location_version_dir(&self, location: &Path) -> PathBuf {
        location.join(self.version_dir_name())
    }

    /// Version directory reached through the tablespace symlink
    pub fn link_version_dir(&self, spc: TablespaceId) -> PathBuf {
        self.link_path(spc).join(self.version_dir_name())
    }

    /// Directory holding a database's files in a tablespace
    pub fn database_path(&self, spc: TablespaceId, db: DatabaseId) -> PathBuf {
        match spc {
            GLOBAL_TABLESPACE_OID => self.data_root.join(GLOBAL_DIR),
            DEFAULT_TABLESPACE_OID => self.data_root.join(BASE_DIR).join(db.to_string()),
            _ => self.link_version_dir(spc).join(db.to_string()),
        }
    }

    /// Path of a relation's main file
    pub fn relation_path(&self, spc: TablespaceId, db: DatabaseId, relfilenode: Oid) -> PathBuf {
        self.database_path(spc, db).join(relfilenode.to_string())
    }

    /// Whether a tablespace location leaves room for everything appended below it
    ///
    /// The longest path ever built is
    /// `<location>/<version>/<db>/<relfilenode>_<fork>.<segno>`.
    pub fn location_fits(&self, location: &str) -> bool {
        location.len()
            + 1
            + self.version_dir_name().len()
            + 1
            + OIDCHARS
            + 1
            + OIDCHARS
            + 1
            + FORKNAMECHARS
            + 1
            + OIDCHARS
            <= MAXPGPATH
    }
}

/// Whether `path` is absolute
pub fn is_absolute_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Unix-ify a path: collapse duplicate separators, drop `.` components,
/// resolve `..` where possible and strip trailing slashes.
pub fn canonicalize_path(path: &str) -> String {
    let absolute = is_absolute_path(path);
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                // can't go above the root
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
