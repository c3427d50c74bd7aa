//! Physical directory lifecycle
//!
//! Everything here is forward-only: nothing is undone when the surrounding
//! transaction aborts, so every step must be safe to apply again from the WAL
//! record alone. Callers hold the tablespace-create lock around create and
//! destroy; [`DirectoryManager::create_dbspace`] takes it itself.

use crate::infrastructure::lwlock::{LwLock, LwLockMode};
use crate::layout::DirectoryLayout;
use crate::tablespace::error::{TablespaceError, TablespaceResult};
use crate::types::{DatabaseId, TablespaceId, GLOBAL_TABLESPACE_OID};
use crate::vfs::{FileKind, VfsError, VfsInterface};
use std::path::Path;
use std::sync::Arc;

/// Mode of every directory the subsystem creates
pub const DIR_CREATE_MODE: u32 = 0o700;

pub struct DirectoryManager {
    layout: DirectoryLayout,
    vfs: Arc<dyn VfsInterface>,
    create_lock: LwLock,
}

impl DirectoryManager {
    pub fn new(layout: DirectoryLayout, vfs: Arc<dyn VfsInterface>) -> Self {
        Self {
            layout,
            vfs,
            create_lock: LwLock::new("TablespaceCreateLock"),
        }
    }

    pub fn layout(&self) -> &DirectoryLayout {
        &self.layout
    }

    pub fn vfs(&self) -> &Arc<dyn VfsInterface> {
        &self.vfs
    }

    /// Serializes directory mutations across sessions
    pub fn create_lock(&self) -> &LwLock {
        &self.create_lock
    }

    /// Build the version directory under `location` and link it into place
    ///
    /// In recovery a leftover version directory or link is removed first, so
    /// replay always rebuilds from scratch.
    pub fn create_directories(
        &self,
        location: &str,
        spc: TablespaceId,
        in_recovery: bool,
    ) -> TablespaceResult<()> {
        let location_path = Path::new(location);
        let version_dir = self.layout.location_version_dir(location_path);
        let link = self.layout.link_path(spc);

        if let Err(err) = self.vfs.set_permissions(location_path, DIR_CREATE_MODE) {
            return Err(match err {
                VfsError::NotFound(_) => {
                    TablespaceError::fs(format!("directory \"{}\" does not exist", location), err)
                }
                _ => TablespaceError::fs(
                    format!("could not set permissions on directory \"{}\"", location),
                    err,
                ),
            });
        }

        if in_recovery {
            match self.vfs.lstat(&version_dir) {
                Ok(_) => self.vfs.remove_tree(&version_dir).map_err(|err| {
                    TablespaceError::fs(
                        format!("directory \"{}\" could not be removed", version_dir.display()),
                        err,
                    )
                })?,
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Err(TablespaceError::fs(
                        format!("could not stat directory \"{}\"", version_dir.display()),
                        err,
                    ));
                }
            }
        }

        if let Err(err) = self.vfs.create_dir(&version_dir, DIR_CREATE_MODE) {
            return Err(if err.is_already_exists() {
                TablespaceError::ObjectInUse(format!(
                    "directory \"{}\" already in use as a tablespace",
                    version_dir.display()
                ))
            } else {
                TablespaceError::fs(
                    format!("could not create directory \"{}\"", version_dir.display()),
                    err,
                )
            });
        }

        if in_recovery {
            self.remove_link(&link, false)?;
        }

        self.vfs
            .symlink(location_path, &link)
            .map_err(|err| {
                TablespaceError::fs(
                    format!(
                        "could not create symbolic link \"{}\"",
                        link.display()
                    ),
                    err,
                )
            })?;

        log::debug!(
            "created tablespace {} directories in \"{}\"",
            spc,
            version_dir.display()
        );
        Ok(())
    }

    /// Tear down the directories of tablespace `spc`
    ///
    /// Returns `false` when the version directory still holds files. With
    /// `is_redo` problems are logged instead of raised and emptiness is not
    /// checked; `false` then means the removal did not complete. A link that
    /// is already gone is only reported.
    pub fn destroy_directories(&self, spc: TablespaceId, is_redo: bool) -> TablespaceResult<bool> {
        let version_dir = self.layout.link_version_dir(spc);
        let link = self.layout.link_path(spc);

        // never unlink a plain file someone left where the link belongs
        if let Ok(FileKind::File | FileKind::Other) = self.vfs.lstat(&link) {
            let message = format!("\"{}\" is not a directory or symbolic link", link.display());
            if is_redo {
                log::info!("{}", message);
                return Ok(false);
            }
            return Err(TablespaceError::fs(
                message,
                VfsError::InvalidArgument(link.display().to_string()),
            ));
        }

        match self.vfs.read_dir(&version_dir) {
            Err(err) if err.is_not_found() => {
                if !is_redo {
                    log::warn!(
                        "could not open directory \"{}\": {}",
                        version_dir.display(),
                        err
                    );
                }
            }
            Err(err) if is_redo => {
                log::info!(
                    "could not open directory \"{}\": {}",
                    version_dir.display(),
                    err
                );
                return Ok(false);
            }
            Err(err) => {
                return Err(TablespaceError::fs(
                    format!("could not open directory \"{}\"", version_dir.display()),
                    err,
                ));
            }
            Ok(entries) => {
                for entry in entries {
                    let subdir = version_dir.join(&entry);

                    if !is_redo && !self.directory_is_empty(&subdir)? {
                        log::debug!("\"{}\" is not empty", subdir.display());
                        return Ok(false);
                    }

                    if let Err(err) = self.vfs.remove_dir(&subdir) {
                        if is_redo {
                            log::info!(
                                "could not remove directory \"{}\": {}",
                                subdir.display(),
                                err
                            );
                        } else {
                            return Err(TablespaceError::fs(
                                format!("could not remove directory \"{}\"", subdir.display()),
                                err,
                            ));
                        }
                    }
                }

                if let Err(err) = self.vfs.remove_dir(&version_dir) {
                    if is_redo {
                        log::info!(
                            "could not remove directory \"{}\": {}",
                            version_dir.display(),
                            err
                        );
                        return Ok(false);
                    }
                    return Err(TablespaceError::fs(
                        format!("could not remove directory \"{}\"", version_dir.display()),
                        err,
                    ));
                }
            }
        }

        match self.vfs.lstat(&link) {
            Ok(_) => self.remove_link(&link, is_redo)?,
            Err(err) if is_redo => {
                log::info!("could not stat file \"{}\": {}", link.display(), err);
            }
            Err(err) => {
                log::warn!("could not stat file \"{}\": {}", link.display(), err);
            }
        }

        log::debug!("destroyed tablespace {} directories", spc);
        Ok(true)
    }

    /// Remove whatever sits at a link location; a missing entry is fine
    ///
    /// Recovery uses this to clear the way for a fresh link, so anything that
    /// is not a directory is unlinked.
    fn remove_link(&self, link: &Path, is_redo: bool) -> TablespaceResult<()> {
        let result = match self.vfs.lstat(link) {
            Ok(FileKind::Directory) => self.vfs.remove_dir(link),
            Ok(_) => self.vfs.unlink(link),
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) if is_redo => {
                log::info!("could not remove symbolic link \"{}\": {}", link.display(), err);
                Ok(())
            }
            Err(err) => Err(TablespaceError::fs(
                format!("could not remove symbolic link \"{}\"", link.display()),
                err,
            )),
        }
    }

    pub fn directory_is_empty(&self, path: &Path) -> TablespaceResult<bool> {
        self.vfs
            .read_dir(path)
            .map(|entries| entries.is_empty())
            .map_err(|err| {
                TablespaceError::fs(format!("could not open directory \"{}\"", path.display()), err)
            })
    }

    /// Make sure the per-database directory of `db` exists in `spc`
    ///
    /// During redo the tablespace link may be gone (dropped later in the WAL);
    /// the missing parents are then created as plain directories.
    pub fn create_dbspace(
        &self,
        spc: TablespaceId,
        db: DatabaseId,
        is_redo: bool,
    ) -> TablespaceResult<()> {
        if spc == GLOBAL_TABLESPACE_OID {
            return Ok(());
        }

        let dir = self.layout.database_path(spc, db);
        if self.is_directory(&dir)? {
            return Ok(());
        }

        let _guard = self.create_lock.acquire(LwLockMode::Exclusive);

        // recheck under the lock
        if self.is_directory(&dir)? {
            return Ok(());
        }

        match self.vfs.create_dir(&dir, DIR_CREATE_MODE) {
            Ok(()) => {}
            Err(err) if err.is_not_found() && is_redo => {
                if let Some(parent) = dir.parent() {
                    if let Some(grandparent) = parent.parent() {
                        self.mkdir_if_missing(grandparent)?;
                    }
                    self.mkdir_if_missing(parent)?;
                }
                self.mkdir_if_missing(&dir)?;
            }
            Err(err) => {
                return Err(TablespaceError::fs(
                    format!("could not create directory \"{}\"", dir.display()),
                    err,
                ));
            }
        }

        log::debug!("created database directory \"{}\"", dir.display());
        Ok(())
    }

    fn is_directory(&self, path: &Path) -> TablespaceResult<bool> {
        match self.vfs.stat(path) {
            Ok(FileKind::Directory) => Ok(true),
            Ok(_) => Err(TablespaceError::fs(
                format!("\"{}\" exists but is not a directory", path.display()),
                VfsError::InvalidArgument(path.display().to_string()),
            )),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(TablespaceError::fs(
                format!("could not stat directory \"{}\"", path.display()),
                err,
            )),
        }
    }

    fn mkdir_if_missing(&self, path: &Path) -> TablespaceResult<()> {
        match self.vfs.create_dir(path, DIR_CREATE_MODE) {
            Ok(()) => Ok(()),
            Err(err) if err.is_already_exists() => Ok(()),
            Err(err) => Err(TablespaceError::fs(
                format!("could not create directory \"{}\"", path.display()),
                err,
            )),
        }
    }
}
