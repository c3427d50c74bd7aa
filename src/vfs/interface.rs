//! VFS interface definitions

use crate::vfs::error::VfsResult;
use std::path::Path;

/// What a path refers to, as reported by `lstat`/`stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Symlink,
    File,
    Other,
}

/// File handle trait for VFS operations
/// This trait represents a handle to an open file and provides methods for reading and writing
pub trait FileHandle: Send + Sync {
    /// Read from the file at a specific offset
    fn pread(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize>;

    /// Write to the file at a specific offset
    fn pwrite(&self, buf: &[u8], offset: u64) -> VfsResult<usize>;

    /// Current length of the file
    fn len(&self) -> VfsResult<u64>;

    /// Flush file contents to stable storage
    fn sync(&self) -> VfsResult<()>;

    /// Close the file handle
    fn close(self: Box<Self>) -> VfsResult<()>;
}

/// VFS interface trait
///
/// Everything the tablespace subsystem does to the filesystem goes through
/// this trait, so tests can observe or perturb it.
pub trait VfsInterface: Send + Sync {
    /// Create a single directory with the given permission bits
    ///
    /// Fails with `AlreadyExists` if anything is already at `path`.
    fn create_dir(&self, path: &Path, mode: u32) -> VfsResult<()>;

    /// Remove an empty directory
    ///
    /// Fails with `NotEmpty` if the directory still has entries.
    fn remove_dir(&self, path: &Path) -> VfsResult<()>;

    /// Remove a directory and everything below it
    fn remove_tree(&self, path: &Path) -> VfsResult<()>;

    /// Change permission bits of `path`
    fn set_permissions(&self, path: &Path, mode: u32) -> VfsResult<()>;

    /// Create a symbolic link at `link` pointing to `target`
    fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()>;

    /// Read the target of a symbolic link
    fn read_link(&self, link: &Path) -> VfsResult<std::path::PathBuf>;

    /// Remove a file or symbolic link
    fn unlink(&self, path: &Path) -> VfsResult<()>;

    /// Kind of `path` without following a trailing symlink
    fn lstat(&self, path: &Path) -> VfsResult<FileKind>;

    /// Kind of `path`, following symlinks
    fn stat(&self, path: &Path) -> VfsResult<FileKind>;

    /// Names of the entries in a directory, excluding `.` and `..`
    fn read_dir(&self, path: &Path) -> VfsResult<Vec<String>>;

    /// Create a new file (truncating an existing one) and return a handle to it
    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn FileHandle>>;

    /// Open an existing file and return a handle to it
    fn open_file(&self, path: &Path) -> VfsResult<Box<dyn FileHandle>>;

    /// Resize a file to the specified length
    fn truncate(&self, path: &Path, length: u64) -> VfsResult<()>;
}
