//! Local file system implementation using libc system calls

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::interface::{FileHandle, FileKind, VfsInterface};
use libc::{self, c_int, c_void, off_t, size_t};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

#[inline]
fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn c_path(path: &Path) -> VfsResult<CString> {
    Ok(CString::new(path.as_os_str().as_bytes())?)
}

fn kind_from_mode(mode: libc::mode_t) -> FileKind {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileKind::Directory,
        libc::S_IFLNK => FileKind::Symlink,
        libc::S_IFREG => FileKind::File,
        _ => FileKind::Other,
    }
}

/// Local file handle implementation
pub struct LocalFileHandle {
    fd: c_int,
}

impl LocalFileHandle {
    /// Create a new LocalFileHandle from a file descriptor
    pub fn new(fd: c_int) -> Self {
        LocalFileHandle { fd }
    }
}

impl FileHandle for LocalFileHandle {
    fn pread(&self, buf: &mut [u8], offset: u64) -> VfsResult<usize> {
        let result = unsafe {
            libc::pread(
                self.fd,
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as size_t,
                offset as off_t,
            )
        };

        if result < 0 {
            Err(VfsError::SystemError(last_errno(), "pread failed".to_string()))
        } else {
            Ok(result as usize)
        }
    }

    fn pwrite(&self, buf: &[u8], offset: u64) -> VfsResult<usize> {
        let result = unsafe {
            libc::pwrite(
                self.fd,
                buf.as_ptr() as *const c_void,
                buf.len() as size_t,
                offset as off_t,
            )
        };

        if result < 0 {
            Err(VfsError::SystemError(last_errno(), "pwrite failed".to_string()))
        } else {
            Ok(result as usize)
        }
    }

    fn len(&self) -> VfsResult<u64> {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::fstat(self.fd, &mut st) };

        if result < 0 {
            Err(VfsError::SystemError(last_errno(), "fstat failed".to_string()))
        } else {
            Ok(st.st_size as u64)
        }
    }

    fn sync(&self) -> VfsResult<()> {
        let result = unsafe { libc::fsync(self.fd) };

        if result < 0 {
            Err(VfsError::SystemError(last_errno(), "fsync failed".to_string()))
        } else {
            Ok(())
        }
    }

    fn close(mut self: Box<Self>) -> VfsResult<()> {
        let fd = std::mem::replace(&mut self.fd, -1);
        let result = unsafe { libc::close(fd) };

        if result < 0 {
            Err(VfsError::SystemError(last_errno(), "close failed".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Drop for LocalFileHandle {
    fn drop(&mut self) {
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
        }
    }
}

/// Local file system implementation
#[derive(Debug, Default)]
pub struct LocalFs {}

impl LocalFs {
    /// Create a new LocalFs instance
    pub fn new() -> Self {
        LocalFs {}
    }

    /// Open a file with the given flags and mode
    fn open_file_internal(&self, path: &Path, flags: c_int, mode: u32) -> VfsResult<c_int> {
        // Create CString in scope so it lives during the system call
        let c_path = c_path(path)?;

        let result = unsafe { libc::open(c_path.as_ptr(), flags, mode as libc::c_uint) };

        if result < 0 {
            Err(VfsError::from_errno(last_errno(), "open", path))
        } else {
            Ok(result)
        }
    }

    fn stat_internal(&self, path: &Path, follow: bool) -> VfsResult<FileKind> {
        let c_path = c_path(path)?;
        let mut st: libc::stat = unsafe { std::mem::zeroed() };

        let result = unsafe {
            if follow {
                libc::stat(c_path.as_ptr(), &mut st)
            } else {
                libc::lstat(c_path.as_ptr(), &mut st)
            }
        };

        if result < 0 {
            Err(VfsError::from_errno(last_errno(), "stat", path))
        } else {
            Ok(kind_from_mode(st.st_mode))
        }
    }
}

impl VfsInterface for LocalFs {
    fn create_dir(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let c_path = c_path(path)?;

        let result = unsafe { libc::mkdir(c_path.as_ptr(), mode as libc::mode_t) };

        if result < 0 {
            Err(VfsError::from_errno(last_errno(), "mkdir", path))
        } else {
            Ok(())
        }
    }

    fn remove_dir(&self, path: &Path) -> VfsResult<()> {
        let c_path = c_path(path)?;

        let result = unsafe { libc::rmdir(c_path.as_ptr()) };

        if result < 0 {
            let errno = last_errno();
            // Some platforms report a non-empty directory as EEXIST
            if errno == libc::EEXIST {
                return Err(VfsError::NotEmpty(path.display().to_string()));
            }
            Err(VfsError::from_errno(errno, "rmdir", path))
        } else {
            Ok(())
        }
    }

    fn remove_tree(&self, path: &Path) -> VfsResult<()> {
        std::fs::remove_dir_all(path).map_err(|e| VfsError::from_io(e, path))
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let c_path = c_path(path)?;

        let result = unsafe { libc::chmod(c_path.as_ptr(), mode as libc::mode_t) };

        if result < 0 {
            Err(VfsError::from_errno(last_errno(), "chmod", path))
        } else {
            Ok(())
        }
    }

    fn symlink(&self, target: &Path, link: &Path) -> VfsResult<()> {
        let c_target = c_path(target)?;
        let c_link = c_path(link)?;

        let result = unsafe { libc::symlink(c_target.as_ptr(), c_link.as_ptr()) };

        if result < 0 {
            Err(VfsError::from_errno(last_errno(), "symlink", link))
        } else {
            Ok(())
        }
    }

    fn read_link(&self, link: &Path) -> VfsResult<PathBuf> {
        std::fs::read_link(link).map_err(|e| VfsError::from_io(e, link))
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        let c_path = c_path(path)?;

        let result = unsafe { libc::unlink(c_path.as_ptr()) };

        if result < 0 {
            Err(VfsError::from_errno(last_errno(), "unlink", path))
        } else {
            Ok(())
        }
    }

    fn lstat(&self, path: &Path) -> VfsResult<FileKind> {
        self.stat_internal(path, false)
    }

    fn stat(&self, path: &Path) -> VfsResult<FileKind> {
        self.stat_internal(path, true)
    }

    fn read_dir(&self, path: &Path) -> VfsResult<Vec<String>> {
        let entries = std::fs::read_dir(path).map_err(|e| VfsError::from_io(e, path))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| VfsError::from_io(e, path))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn FileHandle>> {
        let flags = libc::O_CREAT | libc::O_RDWR | libc::O_TRUNC;
        let mode = 0o600;

        let fd = self.open_file_internal(path, flags, mode)?;
        Ok(Box::new(LocalFileHandle::new(fd)))
    }

    fn open_file(&self, path: &Path) -> VfsResult<Box<dyn FileHandle>> {
        let fd = self.open_file_internal(path, libc::O_RDWR, 0)?;
        Ok(Box::new(LocalFileHandle::new(fd)))
    }

    fn truncate(&self, path: &Path, length: u64) -> VfsResult<()> {
        let c_path = c_path(path)?;

        let result = unsafe { libc::truncate(c_path.as_ptr(), length as off_t) };

        if result < 0 {
            Err(VfsError::from_errno(last_errno(), "truncate", path))
        } else {
            Ok(())
        }
    }
}
