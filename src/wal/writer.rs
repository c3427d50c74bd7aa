//! Append-only WAL file
//!
//! Frame layout, little endian:
//!
//! ```text
//! | len: u32 | rmid: u8 | info: u8 | payload: len bytes | crc32: u32 |
//! ```
//!
//! The CRC covers everything before it. A record's LSN is the byte offset of
//! its frame. Reading stops at the first torn or corrupt frame.

use crate::types::Lsn;
use crate::vfs::{FileHandle, VfsInterface};
use crate::wal::error::WalResult;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

const FRAME_HEADER: usize = 6;
const FRAME_TRAILER: usize = 4;

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub lsn: Lsn,
    pub rmid: u8,
    pub info: u8,
    pub payload: Vec<u8>,
}

/// WAL append primitive
pub trait WalSink: Send + Sync {
    /// Append a record, returning the position just past it
    fn append(&self, rmid: u8, info: u8, payload: &[u8]) -> WalResult<Lsn>;

    /// Make everything up to `upto` durable
    fn flush(&self, upto: Lsn) -> WalResult<()>;

    /// Position the next record will be written at
    fn end_lsn(&self) -> Lsn;
}

struct WalFile {
    handle: Box<dyn FileHandle>,
    end: Lsn,
    flushed: Lsn,
}

pub struct WalWriter {
    path: PathBuf,
    file: Mutex<WalFile>,
}

impl WalWriter {
    pub const DIR_NAME: &'static str = "pg_wal";
    pub const FILE_NAME: &'static str = "wal.log";

    /// Open (or create) `<data_root>/pg_wal/wal.log`, positioned after the
    /// last intact record
    pub fn open(vfs: &dyn VfsInterface, data_root: &Path) -> WalResult<Self> {
        let dir = data_root.join(Self::DIR_NAME);
        match vfs.create_dir(&dir, 0o700) {
            Err(err) if !err.is_already_exists() => return Err(err.into()),
            _ => {}
        }

        let path = dir.join(Self::FILE_NAME);
        let handle = match vfs.open_file(&path) {
            Ok(handle) => handle,
            Err(err) if err.is_not_found() => vfs.create_file(&path)?,
            Err(err) => return Err(err.into()),
        };

        let (records, end) = read_frames(handle.as_ref(), 0)?;
        let len = handle.len()?;
        if end < len {
            log::warn!(
                "discarding {} bytes of torn WAL at {} in \"{}\"",
                len - end,
                end,
                path.display()
            );
            vfs.truncate(&path, end)?;
        }
        log::debug!("opened WAL \"{}\" with {} records", path.display(), records.len());

        Ok(Self {
            path,
            file: Mutex::new(WalFile {
                handle,
                end,
                flushed: end,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every intact record at or after `start`
    pub fn read_from(&self, start: Lsn) -> WalResult<Vec<WalRecord>> {
        let file = self.file.lock();
        let (records, _) = read_frames(file.handle.as_ref(), start)?;
        Ok(records)
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.file.lock().flushed
    }
}

impl WalSink for WalWriter {
    fn append(&self, rmid: u8, info: u8, payload: &[u8]) -> WalResult<Lsn> {
        let mut frame = Vec::with_capacity(FRAME_HEADER + payload.len() + FRAME_TRAILER);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.push(rmid);
        frame.push(info);
        frame.extend_from_slice(payload);
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        let mut file = self.file.lock();
        let lsn = file.end;
        let mut written = 0;
        while written < frame.len() {
            written += file.handle.pwrite(&frame[written..], lsn + written as u64)?;
        }
        file.end = lsn + frame.len() as u64;
        log::trace!("WAL append rmgr {} info 0x{:02X} at {}", rmid, info, lsn);
        Ok(file.end)
    }

    fn flush(&self, upto: Lsn) -> WalResult<()> {
        let mut file = self.file.lock();
        if file.flushed >= upto {
            return Ok(());
        }
        file.handle.sync()?;
        file.flushed = file.end;
        Ok(())
    }

    fn end_lsn(&self) -> Lsn {
        self.file.lock().end
    }
}

/// Decode frames from `start`; returns them with the offset after the last good one
fn read_frames(handle: &dyn FileHandle, start: Lsn) -> WalResult<(Vec<WalRecord>, Lsn)> {
    let len = handle.len()?;
    let mut records = Vec::new();
    let mut pos = start;

    while pos + (FRAME_HEADER + FRAME_TRAILER) as u64 <= len {
        let mut header = [0u8; FRAME_HEADER];
        read_exact_at(handle, &mut header, pos)?;
        let payload_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let frame_len = FRAME_HEADER as u64 + payload_len + FRAME_TRAILER as u64;
        if pos + frame_len > len {
            log::warn!("WAL record at {} is truncated", pos);
            break;
        }

        let mut body = vec![0u8; frame_len as usize];
        read_exact_at(handle, &mut body, pos)?;
        let crc_at = body.len() - FRAME_TRAILER;
        let stored = u32::from_le_bytes([
            body[crc_at],
            body[crc_at + 1],
            body[crc_at + 2],
            body[crc_at + 3],
        ]);
        if crc32fast::hash(&body[..crc_at]) != stored {
            log::warn!("incorrect checksum in WAL record at {}", pos);
            break;
        }

        records.push(WalRecord {
            lsn: pos,
            rmid: header[4],
            info: header[5],
            payload: body[FRAME_HEADER..crc_at].to_vec(),
        });
        pos += frame_len;
    }

    Ok((records, pos))
}

fn read_exact_at(handle: &dyn FileHandle, buf: &mut [u8], offset: u64) -> WalResult<()> {
    let mut read = 0;
    while read < buf.len() {
        let n = handle.pread(&mut buf[read..], offset + read as u64)?;
        if n == 0 {
            break;
        }
        read += n;
    }
    Ok(())
}
