//! Relation file WAL records
//!
//! Payload layouts (little endian):
//!
//! ```text
//! XLOG_SMGR_CREATE  spc: u32 | db: u32 | relfilenode: u32
//! XLOG_SMGR_WRITE   spc: u32 | db: u32 | relfilenode: u32 | offset: u64 | data
//! XLOG_SMGR_UNLINK  spc: u32 | db: u32 | relfilenode: u32
//! ```
//!
//! A write carries the absolute offset it was made at, so replaying it twice
//! leaves the file as replaying it once.

use crate::types::RelFileLocator;
use crate::wal::error::{WalError, WalResult};

/// Resource manager id of relation storage
pub const RM_SMGR_ID: u8 = 2;

pub const XLOG_SMGR_CREATE: u8 = 0x10;
pub const XLOG_SMGR_WRITE: u8 = 0x20;
pub const XLOG_SMGR_UNLINK: u8 = 0x30;

const LOCATOR_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmgrWalRecord {
    Create { locator: RelFileLocator },
    Write { locator: RelFileLocator, offset: u64, data: Vec<u8> },
    Unlink { locator: RelFileLocator },
}

impl SmgrWalRecord {
    pub fn info(&self) -> u8 {
        match self {
            SmgrWalRecord::Create { .. } => XLOG_SMGR_CREATE,
            SmgrWalRecord::Write { .. } => XLOG_SMGR_WRITE,
            SmgrWalRecord::Unlink { .. } => XLOG_SMGR_UNLINK,
        }
    }

    pub fn locator(&self) -> RelFileLocator {
        match self {
            SmgrWalRecord::Create { locator }
            | SmgrWalRecord::Write { locator, .. }
            | SmgrWalRecord::Unlink { locator } => *locator,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LOCATOR_LEN);
        let locator = self.locator();
        buf.extend_from_slice(&locator.spc.to_le_bytes());
        buf.extend_from_slice(&locator.db.to_le_bytes());
        buf.extend_from_slice(&locator.relfilenode.to_le_bytes());
        if let SmgrWalRecord::Write { offset, data, .. } = self {
            buf.extend_from_slice(&offset.to_le_bytes());
            buf.extend_from_slice(data);
        }
        buf
    }

    pub fn decode(rmid: u8, info: u8, payload: &[u8]) -> WalResult<Self> {
        if rmid != RM_SMGR_ID {
            return Err(WalError::UnknownRecord { rmid, info });
        }
        let locator = decode_locator(payload)?;
        let rest = &payload[LOCATOR_LEN..];
        match info {
            XLOG_SMGR_CREATE => Ok(SmgrWalRecord::Create { locator }),
            XLOG_SMGR_UNLINK => Ok(SmgrWalRecord::Unlink { locator }),
            XLOG_SMGR_WRITE => {
                let offset: [u8; 8] = rest
                    .get(..8)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| WalError::Corrupt("write record has no offset".to_string()))?;
                Ok(SmgrWalRecord::Write {
                    locator,
                    offset: u64::from_le_bytes(offset),
                    data: rest[8..].to_vec(),
                })
            }
            _ => Err(WalError::UnknownRecord { rmid, info }),
        }
    }
}

fn decode_locator(payload: &[u8]) -> WalResult<RelFileLocator> {
    if payload.len() < LOCATOR_LEN {
        return Err(WalError::Corrupt(format!(
            "relation record has {} bytes, expected at least {}",
            payload.len(),
            LOCATOR_LEN
        )));
    }
    let word = |at: usize| u32::from_le_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]]);
    Ok(RelFileLocator::new(word(0), word(4), word(8)))
}
