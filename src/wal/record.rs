//! Tablespace WAL records
//!
//! Payload layouts (little endian):
//!
//! ```text
//! XLOG_TBLSPC_CREATE  ts_id: u32 | location bytes | 0x00
//! XLOG_TBLSPC_DROP    ts_id: u32
//! ```

use crate::types::TablespaceId;
use crate::wal::error::{WalError, WalResult};

/// Resource manager id of the tablespace subsystem
pub const RM_TBLSPC_ID: u8 = 5;

pub const XLOG_TBLSPC_CREATE: u8 = 0x00;
pub const XLOG_TBLSPC_DROP: u8 = 0x10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TablespaceWalRecord {
    Create { ts_id: TablespaceId, location: String },
    Drop { ts_id: TablespaceId },
}

impl TablespaceWalRecord {
    pub fn info(&self) -> u8 {
        match self {
            TablespaceWalRecord::Create { .. } => XLOG_TBLSPC_CREATE,
            TablespaceWalRecord::Drop { .. } => XLOG_TBLSPC_DROP,
        }
    }

    pub fn ts_id(&self) -> TablespaceId {
        match self {
            TablespaceWalRecord::Create { ts_id, .. } | TablespaceWalRecord::Drop { ts_id } => {
                *ts_id
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            TablespaceWalRecord::Create { ts_id, location } => encode_create(*ts_id, location),
            TablespaceWalRecord::Drop { ts_id } => encode_drop(*ts_id),
        }
    }

    pub fn decode(rmid: u8, info: u8, payload: &[u8]) -> WalResult<Self> {
        if rmid != RM_TBLSPC_ID {
            return Err(WalError::UnknownRecord { rmid, info });
        }
        match info {
            XLOG_TBLSPC_CREATE => {
                let (ts_id, location) = decode_create(payload)?;
                Ok(TablespaceWalRecord::Create { ts_id, location })
            }
            XLOG_TBLSPC_DROP => Ok(TablespaceWalRecord::Drop {
                ts_id: decode_drop(payload)?,
            }),
            _ => Err(WalError::UnknownRecord { rmid, info }),
        }
    }
}

pub fn encode_create(ts_id: TablespaceId, location: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + location.len() + 1);
    buf.extend_from_slice(&ts_id.to_le_bytes());
    buf.extend_from_slice(location.as_bytes());
    buf.push(0);
    buf
}

pub fn decode_create(payload: &[u8]) -> WalResult<(TablespaceId, String)> {
    let ts_id = read_ts_id(payload)?;
    let rest = &payload[4..];
    let end = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| WalError::Corrupt("create record location is not terminated".to_string()))?;
    let location = std::str::from_utf8(&rest[..end])
        .map_err(|e| WalError::Corrupt(format!("create record location: {}", e)))?;
    Ok((ts_id, location.to_string()))
}

pub fn encode_drop(ts_id: TablespaceId) -> Vec<u8> {
    ts_id.to_le_bytes().to_vec()
}

pub fn decode_drop(payload: &[u8]) -> WalResult<TablespaceId> {
    if payload.len() != 4 {
        return Err(WalError::Corrupt(format!(
            "drop record has {} bytes, expected 4",
            payload.len()
        )));
    }
    read_ts_id(payload)
}

fn read_ts_id(payload: &[u8]) -> WalResult<TablespaceId> {
    let bytes: [u8; 4] = payload
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| WalError::Corrupt("record shorter than a tablespace id".to_string()))?;
    Ok(TablespaceId::from_le_bytes(bytes))
}
