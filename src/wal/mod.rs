//! Write-ahead log
//!
//! Only what the tablespace subsystem needs: an append-only record file with
//! checksummed frames, the encoding of the two tablespace record types and
//! the relation file records replayed alongside them.

pub mod error;
pub mod record;
pub mod smgr;
pub mod writer;

pub use error::{WalError, WalResult};
pub use record::{
    decode_create, decode_drop, encode_create, encode_drop, TablespaceWalRecord, RM_TBLSPC_ID,
    XLOG_TBLSPC_CREATE, XLOG_TBLSPC_DROP,
};
pub use smgr::{SmgrWalRecord, RM_SMGR_ID, XLOG_SMGR_CREATE, XLOG_SMGR_UNLINK, XLOG_SMGR_WRITE};
pub use writer::{WalRecord, WalSink, WalWriter};
