//! Heavyweight lock manager
//!
//! Transaction-scoped locks on relations and on individual catalog rows.
//! A lock is owned by a transaction id, is re-entrant for its owner and is
//! only given back by [`LockManager::release_all`] at transaction end.
//!
//! The lock table is split into partitions selected by an xxh64 hash of the
//! tag, so unrelated tags never contend on the same mutex.

use crate::infrastructure::hash::{hash_bytes, partition_for};
use crate::types::{CatalogKind, DatabaseId, Oid, RelationId, TransactionId};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

pub mod error;
pub use error::{LockError, LockResult};

/// Number of lock table partitions (power of two)
pub const NUM_LOCK_PARTITIONS: usize = 16;

/// What a lock protects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTag {
    /// A relation of a database
    Relation {
        database: DatabaseId,
        relation: RelationId,
    },
    /// A single catalog row, used as an advisory lock on objects that have no
    /// lock of their own (tablespaces)
    CatalogRow { catalog: CatalogKind, row: Oid },
}

impl LockTag {
    pub fn relation(database: DatabaseId, relation: RelationId) -> Self {
        LockTag::Relation { database, relation }
    }

    pub fn tablespace(id: Oid) -> Self {
        LockTag::CatalogRow {
            catalog: CatalogKind::Tablespace,
            row: id,
        }
    }

    fn hash_code(&self) -> u64 {
        let mut buf = [0u8; 9];
        match self {
            LockTag::Relation { database, relation } => {
                buf[0] = 1;
                buf[1..5].copy_from_slice(&database.to_le_bytes());
                buf[5..9].copy_from_slice(&relation.to_le_bytes());
            }
            LockTag::CatalogRow { catalog, row } => {
                buf[0] = 2 + *catalog as u8;
                buf[5..9].copy_from_slice(&row.to_le_bytes());
            }
        }
        hash_bytes(&buf)
    }
}

impl fmt::Display for LockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTag::Relation { database, relation } => {
                write!(f, "relation {} of database {}", relation, database)
            }
            LockTag::CatalogRow { catalog, row } => write!(f, "row {} of {}", row, catalog),
        }
    }
}

/// Lock modes, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockMode {
    /// Readers of a relation
    AccessShare,
    /// Holders of a resolved reference to a catalog row
    KeyShare,
    /// In-place row update that leaves the key alone (rename, options)
    NoKeyExclusive,
    /// Row delete
    Exclusive,
    /// Relation rewrite or drop
    AccessExclusive,
}

impl LockMode {
    pub fn conflicts_with(self, other: LockMode) -> bool {
        use LockMode::*;
        match self {
            AccessShare => other == AccessExclusive,
            KeyShare => matches!(other, Exclusive | AccessExclusive),
            NoKeyExclusive => matches!(other, NoKeyExclusive | Exclusive | AccessExclusive),
            Exclusive => other != AccessShare,
            AccessExclusive => true,
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockMode::AccessShare => "AccessShareLock",
            LockMode::KeyShare => "KeyShareLock",
            LockMode::NoKeyExclusive => "NoKeyExclusiveLock",
            LockMode::Exclusive => "ExclusiveLock",
            LockMode::AccessExclusive => "AccessExclusiveLock",
        };
        f.write_str(name)
    }
}

/// How to behave when the lock is not immediately available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
    /// Wait, optionally bounded
    Block(Option<Duration>),
    /// Fail at once
    NoWait,
}

#[derive(Default)]
struct LockEntry {
    holders: HashMap<TransactionId, HashSet<LockMode>>,
}

impl LockEntry {
    fn conflicts(&self, xid: TransactionId, mode: LockMode) -> bool {
        self.holders.iter().any(|(holder, modes)| {
            *holder != xid && modes.iter().any(|held| mode.conflicts_with(*held))
        })
    }
}

#[derive(Default)]
struct LockPartition {
    table: Mutex<HashMap<LockTag, LockEntry>>,
    released: Condvar,
}

pub struct LockManager {
    partitions: Vec<LockPartition>,
    owned: Mutex<HashMap<TransactionId, HashSet<LockTag>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            partitions: (0..NUM_LOCK_PARTITIONS)
                .map(|_| LockPartition::default())
                .collect(),
            owned: Mutex::new(HashMap::new()),
        }
    }

    fn partition(&self, tag: &LockTag) -> &LockPartition {
        &self.partitions[partition_for(tag.hash_code(), NUM_LOCK_PARTITIONS)]
    }

    /// Acquire `mode` on `tag` for transaction `xid`
    pub fn acquire(
        &self,
        xid: TransactionId,
        tag: LockTag,
        mode: LockMode,
        wait: LockWait,
    ) -> LockResult<()> {
        let partition = self.partition(&tag);
        let mut table = partition.table.lock();

        let deadline = match wait {
            LockWait::Block(Some(timeout)) => Some(Instant::now() + timeout),
            _ => None,
        };

        loop {
            let conflicting = table
                .get(&tag)
                .is_some_and(|entry| entry.conflicts(xid, mode));
            if !conflicting {
                break;
            }
            match (wait, deadline) {
                (LockWait::NoWait, _) => return Err(LockError::NotAvailable(tag)),
                (LockWait::Block(_), Some(deadline)) => {
                    log::debug!("xid {} waiting for {} on {}", xid, mode, tag);
                    if partition
                        .released
                        .wait_until(&mut table, deadline)
                        .timed_out()
                        && table
                            .get(&tag)
                            .is_some_and(|entry| entry.conflicts(xid, mode))
                    {
                        return Err(LockError::Timeout(tag));
                    }
                }
                (LockWait::Block(_), None) => {
                    log::debug!("xid {} waiting for {} on {}", xid, mode, tag);
                    partition.released.wait(&mut table);
                }
            }
        }

        table
            .entry(tag)
            .or_default()
            .holders
            .entry(xid)
            .or_default()
            .insert(mode);
        drop(table);

        self.owned.lock().entry(xid).or_default().insert(tag);
        Ok(())
    }

    /// Release every lock held by `xid`
    pub fn release_all(&self, xid: TransactionId) {
        let tags = match self.owned.lock().remove(&xid) {
            Some(tags) => tags,
            None => return,
        };

        for tag in tags {
            let partition = self.partition(&tag);
            let mut table = partition.table.lock();
            if let Some(entry) = table.get_mut(&tag) {
                entry.holders.remove(&xid);
                if entry.holders.is_empty() {
                    table.remove(&tag);
                }
            }
            partition.released.notify_all();
        }
    }

    /// Whether `xid` holds `mode` (or something stronger) on `tag`
    pub fn holds(&self, xid: TransactionId, tag: &LockTag, mode: LockMode) -> bool {
        let table = self.partition(tag).table.lock();
        table
            .get(tag)
            .and_then(|entry| entry.holders.get(&xid))
            .is_some_and(|modes| modes.iter().any(|held| *held >= mode))
    }

    /// Transactions currently holding any lock on `tag`
    pub fn holders(&self, tag: &LockTag) -> Vec<(TransactionId, LockMode)> {
        let table = self.partition(tag).table.lock();
        let mut holders: Vec<_> = table
            .get(tag)
            .map(|entry| {
                entry
                    .holders
                    .iter()
                    .flat_map(|(xid, modes)| modes.iter().map(move |mode| (*xid, *mode)))
                    .collect()
            })
            .unwrap_or_default();
        holders.sort();
        holders
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
