//! Transactional row store backing every catalog
//!
//! Committed rows live in a shared map. A transaction never touches that map
//! directly: its inserts, updates and deletes accumulate in a private
//! [`WriteSet`] that overlays the committed rows for the transaction's own
//! reads and is applied atomically at commit. Unique keys claimed by an
//! in-flight write set are reserved so a concurrent transaction cannot claim
//! the same key.
//!
//! A store may be backed by a file (`# <catalog> next_oid=<n>` header, then one
//! pipe-separated row per line), rewritten atomically on every commit.

use crate::catalog::error::{CatalogError, CatalogResult};
use crate::types::{CatalogKind, Oid, TransactionId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::hash::Hash;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A row type stored in a catalog
pub trait CatalogRow: Clone + fmt::Debug + Send + Sync + 'static {
    /// Which catalog this row belongs to
    const KIND: CatalogKind;

    /// Unique key besides the oid
    type Key: Clone + Eq + Hash + fmt::Display + Send + Sync;

    fn oid(&self) -> Oid;

    fn key(&self) -> Self::Key;

    /// One-line persistent representation
    fn encode(&self) -> String;

    fn decode(line: &str) -> CatalogResult<Self>;
}

/// Uncommitted changes of one transaction against one catalog
#[derive(Debug)]
pub struct WriteSet<R: CatalogRow> {
    /// `Some` holds the new row version, `None` marks a delete
    changes: BTreeMap<Oid, Option<R>>,
    reserved: Vec<R::Key>,
}

impl<R: CatalogRow> Default for WriteSet<R> {
    fn default() -> Self {
        Self {
            changes: BTreeMap::new(),
            reserved: Vec::new(),
        }
    }
}

impl<R: CatalogRow> WriteSet<R> {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

pub struct CatalogStore<R: CatalogRow> {
    path: Option<PathBuf>,
    rows: RwLock<BTreeMap<Oid, R>>,
    next_oid: Mutex<Oid>,
    reserved_keys: Mutex<HashMap<R::Key, TransactionId>>,
}

impl<R: CatalogRow> CatalogStore<R> {
    const HEADER_PREFIX: &'static str = "# ";

    /// A store that is never written to disk
    pub fn in_memory(first_oid: Oid) -> Self {
        Self {
            path: None,
            rows: RwLock::new(BTreeMap::new()),
            next_oid: Mutex::new(first_oid),
            reserved_keys: Mutex::new(HashMap::new()),
        }
    }

    /// Open a file-backed store, loading the file when it exists
    pub fn open(path: impl AsRef<Path>, first_oid: Oid) -> CatalogResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut rows = BTreeMap::new();
        let mut next_oid = first_oid;

        if path.exists() {
            let reader = BufReader::new(fs::File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                if let Some(header) = line.strip_prefix(Self::HEADER_PREFIX) {
                    next_oid = next_oid.max(Self::parse_header(header)?);
                    continue;
                }
                let row = R::decode(&line)?;
                next_oid = next_oid.max(row.oid().saturating_add(1));
                rows.insert(row.oid(), row);
            }
            log::debug!("loaded {} rows from {}", rows.len(), path.display());
        }

        Ok(Self {
            path: Some(path),
            rows: RwLock::new(rows),
            next_oid: Mutex::new(next_oid),
            reserved_keys: Mutex::new(HashMap::new()),
        })
    }

    fn parse_header(header: &str) -> CatalogResult<Oid> {
        let value = header
            .split_whitespace()
            .find_map(|part| part.strip_prefix("next_oid="))
            .ok_or_else(|| CatalogError::ParseError(format!("Invalid header: {}", header)))?;
        value
            .parse::<Oid>()
            .map_err(|e| CatalogError::ParseError(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    pub fn allocate_oid(&self) -> Oid {
        let mut next = self.next_oid.lock();
        let oid = *next;
        *next += 1;
        oid
    }

    /// Make sure `oid` is never handed out by [`Self::allocate_oid`]
    pub fn advance_oid_past(&self, oid: Oid) {
        let mut next = self.next_oid.lock();
        if oid >= *next {
            *next = oid + 1;
        }
    }

    pub fn peek_next_oid(&self) -> Oid {
        *self.next_oid.lock()
    }

    /// Row as seen by the owner of `ws`
    pub fn get(&self, ws: &WriteSet<R>, oid: Oid) -> Option<R> {
        match ws.changes.get(&oid) {
            Some(change) => change.clone(),
            None => self.rows.read().get(&oid).cloned(),
        }
    }

    /// Row as seen by everybody
    pub fn get_committed(&self, oid: Oid) -> Option<R> {
        self.rows.read().get(&oid).cloned()
    }

    /// All rows visible to the owner of `ws` matching `pred`, in oid order
    pub fn scan(&self, ws: &WriteSet<R>, pred: impl Fn(&R) -> bool) -> Vec<R> {
        let rows = self.rows.read();
        let mut merged: BTreeMap<Oid, &R> = rows.iter().map(|(oid, row)| (*oid, row)).collect();
        for (oid, change) in &ws.changes {
            match change {
                Some(row) => {
                    merged.insert(*oid, row);
                }
                None => {
                    merged.remove(oid);
                }
            }
        }
        merged
            .into_values()
            .filter(|row| pred(row))
            .cloned()
            .collect()
    }

    pub fn find_by_key(&self, ws: &WriteSet<R>, key: &R::Key) -> Option<R> {
        self.scan(ws, |row| row.key() == *key).into_iter().next()
    }

    fn reserve_key(&self, ws: &mut WriteSet<R>, xid: TransactionId, key: R::Key) -> CatalogResult<()> {
        let mut reserved = self.reserved_keys.lock();
        match reserved.get(&key) {
            Some(owner) if *owner != xid => Err(CatalogError::DuplicateKey {
                catalog: R::KIND,
                key: key.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                reserved.insert(key.clone(), xid);
                ws.reserved.push(key);
                Ok(())
            }
        }
    }

    pub fn insert(&self, ws: &mut WriteSet<R>, xid: TransactionId, row: R) -> CatalogResult<()> {
        let key = row.key();
        if self.find_by_key(ws, &key).is_some() {
            return Err(CatalogError::DuplicateKey {
                catalog: R::KIND,
                key: key.to_string(),
            });
        }
        if self.get(ws, row.oid()).is_some() {
            return Err(CatalogError::DuplicateKey {
                catalog: R::KIND,
                key: format!("oid {}", row.oid()),
            });
        }
        self.reserve_key(ws, xid, key)?;
        self.advance_oid_past(row.oid());
        ws.changes.insert(row.oid(), Some(row));
        Ok(())
    }

    pub fn update(&self, ws: &mut WriteSet<R>, xid: TransactionId, row: R) -> CatalogResult<()> {
        let current = self.get(ws, row.oid()).ok_or_else(|| CatalogError::NotFound {
            catalog: R::KIND,
            key: format!("oid {}", row.oid()),
        })?;

        let key = row.key();
        if current.key() != key {
            let taken = self
                .find_by_key(ws, &key)
                .is_some_and(|other| other.oid() != row.oid());
            if taken {
                return Err(CatalogError::DuplicateKey {
                    catalog: R::KIND,
                    key: key.to_string(),
                });
            }
            self.reserve_key(ws, xid, key)?;
        }
        ws.changes.insert(row.oid(), Some(row));
        Ok(())
    }

    pub fn delete(&self, ws: &mut WriteSet<R>, oid: Oid) -> CatalogResult<R> {
        let current = self.get(ws, oid).ok_or_else(|| CatalogError::NotFound {
            catalog: R::KIND,
            key: format!("oid {}", oid),
        })?;
        ws.changes.insert(oid, None);
        Ok(current)
    }

    /// Apply `ws` to the committed rows, persisting them first
    ///
    /// Uniqueness is checked again against the committed state; a violation
    /// leaves the committed rows untouched.
    pub fn commit(&self, ws: &mut WriteSet<R>, xid: TransactionId) -> CatalogResult<()> {
        let changes = std::mem::take(&mut ws.changes);
        let result = if changes.is_empty() {
            Ok(())
        } else {
            self.apply(changes)
        };
        self.release_keys(ws, xid);
        result
    }

    fn apply(&self, changes: BTreeMap<Oid, Option<R>>) -> CatalogResult<()> {
        let mut rows = self.rows.write();
        let mut next = rows.clone();

        for (oid, change) in &changes {
            match change {
                Some(row) => {
                    next.insert(*oid, row.clone());
                }
                None => {
                    next.remove(oid);
                }
            }
        }

        for row in changes.values().flatten() {
            let key = row.key();
            let clash = next
                .values()
                .any(|other| other.oid() != row.oid() && other.key() == key);
            if clash {
                return Err(CatalogError::DuplicateKey {
                    catalog: R::KIND,
                    key: key.to_string(),
                });
            }
        }

        self.persist(&next)?;
        *rows = next;
        Ok(())
    }

    /// Throw `ws` away
    pub fn abort(&self, ws: &mut WriteSet<R>, xid: TransactionId) {
        ws.changes.clear();
        self.release_keys(ws, xid);
    }

    fn release_keys(&self, ws: &mut WriteSet<R>, xid: TransactionId) {
        if ws.reserved.is_empty() {
            return;
        }
        let mut reserved = self.reserved_keys.lock();
        for key in ws.reserved.drain(..) {
            if reserved.get(&key) == Some(&xid) {
                reserved.remove(&key);
            }
        }
    }

    /// Write the committed rows directly, bypassing transactions
    pub fn bootstrap(&self, rows: Vec<R>) -> CatalogResult<()> {
        let mut current = self.rows.write();
        let mut next = current.clone();
        for row in rows {
            next.insert(row.oid(), row);
        }
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    fn persist(&self, rows: &BTreeMap<Oid, R>) -> CatalogResult<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        let mut content = format!(
            "{}{} next_oid={}\n",
            Self::HEADER_PREFIX,
            R::KIND,
            self.peek_next_oid()
        );
        for row in rows.values() {
            content.push_str(&row.encode());
            content.push('\n');
        }

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Escape the separators used by the row format
pub fn escape_field(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' | '|' | ',' | '=' | '\n' => out.push_str(&format!("%{:02X}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape_field(value: &str) -> CatalogResult<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let hex: String = chars.by_ref().take(2).collect();
        let code = u8::from_str_radix(&hex, 16)
            .map_err(|_| CatalogError::ParseError(format!("bad escape in {:?}", value)))?;
        out.push(code as char);
    }
    Ok(out)
}

/// Parse an oid column
pub fn parse_oid(field: &str) -> CatalogResult<Oid> {
    field
        .parse::<Oid>()
        .map_err(|e| CatalogError::ParseError(e.to_string()))
}
