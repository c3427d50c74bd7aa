//! Session state
//!
//! A [`Session`] is the explicit context every tablespace operation runs in:
//! the acting role, the connected database, the session-level settings and the
//! open transaction, if any. Nothing here is process-global.

use crate::types::{
    DatabaseId, RoleId, TablespaceId, DEFAULT_TABLESPACE_OID, NAMEDATALEN,
};
use crate::xact::Transaction;
use std::collections::HashMap;

/// Where a setting value comes from, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GucSource {
    Default,
    File,
    Client,
    Interactive,
    /// Value is being tested, not applied; problems become notices
    Test,
    /// `SET` in the session
    Session,
}

/// Session-level settings that influence tablespace choice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    /// Tablespace new objects go to when none is named; empty means the
    /// database default
    pub default_tablespace: String,
    /// Comma separated list used round-robin for temporary objects
    pub temp_tablespaces: String,
    /// Lift the reserved-name and system-schema restrictions
    pub allow_system_table_mods: bool,
}

pub struct Session {
    pub role: RoleId,
    pub database: DatabaseId,
    /// Default tablespace of `database`
    pub database_tablespace: TablespaceId,
    pub settings: SessionSettings,
    notices: Vec<String>,
    preassigned_oids: HashMap<String, TablespaceId>,
    pub(crate) txn: Option<Transaction>,
}

impl Session {
    pub fn new(role: RoleId, database: DatabaseId) -> Self {
        Self {
            role,
            database,
            database_tablespace: DEFAULT_TABLESPACE_OID,
            settings: SessionSettings::default(),
            notices: Vec::new(),
            preassigned_oids: HashMap::new(),
            txn: None,
        }
    }

    pub fn with_database_tablespace(mut self, tablespace: TablespaceId) -> Self {
        self.database_tablespace = tablespace;
        self
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Queue a NOTICE for the client
    pub fn notice(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("NOTICE: {}", message);
        self.notices.push(message);
    }

    /// Drain the queued notices
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.txn.as_ref()
    }

    /// Use `oid` for the next tablespace created as `name`
    pub fn preassign_tablespace_oid(&mut self, oid: TablespaceId, name: &str) {
        self.preassigned_oids.insert(name.to_string(), oid);
    }

    pub(crate) fn take_preassigned_oid(&mut self, name: &str) -> Option<TablespaceId> {
        self.preassigned_oids.remove(name)
    }
}

/// Split a comma separated list of identifiers
///
/// Names may be double quoted (`""` inside quotes is a literal quote); unquoted
/// names are lower-cased. Over-long names are truncated. Returns `None` on bad
/// syntax; a quoted empty name is allowed and yields an empty string.
pub fn split_identifier_string(raw: &str) -> Option<Vec<String>> {
    let chars: Vec<char> = raw.chars().collect();
    let mut names = Vec::new();
    let mut pos = 0;

    let skip_whitespace = |pos: &mut usize| {
        while *pos < chars.len() && chars[*pos].is_whitespace() {
            *pos += 1;
        }
    };

    skip_whitespace(&mut pos);
    if pos == chars.len() {
        return Some(names);
    }

    loop {
        let Some(&first) = chars.get(pos) else {
            return None;
        };
        let mut name = String::new();
        if first == '"' {
            pos += 1;
            loop {
                match chars.get(pos) {
                    None => return None,
                    Some('"') if chars.get(pos + 1) == Some(&'"') => {
                        name.push('"');
                        pos += 2;
                    }
                    Some('"') => {
                        pos += 1;
                        break;
                    }
                    Some(c) => {
                        name.push(*c);
                        pos += 1;
                    }
                }
            }
        } else {
            let start = pos;
            while pos < chars.len() && chars[pos] != ',' && !chars[pos].is_whitespace() {
                pos += 1;
            }
            if start == pos {
                return None;
            }
            name = chars[start..pos].iter().collect::<String>().to_lowercase();
        }

        skip_whitespace(&mut pos);
        if name.len() >= NAMEDATALEN {
            let mut end = NAMEDATALEN - 1;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }
        names.push(name);

        match chars.get(pos) {
            None => return Some(names),
            Some(',') => {
                pos += 1;
                skip_whitespace(&mut pos);
            }
            Some(_) => return None,
        }
    }
}
