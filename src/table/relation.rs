//! Relation structure for storing pg_class metadata

use crate::catalog::store::{escape_field, parse_oid, unescape_field, CatalogRow};
use crate::catalog::{CatalogError, CatalogResult};
use crate::types::{
    CatalogKind, DatabaseId, NamespaceKind, Oid, Persistence, RelFileLocator, RelKind, RelationId,
    RoleId, TablespaceId, INVALID_OID,
};
use std::fmt;

/// Relation metadata structure
///
/// Stores the subset of pg_class the tablespace subsystem cares about:
/// - tablespace: where the relation's file lives, `0` meaning the database default
/// - relfilenode: file name inside the per-database directory
/// - shared: lives in the global tablespace and belongs to no database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub oid: RelationId,
    pub name: String,
    pub namespace: NamespaceKind,
    pub kind: RelKind,
    pub owner: RoleId,
    pub database: DatabaseId,
    pub tablespace: TablespaceId,
    pub shared: bool,
    pub relfilenode: Oid,
    pub persistence: Persistence,
}

impl Relation {
    /// `schema.name` for messages
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace.name(), self.name)
    }

    pub fn is_temp(&self) -> bool {
        self.persistence == Persistence::Temporary || self.namespace == NamespaceKind::Temp
    }

    /// Whether the relation owns a file at all
    pub fn has_storage(&self) -> bool {
        self.kind.has_storage()
    }

    /// Tablespace the file actually lives in, given the database default
    pub fn effective_tablespace(&self, database_tablespace: TablespaceId) -> TablespaceId {
        if self.tablespace == INVALID_OID {
            database_tablespace
        } else {
            self.tablespace
        }
    }

    pub fn locator(&self, database_tablespace: TablespaceId) -> RelFileLocator {
        RelFileLocator::new(
            self.effective_tablespace(database_tablespace),
            self.database,
            self.relfilenode,
        )
    }
}

/// Unique key: one name per schema per database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationKey {
    pub database: DatabaseId,
    pub namespace: NamespaceKind,
    pub name: String,
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace.name(), self.name)
    }
}

fn parse_namespace(s: &str) -> CatalogResult<NamespaceKind> {
    match s {
        "User" => Ok(NamespaceKind::User),
        "System" => Ok(NamespaceKind::System),
        "Toast" => Ok(NamespaceKind::Toast),
        "Temp" => Ok(NamespaceKind::Temp),
        _ => Err(CatalogError::ParseError(format!("Unknown namespace: {}", s))),
    }
}

fn parse_kind(s: &str) -> CatalogResult<RelKind> {
    match s {
        "Table" => Ok(RelKind::Table),
        "Index" => Ok(RelKind::Index),
        "MaterializedView" => Ok(RelKind::MaterializedView),
        "View" => Ok(RelKind::View),
        "Sequence" => Ok(RelKind::Sequence),
        "Toast" => Ok(RelKind::Toast),
        _ => Err(CatalogError::ParseError(format!("Unknown relkind: {}", s))),
    }
}

fn parse_persistence(s: &str) -> CatalogResult<Persistence> {
    match s {
        "Permanent" => Ok(Persistence::Permanent),
        "Unlogged" => Ok(Persistence::Unlogged),
        "Temporary" => Ok(Persistence::Temporary),
        _ => Err(CatalogError::ParseError(format!("Unknown persistence: {}", s))),
    }
}

impl CatalogRow for Relation {
    const KIND: CatalogKind = CatalogKind::Relation;

    type Key = RelationKey;

    fn oid(&self) -> Oid {
        self.oid
    }

    fn key(&self) -> RelationKey {
        RelationKey {
            database: self.database,
            namespace: self.namespace,
            name: self.name.clone(),
        }
    }

    fn encode(&self) -> String {
        format!(
            "{}|{}|{:?}|{}|{:?}|{}|{}|{}|{}|{:?}",
            self.oid,
            self.database,
            self.namespace,
            escape_field(&self.name),
            self.kind,
            self.owner,
            self.tablespace,
            self.shared,
            self.relfilenode,
            self.persistence
        )
    }

    fn decode(line: &str) -> CatalogResult<Self> {
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 10 {
            return Err(CatalogError::ParseError(format!(
                "Invalid pg_class row: {}",
                line
            )));
        }

        Ok(Self {
            oid: parse_oid(parts[0])?,
            database: parse_oid(parts[1])?,
            namespace: parse_namespace(parts[2])?,
            name: unescape_field(parts[3])?,
            kind: parse_kind(parts[4])?,
            owner: parse_oid(parts[5])?,
            tablespace: parse_oid(parts[6])?,
            shared: parts[7] == "true",
            relfilenode: parse_oid(parts[8])?,
            persistence: parse_persistence(parts[9])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_TABLESPACE_OID;

    fn sample() -> Relation {
        Relation {
            oid: 16390,
            name: "t".to_string(),
            namespace: NamespaceKind::User,
            kind: RelKind::Table,
            owner: 10,
            database: 5,
            tablespace: 16384,
            shared: false,
            relfilenode: 16390,
            persistence: Persistence::Permanent,
        }
    }

    #[test]
    fn test_relation_row_format() {
        let rel = sample();
        let line = rel.encode();
        assert_eq!(line, "16390|5|User|t|Table|10|16384|false|16390|Permanent");
        assert_eq!(Relation::decode(&line).unwrap(), rel);
        assert!(Relation::decode("16390|5|User").is_err());
    }

    #[test]
    fn test_relation_effective_tablespace() {
        let mut rel = sample();
        assert_eq!(rel.effective_tablespace(DEFAULT_TABLESPACE_OID), 16384);
        rel.tablespace = INVALID_OID;
        assert_eq!(
            rel.effective_tablespace(DEFAULT_TABLESPACE_OID),
            DEFAULT_TABLESPACE_OID
        );
        assert_eq!(rel.qualified_name(), "public.t");
    }
}
