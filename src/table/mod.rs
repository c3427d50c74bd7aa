//! Relation module for managing pg_class metadata
//!
//! This module implements the relation side the tablespace subsystem works
//! against:
//! - Relation metadata (oid, schema, kind, owner, tablespace binding, relfilenode)
//! - Relation catalog with transactional lookups and tablespace scans
//! - Builder validating a relation before it is inserted

pub mod builder;
pub mod relation;
pub mod syscache;

pub use builder::RelationBuilder;
pub use relation::{Relation, RelationKey};
pub use syscache::RelationCatalog;
