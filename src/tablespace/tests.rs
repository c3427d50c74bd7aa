use super::*;
use crate::acl::RoleRegistry;
use crate::lock::LockMode;
use crate::session::{GucSource, SessionSettings};
use crate::types::{Persistence, RelKind, BOOTSTRAP_SUPERUSER_ID, FIRST_NORMAL_OID, INVALID_OID};
use crate::wal::WalRecord;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tempfile::TempDir;

const DB: u32 = 16300;

struct TestNode {
    _temp_dir: TempDir,
    root: PathBuf,
    roles: Arc<RoleRegistry>,
    mgr: TablespaceManager,
}

impl TestNode {
    fn new() -> Self {
        Self::with_config(|config| config)
    }

    fn with_config(configure: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let roles = Arc::new(RoleRegistry::new());
        let config = configure(EngineConfig::utility(root.join("data")));
        let mgr = TablespaceManager::open(config, roles.clone()).unwrap();
        Self {
            _temp_dir: temp_dir,
            root,
            roles,
            mgr,
        }
    }

    /// An existing, empty directory to put a tablespace in
    fn location(&self, name: &str) -> String {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir.display().to_string()
    }

    fn create(&self, session: &mut Session, name: &str) -> TablespaceId {
        let location = self.location(name);
        self.mgr
            .create_tablespace(session, &CreateTablespaceStmt::new(name, location))
            .unwrap()
    }
}

fn superuser() -> Session {
    Session::new(BOOTSTRAP_SUPERUSER_ID, DB)
}

fn relation_tablespace(node: &TestNode, session: &Session, name: &str) -> TablespaceId {
    node.mgr.get_relation(session, name).unwrap().unwrap().tablespace
}

#[test]
fn test_create_tablespace_builds_directories() {
    let node = TestNode::new();
    let mut session = superuser();
    let location = node.location("ts1");

    let id = node
        .mgr
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", location.clone()))
        .unwrap();
    assert!(id >= FIRST_NORMAL_OID);
    assert!(!session.in_transaction());

    let layout = node.mgr.layout();
    assert!(layout.link_path(id).exists());
    assert!(Path::new(&location).join(layout.version_dir_name()).is_dir());
    assert_eq!(node.mgr.tablespace_location(id).unwrap(), location);
    assert_eq!(node.mgr.tablespace_location(DEFAULT_TABLESPACE_OID).unwrap(), "");

    assert_eq!(node.mgr.get_tablespace_oid(&mut session, "ts1", false).unwrap(), id);
    assert_eq!(node.mgr.get_tablespace_name(&session, id).as_deref(), Some("ts1"));
    assert_eq!(node.mgr.tablespace_count(), 3);
}

#[test]
fn test_create_tablespace_rejects_bad_input() {
    let node = TestNode::new();
    let mut session = superuser();
    let location = node.location("ts1");

    let relative = CreateTablespaceStmt::new("ts1", "relative/dir");
    assert!(matches!(
        node.mgr.create_tablespace(&mut session, &relative),
        Err(TablespaceError::InvalidPath(_))
    ));

    let quoted = CreateTablespaceStmt::new("ts1", format!("{}/it's", location));
    assert!(matches!(
        node.mgr.create_tablespace(&mut session, &quoted),
        Err(TablespaceError::InvalidPath(_))
    ));

    let reserved = CreateTablespaceStmt::new("pg_mine", location.clone());
    assert!(matches!(
        node.mgr.create_tablespace(&mut session, &reserved),
        Err(TablespaceError::ReservedName(_))
    ));

    let missing = CreateTablespaceStmt::new("ts1", format!("{}/nosuch", location));
    assert!(matches!(
        node.mgr.create_tablespace(&mut session, &missing),
        Err(TablespaceError::Filesystem { .. })
    ));

    let bad_option = CreateTablespaceStmt::new("ts1", location.clone()).option("fillfactor", "10");
    assert!(matches!(
        node.mgr.create_tablespace(&mut session, &bad_option),
        Err(TablespaceError::InvalidParameter(_))
    ));

    let alice = node.roles.create_role("alice", false);
    let mut alice_session = Session::new(alice, DB);
    assert!(matches!(
        node.mgr
            .create_tablespace(&mut alice_session, &CreateTablespaceStmt::new("ts1", location)),
        Err(TablespaceError::PermissionDenied(_))
    ));

    // nothing was recorded
    assert_eq!(node.mgr.tablespace_count(), 2);
    assert_eq!(node.mgr.get_tablespace_oid(&mut session, "ts1", true).unwrap(), INVALID_OID);
}

#[test]
fn test_create_tablespace_reserved_name_with_override() {
    let node = TestNode::new();
    let mut session = superuser().with_settings(SessionSettings {
        allow_system_table_mods: true,
        ..SessionSettings::default()
    });
    let location = node.location("pg_mine");
    node.mgr
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("pg_mine", location))
        .unwrap();
}

#[test]
fn test_create_tablespace_name_and_directory_conflicts() {
    let node = TestNode::new();
    let mut session = superuser();
    let location = node.location("ts1");
    node.mgr
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", location.clone()))
        .unwrap();

    assert!(matches!(
        node.mgr
            .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", node.location("other"))),
        Err(TablespaceError::AlreadyExists(_))
    ));
    assert!(matches!(
        node.mgr
            .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts2", location)),
        Err(TablespaceError::ObjectInUse(_))
    ));
    assert_eq!(node.mgr.tablespace_count(), 3);
}

#[test]
fn test_create_tablespace_owner_and_preassigned_oid() {
    let node = TestNode::new();
    let alice = node.roles.create_role("alice", false);
    let mut session = superuser();
    session.preassign_tablespace_oid(20000, "ts1");

    let stmt = CreateTablespaceStmt::new("ts1", node.location("ts1")).owner("alice");
    assert_eq!(node.mgr.create_tablespace(&mut session, &stmt).unwrap(), 20000);

    let row = node
        .mgr
        .list_tablespaces(&session)
        .into_iter()
        .find(|row| row.id == 20000)
        .unwrap();
    assert_eq!(row.owner, alice);

    let stmt = CreateTablespaceStmt::new("ts2", node.location("ts2")).owner("nobody");
    assert!(matches!(
        node.mgr.create_tablespace(&mut session, &stmt),
        Err(TablespaceError::RoleNotFound(_))
    ));
}

#[test]
fn test_create_and_drop_refused_in_transaction_block() {
    let node = TestNode::new();
    let mut session = superuser();
    node.create(&mut session, "ts1");

    node.mgr.begin(&mut session).unwrap();
    let stmt = CreateTablespaceStmt::new("ts2", node.location("ts2"));
    assert!(matches!(
        node.mgr.create_tablespace(&mut session, &stmt),
        Err(TablespaceError::InvalidTransactionState(_))
    ));
    let drop = DropTablespaceStmt {
        name: "ts1".to_string(),
        missing_ok: false,
    };
    assert!(matches!(
        node.mgr.drop_tablespace(&mut session, &drop),
        Err(TablespaceError::InvalidTransactionState(_))
    ));
    // refused before anything ran; the block stays open
    assert!(session.in_transaction());
    node.mgr.commit(&mut session).unwrap();
}

#[test]
fn test_abort_removes_created_directories() {
    let node = TestNode::new();
    let mut session = superuser();
    let location = node.location("ts1");

    node.mgr.start_transaction(&mut session, false).unwrap();
    let id = node
        .mgr
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", location.clone()))
        .unwrap();
    assert!(node.mgr.layout().link_path(id).exists());
    node.mgr.abort(&mut session);

    assert!(std::fs::symlink_metadata(node.mgr.layout().link_path(id)).is_err());
    assert!(!Path::new(&location)
        .join(node.mgr.layout().version_dir_name())
        .exists());
    assert_eq!(node.mgr.get_tablespace_oid(&mut session, "ts1", true).unwrap(), INVALID_OID);

    // the location is free again
    node.mgr
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", location))
        .unwrap();
}

#[test]
fn test_drop_tablespace_not_empty_then_empty() {
    let node = TestNode::new();
    let mut session = superuser();
    let id = node.create(&mut session, "ts1");

    node.mgr
        .create_relation(&mut session, &CreateRelationStmt::table("t").tablespace("ts1"))
        .unwrap();
    let size = node
        .mgr
        .insert_rows(&mut session, "t", &[b"row one".as_slice(), b"row two".as_slice()])
        .unwrap();
    assert_eq!(size, 14);

    let drop = DropTablespaceStmt {
        name: "ts1".to_string(),
        missing_ok: false,
    };
    assert!(matches!(
        node.mgr.drop_tablespace(&mut session, &drop),
        Err(TablespaceError::NotEmpty(_))
    ));
    assert_eq!(node.mgr.get_tablespace_oid(&mut session, "ts1", false).unwrap(), id);

    node.mgr
        .drop_relation(
            &mut session,
            &DropRelationStmt {
                name: "t".to_string(),
                missing_ok: false,
            },
        )
        .unwrap();
    // the dropped file lingers until the checkpoint the drop requests
    node.mgr.drop_tablespace(&mut session, &drop).unwrap();

    assert_eq!(node.mgr.get_tablespace_oid(&mut session, "ts1", true).unwrap(), INVALID_OID);
    assert!(std::fs::symlink_metadata(node.mgr.layout().link_path(id)).is_err());
}

#[test]
fn test_drop_tablespace_missing_and_builtin() {
    let node = TestNode::new();
    let mut session = superuser();

    let missing = DropTablespaceStmt {
        name: "nosuch".to_string(),
        missing_ok: false,
    };
    assert!(matches!(
        node.mgr.drop_tablespace(&mut session, &missing),
        Err(TablespaceError::NotFound(_))
    ));

    let missing_ok = DropTablespaceStmt {
        missing_ok: true,
        ..missing
    };
    node.mgr.drop_tablespace(&mut session, &missing_ok).unwrap();
    assert_eq!(
        session.take_notices(),
        vec!["tablespace \"nosuch\" does not exist, skipping".to_string()]
    );

    let builtin = DropTablespaceStmt {
        name: "pg_default".to_string(),
        missing_ok: false,
    };
    assert!(matches!(
        node.mgr.drop_tablespace(&mut session, &builtin),
        Err(TablespaceError::ObjectInUse(_))
    ));
}

#[test]
fn test_drop_tablespace_requires_owner() {
    let node = TestNode::new();
    let alice = node.roles.create_role("alice", false);
    let mut session = superuser();
    node.create(&mut session, "ts1");

    let mut alice_session = Session::new(alice, DB);
    let drop = DropTablespaceStmt {
        name: "ts1".to_string(),
        missing_ok: false,
    };
    assert!(matches!(
        node.mgr.drop_tablespace(&mut alice_session, &drop),
        Err(TablespaceError::PermissionDenied(_))
    ));
}

#[test]
fn test_rename_tablespace() {
    let node = TestNode::new();
    let alice = node.roles.create_role("alice", false);
    let bob = node.roles.create_role("bob", false);
    let mut session = superuser();
    let id = node
        .mgr
        .create_tablespace(
            &mut session,
            &CreateTablespaceStmt::new("ts1", node.location("ts1")).owner("alice"),
        )
        .unwrap();
    node.create(&mut session, "other");

    let rename = |old: &str, new: &str| RenameStmt {
        old_name: old.to_string(),
        new_name: new.to_string(),
    };

    let mut bob_session = Session::new(bob, DB);
    assert!(matches!(
        node.mgr.rename_tablespace(&mut bob_session, &rename("ts1", "ts2")),
        Err(TablespaceError::PermissionDenied(_))
    ));

    let mut alice_session = Session::new(alice, DB);
    node.mgr
        .rename_tablespace(&mut alice_session, &rename("ts1", "ts2"))
        .unwrap();
    assert_eq!(node.mgr.get_tablespace_oid(&mut session, "ts1", true).unwrap(), INVALID_OID);
    assert_eq!(node.mgr.get_tablespace_oid(&mut session, "ts2", false).unwrap(), id);

    assert!(matches!(
        node.mgr.rename_tablespace(&mut alice_session, &rename("ts2", "other")),
        Err(TablespaceError::AlreadyExists(_))
    ));
    assert!(matches!(
        node.mgr.rename_tablespace(&mut alice_session, &rename("ts2", "pg_ts")),
        Err(TablespaceError::ReservedName(_))
    ));
    assert!(matches!(
        node.mgr.rename_tablespace(&mut session, &rename("pg_default", "dflt")),
        Err(TablespaceError::ObjectInUse(_))
    ));
    assert!(matches!(
        node.mgr.rename_tablespace(&mut session, &rename("nosuch", "x")),
        Err(TablespaceError::NotFound(_))
    ));

    // and back
    node.mgr
        .rename_tablespace(&mut alice_session, &rename("ts2", "ts1"))
        .unwrap();
    assert_eq!(node.mgr.get_tablespace_name(&session, id).as_deref(), Some("ts1"));
}

#[test]
fn test_rename_visible_only_inside_transaction_until_commit() {
    let node = TestNode::new();
    let mut session = superuser();
    let id = node.create(&mut session, "ts1");
    let observer = superuser();

    node.mgr.begin(&mut session).unwrap();
    node.mgr
        .rename_tablespace(
            &mut session,
            &RenameStmt {
                old_name: "ts1".to_string(),
                new_name: "ts2".to_string(),
            },
        )
        .unwrap();
    assert_eq!(node.mgr.get_tablespace_name(&session, id).as_deref(), Some("ts2"));
    assert_eq!(node.mgr.get_tablespace_name(&observer, id).as_deref(), Some("ts1"));

    node.mgr.abort(&mut session);
    assert_eq!(node.mgr.get_tablespace_name(&observer, id).as_deref(), Some("ts1"));
}

#[test]
fn test_alter_tablespace_options() {
    let node = TestNode::new();
    let mut session = superuser();
    let id = node.create(&mut session, "ts1");

    let set = AlterOptionsStmt {
        name: "ts1".to_string(),
        options: vec![
            DefElem::new("random_page_cost", "1.5"),
            DefElem::new("effective_io_concurrency", "8"),
        ],
        reset: false,
    };
    node.mgr.alter_tablespace_options(&mut session, &set).unwrap();

    let options = |session: &Session| {
        node.mgr
            .list_tablespaces(session)
            .into_iter()
            .find(|row| row.id == id)
            .unwrap()
            .options
    };
    let current = options(&session);
    assert_eq!(current.get("random_page_cost").map(String::as_str), Some("1.5"));
    assert_eq!(current.get("effective_io_concurrency").map(String::as_str), Some("8"));

    let reset = AlterOptionsStmt {
        name: "ts1".to_string(),
        options: vec![DefElem::flag("random_page_cost")],
        reset: true,
    };
    node.mgr.alter_tablespace_options(&mut session, &reset).unwrap();
    let current = options(&session);
    assert!(current.get("random_page_cost").is_none());
    assert_eq!(current.len(), 1);

    let out_of_range = AlterOptionsStmt {
        name: "ts1".to_string(),
        options: vec![DefElem::new("effective_io_concurrency", "5000")],
        reset: false,
    };
    assert!(matches!(
        node.mgr.alter_tablespace_options(&mut session, &out_of_range),
        Err(TablespaceError::InvalidParameter(_))
    ));
    assert_eq!(options(&session).len(), 1);
}

#[test]
fn test_move_relations_between_tablespaces() {
    let node = TestNode::new();
    let mut session = superuser();
    let ts1 = node.create(&mut session, "ts1");
    let ts2 = node.create(&mut session, "ts2");

    for stmt in [
        CreateRelationStmt::table("a").tablespace("ts1"),
        CreateRelationStmt::table("b").tablespace("ts1"),
        CreateRelationStmt::index("a_idx").tablespace("ts1"),
        CreateRelationStmt::table("c"),
    ] {
        node.mgr.create_relation(&mut session, &stmt).unwrap();
    }
    node.mgr.insert_rows(&mut session, "a", &[b"payload".as_slice()]).unwrap();
    let old_a = node.mgr.get_relation(&session, "a").unwrap().unwrap();

    let moved = node
        .mgr
        .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "ts2").kind(MoveObjectKind::Table))
        .unwrap();
    assert_eq!(moved, 2);
    assert_eq!(relation_tablespace(&node, &session, "a"), ts2);
    assert_eq!(relation_tablespace(&node, &session, "b"), ts2);
    assert_eq!(relation_tablespace(&node, &session, "a_idx"), ts1);
    assert_eq!(relation_tablespace(&node, &session, "c"), INVALID_OID);

    let new_a = node.mgr.get_relation(&session, "a").unwrap().unwrap();
    assert_ne!(new_a.relfilenode, old_a.relfilenode);
    let new_path = node.mgr.layout().relation_path(ts2, DB, new_a.relfilenode);
    assert_eq!(std::fs::read(new_path).unwrap(), b"payload");

    // nothing left to move
    let moved = node
        .mgr
        .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "ts2").kind(MoveObjectKind::Table))
        .unwrap();
    assert_eq!(moved, 0);
    assert_eq!(
        session.take_notices(),
        vec!["no matching relations in tablespace \"ts1\" found".to_string()]
    );

    // into the database default
    let moved = node
        .mgr
        .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "pg_default"))
        .unwrap();
    assert_eq!(moved, 1);
    assert_eq!(relation_tablespace(&node, &session, "a_idx"), INVALID_OID);
}

#[test]
fn test_move_from_database_default_names_it_in_notice() {
    let node = TestNode::new();
    let mut session = superuser();
    node.create(&mut session, "ts1");

    let moved = node
        .mgr
        .alter_tablespace_move(&mut session, &MoveStmt::new("pg_default", "ts1"))
        .unwrap();
    assert_eq!(moved, 0);
    assert_eq!(
        session.take_notices(),
        vec!["no matching relations in tablespace \"(database default)\" found".to_string()]
    );
}

#[test]
fn test_move_nowait_fails_without_moving_anything() {
    let node = TestNode::new();
    let mut session = superuser();
    let ts1 = node.create(&mut session, "ts1");
    node.create(&mut session, "ts2");
    node.mgr
        .create_relation(&mut session, &CreateRelationStmt::table("a").tablespace("ts1"))
        .unwrap();
    node.mgr
        .create_relation(&mut session, &CreateRelationStmt::table("b").tablespace("ts1"))
        .unwrap();

    let mut holder = superuser();
    node.mgr.begin(&mut holder).unwrap();
    node.mgr
        .lock_relation(&mut holder, "b", LockMode::AccessShare, false)
        .unwrap();

    let err = node
        .mgr
        .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "ts2").nowait())
        .unwrap_err();
    assert!(matches!(err, TablespaceError::ObjectInUse(_)));
    assert_eq!(relation_tablespace(&node, &session, "a"), ts1);
    assert_eq!(relation_tablespace(&node, &session, "b"), ts1);

    node.mgr.commit(&mut holder).unwrap();
    let moved = node
        .mgr
        .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "ts2").nowait())
        .unwrap();
    assert_eq!(moved, 2);
}

#[test]
fn test_move_checks() {
    let node = TestNode::new();
    let alice = node.roles.create_role("alice", false);
    let mut session = superuser();
    node.create(&mut session, "ts1");
    node.create(&mut session, "ts2");

    assert!(matches!(
        node.mgr
            .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "pg_global")),
        Err(TablespaceError::InvalidParameter(_))
    ));
    assert_eq!(
        node.mgr
            .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "ts1"))
            .unwrap(),
        0
    );
    assert!(matches!(
        node.mgr
            .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "ts2").owned_by("nobody")),
        Err(TablespaceError::RoleNotFound(_))
    ));

    let mut alice_session = Session::new(alice, DB);
    assert!(matches!(
        node.mgr
            .alter_tablespace_move(&mut alice_session, &MoveStmt::new("ts1", "ts2")),
        Err(TablespaceError::PermissionDenied(_))
    ));

    // alice may create in ts2 but does not own the superuser's table
    node.mgr
        .create_relation(&mut session, &CreateRelationStmt::table("t").tablespace("ts1"))
        .unwrap();
    let ts2 = node.mgr.get_tablespace_oid(&mut session, "ts2", false).unwrap();
    node.roles.grant_create(alice, ts2);
    assert!(matches!(
        node.mgr
            .alter_tablespace_move(&mut alice_session, &MoveStmt::new("ts1", "ts2")),
        Err(TablespaceError::PermissionDenied(_))
    ));
    // unless only her own tables are asked for
    assert_eq!(
        node.mgr
            .alter_tablespace_move(&mut alice_session, &MoveStmt::new("ts1", "ts2").owned_by("alice"))
            .unwrap(),
        0
    );
}

#[test]
fn test_create_relation_placement_rules() {
    let node = TestNode::new();
    let alice = node.roles.create_role("alice", false);
    let mut session = superuser();
    let ts1 = node.create(&mut session, "ts1");

    assert!(matches!(
        node.mgr
            .create_relation(&mut session, &CreateRelationStmt::table("g").tablespace("pg_global")),
        Err(TablespaceError::InvalidParameter(_))
    ));
    assert!(matches!(
        node.mgr
            .create_relation(&mut session, &CreateRelationStmt::table("s").shared()),
        Err(TablespaceError::PermissionDenied(_))
    ));
    assert!(matches!(
        node.mgr
            .create_relation(&mut session, &CreateRelationStmt::table("pg_catalog.x")),
        Err(TablespaceError::PermissionDenied(_))
    ));

    // naming the database default stores the sentinel
    node.mgr
        .create_relation(&mut session, &CreateRelationStmt::table("d").tablespace("pg_default"))
        .unwrap();
    assert_eq!(relation_tablespace(&node, &session, "d"), INVALID_OID);

    let mut alice_session = Session::new(alice, DB);
    assert!(matches!(
        node.mgr
            .create_relation(&mut alice_session, &CreateRelationStmt::table("t").tablespace("ts1")),
        Err(TablespaceError::PermissionDenied(_))
    ));
    node.roles.grant_create(alice, ts1);
    node.mgr
        .create_relation(&mut alice_session, &CreateRelationStmt::table("t").tablespace("ts1"))
        .unwrap();
    assert_eq!(relation_tablespace(&node, &session, "t"), ts1);
}

#[test]
fn test_view_never_lands_in_a_tablespace() {
    let node = TestNode::new();
    let mut session = superuser();
    node.create(&mut session, "ts1");

    let explicit = CreateRelationStmt::table("v").kind(RelKind::View).tablespace("ts1");
    let err = node.mgr.create_relation(&mut session, &explicit).unwrap_err();
    assert!(matches!(err, TablespaceError::InvalidParameter(_)));
    assert!(err.to_string().contains("tablespace cannot be specified for view"));

    // default_tablespace is ignored for objects without storage
    node.mgr
        .set_default_tablespace(&mut session, "ts1", GucSource::Session)
        .unwrap();
    node.mgr
        .create_relation(&mut session, &CreateRelationStmt::table("v").kind(RelKind::View))
        .unwrap();
    assert_eq!(relation_tablespace(&node, &session, "v"), INVALID_OID);
    assert!(node.mgr.read_relation(&mut session, "v").unwrap().is_empty());

    node.mgr
        .drop_tablespace(
            &mut session,
            &DropTablespaceStmt {
                name: "ts1".to_string(),
                missing_ok: false,
            },
        )
        .unwrap();
    assert_eq!(relation_tablespace(&node, &session, "v"), INVALID_OID);
}

#[test]
fn test_create_relation_aborted_removes_file() {
    let node = TestNode::new();
    let mut session = superuser();
    let ts1 = node.create(&mut session, "ts1");

    node.mgr.begin(&mut session).unwrap();
    let oid = node
        .mgr
        .create_relation(&mut session, &CreateRelationStmt::table("t").tablespace("ts1"))
        .unwrap();
    let path = node.mgr.layout().relation_path(ts1, DB, oid);
    assert!(path.exists());
    node.mgr.abort(&mut session);

    assert!(!path.exists());
    assert!(node.mgr.get_relation(&session, "t").unwrap().is_none());
}

#[test]
fn test_drop_relation_missing_ok() {
    let node = TestNode::new();
    let mut session = superuser();
    node.mgr
        .drop_relation(
            &mut session,
            &DropRelationStmt {
                name: "nosuch".to_string(),
                missing_ok: true,
            },
        )
        .unwrap();
    assert_eq!(
        session.take_notices(),
        vec!["table \"nosuch\" does not exist, skipping".to_string()]
    );
    assert!(matches!(
        node.mgr.drop_relation(
            &mut session,
            &DropRelationStmt {
                name: "nosuch".to_string(),
                missing_ok: false,
            },
        ),
        Err(TablespaceError::RelationNotFound(_))
    ));
}

#[test]
fn test_lock_relation_requires_block() {
    let node = TestNode::new();
    let mut session = superuser();
    node.mgr
        .create_relation(&mut session, &CreateRelationStmt::table("t"))
        .unwrap();
    assert!(matches!(
        node.mgr.lock_relation(&mut session, "t", LockMode::AccessShare, false),
        Err(TablespaceError::InvalidTransactionState(_))
    ));
}

#[test]
fn test_default_tablespace_setting() {
    let node = TestNode::new();
    let mut session = superuser();
    let ts1 = node.create(&mut session, "ts1");

    assert_eq!(
        node.mgr
            .get_default_tablespace(&mut session, Persistence::Permanent)
            .unwrap(),
        INVALID_OID
    );

    node.mgr
        .set_default_tablespace(&mut session, "ts1", GucSource::Session)
        .unwrap();
    assert_eq!(
        node.mgr
            .get_default_tablespace(&mut session, Persistence::Permanent)
            .unwrap(),
        ts1
    );
    node.mgr
        .create_relation(&mut session, &CreateRelationStmt::table("t"))
        .unwrap();
    assert_eq!(relation_tablespace(&node, &session, "t"), ts1);

    // the database's own default collapses to the sentinel
    node.mgr
        .set_default_tablespace(&mut session, "pg_default", GucSource::Session)
        .unwrap();
    assert_eq!(
        node.mgr
            .get_default_tablespace(&mut session, Persistence::Permanent)
            .unwrap(),
        INVALID_OID
    );

    assert!(matches!(
        node.mgr
            .set_default_tablespace(&mut session, "nosuch", GucSource::Session),
        Err(TablespaceError::InvalidParameter(_))
    ));
    assert_eq!(session.settings.default_tablespace, "pg_default");

    node.mgr
        .set_default_tablespace(&mut session, "nosuch", GucSource::Test)
        .unwrap();
    assert_eq!(
        session.take_notices(),
        vec!["tablespace \"nosuch\" does not exist".to_string()]
    );
    // a setting that no longer resolves falls back to the database default
    assert_eq!(
        node.mgr
            .get_default_tablespace(&mut session, Persistence::Permanent)
            .unwrap(),
        INVALID_OID
    );
}

#[test]
fn test_temp_tablespaces_round_robin_within_transaction() {
    let node = TestNode::new();
    let mut session = superuser();
    let ts1 = node.create(&mut session, "ts1");
    let ts2 = node.create(&mut session, "ts2");
    session.settings.temp_tablespaces = "ts1, nosuch, ts2".to_string();

    node.mgr.begin(&mut session).unwrap();
    node.mgr.prepare_temp_tablespaces(&mut session).unwrap();
    assert_eq!(
        session.take_notices(),
        vec!["tablespace \"nosuch\" does not exist, skipping".to_string()]
    );
    let mut seen = vec![
        node.mgr.get_next_temp_tablespace(&mut session).unwrap(),
        node.mgr.get_next_temp_tablespace(&mut session).unwrap(),
    ];
    seen.sort();
    assert_eq!(seen, vec![ts1, ts2]);

    // temporary objects follow the same rotation
    let next = node
        .mgr
        .get_default_tablespace(&mut session, Persistence::Temporary)
        .unwrap();
    assert!(next == ts1 || next == ts2);
    node.mgr.commit(&mut session).unwrap();
    assert!(!session.in_transaction());
}

#[test]
fn test_temp_tablespaces_skip_unusable_entries() {
    let node = TestNode::new();
    let alice = node.roles.create_role("alice", false);
    let mut session = superuser();
    node.create(&mut session, "ts1");

    let mut alice_session = Session::new(alice, DB);
    alice_session.settings.temp_tablespaces = r#"ts1, "", pg_default"#.to_string();
    node.mgr.begin(&mut alice_session).unwrap();
    node.mgr.prepare_temp_tablespaces(&mut alice_session).unwrap();
    assert_eq!(
        alice_session.take_notices(),
        vec!["permission denied for tablespace ts1, skipping".to_string()]
    );
    assert_eq!(
        alice_session.transaction().unwrap().temp_tablespaces().unwrap().ids(),
        &[INVALID_OID, INVALID_OID]
    );
    node.mgr.commit(&mut alice_session).unwrap();

    // bad syntax resolves to nothing
    alice_session.settings.temp_tablespaces = "\"unterminated".to_string();
    assert_eq!(
        node.mgr.get_next_temp_tablespace(&mut alice_session).unwrap(),
        INVALID_OID
    );
}

#[test]
fn test_set_temp_tablespaces_by_source() {
    let node = TestNode::new();
    let alice = node.roles.create_role("alice", false);
    let mut session = superuser();
    let ts1 = node.create(&mut session, "ts1");

    assert!(matches!(
        node.mgr
            .set_temp_tablespaces(&mut session, "ts1,,", GucSource::Session),
        Err(TablespaceError::InvalidParameter(_))
    ));
    assert!(matches!(
        node.mgr
            .set_temp_tablespaces(&mut session, "nosuch", GucSource::Session),
        Err(TablespaceError::NotFound(_))
    ));
    node.mgr
        .set_temp_tablespaces(&mut session, "nosuch", GucSource::Test)
        .unwrap();
    assert_eq!(
        session.take_notices(),
        vec!["tablespace \"nosuch\" does not exist".to_string()]
    );

    let mut alice_session = Session::new(alice, DB);
    assert!(matches!(
        node.mgr
            .set_temp_tablespaces(&mut alice_session, "ts1", GucSource::Session),
        Err(TablespaceError::PermissionDenied(_))
    ));
    node.mgr
        .set_temp_tablespaces(&mut alice_session, "ts1", GucSource::File)
        .unwrap();
    assert_eq!(alice_session.settings.temp_tablespaces, "ts1");

    // inside a transaction the new list takes effect at once
    node.mgr.begin(&mut session).unwrap();
    node.mgr
        .set_temp_tablespaces(&mut session, "ts1", GucSource::Session)
        .unwrap();
    assert_eq!(
        session.transaction().unwrap().temp_tablespaces().unwrap().ids(),
        &[ts1]
    );
    node.mgr.commit(&mut session).unwrap();
}

struct CountingResolver(AtomicUsize);

impl RecoveryConflictResolver for CountingResolver {
    fn resolve_tablespace_conflict(&self, _spc: TablespaceId) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_redo_is_idempotent() {
    let node = TestNode::new();
    let mut session = superuser();
    let id = node.create(&mut session, "ts1");
    let drop = DropTablespaceStmt {
        name: "ts1".to_string(),
        missing_ok: false,
    };
    node.mgr.drop_tablespace(&mut session, &drop).unwrap();

    let records = node.mgr.wal.read_from(0).unwrap();
    assert_eq!(records.len(), 2);
    for _ in 0..2 {
        for record in &records {
            node.mgr.replay(record).unwrap();
        }
        assert!(std::fs::symlink_metadata(node.mgr.layout().link_path(id)).is_err());
    }

    // replaying only the create rebuilds the directories
    node.mgr.replay(&records[0]).unwrap();
    node.mgr.replay(&records[0]).unwrap();
    assert!(node.mgr.layout().link_version_dir(id).is_dir());
}

#[test]
fn test_redo_drop_of_busy_tablespace_is_tolerated() {
    let temp_dir = TempDir::new().unwrap();
    let resolver = Arc::new(CountingResolver(AtomicUsize::new(0)));
    let mgr = TablespaceManager::open(
        EngineConfig::utility(temp_dir.path().join("data")),
        Arc::new(RoleRegistry::new()),
    )
    .unwrap()
    .with_conflict_resolver(resolver.clone());

    let mut session = superuser();
    let location = temp_dir.path().join("ts1");
    std::fs::create_dir_all(&location).unwrap();
    let id = mgr
        .create_tablespace(
            &mut session,
            &CreateTablespaceStmt::new("ts1", location.display().to_string()),
        )
        .unwrap();
    mgr.create_relation(&mut session, &CreateRelationStmt::table("t").tablespace("ts1"))
        .unwrap();

    let record = WalRecord {
        lsn: 0,
        rmid: crate::wal::RM_TBLSPC_ID,
        info: crate::wal::XLOG_TBLSPC_DROP,
        payload: crate::wal::encode_drop(id),
    };
    mgr.replay(&record).unwrap();
    assert_eq!(resolver.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_startup_recovery_replays_and_checkpoints() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let location = temp_dir.path().join("ts1");
    std::fs::create_dir_all(&location).unwrap();

    let id = {
        let mgr = TablespaceManager::open(EngineConfig::utility(&data_dir), Arc::new(RoleRegistry::new()))
            .unwrap();
        let mut session = superuser();
        mgr.create_tablespace(
            &mut session,
            &CreateTablespaceStmt::new("ts1", location.display().to_string()),
        )
        .unwrap()
    };

    // crash: the directories are gone but the WAL has the create
    let mgr = TablespaceManager::open(EngineConfig::utility(&data_dir), Arc::new(RoleRegistry::new()))
        .unwrap();
    std::fs::remove_file(mgr.layout().link_path(id)).unwrap();
    std::fs::remove_dir_all(mgr.layout().location_version_dir(&location)).unwrap();

    assert_eq!(mgr.startup_recovery().unwrap(), 1);
    assert!(!mgr.in_recovery());
    assert_eq!(mgr.control_state(), DbState::InProduction);
    assert!(mgr.layout().link_version_dir(id).is_dir());

    let mut session = superuser();
    assert_eq!(mgr.get_tablespace_oid(&mut session, "ts1", false).unwrap(), id);

    // the redo point moved past the create
    assert_eq!(mgr.startup_recovery().unwrap(), 0);
}

#[test]
fn test_held_tablespace_reference_blocks_drop() {
    let node = TestNode::with_config(|config| config.with_lock_timeout(Duration::from_millis(100)));
    let mut holder = superuser();
    let mut dropper = superuser();
    let id = node.create(&mut holder, "ts1");
    let drop = DropTablespaceStmt {
        name: "ts1".to_string(),
        missing_ok: false,
    };

    node.mgr.begin(&mut holder).unwrap();
    assert_eq!(node.mgr.get_tablespace_oid(&mut holder, "ts1", false).unwrap(), id);

    let err = node.mgr.drop_tablespace(&mut dropper, &drop).unwrap_err();
    assert!(matches!(err, TablespaceError::ObjectInUse(_)));
    assert!(err.to_string().contains("could not obtain lock on tablespace \"ts1\""));
    assert!(node.mgr.layout().link_version_dir(id).is_dir());

    node.mgr.commit(&mut holder).unwrap();
    node.mgr.drop_tablespace(&mut dropper, &drop).unwrap();
    assert_eq!(node.mgr.get_tablespace_oid(&mut dropper, "ts1", true).unwrap(), INVALID_OID);
}

#[test]
fn test_recovery_keeps_relation_data_in_rebuilt_tablespace() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let location = temp_dir.path().join("ts1");
    std::fs::create_dir_all(&location).unwrap();
    let open = || {
        TablespaceManager::open(EngineConfig::utility(&data_dir), Arc::new(RoleRegistry::new()))
            .unwrap()
    };

    let (id, gone) = {
        let mgr = open();
        let mut session = superuser();
        let id = mgr
            .create_tablespace(
                &mut session,
                &CreateTablespaceStmt::new("ts1", location.display().to_string()),
            )
            .unwrap();
        mgr.create_relation(&mut session, &CreateRelationStmt::table("t").tablespace("ts1"))
            .unwrap();
        let rows = [b"row1".as_slice(), b"row2".as_slice()];
        assert_eq!(mgr.insert_rows(&mut session, "t", &rows).unwrap(), 8);

        let gone = mgr
            .create_relation(&mut session, &CreateRelationStmt::table("gone").tablespace("ts1"))
            .unwrap();
        mgr.drop_relation(
            &mut session,
            &DropRelationStmt {
                name: "gone".to_string(),
                missing_ok: false,
            },
        )
        .unwrap();
        (id, gone)
    };

    // crash: no checkpoint ran, so replay starts before the tablespace create
    let mgr = open();
    assert_eq!(mgr.startup_recovery().unwrap(), 5);
    assert_eq!(mgr.control_state(), DbState::InProduction);

    let mut session = superuser();
    assert_eq!(mgr.read_relation(&mut session, "t").unwrap(), b"row1row2");
    assert_eq!(mgr.insert_rows(&mut session, "t", &[b"row3".as_slice()]).unwrap(), 12);
    assert!(!mgr.layout().relation_path(id, DB, gone).exists());
}

#[test]
fn test_recovery_survives_missing_tablespace_location() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let location = temp_dir.path().join("ts1");
    std::fs::create_dir_all(&location).unwrap();

    {
        let mgr = TablespaceManager::open(EngineConfig::utility(&data_dir), Arc::new(RoleRegistry::new()))
            .unwrap();
        let mut session = superuser();
        mgr.create_tablespace(
            &mut session,
            &CreateTablespaceStmt::new("ts1", location.display().to_string()),
        )
        .unwrap();
        mgr.drop_tablespace(
            &mut session,
            &DropTablespaceStmt {
                name: "ts1".to_string(),
                missing_ok: false,
            },
        )
        .unwrap();
    }
    // the operator removed the directory after the drop
    std::fs::remove_dir_all(&location).unwrap();

    let mgr = TablespaceManager::open(EngineConfig::utility(&data_dir), Arc::new(RoleRegistry::new()))
        .unwrap();
    assert_eq!(mgr.startup_recovery().unwrap(), 2);
    assert_eq!(mgr.control_state(), DbState::InProduction);
    assert!(!location.exists());
}
