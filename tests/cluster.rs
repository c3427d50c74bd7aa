//! A coordinator and two workers in one process, each on its own data
//! directory, sharing tablespace locations.

use aistore_tblspc::acl::RoleRegistry;
use aistore_tblspc::cdb::{LocalSegment, SegmentWorker};
use aistore_tblspc::tablespace::{
    AlterOptionsStmt, CreateRelationStmt, CreateTablespaceStmt, DefElem, DropRelationStmt,
    DropTablespaceStmt, MoveStmt, RenameStmt,
};
use aistore_tblspc::types::{TablespaceId, BOOTSTRAP_SUPERUSER_ID, INVALID_OID};
use aistore_tblspc::lock::LockMode;
use aistore_tblspc::{EngineConfig, Session, TablespaceError, TablespaceManager};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const DB: u32 = 16300;

struct Cluster {
    _temp_dir: TempDir,
    root: PathBuf,
    coordinator: TablespaceManager,
    segments: Vec<Arc<LocalSegment>>,
}

impl Cluster {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let roles = Arc::new(RoleRegistry::new());

        let coordinator =
            TablespaceManager::open(EngineConfig::coordinator(root.join("coord"), 1, 2), roles.clone())
                .unwrap();
        let segments: Vec<Arc<LocalSegment>> = (0..2)
            .map(|content| {
                let config =
                    EngineConfig::worker(root.join(format!("seg{}", content)), 2 + content as u32, content);
                let manager = TablespaceManager::open(config, roles.clone()).unwrap();
                Arc::new(LocalSegment::new(Arc::new(manager)))
            })
            .collect();
        coordinator.attach_workers(
            segments
                .iter()
                .map(|seg| Arc::clone(seg) as Arc<dyn SegmentWorker>)
                .collect(),
        );

        Self {
            _temp_dir: temp_dir,
            root,
            coordinator,
            segments,
        }
    }

    fn location(&self, name: &str) -> String {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir.display().to_string()
    }

    fn nodes(&self) -> Vec<&TablespaceManager> {
        std::iter::once(&self.coordinator)
            .chain(self.segments.iter().map(|seg| seg.manager().as_ref()))
            .collect()
    }

    /// Id of `name` on every node, coordinator first
    fn oids(&self, name: &str) -> Vec<TablespaceId> {
        self.nodes()
            .into_iter()
            .map(|node| {
                node.get_tablespace_oid(&mut session(), name, true)
                    .unwrap()
            })
            .collect()
    }

    fn assert_idle(&self) {
        for seg in &self.segments {
            assert!(seg.in_progress().is_empty());
        }
    }
}

fn session() -> Session {
    Session::new(BOOTSTRAP_SUPERUSER_ID, DB)
}

fn drop_stmt(name: &str) -> DropTablespaceStmt {
    DropTablespaceStmt {
        name: name.to_string(),
        missing_ok: false,
    }
}

#[test]
fn test_create_reaches_every_node_with_one_oid() {
    let cluster = Cluster::new();
    let mut session = session();
    let location = cluster.location("ts1");

    let id = cluster
        .coordinator
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", location.clone()))
        .unwrap();
    assert_eq!(cluster.oids("ts1"), vec![id, id, id]);
    cluster.assert_idle();

    // one version directory per node below the shared location
    for node in cluster.nodes() {
        assert!(node.layout().link_version_dir(id).is_dir());
        assert_eq!(node.tablespace_location(id).unwrap(), location);
    }
    let version_dirs = std::fs::read_dir(&location).unwrap().count();
    assert_eq!(version_dirs, 3);
}

#[test]
fn test_per_content_location_override() {
    let cluster = Cluster::new();
    let mut session = session();
    let shared = cluster.location("shared");
    let own = cluster.location("seg0_only");

    let stmt = CreateTablespaceStmt::new("ts1", shared.clone()).content_location(0, own.clone());
    let id = cluster.coordinator.create_tablespace(&mut session, &stmt).unwrap();

    assert_eq!(cluster.coordinator.tablespace_location(id).unwrap(), shared);
    assert_eq!(cluster.segments[0].manager().tablespace_location(id).unwrap(), own);
    assert_eq!(cluster.segments[1].manager().tablespace_location(id).unwrap(), shared);

    let bad = CreateTablespaceStmt::new("ts2", shared.clone()).content_location(5, own);
    assert!(matches!(
        cluster.coordinator.create_tablespace(&mut session, &bad),
        Err(TablespaceError::PartitionNotFound(5))
    ));
    let garbage = CreateTablespaceStmt::new("ts2", shared).option("contentx", "/x");
    assert!(matches!(
        cluster.coordinator.create_tablespace(&mut session, &garbage),
        Err(TablespaceError::InvalidParameter(_))
    ));
    assert_eq!(cluster.oids("ts2"), vec![INVALID_OID; 3]);
}

#[test]
fn test_worker_failure_rolls_back_everywhere() {
    let cluster = Cluster::new();
    let mut session = session();
    let location = cluster.location("ts1");
    let missing = cluster.root.join("nosuch").display().to_string();

    let stmt = CreateTablespaceStmt::new("ts1", location.clone()).content_location(1, missing);
    let err = cluster
        .coordinator
        .create_tablespace(&mut session, &stmt)
        .unwrap_err();
    assert!(matches!(err, TablespaceError::Dispatch { content_id: 1, .. }));
    assert!(matches!(err.root_cause(), TablespaceError::Filesystem { .. }));

    assert_eq!(cluster.oids("ts1"), vec![INVALID_OID; 3]);
    cluster.assert_idle();
    // the coordinator and seg0 removed what they had built
    assert_eq!(std::fs::read_dir(&location).unwrap().count(), 0);

    // and the name is usable again
    cluster
        .coordinator
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", location))
        .unwrap();
}

#[test]
fn test_drop_not_empty_until_table_dropped() {
    let cluster = Cluster::new();
    let mut session = session();
    let id = cluster
        .coordinator
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", cluster.location("ts1")))
        .unwrap();

    cluster
        .coordinator
        .create_relation(&mut session, &CreateRelationStmt::table("t").tablespace("ts1"))
        .unwrap();
    for seg in &cluster.segments {
        let mut seg_session = self::session();
        assert!(seg.manager().get_relation(&seg_session, "t").unwrap().is_some());
        seg.manager()
            .insert_rows(&mut seg_session, "t", &[b"on a worker".as_slice()])
            .unwrap();
    }
    cluster.assert_idle();

    assert!(matches!(
        cluster.coordinator.drop_tablespace(&mut session, &drop_stmt("ts1")),
        Err(TablespaceError::NotEmpty(_))
    ));
    assert_eq!(cluster.oids("ts1"), vec![id, id, id]);

    cluster
        .coordinator
        .drop_relation(
            &mut session,
            &DropRelationStmt {
                name: "t".to_string(),
                missing_ok: false,
            },
        )
        .unwrap();
    cluster
        .coordinator
        .drop_tablespace(&mut session, &drop_stmt("ts1"))
        .unwrap();

    assert_eq!(cluster.oids("ts1"), vec![INVALID_OID; 3]);
    for node in cluster.nodes() {
        assert!(std::fs::symlink_metadata(node.layout().link_path(id)).is_err());
    }
    cluster.assert_idle();
}

#[test]
fn test_rename_and_options_follow_the_coordinator() {
    let cluster = Cluster::new();
    let mut session = session();
    let id = cluster
        .coordinator
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", cluster.location("ts1")))
        .unwrap();

    let rename = RenameStmt {
        old_name: "ts1".to_string(),
        new_name: "ts2".to_string(),
    };
    cluster.coordinator.rename_tablespace(&mut session, &rename).unwrap();
    assert_eq!(cluster.oids("ts2"), vec![id, id, id]);
    assert_eq!(cluster.oids("ts1"), vec![INVALID_OID; 3]);

    let options = AlterOptionsStmt {
        name: "ts2".to_string(),
        options: vec![DefElem::new("seq_page_cost", "4")],
        reset: false,
    };
    cluster
        .coordinator
        .alter_tablespace_options(&mut session, &options)
        .unwrap();
    for node in cluster.nodes() {
        let row = node
            .list_tablespaces(&self::session())
            .into_iter()
            .find(|row| row.id == id)
            .unwrap();
        assert_eq!(row.options.get("seq_page_cost").map(String::as_str), Some("4"));
    }

    let back = RenameStmt {
        old_name: "ts2".to_string(),
        new_name: "ts1".to_string(),
    };
    cluster.coordinator.rename_tablespace(&mut session, &back).unwrap();
    assert_eq!(cluster.oids("ts1"), vec![id, id, id]);
    cluster.assert_idle();
}

#[test]
fn test_transaction_block_spans_workers_until_abort() {
    let cluster = Cluster::new();
    let mut session = session();
    let id = cluster
        .coordinator
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", cluster.location("ts1")))
        .unwrap();

    cluster.coordinator.begin(&mut session).unwrap();
    cluster
        .coordinator
        .rename_tablespace(
            &mut session,
            &RenameStmt {
                old_name: "ts1".to_string(),
                new_name: "renamed".to_string(),
            },
        )
        .unwrap();
    cluster
        .coordinator
        .create_relation(&mut session, &CreateRelationStmt::table("t").tablespace("renamed"))
        .unwrap();

    let gid = session.transaction().unwrap().dispatch().unwrap().gid().to_string();
    for seg in &cluster.segments {
        assert_eq!(seg.in_progress(), vec![gid.clone()]);
    }

    cluster.coordinator.abort(&mut session);
    cluster.assert_idle();
    assert_eq!(cluster.oids("ts1"), vec![id, id, id]);
    for seg in &cluster.segments {
        assert!(seg.manager().get_relation(&self::session(), "t").unwrap().is_none());
    }
}

#[test]
fn test_move_nowait_conflict_moves_nothing() {
    let cluster = Cluster::new();
    let mut session = session();
    let ts1 = cluster
        .coordinator
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts1", cluster.location("ts1")))
        .unwrap();
    let ts2 = cluster
        .coordinator
        .create_tablespace(&mut session, &CreateTablespaceStmt::new("ts2", cluster.location("ts2")))
        .unwrap();
    cluster
        .coordinator
        .create_relation(&mut session, &CreateRelationStmt::table("t").tablespace("ts1"))
        .unwrap();

    let mut holder = self::session();
    cluster.coordinator.begin(&mut holder).unwrap();
    cluster
        .coordinator
        .lock_relation(&mut holder, "t", LockMode::AccessShare, false)
        .unwrap();

    let err = cluster
        .coordinator
        .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "ts2").nowait())
        .unwrap_err();
    assert!(matches!(err, TablespaceError::ObjectInUse(_)));
    for node in cluster.nodes() {
        let rel = node.get_relation(&self::session(), "t").unwrap().unwrap();
        assert_eq!(rel.tablespace, ts1);
    }

    cluster.coordinator.commit(&mut holder).unwrap();
    let moved = cluster
        .coordinator
        .alter_tablespace_move(&mut session, &MoveStmt::new("ts1", "ts2").nowait())
        .unwrap();
    assert_eq!(moved, 1);
    for node in cluster.nodes() {
        let rel = node.get_relation(&self::session(), "t").unwrap().unwrap();
        assert_eq!(rel.tablespace, ts2);
    }
    cluster.assert_idle();
}

#[test]
fn test_recovery_after_crash_on_every_node() {
    let temp_dir = TempDir::new().unwrap();
    let location = temp_dir.path().join("ts1");
    std::fs::create_dir_all(&location).unwrap();
    let data_dir = temp_dir.path().join("seg0");

    let id = {
        let manager = TablespaceManager::open(
            EngineConfig::worker(&data_dir, 2, 0),
            Arc::new(RoleRegistry::new()),
        )
        .unwrap();
        let mut session = session();
        manager
            .create_tablespace(
                &mut session,
                &CreateTablespaceStmt::new("ts1", location.display().to_string()),
            )
            .unwrap()
    };

    // replaying twice leaves the same directories behind
    for _ in 0..2 {
        let manager = TablespaceManager::open(
            EngineConfig::worker(&data_dir, 2, 0),
            Arc::new(RoleRegistry::new()),
        )
        .unwrap();
        manager.startup_recovery().unwrap();
        assert!(manager.layout().link_version_dir(id).is_dir());
    }
}
