// Relation module tests

#[cfg(test)]
mod relation_tests {
    use crate::catalog::WriteSet;
    use crate::table::{RelationBuilder, RelationCatalog};
    use crate::types::{NamespaceKind, RelKind};
    use tempfile::TempDir;

    #[test]
    fn test_relation_catalog_persists_across_open() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = RelationCatalog::open(temp_dir.path()).unwrap();
        let mut ws = WriteSet::default();

        let oid = catalog.allocate_oid();
        let rel = RelationBuilder::new(oid, "orders")
            .database(5)
            .kind(RelKind::Index)
            .tablespace(16384)
            .try_build()
            .unwrap();
        catalog.insert(&mut ws, 1, rel.clone()).unwrap();
        catalog.commit(&mut ws, 1).unwrap();

        let reopened = RelationCatalog::open(temp_dir.path()).unwrap();
        let loaded = reopened
            .find(&WriteSet::default(), 5, NamespaceKind::User, "orders")
            .unwrap();
        assert_eq!(loaded, rel);
        assert!(reopened.allocate_oid() > oid);
    }

    #[test]
    fn test_aborted_relation_is_not_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = RelationCatalog::open(temp_dir.path()).unwrap();
        let mut ws = WriteSet::default();

        let rel = RelationBuilder::new(catalog.allocate_oid(), "scratch")
            .database(5)
            .try_build()
            .unwrap();
        catalog.insert(&mut ws, 1, rel).unwrap();
        catalog.abort(&mut ws, 1);

        let reopened = RelationCatalog::open(temp_dir.path()).unwrap();
        assert!(reopened.list(&WriteSet::default()).is_empty());
    }
}
