//! Test fixtures.
//!
//! Every fixture seeds the same layout: database `sys` with a KV
//! collection `cache`, an object collection `files` and a broker collection
//! `events`; admin `oliver`/`hello` and read-only `reader`/`pw` on `sys`.

use std::sync::Arc;
use stowage_core::broker::RecordingSink;
use stowage_core::registry::{
    Collection, Database, EngineKind, InMemoryRegistry, PermissionLevel, Registry,
};
use stowage_core::users::{User, UserStore};
use stowage_core::{Catalog, CatalogConfig, ObjectConfig};
use tempfile::TempDir;

/// Database created by the fixtures.
pub const TEST_DATABASE: &str = "sys";
/// KV collection created by the fixtures.
pub const KV_COLLECTION: &str = "cache";
/// Object collection created by the fixtures.
pub const OBJECT_COLLECTION: &str = "files";
/// Broker collection created by the fixtures.
pub const BROKER_COLLECTION: &str = "events";

/// Creates a temporary directory removed on drop.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// The admin user `oliver` / `hello`.
pub fn admin_user() -> User {
    User::new("oliver", "hello").with_id("u-admin").with_admin()
}

/// The non-admin user `reader` / `pw`.
pub fn reader_user() -> User {
    User::new("reader", "pw").with_id("u-reader")
}

/// A user store holding [`admin_user`] and [`reader_user`].
pub fn test_users() -> UserStore {
    let users = UserStore::new();
    users.insert(admin_user());
    users.insert(reader_user());
    users
}

/// The seeded collections, one per engine.
pub fn test_collections() -> Vec<Collection> {
    [
        (KV_COLLECTION, EngineKind::Kv),
        (OBJECT_COLLECTION, EngineKind::Object),
        (BROKER_COLLECTION, EngineKind::Broker),
    ]
    .into_iter()
    .map(|(name, kind)| Collection::new(TEST_DATABASE, name, kind))
    .collect()
}

/// An in-memory registry with the seeded database and collections.
pub fn seeded_registry() -> Arc<InMemoryRegistry> {
    let registry = Arc::new(InMemoryRegistry::new());
    registry
        .create_database(
            Database::new(TEST_DATABASE).with_user("u-reader", PermissionLevel::ReadOnly),
        )
        .expect("Failed to create test database");
    for coll in test_collections() {
        registry
            .create_collection(coll)
            .expect("Failed to create test collection");
    }
    registry
}

/// A catalog over [`seeded_registry`] with deliveries recorded in memory.
///
/// Must be opened inside a tokio runtime.
pub struct TestCatalog {
    /// The catalog.
    pub catalog: Catalog,
    /// Broker deliveries.
    pub sink: Arc<RecordingSink>,
    _dir: TempDir,
}

impl TestCatalog {
    /// Opens the catalog with object compaction disabled.
    pub fn open() -> Self {
        let dir = temp_dir();
        let sink = RecordingSink::new();
        let config = CatalogConfig::new(dir.path())
            .object(ObjectConfig::new(dir.path()).enable_compaction(false));
        let catalog = Catalog::open(seeded_registry(), config, sink.clone())
            .expect("Failed to open test catalog");
        Self {
            catalog,
            sink,
            _dir: dir,
        }
    }
}

impl Drop for TestCatalog {
    fn drop(&mut self) {
        self.catalog.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::users::UserDirectory;

    #[test]
    fn seeded_registry_layout() {
        let registry = seeded_registry();
        assert_eq!(registry.list_collections(TEST_DATABASE).unwrap().len(), 3);
        let db = registry.get_database(TEST_DATABASE).unwrap();
        assert!(db.can_read(&reader_user()));
        assert!(!db.can_write(&reader_user()));
    }

    #[test]
    fn users_verify() {
        let users = test_users();
        let admin = users.find_by_name("oliver").unwrap();
        assert!(admin.verify_password("hello"));
        assert!(admin.is_admin());
    }

    #[tokio::test]
    async fn catalog_has_one_engine_per_collection() {
        let fixture = TestCatalog::open();
        assert_eq!(fixture.catalog.len(), 3);
        assert!(fixture
            .catalog
            .engine(TEST_DATABASE, OBJECT_COLLECTION)
            .unwrap()
            .as_object()
            .is_some());
    }
}
