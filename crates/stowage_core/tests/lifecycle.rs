//! Integration tests across the registry, the catalog and the engines.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use stowage_codec::Value;
use stowage_core::broker::RecordingSink;
use stowage_core::registry::{Collection, Database, EngineKind, JsonFileRegistry, Registry};
use stowage_core::{
    now_nanos, Catalog, CatalogConfig, CoreError, DataDir, KvConfig, ObjectConfig,
};
use tempfile::tempdir;

fn open_catalog(dir: &DataDir) -> Catalog {
    let registry = Arc::new(JsonFileRegistry::open(dir.registry_path()).unwrap());
    let config = CatalogConfig::new(dir.path())
        .object(ObjectConfig::new(dir.path()).enable_compaction(false));
    Catalog::open(registry, config, RecordingSink::new()).unwrap()
}

#[tokio::test]
async fn objects_and_registry_survive_restart() {
    let temp = tempdir().unwrap();

    {
        let dir = DataDir::open(temp.path()).unwrap();
        let catalog = open_catalog(&dir);
        catalog.registry().create_database(Database::new("sys")).unwrap();
        catalog
            .create_collection(Collection::new("sys", "files", EngineKind::Object))
            .unwrap();

        let files = catalog.engine("sys", "files").unwrap();
        let files = files.as_object().unwrap();
        files.put("a.txt", b"hello").unwrap();
        files.put("b.txt", b"world").unwrap();
        files.delete("b.txt").unwrap();
        catalog.shutdown();
    }

    let dir = DataDir::open(temp.path()).unwrap();
    let catalog = open_catalog(&dir);
    assert_eq!(catalog.len(), 1);

    let files = catalog.engine("sys", "files").unwrap();
    let files = files.as_object().unwrap();
    assert_eq!(files.get("a.txt").unwrap(), b"hello");
    assert_eq!(files.metadata("a.txt").unwrap().checksum, 0x3610_A686);
    assert!(matches!(files.get("b.txt"), Err(CoreError::KeyNotFound { .. })));
}

#[tokio::test]
async fn kv_deadline_expires() {
    let temp = tempdir().unwrap();
    let dir = DataDir::open(temp.path()).unwrap();
    let catalog = open_catalog(&dir);
    catalog.registry().create_database(Database::new("sys")).unwrap();
    catalog
        .create_collection(Collection::new("sys", "cache", EngineKind::Kv))
        .unwrap();

    let engine = catalog.engine("sys", "cache").unwrap();
    let kv = engine.as_kv().unwrap();
    let deadline = now_nanos() + Duration::from_millis(50).as_nanos() as i64;
    kv.set("session", Value::from("abc"), deadline);
    assert!(kv.exists("session"));

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(kv.get("session"), None);
    assert!(!kv.exists("session"));
}

#[tokio::test]
async fn broker_collection_delivers() {
    let temp = tempdir().unwrap();
    let dir = DataDir::open(temp.path()).unwrap();
    let sink = RecordingSink::new();
    let registry = Arc::new(JsonFileRegistry::open(dir.registry_path()).unwrap());
    registry.create_database(Database::new("sys")).unwrap();
    let catalog = Catalog::open(registry, CatalogConfig::new(dir.path()), sink.clone()).unwrap();
    catalog
        .create_collection(Collection::new("sys", "events", EngineKind::Broker))
        .unwrap();

    let engine = catalog.engine("sys", "events").unwrap();
    let broker = engine.as_broker().unwrap();
    broker.subscribe("orders.>", 1, None).unwrap();
    broker.publish("orders.eu.created", Bytes::from_static(b"o1")).unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0.database, "sys");
    assert_eq!(batches[0].0.subject, "orders.>");
    assert_eq!(batches[0].1, vec![Bytes::from_static(b"o1")]);
}

#[test]
fn kv_concurrent_writers() {
    let kv = stowage_core::kv::KvEngine::new(KvConfig::new().disable_ttl(true));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let kv = Arc::clone(&kv);
            std::thread::spawn(move || {
                for i in 0..500 {
                    kv.set(&format!("t{t}-k{i}"), Value::Integer(i), 0);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(kv.count(), 8 * 500);
    assert_eq!(kv.get("t3-k499"), Some(Value::Integer(499)));
}

#[test]
fn second_server_cannot_take_data_dir() {
    let temp = tempdir().unwrap();
    let _held = DataDir::open(temp.path()).unwrap();
    assert!(matches!(DataDir::open(temp.path()), Err(CoreError::DataDirLocked)));
}
