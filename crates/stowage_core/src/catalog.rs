//! Engine catalog: one engine instance per registered collection.

use crate::broker::{BrokerEngine, DeliverySink};
use crate::config::{BrokerConfig, KvConfig, ObjectConfig};
use crate::error::{CoreError, CoreResult};
use crate::kv::KvEngine;
use crate::object::ObjectEngine;
use crate::registry::{Collection, EngineKind, Registry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Engine settings applied to every collection the catalog opens.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// KV defaults; a collection's own `disable_ttl` flag is OR-ed in.
    pub kv: KvConfig,
    /// Object engine settings, including the data directory.
    pub object: ObjectConfig,
    /// Broker settings.
    pub broker: BrokerConfig,
}

impl CatalogConfig {
    /// Default engine settings rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            kv: KvConfig::default(),
            object: ObjectConfig::new(data_dir),
            broker: BrokerConfig::default(),
        }
    }

    /// Sets the KV settings.
    #[must_use]
    pub fn kv(mut self, kv: KvConfig) -> Self {
        self.kv = kv;
        self
    }

    /// Sets the object engine settings.
    #[must_use]
    pub fn object(mut self, object: ObjectConfig) -> Self {
        self.object = object;
        self
    }

    /// Sets the broker settings.
    #[must_use]
    pub fn broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }
}

/// A live engine bound to one collection.
#[derive(Debug, Clone)]
pub enum Engine {
    /// Key-value engine.
    Kv(Arc<KvEngine>),
    /// Object engine.
    Object(Arc<ObjectEngine>),
    /// Broker engine.
    Broker(Arc<BrokerEngine>),
}

impl Engine {
    /// Which engine this is.
    pub fn kind(&self) -> EngineKind {
        match self {
            Self::Kv(_) => EngineKind::Kv,
            Self::Object(_) => EngineKind::Object,
            Self::Broker(_) => EngineKind::Broker,
        }
    }

    /// The KV engine, if this is one.
    pub fn as_kv(&self) -> Option<&Arc<KvEngine>> {
        match self {
            Self::Kv(kv) => Some(kv),
            _ => None,
        }
    }

    /// The object engine, if this is one.
    pub fn as_object(&self) -> Option<&Arc<ObjectEngine>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The broker engine, if this is one.
    pub fn as_broker(&self) -> Option<&Arc<BrokerEngine>> {
        match self {
            Self::Broker(broker) => Some(broker),
            _ => None,
        }
    }

    /// Stops background tasks without touching persisted data.
    fn shutdown(&self) {
        match self {
            Self::Kv(kv) => kv.shutdown(),
            Self::Object(obj) => obj.shutdown(),
            Self::Broker(broker) => broker.shutdown(),
        }
    }

    /// Stops background tasks and discards the collection's data.
    fn destroy(&self) -> CoreResult<()> {
        match self {
            Self::Kv(kv) => {
                kv.clear();
                kv.shutdown();
                Ok(())
            }
            Self::Object(obj) => obj.destroy(),
            Self::Broker(broker) => {
                broker.shutdown();
                Ok(())
            }
        }
    }
}

type EngineKey = (String, String);

/// Registry front end that keeps engines in step with collection records.
///
/// Creating a collection opens its engine; deleting one tears the engine
/// down and removes its files. Engines for collections registered outside
/// the catalog are opened on first access.
pub struct Catalog {
    registry: Arc<dyn Registry>,
    config: CatalogConfig,
    sink: Arc<dyn DeliverySink>,
    engines: RwLock<HashMap<EngineKey, Engine>>,
}

impl Catalog {
    /// Opens an engine for every registered collection.
    ///
    /// Must run inside a tokio runtime for background tasks to start.
    ///
    /// # Errors
    ///
    /// Fails if the registry cannot be listed or an object collection cannot
    /// be opened.
    pub fn open(
        registry: Arc<dyn Registry>,
        config: CatalogConfig,
        sink: Arc<dyn DeliverySink>,
    ) -> CoreResult<Self> {
        let catalog = Self {
            registry,
            config,
            sink,
            engines: RwLock::new(HashMap::new()),
        };

        let collections = catalog.registry.list_all_collections()?;
        {
            let mut engines = catalog.engines.write();
            for coll in &collections {
                let engine = catalog.build(coll)?;
                engines.insert(key(&coll.database, &coll.name), engine);
            }
        }
        tracing::info!(collections = collections.len(), "engine catalog loaded");
        Ok(catalog)
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Engine settings in use.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    fn build(&self, coll: &Collection) -> CoreResult<Engine> {
        Ok(match coll.engine {
            EngineKind::Kv => {
                let disable = self.config.kv.disable_ttl || coll.kv_settings.disable_ttl;
                Engine::Kv(KvEngine::new(self.config.kv.clone().disable_ttl(disable)))
            }
            EngineKind::Object => Engine::Object(ObjectEngine::open(
                &coll.database,
                &coll.name,
                &self.config.object,
            )?),
            EngineKind::Broker => Engine::Broker(BrokerEngine::new(
                &coll.database,
                &coll.name,
                self.config.broker.clone(),
                Arc::clone(&self.sink),
            )),
        })
    }

    /// Returns the engine of a collection, opening it on first access.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseNotFound`] or [`CoreError::CollectionNotFound`]
    /// if the collection is not registered.
    pub fn engine(&self, database: &str, collection: &str) -> CoreResult<Engine> {
        if let Some(engine) = self.engines.read().get(&key(database, collection)) {
            return Ok(engine.clone());
        }

        let coll = self.registry.get_collection(database, collection)?;
        let mut engines = self.engines.write();
        if let Some(engine) = engines.get(&key(database, collection)) {
            return Ok(engine.clone());
        }
        let engine = self.build(&coll)?;
        engines.insert(key(database, collection), engine.clone());
        tracing::debug!(database, collection, engine = %coll.engine, "opened engine on access");
        Ok(engine)
    }

    /// Registers a collection and opens its engine.
    ///
    /// The registry record is rolled back if the engine cannot be opened.
    pub fn create_collection(&self, collection: Collection) -> CoreResult<Collection> {
        let coll = self.registry.create_collection(collection)?;
        match self.build(&coll) {
            Ok(engine) => {
                self.engines
                    .write()
                    .insert(key(&coll.database, &coll.name), engine);
                tracing::info!(
                    database = %coll.database,
                    collection = %coll.name,
                    engine = %coll.engine,
                    "collection created"
                );
                Ok(coll)
            }
            Err(err) => {
                if let Err(rollback) = self.registry.delete_collection(&coll.database, &coll.name) {
                    tracing::error!(error = %rollback, "failed to roll back collection record");
                }
                Err(err)
            }
        }
    }

    /// Unregisters a collection and tears its engine down.
    pub fn delete_collection(&self, database: &str, name: &str) -> CoreResult<Collection> {
        let coll = self.registry.delete_collection(database, name)?;
        self.teardown(&coll)?;
        tracing::info!(database, collection = name, "collection deleted");
        Ok(coll)
    }

    /// Deletes a database, tearing down each of its collections first.
    ///
    /// Collections go one at a time and the first failure stops the delete,
    /// leaving the database record and its remaining collections in place.
    pub fn delete_database(&self, name: &str) -> CoreResult<Vec<Collection>> {
        let mut removed = Vec::new();
        for coll in self.registry.list_collections(name)? {
            removed.push(self.delete_collection(&coll.database, &coll.name)?);
        }
        let db_dir = self.config.object.data_dir.join(name);
        if db_dir.exists() {
            std::fs::remove_dir_all(&db_dir)?;
        }

        // Collections created while the loop ran.
        for coll in self.registry.delete_database(name)? {
            self.teardown(&coll)?;
            removed.push(coll);
        }
        tracing::info!(database = name, collections = removed.len(), "database deleted");
        Ok(removed)
    }

    /// Renames a collection.
    ///
    /// KV data moves with the collection and object files are moved on
    /// disk. Broker subscriptions are closed, since their deliveries carry
    /// the old name. The engine map stays write-locked for the whole move,
    /// and the registry record is renamed back if the files cannot be moved.
    pub fn rename_collection(&self, database: &str, from: &str, to: &str) -> CoreResult<Collection> {
        let mut engines = self.engines.write();
        if let Some(Engine::Object(obj)) = engines.get(&key(database, from)) {
            obj.sync()?;
        }
        let coll = self.registry.rename_collection(database, from, to)?;
        let old = engines.remove(&key(database, from));

        match self.move_engine(old, &coll, from) {
            Ok(engine) => {
                engines.insert(key(database, to), engine);
                tracing::info!(database, from, to, "collection renamed");
                Ok(coll)
            }
            Err(err) => {
                // The old engine is gone from the map; it reopens on next access.
                if let Err(rollback) = self.registry.rename_collection(database, to, from) {
                    tracing::error!(error = %rollback, "failed to roll back collection rename");
                }
                Err(err)
            }
        }
    }

    /// Rebinds `old` to the renamed collection `coll`, moving object files
    /// from the `from` directory whether or not the engine was loaded.
    fn move_engine(
        &self,
        old: Option<Engine>,
        coll: &Collection,
        from: &str,
    ) -> CoreResult<Engine> {
        match old {
            Some(Engine::Kv(kv)) => return Ok(Engine::Kv(kv)),
            Some(other) => other.shutdown(),
            None => {}
        }
        if coll.engine == EngineKind::Object {
            let src = self.collection_dir(&coll.database, from);
            let dst = self.collection_dir(&coll.database, &coll.name);
            if dst.exists() {
                return Err(CoreError::invalid_argument(format!(
                    "path already exists: {}",
                    dst.display()
                )));
            }
            if src.exists() {
                std::fs::rename(&src, &dst)?;
            }
        }
        self.build(coll)
    }

    fn collection_dir(&self, database: &str, collection: &str) -> PathBuf {
        self.config.object.data_dir.join(database).join(collection)
    }

    /// Drops every broker subscription held by connection `subscriber_id`.
    pub fn remove_subscriber(&self, subscriber_id: u64) -> usize {
        let brokers: Vec<Arc<BrokerEngine>> = self
            .engines
            .read()
            .values()
            .filter_map(|e| e.as_broker().cloned())
            .collect();
        brokers
            .iter()
            .map(|b| b.remove_subscriber(subscriber_id))
            .sum()
    }

    /// Number of open engines.
    pub fn len(&self) -> usize {
        self.engines.read().len()
    }

    /// Returns true if no engine is open.
    pub fn is_empty(&self) -> bool {
        self.engines.read().is_empty()
    }

    /// Syncs object files and stops every background task.
    pub fn shutdown(&self) {
        let engines: Vec<Engine> = self.engines.write().drain().map(|(_, e)| e).collect();
        for engine in &engines {
            if let Engine::Object(obj) = engine {
                if let Err(err) = obj.sync() {
                    tracing::warn!(error = %err, dir = %obj.dir().display(), "sync on shutdown failed");
                }
            }
            engine.shutdown();
        }
        tracing::info!(engines = engines.len(), "engine catalog shut down");
    }

    fn teardown(&self, coll: &Collection) -> CoreResult<()> {
        match self.engines.write().remove(&key(&coll.database, &coll.name)) {
            Some(engine) => engine.destroy(),
            None if coll.engine == EngineKind::Object => {
                let dir = self.collection_dir(&coll.database, &coll.name);
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("engines", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn key(database: &str, collection: &str) -> EngineKey {
    (database.to_string(), collection.to_string())
}

/// Returns [`CoreError::InvalidArgument`] unless `engine` is `expected`.
pub fn require_kind(engine: &Engine, expected: EngineKind) -> CoreResult<()> {
    if engine.kind() == expected {
        Ok(())
    } else {
        Err(CoreError::invalid_argument(format!(
            "collection uses the {} engine, not {expected}",
            engine.kind()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::RecordingSink;
    use crate::registry::{Database, InMemoryRegistry};
    use stowage_codec::Value;
    use tempfile::tempdir;

    fn catalog(dir: &std::path::Path) -> Catalog {
        let registry = Arc::new(InMemoryRegistry::new());
        registry.create_database(Database::new("sys")).unwrap();
        let config = CatalogConfig::new(dir)
            .object(ObjectConfig::new(dir).enable_compaction(false));
        Catalog::open(registry, config, RecordingSink::new()).unwrap()
    }

    #[tokio::test]
    async fn create_opens_engine() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        catalog
            .create_collection(Collection::new("sys", "cache", EngineKind::Kv))
            .unwrap();
        let engine = catalog.engine("sys", "cache").unwrap();
        assert_eq!(engine.kind(), EngineKind::Kv);
        assert!(require_kind(&engine, EngineKind::Object).is_err());
        assert!(matches!(
            catalog.engine("sys", "missing"),
            Err(CoreError::CollectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_removes_object_files() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        catalog
            .create_collection(Collection::new("sys", "files", EngineKind::Object))
            .unwrap();
        let obj = catalog.engine("sys", "files").unwrap().as_object().cloned().unwrap();
        obj.put("a", b"data").unwrap();
        assert!(dir.path().join("sys/files").is_dir());
        drop(obj);

        catalog.delete_collection("sys", "files").unwrap();
        assert!(!dir.path().join("sys/files").exists());
        assert!(catalog.engine("sys", "files").is_err());
    }

    #[tokio::test]
    async fn rename_moves_data() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        catalog
            .create_collection(Collection::new("sys", "files", EngineKind::Object))
            .unwrap();
        catalog
            .create_collection(Collection::new("sys", "cache", EngineKind::Kv))
            .unwrap();
        catalog.engine("sys", "files").unwrap().as_object().unwrap().put("k", b"v").unwrap();
        catalog
            .engine("sys", "cache")
            .unwrap()
            .as_kv()
            .unwrap()
            .set("k", Value::from("v"), 0);

        catalog.rename_collection("sys", "files", "blobs").unwrap();
        catalog.rename_collection("sys", "cache", "hot").unwrap();

        let blobs = catalog.engine("sys", "blobs").unwrap();
        assert_eq!(blobs.as_object().unwrap().get("k").unwrap(), b"v");
        let hot = catalog.engine("sys", "hot").unwrap();
        assert_eq!(hot.as_kv().unwrap().get("k"), Some(Value::from("v")));
        assert!(!dir.path().join("sys/files").exists());
    }

    #[tokio::test]
    async fn delete_database_tears_down_collections() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        catalog
            .create_collection(Collection::new("sys", "files", EngineKind::Object))
            .unwrap();
        catalog
            .create_collection(Collection::new("sys", "events", EngineKind::Broker))
            .unwrap();
        let broker = catalog.engine("sys", "events").unwrap().as_broker().cloned().unwrap();
        broker.subscribe("a.>", 7, None).unwrap();

        let removed = catalog.delete_database("sys").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(broker.subscription_count(), 0);
        assert!(catalog.is_empty());
        assert!(!dir.path().join("sys").exists());
    }

    #[tokio::test]
    async fn rename_moves_unloaded_object_files() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        catalog
            .registry()
            .create_collection(Collection::new("sys", "files", EngineKind::Object))
            .unwrap();
        let obj = ObjectEngine::open("sys", "files", &catalog.config().object).unwrap();
        obj.put("k", b"v").unwrap();
        obj.sync().unwrap();
        obj.shutdown();
        drop(obj);
        assert!(catalog.is_empty());

        catalog.rename_collection("sys", "files", "blobs").unwrap();
        assert!(!dir.path().join("sys/files").exists());
        let blobs = catalog.engine("sys", "blobs").unwrap();
        assert_eq!(blobs.as_object().unwrap().get("k").unwrap(), b"v");
    }

    #[tokio::test]
    async fn failed_rename_restores_record() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        catalog
            .create_collection(Collection::new("sys", "files", EngineKind::Object))
            .unwrap();
        catalog.engine("sys", "files").unwrap().as_object().unwrap().put("k", b"v").unwrap();
        std::fs::create_dir_all(dir.path().join("sys/blobs")).unwrap();
        std::fs::write(dir.path().join("sys/blobs/stray"), b"x").unwrap();

        assert!(catalog.rename_collection("sys", "files", "blobs").is_err());
        assert!(catalog.registry().get_collection("sys", "files").is_ok());
        assert!(matches!(
            catalog.registry().get_collection("sys", "blobs"),
            Err(CoreError::CollectionNotFound { .. })
        ));
        let files = catalog.engine("sys", "files").unwrap();
        assert_eq!(files.as_object().unwrap().get("k").unwrap(), b"v");
        assert!(dir.path().join("sys/blobs/stray").exists());
    }

    #[tokio::test]
    async fn delete_database_stops_at_first_failure() {
        let dir = tempdir().unwrap();
        let catalog = catalog(dir.path());
        for name in ["cache", "zeta"] {
            catalog
                .create_collection(Collection::new("sys", name, EngineKind::Kv))
                .unwrap();
        }
        // An unloaded object collection whose path is a plain file cannot be removed.
        catalog
            .registry()
            .create_collection(Collection::new("sys", "files", EngineKind::Object))
            .unwrap();
        std::fs::create_dir_all(dir.path().join("sys")).unwrap();
        std::fs::write(dir.path().join("sys/files"), b"not a directory").unwrap();

        assert!(catalog.delete_database("sys").is_err());
        assert!(catalog.registry().get_database("sys").is_ok());
        assert!(catalog.engine("sys", "cache").is_err());
        assert!(catalog.engine("sys", "zeta").unwrap().as_kv().is_some());
        assert!(dir.path().join("sys").is_dir());
    }

    #[tokio::test]
    async fn loads_registered_collections() {
        let dir = tempdir().unwrap();
        let registry = Arc::new(InMemoryRegistry::new());
        registry.create_database(Database::new("sys")).unwrap();
        registry
            .create_collection(Collection::new("sys", "events", EngineKind::Broker))
            .unwrap();
        let catalog = Catalog::open(registry, CatalogConfig::new(dir.path()), RecordingSink::new()).unwrap();
        assert_eq!(catalog.len(), 1);

        let broker = catalog.engine("sys", "events").unwrap().as_broker().cloned().unwrap();
        broker.subscribe("x", 1, None).unwrap();
        broker.subscribe("y", 1, None).unwrap();
        assert_eq!(catalog.remove_subscriber(1), 2);
        catalog.shutdown();
    }
}
