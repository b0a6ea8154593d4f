//! Registry persisted as a JSON file.

use super::model::{Collection, Database, PermissionLevel};
use super::state::RegistryState;
use super::Registry;
use crate::error::CoreResult;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Registry persisted as one JSON document.
///
/// Mutations run against a copy of the state; the copy is written to
/// `<path>.tmp`, synced, renamed over `<path>`, and only then becomes the
/// live state. A failed write leaves both the file and the in-memory state
/// unchanged.
#[derive(Debug)]
pub struct JsonFileRegistry {
    path: PathBuf,
    state: Mutex<RegistryState>,
}

impl JsonFileRegistry {
    /// Opens the registry at `path`, starting empty if the file is missing.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let raw = fs::read(&path)?;
            if raw.is_empty() {
                RegistryState::default()
            } else {
                serde_json::from_slice(&raw)?
            }
        } else {
            RegistryState::default()
        };
        tracing::info!(
            path = %path.display(),
            databases = state.databases.len(),
            "opened registry"
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the registry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T>(&self, f: impl FnOnce(&RegistryState) -> T) -> T {
        f(&self.state.lock())
    }

    fn transact<T>(&self, f: impl FnOnce(&mut RegistryState) -> CoreResult<T>) -> CoreResult<T> {
        let mut guard = self.state.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.save(&next)?;
        *guard = next;
        Ok(out)
    }

    fn save(&self, state: &RegistryState) -> CoreResult<()> {
        let data = serde_json::to_vec_pretty(state)?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        self.sync_parent()
    }

    #[cfg(unix)]
    fn sync_parent(&self) -> CoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent(&self) -> CoreResult<()> {
        Ok(())
    }
}

impl Registry for JsonFileRegistry {
    fn get_database(&self, name: &str) -> CoreResult<Database> {
        self.read(|s| s.get_database(name))
    }

    fn list_databases(&self) -> CoreResult<Vec<Database>> {
        Ok(self.read(RegistryState::list_databases))
    }

    fn create_database(&self, database: Database) -> CoreResult<Database> {
        self.transact(|s| s.create_database(database))
    }

    fn update_database_users(
        &self,
        name: &str,
        users: BTreeMap<String, PermissionLevel>,
    ) -> CoreResult<Database> {
        self.transact(|s| s.update_database_users(name, users))
    }

    fn delete_database(&self, name: &str) -> CoreResult<Vec<Collection>> {
        self.transact(|s| s.delete_database(name))
    }

    fn get_collection(&self, database: &str, name: &str) -> CoreResult<Collection> {
        self.read(|s| s.get_collection(database, name))
    }

    fn list_collections(&self, database: &str) -> CoreResult<Vec<Collection>> {
        self.read(|s| s.list_collections(database))
    }

    fn list_all_collections(&self) -> CoreResult<Vec<Collection>> {
        Ok(self.read(RegistryState::list_all_collections))
    }

    fn create_collection(&self, collection: Collection) -> CoreResult<Collection> {
        self.transact(|s| s.create_collection(collection))
    }

    fn rename_collection(&self, database: &str, from: &str, to: &str) -> CoreResult<Collection> {
        self.transact(|s| s.rename_collection(database, from, to))
    }

    fn delete_collection(&self, database: &str, name: &str) -> CoreResult<Collection> {
        self.transact(|s| s.delete_collection(database, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::registry::EngineKind;
    use tempfile::tempdir;

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");

        {
            let registry = JsonFileRegistry::open(&path).unwrap();
            registry
                .create_database(Database::new("sys").with_user("u1", PermissionLevel::ReadWrite))
                .unwrap();
            registry
                .create_collection(Collection::new("sys", "events", EngineKind::Broker))
                .unwrap();
        }

        let registry = JsonFileRegistry::open(&path).unwrap();
        let db = registry.get_database("sys").unwrap();
        assert_eq!(db.users.get("u1"), Some(&PermissionLevel::ReadWrite));
        let coll = registry.get_collection("sys", "events").unwrap();
        assert_eq!(coll.engine, EngineKind::Broker);
        assert!(!dir.path().join("registry.json.tmp").exists());
    }

    #[test]
    fn failed_mutation_leaves_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let registry = JsonFileRegistry::open(&path).unwrap();
        registry.create_database(Database::new("sys")).unwrap();
        let before = fs::read(&path).unwrap();

        let err = registry
            .create_collection(Collection::new("missing", "c", EngineKind::Kv))
            .unwrap_err();
        assert!(matches!(err, CoreError::DatabaseNotFound { .. }));
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::open(dir.path().join("none.json")).unwrap();
        assert!(registry.list_databases().unwrap().is_empty());
    }
}
