//! Shared server state.

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::connection::{ConnectionMap, ConnectionSink};
use crate::error::ServerResult;
use std::sync::Arc;
use stowage_core::registry::{JsonFileRegistry, Registry};
use stowage_core::users::{User, UserDirectory, UserStore};
use stowage_core::{Catalog, DataDir};

/// Everything a command handler can reach.
#[derive(Debug)]
pub struct ServerState {
    config: ServerConfig,
    catalog: Catalog,
    users: Arc<UserStore>,
    authenticator: Authenticator,
    connections: Arc<ConnectionMap>,
    _data_dir: DataDir,
}

impl ServerState {
    /// Locks the data directory, loads users and the registry and opens the
    /// engine catalog.
    ///
    /// Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the data directory is held by another server, or the users
    /// or registry file cannot be read, or an engine cannot be opened.
    pub fn open(config: ServerConfig) -> ServerResult<Arc<Self>> {
        let data_dir = DataDir::open(&config.data_dir)?;

        let users_path = config
            .users_file
            .clone()
            .unwrap_or_else(|| data_dir.users_path());
        let users = if users_path.exists() {
            UserStore::load(&users_path)?
        } else {
            tracing::info!(path = %users_path.display(), "no users file, starting with an empty user store");
            UserStore::new()
        };
        if let Some(admin) = &config.bootstrap_admin {
            if users.find_by_name(&admin.username).is_none() {
                users.insert(User::new(admin.username.clone(), &admin.password).with_admin());
                tracing::info!(user = %admin.username, "bootstrap admin created");
            }
        }
        let users = Arc::new(users);

        let registry_path = config
            .registry_file
            .clone()
            .unwrap_or_else(|| data_dir.registry_path());
        let registry: Arc<dyn Registry> = Arc::new(JsonFileRegistry::open(registry_path)?);

        let connections = Arc::new(ConnectionMap::new());
        let sink = Arc::new(ConnectionSink::new(Arc::clone(&connections)));
        let catalog = Catalog::open(registry, config.catalog_config(), sink)?;
        let authenticator = Authenticator::new(Arc::clone(&users) as Arc<dyn UserDirectory>);

        Ok(Arc::new(Self {
            config,
            catalog,
            users,
            authenticator,
            connections,
            _data_dir: data_dir,
        }))
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Engine catalog and registry.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Registry of databases and collections.
    pub fn registry(&self) -> &Arc<dyn Registry> {
        self.catalog.registry()
    }

    /// Known users.
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Credential checker.
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Live connections.
    pub fn connections(&self) -> &Arc<ConnectionMap> {
        &self.connections
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use stowage_core::registry::{Collection, Database, EngineKind, PermissionLevel};
    use tempfile::TempDir;

    /// Admin `oliver`/`hello`, read-only `reader`/`pw` on `sys`, and one
    /// collection per engine in `sys`.
    pub(crate) fn test_state() -> (Arc<ServerState>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default()
            .with_data_dir(dir.path())
            .with_compaction_interval(std::time::Duration::from_secs(3600));
        let state = ServerState::open(config).unwrap();

        state.users().insert(User::new("oliver", "hello").with_id("u-admin").with_admin());
        state.users().insert(User::new("reader", "pw").with_id("u-reader"));
        state
            .registry()
            .create_database(Database::new("sys").with_user("u-reader", PermissionLevel::ReadOnly))
            .unwrap();
        for (name, kind) in [
            ("cache", EngineKind::Kv),
            ("files", EngineKind::Object),
            ("events", EngineKind::Broker),
        ] {
            state
                .catalog()
                .create_collection(Collection::new("sys", name, kind))
                .unwrap();
        }
        (state, dir)
    }

    #[tokio::test]
    async fn bootstrap_admin_is_added() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default()
            .with_data_dir(dir.path())
            .with_bootstrap_admin("root", "secret");
        let state = ServerState::open(config).unwrap();
        let root = state.users().find_by_name("root").unwrap();
        assert!(root.is_admin());
        assert!(root.verify_password("secret"));
    }

    #[tokio::test]
    async fn users_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let users_file = dir.path().join("people.json");
        let users = vec![User::new("oliver", "hello").with_id("u1")];
        std::fs::write(&users_file, serde_json::to_vec(&users).unwrap()).unwrap();

        let config = ServerConfig::default()
            .with_data_dir(dir.path().join("data"))
            .with_users_file(&users_file);
        let state = ServerState::open(config).unwrap();
        assert_eq!(state.users().len(), 1);
        assert_eq!(state.users().get("u1").unwrap().name, "oliver");
    }
}
