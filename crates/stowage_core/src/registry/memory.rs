//! In-memory registry.

use super::model::{Collection, Database, PermissionLevel};
use super::state::RegistryState;
use super::Registry;
use crate::error::CoreResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Registry kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `state`.
    pub fn with_state(state: RegistryState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> RegistryState {
        self.state.read().clone()
    }
}

impl Registry for InMemoryRegistry {
    fn get_database(&self, name: &str) -> CoreResult<Database> {
        self.state.read().get_database(name)
    }

    fn list_databases(&self) -> CoreResult<Vec<Database>> {
        Ok(self.state.read().list_databases())
    }

    fn create_database(&self, database: Database) -> CoreResult<Database> {
        self.state.write().create_database(database)
    }

    fn update_database_users(
        &self,
        name: &str,
        users: BTreeMap<String, PermissionLevel>,
    ) -> CoreResult<Database> {
        self.state.write().update_database_users(name, users)
    }

    fn delete_database(&self, name: &str) -> CoreResult<Vec<Collection>> {
        self.state.write().delete_database(name)
    }

    fn get_collection(&self, database: &str, name: &str) -> CoreResult<Collection> {
        self.state.read().get_collection(database, name)
    }

    fn list_collections(&self, database: &str) -> CoreResult<Vec<Collection>> {
        self.state.read().list_collections(database)
    }

    fn list_all_collections(&self) -> CoreResult<Vec<Collection>> {
        Ok(self.state.read().list_all_collections())
    }

    fn create_collection(&self, collection: Collection) -> CoreResult<Collection> {
        self.state.write().create_collection(collection)
    }

    fn rename_collection(&self, database: &str, from: &str, to: &str) -> CoreResult<Collection> {
        self.state.write().rename_collection(database, from, to)
    }

    fn delete_collection(&self, database: &str, name: &str) -> CoreResult<Collection> {
        self.state.write().delete_collection(database, name)
    }
}
