//! Registry contents shared by the adapters.

use super::model::{validate_name, Collection, Database, PermissionLevel};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every database and collection record.
///
/// The adapters wrap this in a lock; [`JsonFileRegistry`](super::JsonFileRegistry)
/// also serializes it as its file format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    /// Databases by name.
    #[serde(default)]
    pub databases: BTreeMap<String, Database>,
    /// Collections by database, then by name.
    #[serde(default)]
    pub collections: BTreeMap<String, BTreeMap<String, Collection>>,
}

impl RegistryState {
    pub(crate) fn get_database(&self, name: &str) -> CoreResult<Database> {
        self.databases
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::database_not_found(name))
    }

    pub(crate) fn list_databases(&self) -> Vec<Database> {
        self.databases.values().cloned().collect()
    }

    pub(crate) fn create_database(&mut self, database: Database) -> CoreResult<Database> {
        validate_name("database", &database.name)?;
        if self.databases.contains_key(&database.name) {
            return Err(CoreError::DatabaseAlreadyExists {
                name: database.name,
            });
        }
        self.databases
            .insert(database.name.clone(), database.clone());
        Ok(database)
    }

    pub(crate) fn update_database_users(
        &mut self,
        name: &str,
        users: BTreeMap<String, PermissionLevel>,
    ) -> CoreResult<Database> {
        let db = self
            .databases
            .get_mut(name)
            .ok_or_else(|| CoreError::database_not_found(name))?;
        db.users = users;
        Ok(db.clone())
    }

    pub(crate) fn delete_database(&mut self, name: &str) -> CoreResult<Vec<Collection>> {
        if self.databases.remove(name).is_none() {
            return Err(CoreError::database_not_found(name));
        }
        Ok(self
            .collections
            .remove(name)
            .map(|colls| colls.into_values().collect())
            .unwrap_or_default())
    }

    pub(crate) fn get_collection(&self, database: &str, name: &str) -> CoreResult<Collection> {
        self.require_database(database)?;
        self.collections
            .get(database)
            .and_then(|colls| colls.get(name))
            .cloned()
            .ok_or_else(|| CoreError::collection_not_found(database, name))
    }

    pub(crate) fn list_collections(&self, database: &str) -> CoreResult<Vec<Collection>> {
        self.require_database(database)?;
        Ok(self
            .collections
            .get(database)
            .map(|colls| colls.values().cloned().collect())
            .unwrap_or_default())
    }

    pub(crate) fn list_all_collections(&self) -> Vec<Collection> {
        self.collections
            .values()
            .flat_map(|colls| colls.values().cloned())
            .collect()
    }

    pub(crate) fn create_collection(&mut self, collection: Collection) -> CoreResult<Collection> {
        validate_name("collection", &collection.name)?;
        self.require_database(&collection.database)?;
        let colls = self
            .collections
            .entry(collection.database.clone())
            .or_default();
        if colls.contains_key(&collection.name) {
            return Err(CoreError::CollectionAlreadyExists {
                database: collection.database,
                name: collection.name,
            });
        }
        colls.insert(collection.name.clone(), collection.clone());
        Ok(collection)
    }

    pub(crate) fn rename_collection(
        &mut self,
        database: &str,
        from: &str,
        to: &str,
    ) -> CoreResult<Collection> {
        validate_name("collection", to)?;
        self.require_database(database)?;
        let colls = self.collections.entry(database.to_string()).or_default();
        if !colls.contains_key(from) {
            return Err(CoreError::collection_not_found(database, from));
        }
        if colls.contains_key(to) {
            return Err(CoreError::CollectionAlreadyExists {
                database: database.to_string(),
                name: to.to_string(),
            });
        }
        let mut coll = colls
            .remove(from)
            .ok_or_else(|| CoreError::collection_not_found(database, from))?;
        coll.name = to.to_string();
        colls.insert(coll.name.clone(), coll.clone());
        Ok(coll)
    }

    pub(crate) fn delete_collection(&mut self, database: &str, name: &str) -> CoreResult<Collection> {
        self.require_database(database)?;
        self.collections
            .get_mut(database)
            .and_then(|colls| colls.remove(name))
            .ok_or_else(|| CoreError::collection_not_found(database, name))
    }

    fn require_database(&self, name: &str) -> CoreResult<()> {
        if self.databases.contains_key(name) {
            Ok(())
        } else {
            Err(CoreError::database_not_found(name))
        }
    }
}
