//! Database and collection registry.
//!
//! The registry is a narrow capability trait so the server can run against
//! whatever metadata store the deployment provides. Two adapters ship with
//! the crate: [`InMemoryRegistry`] and [`JsonFileRegistry`].

mod json;
mod memory;
mod model;
mod state;

pub use json::JsonFileRegistry;
pub use memory::InMemoryRegistry;
pub use model::{
    validate_name, Collection, Database, EngineKind, KvSettings, PermissionLevel, MAX_NAME_LEN,
};
pub use state::RegistryState;

use crate::error::CoreResult;
use crate::users::User;
use std::collections::BTreeMap;

/// Metadata store for databases and collections.
///
/// Implementations must be safe to share between connection tasks. Every
/// mutating call is atomic: it either applies fully or leaves the registry
/// unchanged.
pub trait Registry: Send + Sync {
    /// Looks up a database.
    fn get_database(&self, name: &str) -> CoreResult<Database>;

    /// All databases, ordered by name.
    fn list_databases(&self) -> CoreResult<Vec<Database>>;

    /// Databases `user` can read.
    fn list_databases_for_user(&self, user: &User) -> CoreResult<Vec<Database>> {
        Ok(self
            .list_databases()?
            .into_iter()
            .filter(|db| db.can_read(user))
            .collect())
    }

    /// Registers a new database.
    fn create_database(&self, database: Database) -> CoreResult<Database>;

    /// Replaces the database's user map.
    fn update_database_users(
        &self,
        name: &str,
        users: BTreeMap<String, PermissionLevel>,
    ) -> CoreResult<Database>;

    /// Removes a database together with its collections.
    ///
    /// Returns the removed collections so their engines can be torn down.
    fn delete_database(&self, name: &str) -> CoreResult<Vec<Collection>>;

    /// Looks up a collection.
    fn get_collection(&self, database: &str, name: &str) -> CoreResult<Collection>;

    /// Collections of one database, ordered by name.
    fn list_collections(&self, database: &str) -> CoreResult<Vec<Collection>>;

    /// Every collection of every database.
    fn list_all_collections(&self) -> CoreResult<Vec<Collection>>;

    /// Registers a new collection in an existing database.
    fn create_collection(&self, collection: Collection) -> CoreResult<Collection>;

    /// Renames a collection; the engine binding is kept.
    fn rename_collection(&self, database: &str, from: &str, to: &str) -> CoreResult<Collection>;

    /// Removes a collection and returns its record.
    fn delete_collection(&self, database: &str, name: &str) -> CoreResult<Collection>;
}
