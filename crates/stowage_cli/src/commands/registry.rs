//! Database and collection commands.

use super::CommandResult;
use crate::output::{self, Format};
use crate::{CollectionCommand, DbCommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use stowage_client::{CollectionInfo, DatabaseInfo, Registry, FLAG_DISABLE_TTL};

/// Printable database record.
#[derive(Debug, Serialize)]
pub struct DatabaseRow {
    /// Database name.
    pub name: String,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
    /// Permission level per user id.
    pub users: BTreeMap<String, String>,
}

impl From<DatabaseInfo> for DatabaseRow {
    fn from(db: DatabaseInfo) -> Self {
        Self {
            name: db.name,
            created_at: db.created_at,
            users: db.users,
        }
    }
}

impl fmt::Display for DatabaseRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} users)", self.name, self.users.len())
    }
}

/// Printable collection record.
#[derive(Debug, Serialize)]
pub struct CollectionRow {
    /// Owning database.
    pub database: String,
    /// Collection name.
    pub name: String,
    /// Engine name.
    pub engine: String,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
    /// True when expiry sweeps are off.
    pub disable_ttl: bool,
}

impl From<CollectionInfo> for CollectionRow {
    fn from(coll: CollectionInfo) -> Self {
        Self {
            database: coll.database,
            name: coll.name,
            engine: coll.engine,
            created_at: coll.created_at,
            disable_ttl: coll.disable_ttl,
        }
    }
}

impl fmt::Display for CollectionRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} [{}]", self.database, self.name, self.engine)?;
        if self.disable_ttl {
            write!(f, " no-ttl")?;
        }
        Ok(())
    }
}

/// Runs a database subcommand.
pub async fn run_db(registry: &Registry<'_>, command: DbCommand, format: Format) -> CommandResult {
    match command {
        DbCommand::Create { name } => {
            let row = DatabaseRow::from(registry.create_database(&name).await?);
            output::print_record(format, &row);
        }
        DbCommand::List => {
            for db in registry.databases().await? {
                output::print_record(format, &DatabaseRow::from(db));
            }
        }
    }
    Ok(())
}

/// Runs a collection subcommand.
pub async fn run_collection(
    registry: &Registry<'_>,
    command: CollectionCommand,
    format: Format,
) -> CommandResult {
    match command {
        CollectionCommand::Create {
            database,
            name,
            engine,
            no_ttl,
        } => {
            let flags = if no_ttl { FLAG_DISABLE_TTL } else { 0 };
            let coll = registry.create_collection(&database, &name, engine, flags).await?;
            output::print_record(format, &CollectionRow::from(coll));
        }
        CollectionCommand::List { database } => {
            for coll in registry.collections(&database).await? {
                output::print_record(format, &CollectionRow::from(coll));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_row_text() {
        let row = CollectionRow {
            database: "sys".into(),
            name: "cache".into(),
            engine: "kv".into(),
            created_at: 0,
            disable_ttl: true,
        };
        assert_eq!(row.to_string(), "sys/cache [kv] no-ttl");
    }
}
