//! Database and collection management.

use crate::client::{value_of, Client};
use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use std::collections::BTreeMap;
use stowage_codec::Value;
use stowage_protocol::{ids, Command, PayloadWriter};

/// Collection flag: skip the TTL cleaner.
pub const FLAG_DISABLE_TTL: u8 = 0b0000_0001;

/// Storage engine of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Key-value store.
    Kv,
    /// Object store.
    Object,
    /// Publish/subscribe broker.
    Broker,
}

impl Engine {
    /// Wire code.
    pub const fn code(self) -> u8 {
        match self {
            Self::Kv => 1,
            Self::Object => 2,
            Self::Broker => 3,
        }
    }

    /// Name used in registry records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kv => "kv",
            Self::Object => "object",
            Self::Broker => "broker",
        }
    }
}

impl std::str::FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kv" => Ok(Self::Kv),
            "object" => Ok(Self::Object),
            "broker" => Ok(Self::Broker),
            other => Err(format!("unknown engine: {other}")),
        }
    }
}

/// A database record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
    /// Permission level per user id.
    pub users: BTreeMap<String, String>,
}

/// A collection record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Owning database.
    pub database: String,
    /// Collection name.
    pub name: String,
    /// Engine name.
    pub engine: String,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
    /// True when the TTL cleaner skips this collection.
    pub disable_ttl: bool,
}

struct Record(BTreeMap<String, Value>);

impl Record {
    fn parse(value: Value) -> ClientResult<Self> {
        match value {
            Value::Map(fields) => Ok(Self(fields)),
            other => Err(ClientError::unexpected(format!("expected a record, got {}", other.type_name()))),
        }
    }

    fn string(&self, name: &str) -> ClientResult<String> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::unexpected(format!("record lacks {name}")))
    }

    fn integer(&self, name: &str) -> ClientResult<i64> {
        self.0
            .get(name)
            .and_then(Value::as_integer)
            .ok_or_else(|| ClientError::unexpected(format!("record lacks {name}")))
    }
}

impl DatabaseInfo {
    fn from_value(value: Value) -> ClientResult<Self> {
        let record = Record::parse(value)?;
        let users = match record.0.get("users") {
            Some(Value::Map(users)) => users
                .iter()
                .filter_map(|(id, level)| level.as_str().map(|l| (id.clone(), l.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };
        Ok(Self {
            name: record.string("name")?,
            created_at: record.integer("created_at")?,
            users,
        })
    }
}

impl CollectionInfo {
    fn from_value(value: Value) -> ClientResult<Self> {
        let record = Record::parse(value)?;
        Ok(Self {
            database: record.string("database")?,
            name: record.string("name")?,
            engine: record.string("engine")?,
            created_at: record.integer("created_at")?,
            disable_ttl: record.0.get("disable_ttl").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

fn list_of<T>(value: Value, parse: fn(Value) -> ClientResult<T>) -> ClientResult<Vec<T>> {
    match value {
        Value::List(items) => items.into_iter().map(parse).collect(),
        other => Err(ClientError::unexpected(format!("expected a list, got {}", other.type_name()))),
    }
}

/// Registry commands. Names travel in the payload.
#[derive(Debug, Clone, Copy)]
pub struct Registry<'a> {
    client: &'a Client,
}

impl<'a> Registry<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    async fn call(&self, command: u16, payload: PayloadWriter) -> ClientResult<Bytes> {
        self.client
            .execute(&Command::system(command, payload.finish()))
            .await
    }

    fn names(names: &[&str]) -> ClientResult<PayloadWriter> {
        names
            .iter()
            .try_fold(PayloadWriter::new(), |w, name| -> ClientResult<PayloadWriter> {
                Ok(w.put_str16("name", name)?)
            })
    }

    /// Fetches one database.
    pub async fn database(&self, name: &str) -> ClientResult<DatabaseInfo> {
        let payload = self.call(ids::DATABASE_GET, Self::names(&[name])?).await?;
        DatabaseInfo::from_value(value_of(&payload)?)
    }

    /// Databases the logged-in user can read.
    pub async fn databases(&self) -> ClientResult<Vec<DatabaseInfo>> {
        let payload = self.call(ids::DATABASE_LIST, PayloadWriter::new()).await?;
        list_of(value_of(&payload)?, DatabaseInfo::from_value)
    }

    /// Creates a database. Requires an admin user.
    pub async fn create_database(&self, name: &str) -> ClientResult<DatabaseInfo> {
        let payload = self.call(ids::DATABASE_CREATE, Self::names(&[name])?).await?;
        DatabaseInfo::from_value(value_of(&payload)?)
    }

    /// Deletes a database and everything in it. Requires an admin user.
    pub async fn delete_database(&self, name: &str) -> ClientResult<()> {
        self.call(ids::DATABASE_DELETE, Self::names(&[name])?).await?;
        Ok(())
    }

    /// Replaces the permission table of a database.
    ///
    /// Levels are `read_only`, `read_write` or `admin`.
    pub async fn update_users(
        &self,
        name: &str,
        users: &BTreeMap<String, String>,
    ) -> ClientResult<DatabaseInfo> {
        let levels = users
            .iter()
            .map(|(id, level)| (id.clone(), Value::from(level.as_str())))
            .collect();
        let payload = Self::names(&[name])?.put_value(&Value::Map(levels))?;
        let payload = self.call(ids::DATABASE_UPDATE_USERS, payload).await?;
        DatabaseInfo::from_value(value_of(&payload)?)
    }

    /// Fetches one collection.
    pub async fn collection(&self, database: &str, name: &str) -> ClientResult<CollectionInfo> {
        let payload = self
            .call(ids::COLLECTION_GET, Self::names(&[database, name])?)
            .await?;
        CollectionInfo::from_value(value_of(&payload)?)
    }

    /// Collections of a database.
    pub async fn collections(&self, database: &str) -> ClientResult<Vec<CollectionInfo>> {
        let payload = self
            .call(ids::COLLECTION_LIST, Self::names(&[database])?)
            .await?;
        list_of(value_of(&payload)?, CollectionInfo::from_value)
    }

    /// Creates a collection bound to `engine`.
    pub async fn create_collection(
        &self,
        database: &str,
        name: &str,
        engine: Engine,
        flags: u8,
    ) -> ClientResult<CollectionInfo> {
        let payload = Self::names(&[database, name])?
            .put_u8(engine.code())
            .put_u8(flags);
        let payload = self.call(ids::COLLECTION_CREATE, payload).await?;
        CollectionInfo::from_value(value_of(&payload)?)
    }

    /// Deletes a collection and its stored data.
    pub async fn delete_collection(&self, database: &str, name: &str) -> ClientResult<()> {
        self.call(ids::COLLECTION_DELETE, Self::names(&[database, name])?)
            .await?;
        Ok(())
    }

    /// Renames a collection.
    pub async fn rename_collection(
        &self,
        database: &str,
        from: &str,
        to: &str,
    ) -> ClientResult<CollectionInfo> {
        let payload = self
            .call(ids::COLLECTION_RENAME, Self::names(&[database, from, to])?)
            .await?;
        CollectionInfo::from_value(value_of(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_codes_and_names() {
        assert_eq!(Engine::Object.code(), 2);
        assert_eq!("BROKER".parse::<Engine>().unwrap(), Engine::Broker);
        assert!("table".parse::<Engine>().is_err());
    }

    #[test]
    fn collection_record() {
        let value = Value::Map(BTreeMap::from([
            ("database".to_string(), Value::from("sys")),
            ("name".to_string(), Value::from("cache")),
            ("engine".to_string(), Value::from("kv")),
            ("created_at".to_string(), Value::Integer(7)),
            ("disable_ttl".to_string(), Value::Boolean(true)),
        ]));
        let info = CollectionInfo::from_value(value).unwrap();
        assert_eq!(info.engine, Engine::Kv.as_str());
        assert!(info.disable_ttl);
    }

    #[test]
    fn database_record_needs_a_name() {
        let value = Value::Map(BTreeMap::from([("created_at".to_string(), Value::Integer(1))]));
        assert!(DatabaseInfo::from_value(value).is_err());
        assert!(list_of(Value::Integer(1), DatabaseInfo::from_value).is_err());
    }
}
