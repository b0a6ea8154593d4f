//! Database and collection records.

use crate::clock::now_millis;
use crate::error::{CoreError, CoreResult};
use crate::users::User;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A user's access level on one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Read commands only.
    ReadOnly,
    /// Read and write commands.
    ReadWrite,
    /// Everything, including user management.
    Admin,
}

impl PermissionLevel {
    /// Wire and file name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::ReadWrite => "read_write",
            Self::Admin => "admin",
        }
    }

    /// Parses a level name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read_only" => Some(Self::ReadOnly),
            "read_write" => Some(Self::ReadWrite),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage engine bound to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Sharded in-memory key-value store.
    Kv,
    /// Sharded append-log object store.
    Object,
    /// Subject-routed pub/sub.
    Broker,
}

impl EngineKind {
    /// Wire code.
    pub const fn code(self) -> u8 {
        match self {
            Self::Kv => 1,
            Self::Object => 2,
            Self::Broker => 3,
        }
    }

    /// Parses a wire code.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Kv),
            2 => Some(Self::Object),
            3 => Some(Self::Broker),
            _ => None,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kv => "kv",
            Self::Object => "object",
            Self::Broker => "broker",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineKind {
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

/// A named database and its per-user permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    /// Globally unique name.
    pub name: String,
    /// Unix milliseconds of creation.
    pub created_at: i64,
    /// User id to permission level.
    #[serde(default)]
    pub users: BTreeMap<String, PermissionLevel>,
}

impl Database {
    /// Creates a database record stamped with the current time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: now_millis(),
            users: BTreeMap::new(),
        }
    }

    /// Grants `level` to `user_id`.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>, level: PermissionLevel) -> Self {
        self.users.insert(user_id.into(), level);
        self
    }

    /// Returns true if `user_id` holds at least `level`.
    pub fn has_permission(&self, user_id: &str, level: PermissionLevel) -> bool {
        self.users.get(user_id).is_some_and(|held| *held >= level)
    }

    /// Admins, or any listed user.
    pub fn can_read(&self, user: &User) -> bool {
        user.is_admin() || self.has_permission(&user.id, PermissionLevel::ReadOnly)
    }

    /// Admins, or users with read-write or admin.
    pub fn can_write(&self, user: &User) -> bool {
        user.is_admin() || self.has_permission(&user.id, PermissionLevel::ReadWrite)
    }

    /// Admins, or users with admin.
    pub fn can_admin(&self, user: &User) -> bool {
        user.is_admin() || self.has_permission(&user.id, PermissionLevel::Admin)
    }
}

/// Settings of a key-value collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvSettings {
    /// Skips the TTL cleaner for this collection.
    #[serde(default)]
    pub disable_ttl: bool,
}

/// A collection bound to one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Owning database.
    pub database: String,
    /// Name, unique within the database.
    pub name: String,
    /// Unix milliseconds of creation.
    pub created_at: i64,
    /// Engine; fixed at creation.
    pub engine: EngineKind,
    /// KV engine settings.
    #[serde(default)]
    pub kv_settings: KvSettings,
}

impl Collection {
    /// Creates a collection record stamped with the current time.
    pub fn new(database: impl Into<String>, name: impl Into<String>, engine: EngineKind) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            created_at: now_millis(),
            engine,
            kv_settings: KvSettings::default(),
        }
    }

    /// Sets the KV settings.
    #[must_use]
    pub const fn with_kv_settings(mut self, settings: KvSettings) -> Self {
        self.kv_settings = settings;
        self
    }
}

/// Longest accepted database or collection name.
pub const MAX_NAME_LEN: usize = 128;

/// Validates a database or collection name.
///
/// Names become directory names, so only ASCII letters, digits, `_` and `-`
/// are accepted.
///
/// # Errors
///
/// [`CoreError::InvalidArgument`] for empty, long or unsafe names.
pub fn validate_name(kind: &str, name: &str) -> CoreResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::invalid_argument(format!("invalid {kind} name: {name:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_predicates() {
        let reader = User::new("r", "x").with_id("r");
        let writer = User::new("w", "x").with_id("w");
        let owner = User::new("o", "x").with_id("o");
        let stranger = User::new("s", "x").with_id("s");
        let admin = User::new("a", "x").with_id("a").with_admin();

        let db = Database::new("sys")
            .with_user("r", PermissionLevel::ReadOnly)
            .with_user("w", PermissionLevel::ReadWrite)
            .with_user("o", PermissionLevel::Admin);

        assert!(db.can_read(&reader) && !db.can_write(&reader));
        assert!(db.can_write(&writer) && !db.can_admin(&writer));
        assert!(db.can_admin(&owner));
        assert!(!db.can_read(&stranger));
        assert!(db.can_admin(&admin));
    }

    #[test]
    fn engine_codes() {
        for kind in [EngineKind::Kv, EngineKind::Object, EngineKind::Broker] {
            assert_eq!(EngineKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(EngineKind::from_code(9), None);
        assert_eq!("Object".parse::<EngineKind>(), Ok(EngineKind::Object));
    }

    #[test]
    fn names() {
        assert!(validate_name("database", "sys").is_ok());
        assert!(validate_name("collection", "my-coll_1").is_ok());
        assert!(validate_name("collection", "").is_err());
        assert!(validate_name("collection", "../etc").is_err());
        assert!(validate_name("collection", "a/b").is_err());
    }

    #[test]
    fn serde_names() {
        let json = serde_json::to_string(&PermissionLevel::ReadWrite).unwrap();
        assert_eq!(json, "\"read_write\"");
        let coll: Collection = serde_json::from_str(
            r#"{"database":"d","name":"c","created_at":1,"engine":"broker"}"#,
        )
        .unwrap();
        assert_eq!(coll.engine, EngineKind::Broker);
        assert!(!coll.kv_settings.disable_ttl);
    }
}
