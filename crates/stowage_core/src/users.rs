//! User identities and credential checks.
//!
//! Passwords are stored as the lowercase hex SHA-256 of the password. API
//! keys are stored in `metadata["api_key"]`. Comparisons of secrets run in
//! constant time.

use crate::error::CoreResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Role name that grants admin rights.
pub const ADMIN_ROLE: &str = "admin";

/// Metadata key holding a user's API key.
pub const API_KEY_METADATA: &str = "api_key";

/// A user known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier; database permissions are keyed by it.
    pub id: String,
    /// Login name.
    pub name: String,
    /// SHA-256 hex of the password.
    pub password_hash: String,
    /// Whether the account has been verified.
    #[serde(default)]
    pub verified: bool,
    /// Whether the account is enabled.
    #[serde(default)]
    pub is_active: bool,
    /// Role names; `admin` bypasses database permissions.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl User {
    /// Creates an active, verified user with a fresh id.
    pub fn new(name: impl Into<String>, password: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            password_hash: hash_password(password),
            verified: true,
            is_active: true,
            roles: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Grants the admin role.
    #[must_use]
    pub fn with_admin(mut self) -> Self {
        if !self.is_admin() {
            self.roles.push(ADMIN_ROLE.to_string());
        }
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.metadata.insert(API_KEY_METADATA.to_string(), key.into());
        self
    }

    /// Sets the verified flag.
    #[must_use]
    pub const fn with_verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    /// Sets the active flag.
    #[must_use]
    pub const fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Returns true for admins.
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }

    /// Returns true if the user may issue commands.
    pub fn is_usable(&self) -> bool {
        self.verified && self.is_active
    }

    /// Checks `password` against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        constant_time_eq(
            hash_password(password).as_bytes(),
            self.password_hash.as_bytes(),
        )
    }

    /// Checks `key` against the stored API key.
    pub fn verify_api_key(&self, key: &str) -> bool {
        self.metadata
            .get(API_KEY_METADATA)
            .is_some_and(|stored| !stored.is_empty() && constant_time_eq(stored.as_bytes(), key.as_bytes()))
    }
}

/// Lowercase hex SHA-256 of `password`.
pub fn hash_password(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Compares two byte strings without early exit on the first difference.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Looks users up for authentication.
pub trait UserDirectory: Send + Sync {
    /// Finds a user by login name.
    fn find_by_name(&self, name: &str) -> Option<User>;

    /// Finds the user owning `api_key`.
    fn find_by_api_key(&self, api_key: &str) -> Option<User>;

    /// Finds a user by id.
    fn get(&self, id: &str) -> Option<User>;
}

/// In-memory user directory, optionally loaded from a JSON array.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads users from a JSON file holding an array of users.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read(path)?;
        let users: Vec<User> = serde_json::from_slice(&raw)?;
        let store = Self::new();
        for user in users {
            store.insert(user);
        }
        tracing::info!(path = %path.display(), users = store.len(), "loaded users");
        Ok(store)
    }

    /// Adds or replaces a user.
    pub fn insert(&self, user: User) {
        self.users.write().insert(user.id.clone(), user);
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Returns true if the store has no users.
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl UserDirectory for UserStore {
    fn find_by_name(&self, name: &str) -> Option<User> {
        self.users.read().values().find(|u| u.name == name).cloned()
    }

    fn find_by_api_key(&self, api_key: &str) -> Option<User> {
        if api_key.is_empty() {
            return None;
        }
        self.users
            .read()
            .values()
            .find(|u| u.verify_api_key(api_key))
            .cloned()
    }

    fn get(&self, id: &str) -> Option<User> {
        self.users.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_of_hello() {
        assert_eq!(
            hash_password("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn password_check() {
        let user = User::new("oliver", "hello");
        assert!(user.verify_password("hello"));
        assert!(!user.verify_password("wrong"));
        assert!(user.is_usable());
        assert!(!user.is_admin());
        assert!(user.with_admin().is_admin());
    }

    #[test]
    fn api_key_lookup() {
        let store = UserStore::new();
        store.insert(User::new("a", "x").with_api_key("key-a"));
        store.insert(User::new("b", "y"));
        assert_eq!(store.find_by_api_key("key-a").unwrap().name, "a");
        assert!(store.find_by_api_key("key-b").is_none());
        assert!(store.find_by_api_key("").is_none());
    }

    #[test]
    fn constant_time_compare() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let users = vec![User::new("oliver", "hello").with_id("u1").with_admin()];
        std::fs::write(&path, serde_json::to_vec(&users).unwrap()).unwrap();

        let store = UserStore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
        let user = store.find_by_name("oliver").unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.is_admin());
    }
}
