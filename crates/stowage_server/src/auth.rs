//! Authentication for client connections.
//!
//! ## Login payload
//!
//! ```text
//! u8 authType | fields...
//!   1: u16 usernameLen | username | u16 passwordLen | password
//!   2: u16 apiKeyLen | apiKey
//! ```
//!
//! A successful login attaches the user to the connection context; every
//! later command reads it back through [`ConnectionContext::user`].

use crate::connection::ConnectionContext;
use crate::error::{ServerError, ServerResult};
use std::sync::Arc;
use stowage_core::users::{User, UserDirectory};
use stowage_protocol::PayloadReader;

/// Login with username and password.
pub const AUTH_PASSWORD: u8 = 1;

/// Login with an API key.
pub const AUTH_API_KEY: u8 = 2;

/// Credentials carried by a login command.
#[derive(Clone, PartialEq, Eq)]
pub enum LoginRequest {
    /// Username and password.
    Password {
        /// Login name.
        username: String,
        /// Plain-text password.
        password: String,
    },
    /// API key.
    ApiKey(String),
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
        }
    }
}

impl LoginRequest {
    /// Parses a login payload.
    ///
    /// # Errors
    ///
    /// [`ServerError::BadRequest`] for truncated payloads or unknown
    /// authentication types.
    pub fn parse(payload: &[u8]) -> ServerResult<Self> {
        let mut reader = PayloadReader::new(payload);
        match reader.read_u8()? {
            AUTH_PASSWORD => Ok(Self::Password {
                username: reader.read_str16("username")?,
                password: reader.read_str16("password")?,
            }),
            AUTH_API_KEY => Ok(Self::ApiKey(reader.read_str16("api key")?)),
            _ => Err(ServerError::bad_request("unsupported authentication type")),
        }
    }
}

/// Checks credentials against a user directory.
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserDirectory>,
}

impl Authenticator {
    /// Creates an authenticator over `users`.
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    /// Resolves credentials to a user.
    ///
    /// # Errors
    ///
    /// [`ServerError::InvalidCredentials`] if no user matches.
    pub fn authenticate(&self, request: &LoginRequest) -> ServerResult<User> {
        let user = match request {
            LoginRequest::ApiKey(key) => self
                .users
                .find_by_api_key(key)
                .filter(|u| u.verify_api_key(key)),
            LoginRequest::Password { username, password } => self
                .users
                .find_by_name(username)
                .filter(|u| u.verify_password(password)),
        };
        user.ok_or(ServerError::InvalidCredentials)
    }

    /// Authenticates and attaches the user to `conn`.
    pub fn login(&self, conn: &ConnectionContext, request: &LoginRequest) -> ServerResult<User> {
        let user = self.authenticate(request)?;
        conn.set_user(user.clone());
        tracing::info!(conn_id = conn.id(), user = %user.name, "login succeeded");
        Ok(user)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

/// Returns the connection's user if it may issue commands.
///
/// # Errors
///
/// [`ServerError::Unauthorized`] if nobody logged in, or the user is
/// inactive or unverified.
pub fn require_user(conn: &ConnectionContext) -> ServerResult<User> {
    conn.user()
        .filter(User::is_usable)
        .ok_or(ServerError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::users::UserStore;
    use stowage_protocol::PayloadWriter;

    fn authenticator() -> Authenticator {
        let store = UserStore::new();
        store.insert(User::new("oliver", "hello").with_id("u1"));
        store.insert(User::new("svc", "unused").with_id("u2").with_api_key("k-123"));
        store.insert(User::new("ghost", "boo").with_id("u3").with_active(false));
        Authenticator::new(Arc::new(store))
    }

    fn password_payload(user: &str, pass: &str) -> Vec<u8> {
        PayloadWriter::new()
            .put_u8(AUTH_PASSWORD)
            .put_str16("username", user)
            .unwrap()
            .put_str16("password", pass)
            .unwrap()
            .finish()
            .to_vec()
    }

    #[test]
    fn password_login() {
        let auth = authenticator();
        let req = LoginRequest::parse(&password_payload("oliver", "hello")).unwrap();
        assert_eq!(auth.authenticate(&req).unwrap().id, "u1");

        let req = LoginRequest::parse(&password_payload("oliver", "nope")).unwrap();
        assert!(matches!(auth.authenticate(&req), Err(ServerError::InvalidCredentials)));
    }

    #[test]
    fn api_key_login() {
        let auth = authenticator();
        let payload = PayloadWriter::new()
            .put_u8(AUTH_API_KEY)
            .put_str16("api key", "k-123")
            .unwrap()
            .finish();
        let req = LoginRequest::parse(&payload).unwrap();
        assert_eq!(auth.authenticate(&req).unwrap().name, "svc");

        let req = LoginRequest::ApiKey("k-999".into());
        assert!(matches!(auth.authenticate(&req), Err(ServerError::InvalidCredentials)));
    }

    #[test]
    fn unknown_auth_type() {
        let err = LoginRequest::parse(&[9, 0, 0]).unwrap_err();
        assert_eq!(err.client_message(), "unsupported authentication type");
    }

    #[test]
    fn inactive_user_is_unauthorized() {
        let auth = authenticator();
        let (conn, _rx) = ConnectionContext::new(1, "127.0.0.1:1".parse().unwrap());
        assert!(matches!(require_user(&conn), Err(ServerError::Unauthorized)));

        auth.login(&conn, &LoginRequest::parse(&password_payload("ghost", "boo")).unwrap())
            .unwrap();
        assert!(matches!(require_user(&conn), Err(ServerError::Unauthorized)));

        auth.login(&conn, &LoginRequest::parse(&password_payload("oliver", "hello")).unwrap())
            .unwrap();
        assert_eq!(require_user(&conn).unwrap().name, "oliver");
    }

    #[test]
    fn debug_hides_secrets() {
        let req = LoginRequest::Password {
            username: "oliver".into(),
            password: "hello".into(),
        };
        assert!(!format!("{req:?}").contains("hello"));
    }
}
