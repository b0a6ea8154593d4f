//! Response status codes.

use std::fmt;

/// Status code carried by every response.
///
/// Distinct failure kinds always map to distinct codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The command succeeded.
    Ok,
    /// The frame or message could not be decoded.
    InvalidMessage,
    /// No handler is registered for the command id.
    CommandNotFound,
    /// Login credentials were rejected.
    InvalidCredentials,
    /// The command payload is malformed.
    BadRequest,
    /// The connection has no active, verified user.
    Unauthorized,
    /// The user lacks the permission the command needs.
    Forbidden,
    /// The addressed key or object does not exist.
    NotFound,
    /// The addressed database does not exist.
    DatabaseNotFound,
    /// The addressed collection does not exist.
    CollectionNotFound,
    /// The collection's engine does not implement the command.
    CommandNotAllowed,
    /// The addressed database or collection already exists.
    AlreadyExists,
    /// The server failed unexpectedly.
    InternalServerError,
}

impl Status {
    /// Every status, in code order.
    pub const ALL: [Status; 13] = [
        Status::Ok,
        Status::InvalidMessage,
        Status::CommandNotFound,
        Status::InvalidCredentials,
        Status::BadRequest,
        Status::Unauthorized,
        Status::Forbidden,
        Status::NotFound,
        Status::DatabaseNotFound,
        Status::CollectionNotFound,
        Status::CommandNotAllowed,
        Status::AlreadyExists,
        Status::InternalServerError,
    ];

    /// Returns the wire code.
    pub const fn code(self) -> u16 {
        match self {
            Status::Ok => 1,
            Status::InvalidMessage => 1000,
            Status::CommandNotFound => 1001,
            Status::InvalidCredentials => 1002,
            Status::BadRequest => 1003,
            Status::Unauthorized => 1004,
            Status::Forbidden => 1005,
            Status::NotFound => 1006,
            Status::DatabaseNotFound => 1007,
            Status::CollectionNotFound => 1008,
            Status::CommandNotAllowed => 1009,
            Status::AlreadyExists => 1010,
            Status::InternalServerError => 2000,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Returns true for [`Status::Ok`].
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_distinct() {
        let codes: HashSet<u16> = Status::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes.len(), Status::ALL.len());
    }

    #[test]
    fn fixed_codes() {
        assert_eq!(Status::Ok.code(), 1);
        assert_eq!(Status::CommandNotFound.code(), 1001);
        assert_eq!(Status::InvalidCredentials.code(), 1002);
        assert_eq!(Status::BadRequest.code(), 1003);
        assert_eq!(Status::Unauthorized.code(), 1004);
        assert_eq!(Status::InternalServerError.code(), 2000);
    }

    #[test]
    fn parse_codes() {
        for status in Status::ALL {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(42), None);
    }
}
