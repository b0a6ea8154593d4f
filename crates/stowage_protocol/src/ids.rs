//! Command identifiers.
//!
//! | range | family |
//! |---|---|
//! | 0xxx | system and auth |
//! | 1xxx | registry |
//! | 2xxx | key-value |
//! | 4xxx | object |
//! | 6xxx | broker |

/// Health check; responds `pong`.
pub const PING: u16 = 1;
/// Lists protocol versions the server speaks.
pub const SUPPORTED_PROTOCOL_VERSIONS: u16 = 2;
/// Authenticates the connection.
pub const LOGIN: u16 = 100;
/// Reports whether the connection is authenticated.
pub const AUTH_STATUS: u16 = 101;

/// Fetches one database.
pub const DATABASE_GET: u16 = 1000;
/// Lists databases readable by the user.
pub const DATABASE_LIST: u16 = 1001;
/// Creates a database.
pub const DATABASE_CREATE: u16 = 1002;
/// Deletes a database and its collections.
pub const DATABASE_DELETE: u16 = 1003;
/// Replaces a database's user permissions.
pub const DATABASE_UPDATE_USERS: u16 = 1004;
/// Fetches one collection.
pub const COLLECTION_GET: u16 = 1010;
/// Lists the collections of a database.
pub const COLLECTION_LIST: u16 = 1011;
/// Creates a collection bound to an engine.
pub const COLLECTION_CREATE: u16 = 1012;
/// Deletes a collection and its engine state.
pub const COLLECTION_DELETE: u16 = 1013;
/// Renames a collection.
pub const COLLECTION_RENAME: u16 = 1014;

#[allow(missing_docs)]
pub mod kv {
    pub const SET: u16 = 2000;
    pub const SET_TTL: u16 = 2001;
    pub const SET_MULTIPLE: u16 = 2002;
    pub const SET_MULTIPLE_TTL: u16 = 2003;
    pub const SET_IF_EXISTS: u16 = 2004;
    pub const SET_IF_EXISTS_TTL: u16 = 2005;
    pub const SET_IF_NOT_EXISTS: u16 = 2006;
    pub const SET_IF_NOT_EXISTS_TTL: u16 = 2007;

    pub const DELETE: u16 = 2020;
    pub const DELETE_MULTIPLE: u16 = 2021;
    pub const DELETE_ALL: u16 = 2022;

    pub const EXISTS: u16 = 2030;
    pub const GET: u16 = 2031;
    pub const GET_MULTIPLE: u16 = 2032;
    pub const GET_ALL: u16 = 2033;
    pub const GET_TTL: u16 = 2034;
    pub const GET_MULTIPLE_TTL: u16 = 2035;
    pub const GET_ALL_TTL: u16 = 2036;
    pub const KEYS: u16 = 2037;
    pub const COUNT: u16 = 2038;
    pub const SIZE: u16 = 2039;

    pub const NUM_INCREMENT: u16 = 2520;
    pub const NUM_DECREMENT: u16 = 2521;
    pub const NUM_MULTIPLY: u16 = 2522;
    pub const NUM_DIVIDE: u16 = 2523;
    pub const NUM_MODULO: u16 = 2524;
    pub const NUM_LEFT_SHIFT: u16 = 2525;
    pub const NUM_RIGHT_SHIFT: u16 = 2526;
    pub const NUM_AND: u16 = 2527;
    pub const NUM_OR: u16 = 2528;
    pub const NUM_XOR: u16 = 2529;
    pub const NUM_NOT: u16 = 2530;

    pub const STRING_APPEND: u16 = 2540;
    pub const STRING_PREPEND: u16 = 2541;
    pub const STRING_LENGTH: u16 = 2542;
    pub const STRING_SUBSTRING: u16 = 2543;

    pub const LIST_LENGTH: u16 = 2550;
    pub const LIST_GET: u16 = 2551;
    pub const LIST_SET: u16 = 2552;
    pub const LIST_REMOVE: u16 = 2553;
    pub const LIST_LEFT_PUSH: u16 = 2554;
    pub const LIST_RIGHT_PUSH: u16 = 2555;
    pub const LIST_LEFT_POP: u16 = 2556;
    pub const LIST_RIGHT_POP: u16 = 2557;

    pub const MAP_LENGTH: u16 = 2560;
    pub const MAP_SET: u16 = 2561;
    pub const MAP_GET: u16 = 2562;
    pub const MAP_DELETE: u16 = 2563;
    pub const MAP_EXISTS: u16 = 2564;
    pub const MAP_KEYS: u16 = 2565;
    pub const MAP_VALUES: u16 = 2566;
}

#[allow(missing_docs)]
pub mod object {
    pub const PUT: u16 = 4000;
    pub const GET: u16 = 4001;
    pub const GET_METADATA: u16 = 4002;
    pub const DELETE: u16 = 4003;
    pub const EXISTS: u16 = 4004;
    pub const LIST: u16 = 4005;
    pub const COPY: u16 = 4006;
    pub const MOVE: u16 = 4007;
    pub const RENAME: u16 = 4008;
    pub const COUNT: u16 = 4009;
    pub const SIZE: u16 = 4010;
}

#[allow(missing_docs)]
pub mod broker {
    pub const SUBSCRIBE: u16 = 6000;
    pub const SUBSCRIBE_QUEUE: u16 = 6001;
    pub const UNSUBSCRIBE: u16 = 6002;
    pub const PUBLISH: u16 = 6003;
    /// Server-to-client delivery of a batch of published messages.
    pub const CLIENT_MESSAGE: u16 = 6004;
}
