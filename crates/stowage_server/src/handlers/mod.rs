//! Command handlers.
//!
//! Collection commands share one resolution pipeline, see [`resolve`]:
//! identity, database, permission, collection, engine type. Payload parsing
//! and the engine call follow in each handler.

mod broker;
mod kv;
mod object;
mod registry;
mod system;

use crate::auth::require_user;
use crate::connection::ConnectionContext;
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use stowage_core::registry::{Database, EngineKind};
use stowage_core::users::User;
use stowage_core::Engine;
use stowage_protocol::Command;

/// Permission a command needs on its database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
    Admin,
}

impl Access {
    fn allows(self, database: &Database, user: &User) -> bool {
        match self {
            Self::Read => database.can_read(user),
            Self::Write => database.can_write(user),
            Self::Admin => database.can_admin(user),
        }
    }
}

/// Builds a dispatcher with every server command registered.
pub fn dispatcher() -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    system::register(&mut dispatcher);
    registry::register(&mut dispatcher);
    kv::register(&mut dispatcher);
    object::register(&mut dispatcher);
    broker::register(&mut dispatcher);
    dispatcher
}

/// Checks that the connection's user may `access` the command's database.
pub(crate) fn authorize(
    state: &ServerState,
    conn: &ConnectionContext,
    database: &str,
    access: Access,
) -> ServerResult<(User, Database)> {
    let user = require_user(conn)?;
    let db = state.registry().get_database(database)?;
    if !access.allows(&db, &user) {
        return Err(ServerError::Forbidden);
    }
    Ok((user, db))
}

/// Resolves the engine addressed by `cmd`.
pub(crate) fn resolve(
    state: &ServerState,
    conn: &ConnectionContext,
    cmd: &Command,
    access: Access,
    kind: EngineKind,
) -> ServerResult<Engine> {
    authorize(state, conn, &cmd.database, access)?;
    let engine = state.catalog().engine(&cmd.database, &cmd.collection)?;
    if engine.kind() != kind {
        return Err(ServerError::CommandNotAllowed(engine.kind().as_str()));
    }
    Ok(engine)
}
