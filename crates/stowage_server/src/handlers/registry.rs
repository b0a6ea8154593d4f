//! Database and collection management commands.
//!
//! Registry commands carry their names in the payload; the command's own
//! database and collection fields are ignored.
//!
//! ```text
//! DatabaseGet / DatabaseDelete    u16 name
//! DatabaseList                    (empty)
//! DatabaseCreate                  u16 name
//! DatabaseUpdateUsers             u16 name | codex Map(userId -> level)
//! CollectionGet / Delete          u16 database | u16 name
//! CollectionList                  u16 database
//! CollectionCreate                u16 database | u16 name | u8 engine | [u8 flags]
//! CollectionRename                u16 database | u16 from | u16 to
//! ```
//!
//! Records are returned as codex maps.

use super::{authorize, Access};
use crate::auth::require_user;
use crate::connection::ConnectionContext;
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use std::collections::BTreeMap;
use stowage_codec::Value;
use stowage_core::registry::{
    validate_name, Collection, Database, EngineKind, KvSettings, PermissionLevel,
};
use stowage_protocol::{ids, value_payload, Command, PayloadReader, Response};

/// Collection flag: skip the TTL cleaner.
pub const FLAG_DISABLE_TTL: u8 = 0b0000_0001;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher
        .register(ids::DATABASE_GET, database_get)
        .register(ids::DATABASE_LIST, database_list)
        .register(ids::DATABASE_CREATE, database_create)
        .register_blocking(ids::DATABASE_DELETE, database_delete)
        .register(ids::DATABASE_UPDATE_USERS, database_update_users)
        .register(ids::COLLECTION_GET, collection_get)
        .register(ids::COLLECTION_LIST, collection_list)
        .register_blocking(ids::COLLECTION_CREATE, collection_create)
        .register_blocking(ids::COLLECTION_DELETE, collection_delete)
        .register_blocking(ids::COLLECTION_RENAME, collection_rename);
}

fn database_value(db: &Database) -> Value {
    let users = db
        .users
        .iter()
        .map(|(id, level)| (id.clone(), Value::from(level.as_str())))
        .collect::<BTreeMap<_, _>>();
    Value::Map(BTreeMap::from([
        ("name".to_string(), Value::from(db.name.as_str())),
        ("created_at".to_string(), Value::Integer(db.created_at)),
        ("users".to_string(), Value::Map(users)),
    ]))
}

fn collection_value(coll: &Collection) -> Value {
    Value::Map(BTreeMap::from([
        ("database".to_string(), Value::from(coll.database.as_str())),
        ("name".to_string(), Value::from(coll.name.as_str())),
        ("engine".to_string(), Value::from(coll.engine.as_str())),
        ("created_at".to_string(), Value::Integer(coll.created_at)),
        ("disable_ttl".to_string(), Value::Boolean(coll.kv_settings.disable_ttl)),
    ]))
}

fn reply(value: &Value) -> ServerResult<Response> {
    Ok(Response::ok(value_payload(value)?))
}

fn require_admin(conn: &ConnectionContext) -> ServerResult<()> {
    if require_user(conn)?.is_admin() {
        Ok(())
    } else {
        Err(ServerError::Forbidden)
    }
}

fn database_get(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let name = PayloadReader::new(&cmd.payload).read_str16("database")?;
    let (_, db) = authorize(state, conn, &name, Access::Read)?;
    reply(&database_value(&db))
}

fn database_list(state: &ServerState, conn: &ConnectionContext, _: &Command) -> ServerResult<Response> {
    let user = require_user(conn)?;
    let databases = state.registry().list_databases_for_user(&user)?;
    reply(&Value::List(databases.iter().map(database_value).collect()))
}

fn database_create(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    require_admin(conn)?;
    let name = PayloadReader::new(&cmd.payload).read_str16("database")?;
    validate_name("database", &name)?;
    let db = state.registry().create_database(Database::new(name))?;
    tracing::info!(conn_id = conn.id(), database = %db.name, "database created");
    reply(&database_value(&db))
}

fn database_delete(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    require_admin(conn)?;
    let name = PayloadReader::new(&cmd.payload).read_str16("database")?;
    state.catalog().delete_database(&name)?;
    Ok(Response::ok_empty())
}

fn database_update_users(
    state: &ServerState,
    conn: &ConnectionContext,
    cmd: &Command,
) -> ServerResult<Response> {
    let mut reader = PayloadReader::new(&cmd.payload);
    let name = reader.read_str16("database")?;
    let Value::Map(entries) = reader.read_value()? else {
        return Err(ServerError::bad_request("users must be a map"));
    };
    authorize(state, conn, &name, Access::Admin)?;

    let mut users = BTreeMap::new();
    for (user_id, level) in entries {
        let level = level
            .as_str()
            .and_then(PermissionLevel::parse)
            .ok_or_else(|| ServerError::bad_request(format!("invalid permission level for {user_id}")))?;
        users.insert(user_id, level);
    }
    let db = state.registry().update_database_users(&name, users)?;
    reply(&database_value(&db))
}

fn collection_get(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let mut reader = PayloadReader::new(&cmd.payload);
    let database = reader.read_str16("database")?;
    let name = reader.read_str16("collection")?;
    authorize(state, conn, &database, Access::Read)?;
    reply(&collection_value(&state.registry().get_collection(&database, &name)?))
}

fn collection_list(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let database = PayloadReader::new(&cmd.payload).read_str16("database")?;
    authorize(state, conn, &database, Access::Read)?;
    let collections = state.registry().list_collections(&database)?;
    reply(&Value::List(collections.iter().map(collection_value).collect()))
}

fn collection_create(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let mut reader = PayloadReader::new(&cmd.payload);
    let database = reader.read_str16("database")?;
    let name = reader.read_str16("collection")?;
    let engine = EngineKind::from_code(reader.read_u8()?)
        .ok_or_else(|| ServerError::bad_request("unknown engine"))?;
    let flags = if reader.is_empty() { 0 } else { reader.read_u8()? };

    authorize(state, conn, &database, Access::Write)?;
    validate_name("collection", &name)?;
    let settings = KvSettings {
        disable_ttl: flags & FLAG_DISABLE_TTL != 0,
    };
    let coll = state
        .catalog()
        .create_collection(Collection::new(database, name, engine).with_kv_settings(settings))?;
    reply(&collection_value(&coll))
}

fn collection_delete(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let mut reader = PayloadReader::new(&cmd.payload);
    let database = reader.read_str16("database")?;
    let name = reader.read_str16("collection")?;
    authorize(state, conn, &database, Access::Write)?;
    state.catalog().delete_collection(&database, &name)?;
    Ok(Response::ok_empty())
}

fn collection_rename(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let mut reader = PayloadReader::new(&cmd.payload);
    let database = reader.read_str16("database")?;
    let from = reader.read_str16("collection")?;
    let to = reader.read_str16("new name")?;
    authorize(state, conn, &database, Access::Write)?;
    validate_name("collection", &to)?;
    let coll = state.catalog().rename_collection(&database, &from, &to)?;
    reply(&collection_value(&coll))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::Harness;
    use stowage_codec::decode_value;
    use stowage_protocol::{PayloadWriter, Status};

    fn names(parts: &[&str]) -> PayloadWriter {
        parts
            .iter()
            .fold(PayloadWriter::new(), |w, p| w.put_str16("name", p).unwrap())
    }

    #[tokio::test]
    async fn admin_creates_and_lists_databases() {
        let h = Harness::admin();
        let resp = h.run(Command::system(ids::DATABASE_CREATE, names(&["app"]).finish())).await;
        assert_eq!(resp.status, Status::Ok);
        let created = decode_value(&resp.payload).unwrap();
        assert_eq!(created.as_map().unwrap()["name"], Value::from("app"));

        let resp = h.run(Command::system(ids::DATABASE_CREATE, names(&["app"]).finish())).await;
        assert_eq!(resp.status, Status::AlreadyExists);

        let resp = h.run(Command::system(ids::DATABASE_LIST, Vec::new())).await;
        let list = decode_value(&resp.payload).unwrap();
        assert_eq!(list.as_list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn readers_cannot_create_databases() {
        let h = Harness::login("reader", "pw");
        let resp = h.run(Command::system(ids::DATABASE_CREATE, names(&["app"]).finish())).await;
        assert_eq!(resp.status, Status::Forbidden);

        let resp = h.run(Command::system(ids::DATABASE_LIST, Vec::new())).await;
        let list = decode_value(&resp.payload).unwrap();
        assert_eq!(list.as_list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsafe_names_are_rejected() {
        let h = Harness::admin();
        let resp = h.run(Command::system(ids::DATABASE_CREATE, names(&["../etc"]).finish())).await;
        assert_eq!(resp.status, Status::BadRequest);
    }

    #[tokio::test]
    async fn collection_lifecycle() {
        let h = Harness::admin();
        let payload = names(&["sys", "sessions"]).put_u8(1).put_u8(FLAG_DISABLE_TTL).finish();
        let resp = h.run(Command::system(ids::COLLECTION_CREATE, payload)).await;
        assert_eq!(resp.status, Status::Ok);
        let coll = decode_value(&resp.payload).unwrap();
        assert_eq!(coll.as_map().unwrap()["disable_ttl"], Value::Boolean(true));
        assert_eq!(coll.as_map().unwrap()["engine"], Value::from("kv"));

        let resp = h
            .run(Command::system(ids::COLLECTION_RENAME, names(&["sys", "sessions", "logins"]).finish()))
            .await;
        assert_eq!(resp.status, Status::Ok);

        let resp = h.run(Command::system(ids::COLLECTION_GET, names(&["sys", "sessions"]).finish())).await;
        assert_eq!(resp.status, Status::CollectionNotFound);

        let resp = h.run(Command::system(ids::COLLECTION_LIST, names(&["sys"]).finish())).await;
        let list = decode_value(&resp.payload).unwrap();
        assert_eq!(list.as_list().unwrap().len(), 4);

        let resp = h.run(Command::system(ids::COLLECTION_DELETE, names(&["sys", "logins"]).finish())).await;
        assert_eq!(resp.status, Status::Ok);
        assert!(h.state.catalog().engine("sys", "logins").is_err());
    }

    #[tokio::test]
    async fn unknown_engine_is_bad_request() {
        let h = Harness::admin();
        let payload = names(&["sys", "x"]).put_u8(9).finish();
        let resp = h.run(Command::system(ids::COLLECTION_CREATE, payload)).await;
        assert_eq!(resp.status, Status::BadRequest);
    }

    #[tokio::test]
    async fn update_users_replaces_map() {
        let h = Harness::admin();
        let users = Value::Map(BTreeMap::from([(
            "u-reader".to_string(),
            Value::from("read_write"),
        )]));
        let payload = names(&["sys"]).put_value(&users).unwrap().finish();
        let resp = h.run(Command::system(ids::DATABASE_UPDATE_USERS, payload)).await;
        assert_eq!(resp.status, Status::Ok);

        let db = h.state.registry().get_database("sys").unwrap();
        assert_eq!(db.users.get("u-reader"), Some(&PermissionLevel::ReadWrite));

        let bad = Value::Map(BTreeMap::from([("u-reader".to_string(), Value::from("owner"))]));
        let payload = names(&["sys"]).put_value(&bad).unwrap().finish();
        let resp = h.run(Command::system(ids::DATABASE_UPDATE_USERS, payload)).await;
        assert_eq!(resp.status, Status::BadRequest);
    }

    #[tokio::test]
    async fn delete_database_drops_engines() {
        let h = Harness::admin();
        let resp = h.run(Command::system(ids::DATABASE_DELETE, names(&["sys"]).finish())).await;
        assert_eq!(resp.status, Status::Ok);
        assert!(h.state.catalog().is_empty());

        let resp = h.run(Command::system(ids::DATABASE_GET, names(&["sys"]).finish())).await;
        assert_eq!(resp.status, Status::DatabaseNotFound);
    }
}
