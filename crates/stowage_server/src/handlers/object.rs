//! Object commands. All of them touch shard files and run on the blocking
//! pool.

use super::{resolve, Access};
use crate::connection::ConnectionContext;
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;
use std::sync::Arc;
use stowage_codec::Value;
use stowage_core::object::ObjectEngine;
use stowage_core::registry::EngineKind;
use stowage_protocol::ids::object as id;
use stowage_protocol::{value_payload, Command, PayloadReader, Response};

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher
        .register_blocking(id::PUT, put)
        .register_blocking(id::GET, get)
        .register_blocking(id::GET_METADATA, get_metadata)
        .register_blocking(id::DELETE, delete)
        .register_blocking(id::EXISTS, exists)
        .register_blocking(id::LIST, list)
        .register_blocking(id::COPY, transfer)
        .register_blocking(id::MOVE, transfer)
        .register_blocking(id::RENAME, transfer)
        .register_blocking(id::COUNT, count)
        .register_blocking(id::SIZE, size);
}

fn engine(
    state: &ServerState,
    conn: &ConnectionContext,
    cmd: &Command,
    access: Access,
) -> ServerResult<Arc<ObjectEngine>> {
    let engine = resolve(state, conn, cmd, access, EngineKind::Object)?;
    engine
        .as_object()
        .cloned()
        .ok_or_else(|| ServerError::Internal("engine kind changed".into()))
}

fn reply(value: &Value) -> ServerResult<Response> {
    Ok(Response::ok(value_payload(value)?))
}

/// `u16 key | codex Binary`
fn put(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Write)?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let key = reader.read_str16("key")?;
    let data = reader
        .read_value()?
        .into_binary()
        .ok_or_else(|| ServerError::bad_request("object data must be binary"))?;
    if data.is_empty() {
        return Err(ServerError::bad_request("object data must not be empty"));
    }
    objects.put(&key, &data)?;
    Ok(Response::ok_empty())
}

fn get(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Read)?;
    let key = PayloadReader::new(&cmd.payload).read_str16("key")?;
    reply(&Value::Binary(objects.get(&key)?))
}

fn get_metadata(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Read)?;
    let key = PayloadReader::new(&cmd.payload).read_str16("key")?;
    let meta = objects.metadata(&key)?;
    reply(&Value::Map(BTreeMap::from([
        ("size".to_string(), Value::Integer(meta.size as i64)),
        ("checksum".to_string(), Value::Integer(i64::from(meta.checksum))),
        ("created_at".to_string(), Value::Integer(meta.created_at)),
        ("modified_at".to_string(), Value::Integer(meta.modified_at)),
    ])))
}

fn delete(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Write)?;
    let key = PayloadReader::new(&cmd.payload).read_str16("key")?;
    objects.delete(&key)?;
    Ok(Response::ok_empty())
}

fn exists(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Read)?;
    let key = PayloadReader::new(&cmd.payload).read_str16("key")?;
    if objects.exists(&key) {
        Ok(Response::ok_empty())
    } else {
        Err(ServerError::NotFound)
    }
}

/// `[u16 prefix]`; an empty payload lists everything.
fn list(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Read)?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let prefix = if reader.is_empty() {
        String::new()
    } else {
        reader.read_str16("prefix")?
    };
    reply(&Value::string_list(objects.list(&prefix)))
}

/// Copy, move and rename: `u16 src | u16 dst`.
fn transfer(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Write)?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let src = reader.read_str16("source key")?;
    let dst = reader.read_str16("destination key")?;
    match cmd.id {
        id::COPY => objects.copy(&src, &dst)?,
        id::MOVE => objects.move_object(&src, &dst)?,
        _ => objects.rename(&src, &dst)?,
    }
    Ok(Response::ok_empty())
}

fn count(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Read)?;
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(u32::try_from(objects.count()).unwrap_or(u32::MAX));
    Ok(Response::ok(buf.freeze()))
}

fn size(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let objects = engine(state, conn, cmd, Access::Read)?;
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(objects.size());
    Ok(Response::ok(buf.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::Harness;
    use stowage_codec::decode_value;
    use stowage_protocol::{PayloadWriter, Status};

    fn cmd(id: u16, payload: PayloadWriter) -> Command {
        Command::new(id, "sys", "files", payload.finish())
    }

    fn key(k: &str) -> PayloadWriter {
        PayloadWriter::new().put_str16("key", k).unwrap()
    }

    fn put_payload(k: &str, data: &[u8]) -> PayloadWriter {
        key(k).put_value(&Value::Binary(data.to_vec())).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_get_metadata_delete() {
        let h = Harness::admin();
        assert_eq!(h.run(cmd(id::PUT, put_payload("k1", b"hello"))).await.status, Status::Ok);

        let resp = h.run(cmd(id::GET, key("k1"))).await;
        assert_eq!(decode_value(&resp.payload).unwrap(), Value::Binary(b"hello".to_vec()));

        let resp = h.run(cmd(id::GET_METADATA, key("k1"))).await;
        let meta = decode_value(&resp.payload).unwrap();
        let meta = meta.as_map().unwrap();
        assert_eq!(meta["size"], Value::Integer(5));
        assert_eq!(meta["checksum"], Value::Integer(0x3610_A686));

        assert_eq!(h.run(cmd(id::DELETE, key("k1"))).await.status, Status::Ok);
        assert_eq!(h.run(cmd(id::GET, key("k1"))).await.status, Status::NotFound);
        assert_eq!(h.run(cmd(id::DELETE, key("k1"))).await.status, Status::NotFound);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_put_is_rejected() {
        let h = Harness::admin();
        let resp = h.run(cmd(id::PUT, put_payload("k", b""))).await;
        assert_eq!(resp.status, Status::BadRequest);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn copy_move_rename_list() {
        let h = Harness::admin();
        h.run(cmd(id::PUT, put_payload("img/a", b"1"))).await;
        h.run(cmd(id::PUT, put_payload("img/b", b"2"))).await;

        let pair = |a: &str, b: &str| key(a).put_str16("key", b).unwrap();
        assert_eq!(h.run(cmd(id::COPY, pair("img/a", "img/c"))).await.status, Status::Ok);
        assert_eq!(h.run(cmd(id::MOVE, pair("img/b", "doc/b"))).await.status, Status::Ok);
        assert_eq!(
            h.run(cmd(id::RENAME, pair("img/a", "img/c"))).await.status,
            Status::AlreadyExists
        );

        let resp = h.run(cmd(id::LIST, key("img/"))).await;
        assert_eq!(
            decode_value(&resp.payload).unwrap(),
            Value::string_list(["img/a", "img/c"])
        );

        let resp = h.run(cmd(id::COUNT, PayloadWriter::new())).await;
        assert_eq!(resp.payload.as_ref(), &3u32.to_be_bytes());
    }
}
