//! Key-value commands.
//!
//! Keys are `u16`-prefixed strings and values are embedded codex values.
//! Deadlines are absolute unix nanoseconds and must lie in the future.

use super::{resolve, Access};
use crate::connection::ConnectionContext;
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;
use std::sync::Arc;
use stowage_codec::Value;
use stowage_core::kv::{BitOp, DerivedOp, DerivedOutcome, KvEngine, NumOp};
use stowage_core::now_nanos;
use stowage_core::registry::EngineKind;
use stowage_protocol::ids::kv as id;
use stowage_protocol::{value_payload, Command, PayloadReader, Response};

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher
        .register_all(&[id::SET, id::SET_TTL], set)
        .register_all(&[id::SET_MULTIPLE, id::SET_MULTIPLE_TTL], set_multiple)
        .register_all(
            &[
                id::SET_IF_EXISTS,
                id::SET_IF_EXISTS_TTL,
                id::SET_IF_NOT_EXISTS,
                id::SET_IF_NOT_EXISTS_TTL,
            ],
            set_conditional,
        )
        .register(id::DELETE, delete)
        .register(id::DELETE_MULTIPLE, delete_multiple)
        .register(id::DELETE_ALL, delete_all)
        .register(id::EXISTS, exists)
        .register(id::GET, get)
        .register(id::GET_MULTIPLE, get_multiple)
        .register(id::GET_ALL, get_all)
        .register(id::GET_TTL, get_ttl)
        .register(id::GET_MULTIPLE_TTL, get_multiple_ttl)
        .register(id::GET_ALL_TTL, get_all_ttl)
        .register(id::KEYS, keys)
        .register(id::COUNT, count)
        .register(id::SIZE, size)
        .register_all(DERIVED, derived);
}

const DERIVED: &[u16] = &[
    id::NUM_INCREMENT,
    id::NUM_DECREMENT,
    id::NUM_MULTIPLY,
    id::NUM_DIVIDE,
    id::NUM_MODULO,
    id::NUM_LEFT_SHIFT,
    id::NUM_RIGHT_SHIFT,
    id::NUM_AND,
    id::NUM_OR,
    id::NUM_XOR,
    id::NUM_NOT,
    id::STRING_APPEND,
    id::STRING_PREPEND,
    id::STRING_LENGTH,
    id::STRING_SUBSTRING,
    id::LIST_LENGTH,
    id::LIST_GET,
    id::LIST_SET,
    id::LIST_REMOVE,
    id::LIST_LEFT_PUSH,
    id::LIST_RIGHT_PUSH,
    id::LIST_LEFT_POP,
    id::LIST_RIGHT_POP,
    id::MAP_LENGTH,
    id::MAP_SET,
    id::MAP_GET,
    id::MAP_DELETE,
    id::MAP_EXISTS,
    id::MAP_KEYS,
    id::MAP_VALUES,
];

fn engine(
    state: &ServerState,
    conn: &ConnectionContext,
    cmd: &Command,
    access: Access,
) -> ServerResult<Arc<KvEngine>> {
    let engine = resolve(state, conn, cmd, access, EngineKind::Kv)?;
    engine
        .as_kv()
        .cloned()
        .ok_or_else(|| ServerError::Internal("engine kind changed".into()))
}

fn read_deadline(reader: &mut PayloadReader<'_>) -> ServerResult<i64> {
    let raw = reader.read_u64()?;
    match i64::try_from(raw) {
        Ok(deadline) if deadline > now_nanos() => Ok(deadline),
        _ => Err(ServerError::bad_request("invalid TTL")),
    }
}

fn read_keys(reader: &mut PayloadReader<'_>) -> ServerResult<Vec<String>> {
    let Value::List(items) = reader.read_value()? else {
        return Err(ServerError::bad_request("keys must be a list"));
    };
    items
        .into_iter()
        .map(|v| {
            v.into_string()
                .ok_or_else(|| ServerError::bad_request("keys must be strings"))
        })
        .collect()
}

fn reply(value: &Value) -> ServerResult<Response> {
    Ok(Response::ok(value_payload(value)?))
}

fn deadlines(map: BTreeMap<String, i64>) -> Value {
    Value::Map(map.into_iter().map(|(k, t)| (k, Value::Integer(t))).collect())
}

fn set(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Write)?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let key = reader.read_str16("key")?;
    let value = reader.read_value()?;
    let deadline = if cmd.id == id::SET_TTL {
        read_deadline(&mut reader)?
    } else {
        0
    };
    kv.set(&key, value, deadline);
    Ok(Response::ok_empty())
}

fn set_multiple(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Write)?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let Value::Map(entries) = reader.read_value()? else {
        return Err(ServerError::bad_request("entries must be a map"));
    };
    let deadline = if cmd.id == id::SET_MULTIPLE_TTL {
        read_deadline(&mut reader)?
    } else {
        0
    };
    kv.set_multiple(entries, deadline);
    Ok(Response::ok_empty())
}

fn set_conditional(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Write)?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let key = reader.read_str16("key")?;
    let value = reader.read_value()?;
    let deadline = if matches!(cmd.id, id::SET_IF_EXISTS_TTL | id::SET_IF_NOT_EXISTS_TTL) {
        read_deadline(&mut reader)?
    } else {
        0
    };
    let written = if matches!(cmd.id, id::SET_IF_EXISTS | id::SET_IF_EXISTS_TTL) {
        kv.set_if_exists(&key, value, deadline)
    } else {
        kv.set_if_not_exists(&key, value, deadline)
    };
    reply(&Value::Boolean(written))
}

fn delete(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Write)?;
    let key = PayloadReader::new(&cmd.payload).read_str16("key")?;
    kv.delete(&key);
    Ok(Response::ok_empty())
}

fn delete_multiple(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Write)?;
    let keys = read_keys(&mut PayloadReader::new(&cmd.payload))?;
    kv.delete_multiple(&keys);
    Ok(Response::ok_empty())
}

fn delete_all(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    engine(state, conn, cmd, Access::Write)?.clear();
    Ok(Response::ok_empty())
}

fn exists(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    let key = PayloadReader::new(&cmd.payload).read_str16("key")?;
    if kv.exists(&key) {
        Ok(Response::ok_empty())
    } else {
        Err(ServerError::NotFound)
    }
}

fn get(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    let key = PayloadReader::new(&cmd.payload).read_str16("key")?;
    let value = kv.get(&key).ok_or(ServerError::NotFound)?;
    reply(&value)
}

fn get_multiple(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    let keys = read_keys(&mut PayloadReader::new(&cmd.payload))?;
    reply(&Value::Map(kv.get_multiple(&keys)))
}

fn get_all(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    reply(&Value::Map(kv.get_all()))
}

/// `u64` deadline; 0 when the key never expires.
fn get_ttl(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    let key = PayloadReader::new(&cmd.payload).read_str16("key")?;
    let deadline = kv.get_ttl(&key).ok_or(ServerError::NotFound)?;
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(deadline.max(0) as u64);
    Ok(Response::ok(buf.freeze()))
}

fn get_multiple_ttl(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    let keys = read_keys(&mut PayloadReader::new(&cmd.payload))?;
    reply(&deadlines(kv.get_multiple_ttl(&keys)))
}

fn get_all_ttl(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    reply(&deadlines(kv.get_all_ttl()))
}

fn keys(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    reply(&Value::string_list(kv.keys()))
}

fn count(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u32(u32::try_from(kv.count()).unwrap_or(u32::MAX));
    Ok(Response::ok(buf.freeze()))
}

fn size(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, Access::Read)?;
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u64(kv.size());
    Ok(Response::ok(buf.freeze()))
}

fn derived_access(command: u16) -> Access {
    match command {
        id::STRING_LENGTH
        | id::STRING_SUBSTRING
        | id::LIST_LENGTH
        | id::LIST_GET
        | id::MAP_LENGTH
        | id::MAP_GET
        | id::MAP_EXISTS
        | id::MAP_KEYS
        | id::MAP_VALUES => Access::Read,
        _ => Access::Write,
    }
}

fn integer_operand(reader: &mut PayloadReader<'_>) -> ServerResult<i64> {
    reader
        .read_value()?
        .as_integer()
        .ok_or_else(|| ServerError::bad_request("operand must be an integer"))
}

fn string_operand(reader: &mut PayloadReader<'_>) -> ServerResult<String> {
    reader
        .read_value()?
        .into_string()
        .ok_or_else(|| ServerError::bad_request("operand must be a string"))
}

/// Decodes the operation-specific part of a derived command.
fn parse_derived(command: u16, reader: &mut PayloadReader<'_>) -> ServerResult<DerivedOp> {
    Ok(match command {
        id::NUM_INCREMENT => DerivedOp::Numeric(NumOp::Increment, numeric_operand(reader)?),
        id::NUM_DECREMENT => DerivedOp::Numeric(NumOp::Decrement, numeric_operand(reader)?),
        id::NUM_MULTIPLY => DerivedOp::Numeric(NumOp::Multiply, numeric_operand(reader)?),
        id::NUM_DIVIDE => DerivedOp::Numeric(NumOp::Divide, numeric_operand(reader)?),
        id::NUM_MODULO => DerivedOp::Numeric(NumOp::Modulo, numeric_operand(reader)?),
        id::NUM_LEFT_SHIFT => DerivedOp::Bitwise(BitOp::LeftShift, integer_operand(reader)?),
        id::NUM_RIGHT_SHIFT => DerivedOp::Bitwise(BitOp::RightShift, integer_operand(reader)?),
        id::NUM_AND => DerivedOp::Bitwise(BitOp::And, integer_operand(reader)?),
        id::NUM_OR => DerivedOp::Bitwise(BitOp::Or, integer_operand(reader)?),
        id::NUM_XOR => DerivedOp::Bitwise(BitOp::Xor, integer_operand(reader)?),
        id::NUM_NOT => DerivedOp::Not,
        id::STRING_APPEND => DerivedOp::Append(string_operand(reader)?),
        id::STRING_PREPEND => DerivedOp::Prepend(string_operand(reader)?),
        id::STRING_LENGTH => DerivedOp::StringLength,
        id::STRING_SUBSTRING => DerivedOp::Substring {
            start: reader.read_u32()?,
            end: reader.read_u32()?,
        },
        id::LIST_LENGTH => DerivedOp::ListLength,
        id::LIST_GET => DerivedOp::ListGet(reader.read_u32()?),
        id::LIST_SET => DerivedOp::ListSet(reader.read_u32()?, reader.read_value()?),
        id::LIST_REMOVE => DerivedOp::ListRemove(reader.read_value()?),
        id::LIST_LEFT_PUSH => DerivedOp::LeftPush(reader.read_value()?),
        id::LIST_RIGHT_PUSH => DerivedOp::RightPush(reader.read_value()?),
        id::LIST_LEFT_POP => DerivedOp::LeftPop,
        id::LIST_RIGHT_POP => DerivedOp::RightPop,
        id::MAP_LENGTH => DerivedOp::MapLength,
        id::MAP_SET => DerivedOp::MapSet(reader.read_str16("field")?, reader.read_value()?),
        id::MAP_GET => DerivedOp::MapGet(reader.read_str16("field")?),
        id::MAP_DELETE => DerivedOp::MapDelete(reader.read_str16("field")?),
        id::MAP_EXISTS => DerivedOp::MapExists(reader.read_str16("field")?),
        id::MAP_KEYS => DerivedOp::MapKeys,
        id::MAP_VALUES => DerivedOp::MapValues,
        other => return Err(ServerError::CommandNotFound(other)),
    })
}

fn numeric_operand(reader: &mut PayloadReader<'_>) -> ServerResult<Value> {
    match reader.read_value()? {
        v @ (Value::Integer(_) | Value::Number(_)) => Ok(v),
        _ => Err(ServerError::bad_request("operand must be numeric")),
    }
}

fn derived(state: &ServerState, conn: &ConnectionContext, cmd: &Command) -> ServerResult<Response> {
    let kv = engine(state, conn, cmd, derived_access(cmd.id))?;
    let mut reader = PayloadReader::new(&cmd.payload);
    let key = reader.read_str16("key")?;
    let op = parse_derived(cmd.id, &mut reader)?;
    match kv.apply(&key, op)? {
        DerivedOutcome::Value(value) => reply(&value),
        DerivedOutcome::Done => Ok(Response::ok_empty()),
        DerivedOutcome::Missing => Err(ServerError::NotFound),
    }
}
