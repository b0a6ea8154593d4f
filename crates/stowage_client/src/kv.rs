//! Key-value commands.

use crate::client::{into_payload, optional, read_u32, read_u64, string_list, value_of, Client};
use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use stowage_codec::Value;
use stowage_protocol::ids::kv as id;
use stowage_protocol::{Command, PayloadWriter};

/// Absolute deadline `ttl` from now, in unix nanoseconds.
pub fn deadline_after(ttl: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from((now + ttl).as_nanos()).unwrap_or(u64::MAX)
}

/// Key-value commands bound to one collection.
#[derive(Debug, Clone, Copy)]
pub struct Kv<'a> {
    client: &'a Client,
    database: &'a str,
    collection: &'a str,
}

impl<'a> Kv<'a> {
    pub(crate) fn new(client: &'a Client, database: &'a str, collection: &'a str) -> Self {
        Self {
            client,
            database,
            collection,
        }
    }

    async fn call(&self, command: u16, payload: PayloadWriter) -> ClientResult<Bytes> {
        let cmd = Command::new(command, self.database, self.collection, payload.finish());
        self.client.execute(&cmd).await
    }

    fn key(key: &str) -> ClientResult<PayloadWriter> {
        Ok(PayloadWriter::new().put_str16("key", key)?)
    }

    fn keys_payload(keys: &[&str]) -> ClientResult<PayloadWriter> {
        Ok(PayloadWriter::new().put_value(&Value::string_list(keys.iter().copied()))?)
    }

    /// Stores `value` under `key` without a deadline.
    pub async fn set(&self, key: &str, value: &Value) -> ClientResult<()> {
        self.call(id::SET, Self::key(key)?.put_value(value)?).await?;
        Ok(())
    }

    /// Stores `value` under `key` until `expires_at` (unix nanoseconds).
    pub async fn set_until(&self, key: &str, value: &Value, expires_at: u64) -> ClientResult<()> {
        let payload = Self::key(key)?.put_value(value)?.put_u64(expires_at);
        self.call(id::SET_TTL, payload).await?;
        Ok(())
    }

    /// Stores `value` under `key` for `ttl`.
    pub async fn set_with_ttl(&self, key: &str, value: &Value, ttl: Duration) -> ClientResult<()> {
        self.set_until(key, value, deadline_after(ttl)).await
    }

    /// Stores every entry, optionally with one shared deadline.
    pub async fn set_multiple(
        &self,
        entries: BTreeMap<String, Value>,
        expires_at: Option<u64>,
    ) -> ClientResult<()> {
        let payload = PayloadWriter::new().put_value(&Value::Map(entries))?;
        match expires_at {
            Some(deadline) => self.call(id::SET_MULTIPLE_TTL, payload.put_u64(deadline)).await?,
            None => self.call(id::SET_MULTIPLE, payload).await?,
        };
        Ok(())
    }

    async fn set_conditional(
        &self,
        plain: u16,
        with_ttl: u16,
        key: &str,
        value: &Value,
        expires_at: Option<u64>,
    ) -> ClientResult<bool> {
        let payload = Self::key(key)?.put_value(value)?;
        let reply = match expires_at {
            Some(deadline) => self.call(with_ttl, payload.put_u64(deadline)).await?,
            None => self.call(plain, payload).await?,
        };
        value_of(&reply)?
            .as_bool()
            .ok_or_else(|| ClientError::unexpected("conditional set must answer a boolean"))
    }

    /// Overwrites `key` only if it exists. Returns whether it was written.
    pub async fn set_if_exists(
        &self,
        key: &str,
        value: &Value,
        expires_at: Option<u64>,
    ) -> ClientResult<bool> {
        self.set_conditional(id::SET_IF_EXISTS, id::SET_IF_EXISTS_TTL, key, value, expires_at)
            .await
    }

    /// Writes `key` only if it is absent. Returns whether it was written.
    pub async fn set_if_not_exists(
        &self,
        key: &str,
        value: &Value,
        expires_at: Option<u64>,
    ) -> ClientResult<bool> {
        self.set_conditional(id::SET_IF_NOT_EXISTS, id::SET_IF_NOT_EXISTS_TTL, key, value, expires_at)
            .await
    }

    /// Removes `key`; missing keys are not an error.
    pub async fn delete(&self, key: &str) -> ClientResult<()> {
        self.call(id::DELETE, Self::key(key)?).await?;
        Ok(())
    }

    /// Removes every listed key.
    pub async fn delete_multiple(&self, keys: &[&str]) -> ClientResult<()> {
        self.call(id::DELETE_MULTIPLE, Self::keys_payload(keys)?).await?;
        Ok(())
    }

    /// Removes every key of the collection.
    pub async fn delete_all(&self) -> ClientResult<()> {
        self.call(id::DELETE_ALL, PayloadWriter::new()).await?;
        Ok(())
    }

    /// Returns true if `key` holds a live value.
    pub async fn exists(&self, key: &str) -> ClientResult<bool> {
        Ok(optional(self.call(id::EXISTS, Self::key(key)?).await)?.is_some())
    }

    /// Value under `key`, or `None` when missing or expired.
    pub async fn get(&self, key: &str) -> ClientResult<Option<Value>> {
        match optional(self.call(id::GET, Self::key(key)?).await)? {
            Some(payload) => Ok(Some(value_of(&payload)?)),
            None => Ok(None),
        }
    }

    /// Live values among `keys`; missing keys are left out.
    pub async fn get_multiple(&self, keys: &[&str]) -> ClientResult<BTreeMap<String, Value>> {
        into_map(value_of(&self.call(id::GET_MULTIPLE, Self::keys_payload(keys)?).await?)?)
    }

    /// Every live entry of the collection.
    pub async fn get_all(&self) -> ClientResult<BTreeMap<String, Value>> {
        into_map(value_of(&self.call(id::GET_ALL, PayloadWriter::new()).await?)?)
    }

    /// Deadline of `key` in unix nanoseconds; `Some(0)` means no deadline
    /// and `None` means the key is missing.
    pub async fn ttl(&self, key: &str) -> ClientResult<Option<u64>> {
        match optional(self.call(id::GET_TTL, Self::key(key)?).await)? {
            Some(payload) => Ok(Some(read_u64(&payload)?)),
            None => Ok(None),
        }
    }

    /// Deadlines of the listed keys that carry one.
    pub async fn ttl_multiple(&self, keys: &[&str]) -> ClientResult<BTreeMap<String, i64>> {
        into_deadlines(value_of(&self.call(id::GET_MULTIPLE_TTL, Self::keys_payload(keys)?).await?)?)
    }

    /// Deadlines of every key that carries one.
    pub async fn ttl_all(&self) -> ClientResult<BTreeMap<String, i64>> {
        into_deadlines(value_of(&self.call(id::GET_ALL_TTL, PayloadWriter::new()).await?)?)
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> ClientResult<Vec<String>> {
        string_list(value_of(&self.call(id::KEYS, PayloadWriter::new()).await?)?)
    }

    /// Number of live keys.
    pub async fn count(&self) -> ClientResult<u32> {
        read_u32(&self.call(id::COUNT, PayloadWriter::new()).await?)
    }

    /// Approximate stored size in bytes.
    pub async fn size(&self) -> ClientResult<u64> {
        read_u64(&self.call(id::SIZE, PayloadWriter::new()).await?)
    }

    /// Runs a derived operation (`ids::kv::NUM_*`, `STRING_*`, `LIST_*`,
    /// `MAP_*`). `operands` follow the key in the payload.
    ///
    /// Returns `None` for operations that answer with an empty OK and for
    /// missing list items or map fields.
    pub async fn apply(
        &self,
        command: u16,
        key: &str,
        operands: impl FnOnce(PayloadWriter) -> ClientResult<PayloadWriter>,
    ) -> ClientResult<Option<Value>> {
        let cmd = Command::new(
            command,
            self.database,
            self.collection,
            operands(Self::key(key)?)?.finish(),
        );
        let payload = match optional(into_payload(self.client.request(&cmd).await?))? {
            Some(payload) => payload,
            None => return Ok(None),
        };
        if payload.is_empty() {
            Ok(None)
        } else {
            value_of(&payload).map(Some)
        }
    }

    async fn apply_value(
        &self,
        command: u16,
        key: &str,
        operands: impl FnOnce(PayloadWriter) -> ClientResult<PayloadWriter>,
    ) -> ClientResult<Value> {
        self.apply(command, key, operands)
            .await?
            .ok_or_else(|| ClientError::unexpected("derived operation returned no value"))
    }

    /// Adds `by` (Integer or Number) to the value under `key`.
    pub async fn increment(&self, key: &str, by: Value) -> ClientResult<Value> {
        self.apply_value(id::NUM_INCREMENT, key, |w| Ok(w.put_value(&by)?))
            .await
    }

    /// Subtracts `by` from the value under `key`.
    pub async fn decrement(&self, key: &str, by: Value) -> ClientResult<Value> {
        self.apply_value(id::NUM_DECREMENT, key, |w| Ok(w.put_value(&by)?))
            .await
    }

    /// Appends `suffix` to the string under `key`.
    pub async fn append(&self, key: &str, suffix: &str) -> ClientResult<Value> {
        self.apply_value(id::STRING_APPEND, key, |w| Ok(w.put_value(&Value::from(suffix))?))
            .await
    }

    /// Characters `start..end` of the string under `key`, clamped.
    pub async fn substring(&self, key: &str, start: u32, end: u32) -> ClientResult<Value> {
        self.apply_value(id::STRING_SUBSTRING, key, |w| Ok(w.put_u32(start).put_u32(end)))
            .await
    }

    /// Pushes onto the tail of the list under `key`. Returns the new length.
    pub async fn right_push(&self, key: &str, item: &Value) -> ClientResult<Value> {
        self.apply_value(id::LIST_RIGHT_PUSH, key, |w| Ok(w.put_value(item)?))
            .await
    }

    /// Pops the head of the list under `key`.
    pub async fn left_pop(&self, key: &str) -> ClientResult<Option<Value>> {
        self.apply(id::LIST_LEFT_POP, key, Ok).await
    }

    /// Sets `field` of the map under `key`.
    pub async fn map_set(&self, key: &str, field: &str, value: &Value) -> ClientResult<()> {
        self.apply(id::MAP_SET, key, |w| {
            Ok(w.put_str16("field", field)?.put_value(value)?)
        })
        .await?;
        Ok(())
    }

    /// Reads `field` of the map under `key`.
    pub async fn map_get(&self, key: &str, field: &str) -> ClientResult<Option<Value>> {
        self.apply(id::MAP_GET, key, |w| Ok(w.put_str16("field", field)?))
            .await
    }
}

fn into_map(value: Value) -> ClientResult<BTreeMap<String, Value>> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(ClientError::unexpected(format!("expected a map, got {}", other.type_name()))),
    }
}

fn into_deadlines(value: Value) -> ClientResult<BTreeMap<String, i64>> {
    into_map(value)?
        .into_iter()
        .map(|(key, deadline)| {
            deadline
                .as_integer()
                .map(|d| (key, d))
                .ok_or_else(|| ClientError::unexpected("deadlines must be integers"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlines_lie_in_the_future() {
        let now = deadline_after(Duration::ZERO);
        let later = deadline_after(Duration::from_secs(1));
        assert!(later >= now + 1_000_000_000);
    }

    #[test]
    fn deadline_maps_require_integers() {
        let ok = Value::Map(BTreeMap::from([("a".to_string(), Value::Integer(5))]));
        assert_eq!(into_deadlines(ok).unwrap()["a"], 5);

        let bad = Value::Map(BTreeMap::from([("a".to_string(), Value::from("x"))]));
        assert!(into_deadlines(bad).is_err());
        assert!(into_map(Value::Integer(1)).is_err());
    }
}
