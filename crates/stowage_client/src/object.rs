//! Object commands.

use crate::client::{optional, read_u32, read_u64, string_list, value_of, Client};
use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use stowage_codec::Value;
use stowage_protocol::ids::object as id;
use stowage_protocol::{Command, PayloadWriter};

/// Metadata of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Data length in bytes.
    pub size: u64,
    /// CRC-32 of the data.
    pub checksum: u32,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
    /// Last write time, unix milliseconds.
    pub modified_at: i64,
}

impl ObjectInfo {
    fn from_value(value: &Value) -> ClientResult<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| ClientError::unexpected("object metadata must be a map"))?;
        let field = |name: &str| {
            map.get(name)
                .and_then(Value::as_integer)
                .ok_or_else(|| ClientError::unexpected(format!("metadata lacks {name}")))
        };
        Ok(Self {
            size: u64::try_from(field("size")?).unwrap_or_default(),
            checksum: u32::try_from(field("checksum")?).unwrap_or_default(),
            created_at: field("created_at")?,
            modified_at: field("modified_at")?,
        })
    }
}

/// Object commands bound to one collection.
#[derive(Debug, Clone, Copy)]
pub struct Objects<'a> {
    client: &'a Client,
    database: &'a str,
    collection: &'a str,
}

impl<'a> Objects<'a> {
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

    fn pair(src: &str, dst: &str) -> ClientResult<PayloadWriter> {
        Ok(Self::key(src)?.put_str16("key", dst)?)
    }

    /// Stores `data` under `key`, replacing any previous object.
    pub async fn put(&self, key: &str, data: &[u8]) -> ClientResult<()> {
        let payload = Self::key(key)?.put_value(&Value::Binary(data.to_vec()))?;
        self.call(id::PUT, payload).await?;
        Ok(())
    }

    /// Object data, or `None` when missing.
    pub async fn get(&self, key: &str) -> ClientResult<Option<Vec<u8>>> {
        let Some(payload) = optional(self.call(id::GET, Self::key(key)?).await)? else {
            return Ok(None);
        };
        value_of(&payload)?
            .into_binary()
            .map(Some)
            .ok_or_else(|| ClientError::unexpected("object data must be binary"))
    }

    /// Object metadata, or `None` when missing.
    pub async fn metadata(&self, key: &str) -> ClientResult<Option<ObjectInfo>> {
        match optional(self.call(id::GET_METADATA, Self::key(key)?).await)? {
            Some(payload) => ObjectInfo::from_value(&value_of(&payload)?).map(Some),
            None => Ok(None),
        }
    }

    /// Deletes `key`. Fails with `NotFound` when missing.
    pub async fn delete(&self, key: &str) -> ClientResult<()> {
        self.call(id::DELETE, Self::key(key)?).await?;
        Ok(())
    }

    /// Returns true if `key` holds an object.
    pub async fn exists(&self, key: &str) -> ClientResult<bool> {
        Ok(optional(self.call(id::EXISTS, Self::key(key)?).await)?.is_some())
    }

    /// Keys starting with `prefix`, sorted. An empty prefix lists all.
    pub async fn list(&self, prefix: &str) -> ClientResult<Vec<String>> {
        let payload = if prefix.is_empty() {
            PayloadWriter::new()
        } else {
            Self::key(prefix)?
        };
        string_list(value_of(&self.call(id::LIST, payload).await?)?)
    }

    /// Copies `src` to `dst`.
    pub async fn copy(&self, src: &str, dst: &str) -> ClientResult<()> {
        self.call(id::COPY, Self::pair(src, dst)?).await?;
        Ok(())
    }

    /// Copies `src` to `dst`, then deletes `src`.
    pub async fn move_to(&self, src: &str, dst: &str) -> ClientResult<()> {
        self.call(id::MOVE, Self::pair(src, dst)?).await?;
        Ok(())
    }

    /// Renames `src` to `dst`; fails if `dst` exists.
    pub async fn rename(&self, src: &str, dst: &str) -> ClientResult<()> {
        self.call(id::RENAME, Self::pair(src, dst)?).await?;
        Ok(())
    }

    /// Number of stored objects.
    pub async fn count(&self) -> ClientResult<u32> {
        read_u32(&self.call(id::COUNT, PayloadWriter::new()).await?)
    }

    /// Total data size in bytes.
    pub async fn size(&self) -> ClientResult<u64> {
        read_u64(&self.call(id::SIZE, PayloadWriter::new()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn metadata_from_map() {
        let value = Value::Map(BTreeMap::from([
            ("size".to_string(), Value::Integer(5)),
            ("checksum".to_string(), Value::Integer(0x3610_A686)),
            ("created_at".to_string(), Value::Integer(10)),
            ("modified_at".to_string(), Value::Integer(20)),
        ]));
        let info = ObjectInfo::from_value(&value).unwrap();
        assert_eq!(info.checksum, 0x3610_A686);
        assert_eq!(info.size, 5);
    }

    #[test]
    fn incomplete_metadata_is_rejected() {
        let value = Value::Map(BTreeMap::from([("size".to_string(), Value::Integer(5))]));
        assert!(ObjectInfo::from_value(&value).is_err());
    }
}
