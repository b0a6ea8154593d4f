//! Codex encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::{tag, Value};
use bytes::{BufMut, BytesMut};

/// Encode a value to codex bytes.
///
/// # Errors
///
/// Returns an error if a string, binary, container or map key exceeds the
/// length its prefix can describe.
pub fn encode_value(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = ValueEncoder::with_capacity(value.encoded_size());
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A codex encoder writing into a growable buffer.
///
/// Several values can be encoded back to back; the encoder does not add any
/// framing between them.
#[derive(Debug, Default)]
pub struct ValueEncoder {
    buffer: BytesMut,
}

impl ValueEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        self.buffer.put_u8(value.tag());
        match value {
            Value::Empty => {}
            Value::Boolean(b) => self.buffer.put_u8(u8::from(*b)),
            Value::Integer(n) => self.buffer.put_i64(*n),
            Value::Number(n) => self.buffer.put_f64(*n),
            Value::String(s) => self.put_u32_prefixed(s.as_bytes())?,
            Value::Binary(b) => self.put_u32_prefixed(b)?,
            Value::List(items) => {
                self.put_count(items.len())?;
                for item in items {
                    self.put_nested(item)?;
                }
            }
            Value::Set(members) => {
                self.put_count(members.len())?;
                for member in members {
                    self.put_u16_prefixed(member.as_bytes())?;
                }
            }
            Value::Map(entries) => {
                self.put_count(entries.len())?;
                for (key, item) in entries {
                    self.put_u16_prefixed(key.as_bytes())?;
                    self.put_nested(item)?;
                }
            }
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn put_count(&mut self, count: usize) -> CodecResult<()> {
        let count = u32::try_from(count)
            .map_err(|_| CodecError::encoding_failed("container has too many elements"))?;
        self.buffer.put_u32(count);
        Ok(())
    }

    fn put_u32_prefixed(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| CodecError::encoding_failed("value longer than u32::MAX bytes"))?;
        self.buffer.put_u32(len);
        self.buffer.put_slice(bytes);
        Ok(())
    }

    fn put_u16_prefixed(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let len = u16::try_from(bytes.len())
            .map_err(|_| CodecError::encoding_failed("key longer than u16::MAX bytes"))?;
        self.buffer.put_u16(len);
        self.buffer.put_slice(bytes);
        Ok(())
    }

    /// Writes `u32 len | value`, patching the length once the value is known.
    fn put_nested(&mut self, value: &Value) -> CodecResult<()> {
        let len_pos = self.buffer.len();
        self.buffer.put_u32(0);
        let start = self.buffer.len();
        self.encode(value)?;
        let len = u32::try_from(self.buffer.len() - start)
            .map_err(|_| CodecError::encoding_failed("nested value longer than u32::MAX bytes"))?;
        self.buffer[len_pos..start].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}
