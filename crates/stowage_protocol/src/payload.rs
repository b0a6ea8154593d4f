//! Cursor helpers for command payloads.
//!
//! Command payloads are sequences of big-endian integers, `u16`-prefixed
//! strings and embedded codex values. [`PayloadReader`] never reads past the
//! declared lengths and reports [`ProtocolError::PayloadTooShort`] instead.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{BufMut, Bytes, BytesMut};
use stowage_codec::{Value, ValueDecoder, ValueEncoder};

/// Reads fields from a command payload.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ProtocolError::PayloadTooShort)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16(&mut self) -> ProtocolResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> ProtocolResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64(&mut self) -> ProtocolResult<u64> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    /// Reads `u16 len | bytes` as raw bytes.
    pub fn read_bytes16(&mut self) -> ProtocolResult<&'a [u8]> {
        let len = usize::from(self.read_u16()?);
        self.take(len)
    }

    /// Reads `u16 len | utf8` as a string.
    pub fn read_str16(&mut self, field: &'static str) -> ProtocolResult<String> {
        let raw = self.read_bytes16()?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| ProtocolError::InvalidUtf8(field))
    }

    /// Reads one embedded codex value.
    pub fn read_value(&mut self) -> ProtocolResult<Value> {
        let mut decoder = ValueDecoder::new(&self.data[self.pos..]);
        let value = decoder.decode()?;
        self.pos += decoder.position();
        Ok(value)
    }

    /// Returns the unread bytes and consumes them.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true when every byte has been read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Builds a command payload.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `u8`.
    pub fn put_u8(mut self, v: u8) -> Self {
        self.buf.put_u8(v);
        self
    }

    /// Appends a big-endian `u16`.
    pub fn put_u16(mut self, v: u16) -> Self {
        self.buf.put_u16(v);
        self
    }

    /// Appends a big-endian `u32`.
    pub fn put_u32(mut self, v: u32) -> Self {
        self.buf.put_u32(v);
        self
    }

    /// Appends a big-endian `u64`.
    pub fn put_u64(mut self, v: u64) -> Self {
        self.buf.put_u64(v);
        self
    }

    /// Appends `u16 len | bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FieldTooLong`] above `u16::MAX` bytes.
    pub fn put_bytes16(mut self, field: &'static str, bytes: &[u8]) -> ProtocolResult<Self> {
        let len = u16::try_from(bytes.len()).map_err(|_| ProtocolError::FieldTooLong {
            field,
            len: bytes.len(),
        })?;
        self.buf.put_u16(len);
        self.buf.put_slice(bytes);
        Ok(self)
    }

    /// Appends `u16 len | utf8`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FieldTooLong`] above `u16::MAX` bytes.
    pub fn put_str16(self, field: &'static str, s: &str) -> ProtocolResult<Self> {
        self.put_bytes16(field, s.as_bytes())
    }

    /// Appends an encoded codex value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Codec`] if the value cannot be encoded.
    pub fn put_value(mut self, value: &Value) -> ProtocolResult<Self> {
        let mut encoder = ValueEncoder::new();
        encoder.encode(value)?;
        self.buf.put_slice(encoder.as_bytes());
        Ok(self)
    }

    /// Appends raw bytes.
    pub fn put_slice(mut self, bytes: &[u8]) -> Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Finishes the payload.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Encodes a single codex value as a response payload.
///
/// # Errors
///
/// Returns [`ProtocolError::Codec`] if the value cannot be encoded.
pub fn value_payload(value: &Value) -> ProtocolResult<Bytes> {
    Ok(PayloadWriter::new().put_value(value)?.finish())
}
