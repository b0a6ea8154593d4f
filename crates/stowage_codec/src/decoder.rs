//! Codex decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::{tag, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum container nesting accepted from untrusted input.
pub const MAX_DEPTH: usize = 64;

/// Decode exactly one value, rejecting trailing bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid codex value or if bytes
/// remain after it.
pub fn decode_value(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = ValueDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes(decoder.remaining().len()));
    }
    Ok(value)
}

/// A codex decoder over a borrowed buffer.
///
/// Declared lengths are checked against the remaining input before any
/// allocation, so a hostile length prefix cannot force a large allocation.
pub struct ValueDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> ValueDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let type_tag = self.read_byte()?;
        match type_tag {
            tag::EMPTY => Ok(Value::Empty),
            tag::BOOLEAN => Ok(Value::Boolean(self.read_byte()? != 0)),
            tag::INTEGER => Ok(Value::Integer(i64::from_be_bytes(self.read_array()?))),
            tag::NUMBER => Ok(Value::Number(f64::from_be_bytes(self.read_array()?))),
            tag::STRING => {
                let len = self.read_u32()? as usize;
                self.read_str(len).map(|s| Value::String(s.to_string()))
            }
            tag::BINARY => {
                let len = self.read_u32()? as usize;
                self.read_bytes(len).map(|b| Value::Binary(b.to_vec()))
            }
            tag::LIST => self.enter(Self::decode_list),
            tag::SET => self.decode_set(),
            tag::MAP => self.enter(Self::decode_map),
            other => Err(CodecError::UnknownTag(other)),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn enter(&mut self, f: fn(&mut Self) -> CodecResult<Value>) -> CodecResult<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn decode_list(&mut self) -> CodecResult<Value> {
        let count = self.read_u32()? as usize;
        // Each item needs at least a 4-byte length and a 1-byte tag.
        let mut items = Vec::with_capacity(count.min(self.remaining().len() / 5));
        for _ in 0..count {
            items.push(self.decode_nested()?);
        }
        Ok(Value::List(items))
    }

    fn decode_set(&mut self) -> CodecResult<Value> {
        let count = self.read_u32()? as usize;
        let mut members = BTreeSet::new();
        for _ in 0..count {
            let len = usize::from(self.read_u16()?);
            members.insert(self.read_str(len)?.to_string());
        }
        Ok(Value::Set(members))
    }

    fn decode_map(&mut self) -> CodecResult<Value> {
        let count = self.read_u32()? as usize;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let key_len = usize::from(self.read_u16()?);
            let key = self.read_str(key_len)?.to_string();
            let value = self.decode_nested()?;
            entries.insert(key, value);
        }
        Ok(Value::Map(entries))
    }

    /// Decodes `u32 len | value` and checks the value used exactly `len` bytes.
    fn decode_nested(&mut self) -> CodecResult<Value> {
        let len = self.read_u32()? as usize;
        let body = self.read_bytes(len)?;
        let mut inner = ValueDecoder {
            data: body,
            pos: 0,
            depth: self.depth,
        };
        let value = inner.decode()?;
        if !inner.is_empty() {
            return Err(CodecError::TrailingBytes(inner.remaining().len()));
        }
        Ok(value)
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if len > self.data.len() - self.pos {
            return Err(CodecError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    fn read_str(&mut self, len: usize) -> CodecResult<&'a str> {
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_value;

    #[test]
    fn decode_empty_input() {
        assert_eq!(decode_value(&[]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn decode_unknown_tag() {
        assert_eq!(decode_value(&[200]), Err(CodecError::UnknownTag(200)));
    }

    #[test]
    fn decode_truncated_binary() {
        // Declares 10 bytes but carries 2
        let bytes = [tag::BINARY, 0, 0, 0, 10, 1, 2];
        assert_eq!(decode_value(&bytes), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn decode_huge_list_count_without_items() {
        let bytes = [tag::LIST, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(decode_value(&bytes), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = encode_value(&Value::Number(1.0)).unwrap();
        bytes.push(0);
        assert_eq!(decode_value(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn decode_invalid_utf8() {
        let bytes = [tag::STRING, 0, 0, 0, 1, 0xFF];
        assert_eq!(decode_value(&bytes), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn decode_stream_of_values() {
        let mut bytes = encode_value(&Value::from("key")).unwrap();
        bytes.extend(encode_value(&Value::Integer(-3)).unwrap());

        let mut decoder = ValueDecoder::new(&bytes);
        assert_eq!(decoder.decode().unwrap(), Value::from("key"));
        assert_eq!(decoder.decode().unwrap(), Value::Integer(-3));
        assert!(decoder.is_empty());
    }

    #[test]
    fn decode_rejects_deep_nesting() {
        let mut value = Value::Empty;
        for _ in 0..=MAX_DEPTH {
            value = Value::List(vec![value]);
        }
        let bytes = encode_value(&value).unwrap();
        assert_eq!(decode_value(&bytes), Err(CodecError::TooDeep(MAX_DEPTH)));
    }
}
