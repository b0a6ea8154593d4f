//! Dynamic codex value type.

use std::collections::{BTreeMap, BTreeSet};

/// Wire tags for each codex type.
pub mod tag {
    /// No value.
    pub const EMPTY: u8 = 0;
    /// Boolean, one byte.
    pub const BOOLEAN: u8 = 1;
    /// Signed 64-bit integer, big-endian.
    pub const INTEGER: u8 = 8;
    /// 64-bit float, big-endian IEEE 754 bits.
    pub const NUMBER: u8 = 10;
    /// Length-prefixed bytes.
    pub const BINARY: u8 = 11;
    /// Length-prefixed UTF-8.
    pub const STRING: u8 = 12;
    /// Count-prefixed list of length-prefixed values.
    pub const LIST: u8 = 13;
    /// Count-prefixed map of string keys to values.
    pub const MAP: u8 = 14;
    /// Count-prefixed set of strings.
    pub const SET: u8 = 15;
}

/// A dynamic value stored by the key-value engine and carried in payloads.
///
/// Maps and sets are ordered so that equal values always encode to equal
/// bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Empty,
    /// Boolean value.
    Boolean(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Set of strings.
    Set(BTreeSet<String>),
    /// Map from string keys to values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a list of string values.
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Returns the wire tag for this value.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Empty => tag::EMPTY,
            Value::Boolean(_) => tag::BOOLEAN,
            Value::Integer(_) => tag::INTEGER,
            Value::Number(_) => tag::NUMBER,
            Value::String(_) => tag::STRING,
            Value::Binary(_) => tag::BINARY,
            Value::List(_) => tag::LIST,
            Value::Set(_) => tag::SET,
            Value::Map(_) => tag::MAP,
        }
    }

    /// Returns a human-readable type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }

    /// Check if this value is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float. Integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is binary.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a list, if it is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get this value as a set, if it is one.
    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Value::Set(members) => Some(members),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Consumes the value and returns its bytes, if it is binary.
    pub fn into_binary(self) -> Option<Vec<u8>> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Consumes the value and returns its string, if it is one.
    pub fn into_string(self) -> Option<String> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number of bytes this value occupies when encoded.
    pub fn encoded_size(&self) -> usize {
        1 + match self {
            Value::Empty => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Number(_) => 8,
            Value::String(s) => 4 + s.len(),
            Value::Binary(b) => 4 + b.len(),
            Value::List(items) => 4 + items.iter().map(|v| 4 + v.encoded_size()).sum::<usize>(),
            Value::Set(members) => 4 + members.iter().map(|m| 2 + m.len()).sum::<usize>(),
            Value::Map(entries) => {
                4 + entries
                    .iter()
                    .map(|(k, v)| 2 + k.len() + 4 + v.encoded_size())
                    .sum::<usize>()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Binary(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projections_are_type_safe() {
        let v = Value::from("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_binary(), None);

        let b = Value::from(vec![1u8, 2, 3]);
        assert_eq!(b.as_binary(), Some(&[1u8, 2, 3][..]));
        assert_eq!(b.as_str(), None);
    }

    #[test]
    fn integers_widen_to_numbers() {
        assert_eq!(Value::Integer(7).as_number(), Some(7.0));
        assert_eq!(Value::Number(1.5).as_integer(), None);
    }

    #[test]
    fn encoded_size_of_nested_map() {
        let mut inner = BTreeMap::new();
        inner.insert("a".to_string(), Value::Number(1.0));
        let v = Value::Map(inner);
        // tag + count + (keyLen + "a" + valLen + (tag + 8))
        assert_eq!(v.encoded_size(), 1 + 4 + 2 + 1 + 4 + 9);
    }

    #[test]
    fn default_is_empty() {
        assert!(Value::default().is_empty());
        assert_eq!(Value::Empty.type_name(), "empty");
    }
}
