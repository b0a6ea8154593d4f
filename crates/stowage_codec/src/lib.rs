//! # Stowage Codec
//!
//! The codex: a tagged binary encoding for dynamic values.
//!
//! Every value is written as `u8 tag | payload`. Multi-byte integers are
//! big-endian. Strings and binary values carry a `u32` length prefix;
//! containers carry a `u32` element count and prefix each element with its
//! own length, so a reader can skip an element without decoding it.
//!
//! ## Usage
//!
//! ```
//! use stowage_codec::{decode_value, encode_value, Value};
//!
//! let value = Value::Number(42.0);
//! let bytes = encode_value(&value).unwrap();
//! assert_eq!(decode_value(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{decode_value, ValueDecoder, MAX_DEPTH};
pub use encoder::{encode_value, ValueEncoder};
pub use error::{CodecError, CodecResult};
pub use value::{tag, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Empty),
            any::<bool>().prop_map(Value::Boolean),
            any::<i64>().prop_map(Value::Integer),
            (-1.0e12f64..1.0e12).prop_map(Value::Number),
            "[a-z0-9 ]{0,16}".prop_map(Value::String),
            prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Binary),
            prop::collection::btree_set("[a-z]{1,6}", 0..4).prop_map(Value::Set),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(v in value()) {
            let bytes = encode_value(&v).unwrap();
            prop_assert_eq!(bytes.len(), v.encoded_size());
            prop_assert_eq!(decode_value(&bytes).unwrap(), v);
        }
    }

    #[test]
    fn set_members_are_deduplicated() {
        let members: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let value = Value::Set(members);
        let decoded = decode_value(&encode_value(&value).unwrap()).unwrap();
        assert_eq!(decoded.as_set().map(BTreeSet::len), Some(2));
    }

    #[test]
    fn map_values_can_be_any_type() {
        let mut entries = BTreeMap::new();
        entries.insert("bin".to_string(), Value::Binary(vec![0, 1]));
        entries.insert("list".to_string(), Value::string_list(["x"]));
        let value = Value::Map(entries);
        assert_eq!(decode_value(&encode_value(&value).unwrap()).unwrap(), value);
    }
}
