//! Benchmark utilities.

use rand::Rng;
use std::collections::BTreeMap;
use stowage_codec::Value;

/// Generate random object data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct keys with a shared prefix.
pub fn generate_keys(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}{i:08}")).collect()
}

/// A small user-like record.
pub fn sample_record() -> Value {
    Value::Map(BTreeMap::from([
        ("name".to_string(), Value::from("Alice")),
        ("email".to_string(), Value::from("alice@example.com")),
        ("age".to_string(), Value::Integer(30)),
        ("score".to_string(), Value::Number(0.75)),
        ("active".to_string(), Value::Boolean(true)),
    ]))
}

/// Nested maps `depth` levels deep with `width` children per level.
pub fn nested_value(depth: usize, width: usize) -> Value {
    if depth == 0 {
        Value::from("leaf")
    } else {
        Value::Map(
            (0..width)
                .map(|i| (format!("key_{i}"), nested_value(depth - 1, width)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_distinct() {
        let keys = generate_keys("k", 100);
        let unique: std::collections::BTreeSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 100);
        assert_eq!(random_data(64).len(), 64);
    }

    #[test]
    fn nested_value_has_expected_shape() {
        let value = nested_value(2, 3);
        let outer = value.as_map().unwrap();
        assert_eq!(outer.len(), 3);
        assert_eq!(outer["key_0"].as_map().unwrap().len(), 3);
    }
}
