//! Property-based test generators using proptest.

use proptest::prelude::*;
use stowage_codec::Value;

/// Strategy for valid database and collection names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for KV and object keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9/_.:-]{1,32}").expect("Invalid regex")
}

/// Strategy for concrete subjects: one to four dot-separated tokens.
pub fn subject_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,4}", 1..=4).prop_map(|tokens| tokens.join("."))
}

/// Strategy for subscription patterns: tokens, `*` wildcards and an
/// optional trailing `>`.
pub fn pattern_strategy() -> impl Strategy<Value = String> {
    let token = prop_oneof![3 => "[a-z]{1,4}", 1 => Just("*".to_string())];
    (prop::collection::vec(token, 0..=3), any::<bool>()).prop_filter_map(
        "pattern must not be empty",
        |(mut tokens, tail)| {
            if tail {
                tokens.push(">".to_string());
            }
            (!tokens.is_empty()).then(|| tokens.join("."))
        },
    )
}

/// Strategy for scalar codex values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Empty),
        any::<bool>().prop_map(Value::Boolean),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e12f64..1.0e12).prop_map(Value::Number),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Binary),
    ]
}

/// Strategy for codex values up to three levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4).prop_map(Value::Map),
            prop::collection::btree_set("[a-z]{1,8}", 0..4).prop_map(Value::Set),
        ]
    })
}

/// Strategy for non-empty object payloads.
pub fn object_data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..4096)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::registry::validate_name;

    proptest! {
        #[test]
        fn names_are_accepted_by_the_registry(name in name_strategy()) {
            prop_assert!(validate_name("collection", &name).is_ok());
        }

        #[test]
        fn patterns_only_end_with_tail(pattern in pattern_strategy()) {
            let tokens: Vec<&str> = pattern.split('.').collect();
            for token in &tokens[..tokens.len() - 1] {
                prop_assert_ne!(*token, ">");
            }
        }

        #[test]
        fn subjects_have_no_wildcards(subject in subject_strategy()) {
            prop_assert!(!subject.contains('*') && !subject.contains('>'));
        }
    }
}
