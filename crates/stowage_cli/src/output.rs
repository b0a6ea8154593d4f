//! Value parsing and printing.

use serde_json::{json, Map, Number};
use std::collections::BTreeMap;
use stowage_codec::Value;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// One JSON document per result.
    Json,
}

impl Format {
    /// Parses `text` or `json`.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format: {other}")),
        }
    }
}

/// Builds a codex value from command-line text.
pub fn parse_value(text: &str, kind: &str) -> Result<Value, String> {
    match kind {
        "string" => Ok(Value::from(text)),
        "int" => text
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| format!("invalid integer {text:?}: {e}")),
        "number" => text
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|e| format!("invalid number {text:?}: {e}")),
        "bool" => text
            .parse::<bool>()
            .map(Value::Boolean)
            .map_err(|e| format!("invalid bool {text:?}: {e}")),
        "json" => serde_json::from_str::<serde_json::Value>(text)
            .map(|json| from_json(&json))
            .map_err(|e| format!("invalid JSON: {e}")),
        other => Err(format!("unknown value type: {other}")),
    }
}

/// Converts JSON into a codex value. Integral numbers become `Integer`.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Empty,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(from_json).collect()),
        serde_json::Value::Object(fields) => Value::Map(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

/// Converts a codex value into JSON. Binary becomes an array of bytes.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Empty => serde_json::Value::Null,
        Value::Boolean(b) => json!(b),
        Value::Integer(i) => json!(i),
        Value::Number(n) => Number::from_f64(*n).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::String(s) => json!(s),
        Value::Binary(bytes) => json!(bytes),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Set(members) => json!(members),
        Value::Map(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<Map<_, _>>(),
        ),
    }
}

/// Prints a value in the chosen format.
pub fn print_value(format: Format, value: &Value) {
    match (format, value) {
        (Format::Text, Value::String(s)) => println!("{s}"),
        (Format::Text, Value::Binary(bytes)) => println!("{}", String::from_utf8_lossy(bytes)),
        _ => println!("{}", to_json(value)),
    }
}

/// Prints one line per item, or a JSON array.
pub fn print_list(format: Format, items: &[String]) {
    match format {
        Format::Text => items.iter().for_each(|item| println!("{item}")),
        Format::Json => println!("{}", json!(items)),
    }
}

/// Prints a serializable record.
pub fn print_record<T: serde::Serialize + std::fmt::Display>(format: Format, record: &T) {
    match format {
        Format::Text => println!("{record}"),
        Format::Json => match serde_json::to_string(record) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("cannot encode output: {err}"),
        },
    }
}

/// Prints the authentication status.
pub fn print_status(format: Format, authenticated: bool) {
    match format {
        Format::Text if authenticated => println!("authenticated"),
        Format::Text => println!("not authenticated"),
        Format::Json => println!("{}", json!({ "authenticated": authenticated })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_values() {
        assert_eq!(parse_value("42", "int").unwrap(), Value::Integer(42));
        assert_eq!(parse_value("true", "bool").unwrap(), Value::Boolean(true));
        assert!(parse_value("x", "number").is_err());
        assert!(parse_value("x", "blob").is_err());
    }

    #[test]
    fn json_values_nest() {
        let value = parse_value(r#"{"n": 1, "tags": ["a"], "ratio": 0.5}"#, "json").unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map["n"], Value::Integer(1));
        assert_eq!(map["tags"], Value::List(vec![Value::from("a")]));
        assert_eq!(to_json(&value)["ratio"], json!(0.5));
    }
}
