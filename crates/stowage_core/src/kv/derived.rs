//! Derived operations on stored values.
//!
//! Each operation is a pure function from the current value to a new value
//! and an outcome. The engine runs writes under the key's shard write lock
//! and [read-only](DerivedOp::is_read_only) operations under its read lock,
//! where they borrow the stored value.
//! Missing keys start from `Integer(0)`, `""`, `[]` or `{}`.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use stowage_codec::Value;

/// Arithmetic operators for numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumOp {
    /// `a + b`
    Increment,
    /// `a - b`
    Decrement,
    /// `a * b`
    Multiply,
    /// `a / b`
    Divide,
    /// `a % b`
    Modulo,
}

/// Bitwise operators for integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    /// `a << b`
    LeftShift,
    /// `a >> b`
    RightShift,
    /// `a & b`
    And,
    /// `a | b`
    Or,
    /// `a ^ b`
    Xor,
}

/// A read-modify-write operation on one key.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedOp {
    /// Arithmetic with an Integer or Number operand.
    Numeric(NumOp, Value),
    /// Bitwise operation with an Integer operand.
    Bitwise(BitOp, i64),
    /// Bitwise complement.
    Not,
    /// Appends to a string.
    Append(String),
    /// Prepends to a string.
    Prepend(String),
    /// Character count of a string.
    StringLength,
    /// Characters `start..end`, clamped to the string.
    Substring {
        /// First character.
        start: u32,
        /// One past the last character.
        end: u32,
    },
    /// Length of a list.
    ListLength,
    /// Item at an index.
    ListGet(u32),
    /// Replaces the item at an index.
    ListSet(u32, Value),
    /// Removes every item equal to the value.
    ListRemove(Value),
    /// Pushes to the front.
    LeftPush(Value),
    /// Pushes to the back.
    RightPush(Value),
    /// Pops from the front.
    LeftPop,
    /// Pops from the back.
    RightPop,
    /// Number of map entries.
    MapLength,
    /// Sets a map field.
    MapSet(String, Value),
    /// Reads a map field.
    MapGet(String),
    /// Removes a map field.
    MapDelete(String),
    /// Checks a map field.
    MapExists(String),
    /// Map field names.
    MapKeys,
    /// Map field values.
    MapValues,
}

impl DerivedOp {
    /// True if the operation never produces a value to store.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::StringLength
                | Self::Substring { .. }
                | Self::ListLength
                | Self::ListGet(_)
                | Self::MapLength
                | Self::MapGet(_)
                | Self::MapExists(_)
                | Self::MapKeys
                | Self::MapValues
        )
    }
}

/// Result of a derived operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedOutcome {
    /// A value to return to the caller.
    Value(Value),
    /// Success without a value.
    Done,
    /// The addressed element does not exist.
    Missing,
}

type Applied = (Option<Value>, DerivedOutcome);

/// Applies `op` to `current`.
///
/// Returns the value to store (`None` leaves the entry untouched) and the
/// outcome.
///
/// # Errors
///
/// [`CoreError::TypeMismatch`] when the stored value has the wrong type and
/// [`CoreError::InvalidArgument`] for division by zero, overflow or an
/// out-of-range shift.
pub fn apply(op: DerivedOp, current: Option<&Value>) -> CoreResult<Applied> {
    match op {
        DerivedOp::Numeric(op, operand) => numeric(op, current, &operand),
        DerivedOp::Bitwise(op, operand) => bitwise(op, current, operand),
        DerivedOp::Not => {
            let n = integer(current)?;
            Ok(store(Value::Integer(!n)))
        }
        DerivedOp::Append(suffix) => {
            let mut s = string(current)?;
            s.push_str(&suffix);
            Ok(store(Value::String(s)))
        }
        DerivedOp::Prepend(prefix) => Ok(store(Value::String(prefix + str_ref(current)?))),
        DerivedOp::StringLength => {
            let n = str_ref(current)?.chars().count();
            Ok(read(Value::Integer(n as i64)))
        }
        DerivedOp::Substring { start, end } => {
            let s = str_ref(current)?;
            let (start, end) = (start as usize, end as usize);
            let sub: String = if start >= end {
                String::new()
            } else {
                s.chars().skip(start).take(end - start).collect()
            };
            Ok(read(Value::String(sub)))
        }
        DerivedOp::ListLength => Ok(read(Value::Integer(list_ref(current)?.len() as i64))),
        DerivedOp::ListGet(index) => Ok(match list_ref(current)?.get(index as usize) {
            Some(item) => read(item.clone()),
            None => missing(),
        }),
        DerivedOp::ListSet(index, value) => {
            let mut items = list(current)?;
            match items.get_mut(index as usize) {
                Some(slot) => {
                    *slot = value;
                    Ok((Some(Value::List(items)), DerivedOutcome::Done))
                }
                None => Ok(missing()),
            }
        }
        DerivedOp::ListRemove(value) => {
            let mut items = list(current)?;
            let before = items.len();
            items.retain(|item| *item != value);
            let removed = (before - items.len()) as i64;
            let next = (removed > 0).then_some(Value::List(items));
            Ok((next, DerivedOutcome::Value(Value::Integer(removed))))
        }
        DerivedOp::LeftPush(value) => {
            let mut items = list(current)?;
            items.insert(0, value);
            let len = items.len() as i64;
            Ok((Some(Value::List(items)), DerivedOutcome::Value(Value::Integer(len))))
        }
        DerivedOp::RightPush(value) => {
            let mut items = list(current)?;
            items.push(value);
            let len = items.len() as i64;
            Ok((Some(Value::List(items)), DerivedOutcome::Value(Value::Integer(len))))
        }
        DerivedOp::LeftPop => {
            let mut items = list(current)?;
            if items.is_empty() {
                return Ok(missing());
            }
            let item = items.remove(0);
            Ok((Some(Value::List(items)), DerivedOutcome::Value(item)))
        }
        DerivedOp::RightPop => {
            let mut items = list(current)?;
            match items.pop() {
                Some(item) => Ok((Some(Value::List(items)), DerivedOutcome::Value(item))),
                None => Ok(missing()),
            }
        }
        DerivedOp::MapLength => {
            let len = map_ref(current)?.map_or(0, BTreeMap::len);
            Ok(read(Value::Integer(len as i64)))
        }
        DerivedOp::MapSet(field, value) => {
            let mut entries = map(current)?;
            entries.insert(field, value);
            Ok((Some(Value::Map(entries)), DerivedOutcome::Done))
        }
        DerivedOp::MapGet(field) => Ok(match map_ref(current)?.and_then(|m| m.get(&field)) {
            Some(value) => read(value.clone()),
            None => missing(),
        }),
        DerivedOp::MapDelete(field) => {
            let mut entries = map(current)?;
            let next = entries.remove(&field).map(|_| Value::Map(entries));
            Ok((next, DerivedOutcome::Done))
        }
        DerivedOp::MapExists(field) => {
            let exists = map_ref(current)?.is_some_and(|m| m.contains_key(&field));
            Ok(if exists { (None, DerivedOutcome::Done) } else { missing() })
        }
        DerivedOp::MapKeys => {
            let keys = map_ref(current)?.into_iter().flat_map(BTreeMap::keys);
            Ok(read(Value::string_list(keys.cloned())))
        }
        DerivedOp::MapValues => {
            let values = map_ref(current)?.into_iter().flat_map(BTreeMap::values);
            Ok(read(Value::List(values.cloned().collect())))
        }
    }
}

fn store(value: Value) -> Applied {
    (Some(value.clone()), DerivedOutcome::Value(value))
}

fn read(value: Value) -> Applied {
    (None, DerivedOutcome::Value(value))
}

fn missing() -> Applied {
    (None, DerivedOutcome::Missing)
}

fn integer(current: Option<&Value>) -> CoreResult<i64> {
    match current {
        None => Ok(0),
        Some(Value::Integer(n)) => Ok(*n),
        Some(other) => Err(CoreError::type_mismatch("integer", other.type_name())),
    }
}

fn string(current: Option<&Value>) -> CoreResult<String> {
    match current {
        None => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(CoreError::type_mismatch("string", other.type_name())),
    }
}

fn str_ref(current: Option<&Value>) -> CoreResult<&str> {
    match current {
        None => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(CoreError::type_mismatch("string", other.type_name())),
    }
}

fn list_ref(current: Option<&Value>) -> CoreResult<&[Value]> {
    match current {
        None => Ok(&[]),
        Some(Value::List(items)) => Ok(items),
        Some(other) => Err(CoreError::type_mismatch("list", other.type_name())),
    }
}

/// `None` for a missing key.
fn map_ref(current: Option<&Value>) -> CoreResult<Option<&BTreeMap<String, Value>>> {
    match current {
        None => Ok(None),
        Some(Value::Map(entries)) => Ok(Some(entries)),
        Some(other) => Err(CoreError::type_mismatch("map", other.type_name())),
    }
}

fn list(current: Option<&Value>) -> CoreResult<Vec<Value>> {
    match current {
        None => Ok(Vec::new()),
        Some(Value::List(items)) => Ok(items.clone()),
        Some(other) => Err(CoreError::type_mismatch("list", other.type_name())),
    }
}

fn map(current: Option<&Value>) -> CoreResult<BTreeMap<String, Value>> {
    match current {
        None => Ok(BTreeMap::new()),
        Some(Value::Map(entries)) => Ok(entries.clone()),
        Some(other) => Err(CoreError::type_mismatch("map", other.type_name())),
    }
}

fn numeric(op: NumOp, current: Option<&Value>, operand: &Value) -> CoreResult<Applied> {
    let zero = Value::Integer(0);
    let current = current.unwrap_or(&zero);
    let result = match (current, operand) {
        (Value::Integer(a), Value::Integer(b)) => Value::Integer(integer_op(op, *a, *b)?),
        (a, b) => {
            let x = a
                .as_number()
                .ok_or_else(|| CoreError::type_mismatch("number", a.type_name()))?;
            let y = b
                .as_number()
                .ok_or_else(|| CoreError::type_mismatch("number", b.type_name()))?;
            Value::Number(float_op(op, x, y)?)
        }
    };
    Ok(store(result))
}

fn integer_op(op: NumOp, a: i64, b: i64) -> CoreResult<i64> {
    let result = match op {
        NumOp::Increment => a.checked_add(b),
        NumOp::Decrement => a.checked_sub(b),
        NumOp::Multiply => a.checked_mul(b),
        NumOp::Divide | NumOp::Modulo if b == 0 => {
            return Err(CoreError::invalid_argument("division by zero"))
        }
        NumOp::Divide => a.checked_div(b),
        NumOp::Modulo => a.checked_rem(b),
    };
    result.ok_or_else(|| CoreError::invalid_argument("integer overflow"))
}

fn float_op(op: NumOp, a: f64, b: f64) -> CoreResult<f64> {
    match op {
        NumOp::Increment => Ok(a + b),
        NumOp::Decrement => Ok(a - b),
        NumOp::Multiply => Ok(a * b),
        NumOp::Divide | NumOp::Modulo if b == 0.0 => {
            Err(CoreError::invalid_argument("division by zero"))
        }
        NumOp::Divide => Ok(a / b),
        NumOp::Modulo => Ok(a % b),
    }
}

fn bitwise(op: BitOp, current: Option<&Value>, operand: i64) -> CoreResult<Applied> {
    let a = integer(current)?;
    let shift = || {
        u32::try_from(operand)
            .ok()
            .filter(|s| *s < 64)
            .ok_or_else(|| CoreError::invalid_argument("shift out of range"))
    };
    let result = match op {
        BitOp::LeftShift => a << shift()?,
        BitOp::RightShift => a >> shift()?,
        BitOp::And => a & operand,
        BitOp::Or => a | operand,
        BitOp::Xor => a ^ operand,
    };
    Ok(store(Value::Integer(result)))
}
