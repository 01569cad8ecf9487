// SPDX-License-Identifier: PMPL-1.0-or-later
//! Literal value helpers shared by the canonicalizer and the key derivation.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tags accepted by `$type`.
///
/// JSON only distinguishes a handful of types, but the numeric aliases of the
/// wire protocol are accepted so that descriptors copied from a shell parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Double,
    String,
    Object,
    Array,
    Bool,
    Null,
    Int,
    Long,
    Decimal,
    /// Alias matching every numeric kind.
    Number,
}

impl ValueKind {
    /// Parse a `$type` argument: either an alias string or a numeric type code.
    pub fn from_type_arg(arg: &Value) -> Option<Self> {
        match arg {
            Value::String(s) => match s.as_str() {
                "double" => Some(ValueKind::Double),
                "string" => Some(ValueKind::String),
                "object" => Some(ValueKind::Object),
                "array" => Some(ValueKind::Array),
                "bool" => Some(ValueKind::Bool),
                "null" => Some(ValueKind::Null),
                "int" => Some(ValueKind::Int),
                "long" => Some(ValueKind::Long),
                "decimal" => Some(ValueKind::Decimal),
                "number" => Some(ValueKind::Number),
                _ => None,
            },
            Value::Number(n) => match n.as_f64()? as i64 {
                1 => Some(ValueKind::Double),
                2 => Some(ValueKind::String),
                3 => Some(ValueKind::Object),
                4 => Some(ValueKind::Array),
                8 => Some(ValueKind::Bool),
                10 => Some(ValueKind::Null),
                16 => Some(ValueKind::Int),
                18 => Some(ValueKind::Long),
                19 => Some(ValueKind::Decimal),
                _ => None,
            },
            _ => None,
        }
    }

    /// Kind of a concrete JSON value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i32::try_from(i).is_ok() {
                        ValueKind::Int
                    } else {
                        ValueKind::Long
                    }
                } else if n.is_u64() {
                    ValueKind::Long
                } else {
                    ValueKind::Double
                }
            }
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Single-character code used when folding `$type` into a shape key.
    pub fn code(self) -> char {
        match self {
            ValueKind::Double => 'd',
            ValueKind::String => 's',
            ValueKind::Object => 'o',
            ValueKind::Array => 'a',
            ValueKind::Bool => 'b',
            ValueKind::Null => 'n',
            ValueKind::Int => 'i',
            ValueKind::Long => 'l',
            ValueKind::Decimal => 'm',
            ValueKind::Number => 'N',
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::Bool => "bool",
            ValueKind::Null => "null",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Decimal => "decimal",
            ValueKind::Number => "number",
        };
        f.write_str(name)
    }
}

/// Whether a comparison against this value can be affected by a collation.
///
/// Strings compare under the collation; objects and arrays may contain
/// strings, so they are treated as collatable too.
pub fn is_collatable(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Array(_) | Value::Object(_))
}

/// Order two literals of the same canonical type. Returns `None` when the
/// values are not mutually comparable (different types, objects, arrays).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// Short type name for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truthiness in the wire protocol's sense: `false`, `0` and `null` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_of_numbers() {
        assert_eq!(ValueKind::of(&json!(1)), ValueKind::Int);
        assert_eq!(ValueKind::of(&json!(5_000_000_000i64)), ValueKind::Long);
        assert_eq!(ValueKind::of(&json!(1.5)), ValueKind::Double);
    }

    #[test]
    fn test_type_arg_aliases_and_codes() {
        assert_eq!(ValueKind::from_type_arg(&json!("string")), Some(ValueKind::String));
        assert_eq!(ValueKind::from_type_arg(&json!(2)), Some(ValueKind::String));
        assert_eq!(ValueKind::from_type_arg(&json!("number")), Some(ValueKind::Number));
        assert_eq!(ValueKind::from_type_arg(&json!("blob")), None);
        assert_eq!(ValueKind::from_type_arg(&json!(true)), None);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2.5)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("a"), &json!(1)), None);
        assert_eq!(compare_values(&json!({"x": 1}), &json!({"x": 1})), Some(Ordering::Equal));
    }

    #[test]
    fn test_collatable() {
        assert!(is_collatable(&json!("foo")));
        assert!(is_collatable(&json!(["foo"])));
        assert!(!is_collatable(&json!(3)));
        assert!(!is_collatable(&json!(null)));
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!("")));
    }
}
