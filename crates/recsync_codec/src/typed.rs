//! Typed scalar encoding for single-argument payloads.
//!
//! One tag byte followed by the payload:
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `S` | string, raw text follows |
//! | `O` | array or object, JSON follows |
//! | `N` | number, decimal text follows |
//! | `L` | null |
//! | `T` / `F` | booleans |
//! | `U` | undefined (absent) |

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// A tagged scalar carried as one frame argument.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// String payload.
    String(String),
    /// JSON container payload.
    Object(Value),
    /// Numeric payload.
    Number(f64),
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Absent value.
    Undefined,
}

impl TypedValue {
    /// Encodes to the tagged text form.
    ///
    /// # Errors
    ///
    /// Fails on non-finite numbers, inside containers or at the top level.
    pub fn encode(&self) -> CodecResult<String> {
        match self {
            TypedValue::String(s) => Ok(format!("S{s}")),
            TypedValue::Object(value) => Ok(format!("O{}", value.to_json_string()?)),
            TypedValue::Number(n) if !n.is_finite() => Err(CodecError::NonFiniteNumber),
            TypedValue::Number(n) => Ok(format!("N{n}")),
            TypedValue::Null => Ok("L".to_string()),
            TypedValue::Bool(true) => Ok("T".to_string()),
            TypedValue::Bool(false) => Ok("F".to_string()),
            TypedValue::Undefined => Ok("U".to_string()),
        }
    }

    /// Decodes the tagged text form.
    pub fn decode(text: &str) -> CodecResult<Self> {
        let mut chars = text.chars();
        let tag = chars
            .next()
            .ok_or_else(|| CodecError::invalid_typed("empty typed value"))?;
        let payload = chars.as_str();
        match tag {
            'S' => Ok(TypedValue::String(payload.to_string())),
            'O' => {
                let value = Value::from_json_str(payload)?;
                if !value.is_container() {
                    return Err(CodecError::invalid_typed(format!(
                        "O payload must be an array or object, got {}",
                        value.type_name()
                    )));
                }
                Ok(TypedValue::Object(value))
            }
            'N' => payload
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(TypedValue::Number)
                .ok_or_else(|| CodecError::invalid_typed(format!("bad number {payload:?}"))),
            'L' => Ok(TypedValue::Null),
            'T' => Ok(TypedValue::Bool(true)),
            'F' => Ok(TypedValue::Bool(false)),
            'U' => Ok(TypedValue::Undefined),
            other => Err(CodecError::invalid_typed(format!("unknown tag {other:?}"))),
        }
    }

    /// Converts to a [`Value`]; `Undefined` maps to `None`.
    pub fn into_value(self) -> Option<Value> {
        match self {
            TypedValue::String(s) => Some(Value::from(s)),
            TypedValue::Object(value) => Some(value),
            TypedValue::Number(n) => Some(Value::Number(n)),
            TypedValue::Null => Some(Value::Null),
            TypedValue::Bool(b) => Some(Value::Bool(b)),
            TypedValue::Undefined => None,
        }
    }
}

impl From<Value> for TypedValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => TypedValue::Null,
            Value::Bool(b) => TypedValue::Bool(b),
            Value::Number(n) => TypedValue::Number(n),
            Value::String(s) => TypedValue::String(s.to_string()),
            container @ (Value::Array(_) | Value::Object(_)) => TypedValue::Object(container),
        }
    }
}

impl From<Option<Value>> for TypedValue {
    fn from(value: Option<Value>) -> Self {
        value.map_or(TypedValue::Undefined, TypedValue::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_tags() {
        assert_eq!(TypedValue::String("hi".into()).encode().unwrap(), "Shi");
        assert_eq!(TypedValue::Number(42.0).encode().unwrap(), "N42");
        assert_eq!(TypedValue::Number(0.5).encode().unwrap(), "N0.5");
        assert_eq!(TypedValue::Null.encode().unwrap(), "L");
        assert_eq!(TypedValue::Bool(true).encode().unwrap(), "T");
        assert_eq!(TypedValue::Bool(false).encode().unwrap(), "F");
        assert_eq!(TypedValue::Undefined.encode().unwrap(), "U");
    }

    #[test]
    fn object_payload_is_json() {
        let typed = TypedValue::from(Value::from(json!({"a": [1, 2]})));
        let text = typed.encode().unwrap();
        assert_eq!(text, r#"O{"a":[1,2]}"#);
        assert_eq!(TypedValue::decode(&text).unwrap(), typed);
    }

    #[test]
    fn empty_string_keeps_its_tag() {
        assert_eq!(
            TypedValue::decode("S").unwrap(),
            TypedValue::String(String::new())
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(TypedValue::decode("").is_err());
        assert!(TypedValue::decode("Q1").is_err());
        assert!(TypedValue::decode("Nabc").is_err());
        assert!(TypedValue::decode("O5").is_err());
        assert!(TypedValue::Number(f64::INFINITY).encode().is_err());
    }

    #[test]
    fn undefined_has_no_value() {
        assert_eq!(TypedValue::Undefined.into_value(), None);
        assert_eq!(TypedValue::from(None), TypedValue::Undefined);
        assert_eq!(
            TypedValue::decode("T").unwrap().into_value(),
            Some(Value::Bool(true))
        );
    }
}
