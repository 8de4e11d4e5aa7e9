//! Scalar value model and type-tag codec.
//!
//! Every stored scalar row carries a type tag naming how to decode its
//! backend-native payload. Decoding dispatches on the tag through a fixed
//! table — an unknown tag or an uncoercible payload is a type mismatch,
//! never a silent default.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Scalar type tags as persisted in the `type_tag` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Bool,
    Int,
    Long,
    Double,
    Text,
    Timestamp,
    Uuid,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Bool => "bool",
            TypeTag::Int => "i32",
            TypeTag::Long => "i64",
            TypeTag::Double => "f64",
            TypeTag::Text => "string",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Uuid => "uuid",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "bool" => Some(TypeTag::Bool),
            "i32" => Some(TypeTag::Int),
            "i64" => Some(TypeTag::Long),
            "f64" => Some(TypeTag::Double),
            "string" => Some(TypeTag::Text),
            "timestamp" => Some(TypeTag::Timestamp),
            "uuid" => Some(TypeTag::Uuid),
            _ => None,
        }
    }
}

/// One scalar variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Long(_) => TypeTag::Long,
            Value::Double(_) => TypeTag::Double,
            Value::Text(_) => TypeTag::Text,
            Value::Timestamp(_) => TypeTag::Timestamp,
            Value::Uuid(_) => TypeTag::Uuid,
        }
    }

    /// Backend-native payload for this value.
    pub fn encode(&self) -> JsonValue {
        match self {
            Value::Bool(b) => JsonValue::from(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Long(l) => JsonValue::from(*l),
            Value::Double(d) => JsonValue::from(*d),
            Value::Text(s) => JsonValue::from(s.clone()),
            Value::Timestamp(ts) => JsonValue::from(ts.to_rfc3339()),
            Value::Uuid(u) => JsonValue::from(u.to_string()),
        }
    }

    /// Decode a stored payload by its type tag. The error string describes
    /// the mismatch; callers attach the row key.
    pub(crate) fn decode(tag: &str, raw: &JsonValue) -> Result<Self, String> {
        let Some(tag) = TypeTag::parse(tag) else {
            return Err(format!("unknown type tag `{tag}`"));
        };
        match tag {
            TypeTag::Bool => raw
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| format!("stored value {raw} is not a bool")),
            TypeTag::Int => raw
                .as_i64()
                .and_then(|l| i32::try_from(l).ok())
                .map(Value::Int)
                .ok_or_else(|| format!("stored value {raw} is not an i32")),
            TypeTag::Long => raw
                .as_i64()
                .map(Value::Long)
                .ok_or_else(|| format!("stored value {raw} is not an i64")),
            TypeTag::Double => raw
                .as_f64()
                .map(Value::Double)
                .ok_or_else(|| format!("stored value {raw} is not an f64")),
            TypeTag::Text => raw
                .as_str()
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(|| format!("stored value {raw} is not a string")),
            TypeTag::Timestamp => raw
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
                .ok_or_else(|| format!("stored value {raw} is not a timestamp")),
            TypeTag::Uuid => raw
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(Value::Uuid)
                .ok_or_else(|| format!("stored value {raw} is not a uuid")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

/// What one hierarchy level holds under a name: a scalar, or a nested
/// dictionary reached through `child`.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Scalar(Value),
    Dictionary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_roundtrip_through_strings() {
        for tag in [
            TypeTag::Bool,
            TypeTag::Int,
            TypeTag::Long,
            TypeTag::Double,
            TypeTag::Text,
            TypeTag::Timestamp,
            TypeTag::Uuid,
        ] {
            assert_eq!(TypeTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(TypeTag::parse("System.Int32"), None);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let ts = DateTime::parse_from_rfc3339("2016-05-12T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let values = [
            Value::Bool(true),
            Value::Int(-42),
            Value::Long(1 << 40),
            Value::Double(2.5),
            Value::Text("mainpage".to_string()),
            Value::Timestamp(ts),
            Value::Uuid(Uuid::parse_str("8b59c48a-9e2f-4313-8d0f-c9b77b9eb1a4").unwrap()),
        ];
        for value in values {
            let decoded = Value::decode(value.tag().as_str(), &value.encode()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn unknown_tag_is_a_mismatch() {
        let err = Value::decode("decimal", &json!(1)).unwrap_err();
        assert!(err.contains("unknown type tag"));
    }

    #[test]
    fn uncoercible_payloads_are_mismatches() {
        assert!(Value::decode("bool", &json!(1)).is_err());
        assert!(Value::decode("i64", &json!("five")).is_err());
        assert!(Value::decode("i32", &json!(i64::MAX)).is_err());
        assert!(Value::decode("timestamp", &json!("not-a-date")).is_err());
        assert!(Value::decode("uuid", &json!("not-a-uuid")).is_err());
    }

    #[test]
    fn int_fits_in_i32_range() {
        assert_eq!(
            Value::decode("i32", &json!(i64::from(i32::MAX))).unwrap(),
            Value::Int(i32::MAX)
        );
    }
}
