//! Field codecs turning raw values into their engine representation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::field_value::FieldValue;
use crate::error::{Result, SearchSyncError};

/// Value types a schema value field can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Analyzed text.
    Text,
    /// Exact-match string.
    Keyword,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean, stored as 0/1.
    Boolean,
    /// UTC timestamp, stored as epoch milliseconds.
    DateTime,
    /// Raw bytes.
    Binary,
}

/// The engine-native representation of one field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncodedValue {
    Text(String),
    Long(i64),
    Double(f64),
    Bytes(Vec<u8>),
}

impl EncodedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EncodedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            EncodedValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            EncodedValue::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodedValue::Text(s) => write!(f, "{s}"),
            EncodedValue::Long(v) => write!(f, "{v}"),
            EncodedValue::Double(v) => write!(f, "{v}"),
            EncodedValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<&str> for EncodedValue {
    fn from(value: &str) -> Self {
        EncodedValue::Text(value.to_string())
    }
}

impl From<String> for EncodedValue {
    fn from(value: String) -> Self {
        EncodedValue::Text(value)
    }
}

impl From<i64> for EncodedValue {
    fn from(value: i64) -> Self {
        EncodedValue::Long(value)
    }
}

/// Converts a raw [`FieldValue`] into its engine representation.
///
/// Codecs are never handed [`FieldValue::Null`]; the assembler skips nulls
/// before encoding.
pub trait FieldCodec: Send + Sync + fmt::Debug {
    fn encode(&self, value: &FieldValue) -> Result<EncodedValue>;
}

/// The built-in codec for each [`ValueType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultCodec(pub ValueType);

impl DefaultCodec {
    fn mismatch(&self, value: &FieldValue) -> SearchSyncError {
        SearchSyncError::schema(format!(
            "Cannot encode a {} value into a {:?} field",
            value.type_name(),
            self.0
        ))
    }
}

impl FieldCodec for DefaultCodec {
    fn encode(&self, value: &FieldValue) -> Result<EncodedValue> {
        let encoded = match (self.0, value) {
            (ValueType::Text | ValueType::Keyword, FieldValue::Text(s)) => {
                EncodedValue::Text(s.clone())
            }
            (ValueType::Text | ValueType::Keyword, FieldValue::Integer(i)) => {
                EncodedValue::Text(i.to_string())
            }
            (ValueType::Integer, _) => {
                EncodedValue::Long(value.as_integer().ok_or_else(|| self.mismatch(value))?)
            }
            (ValueType::Float, _) => {
                EncodedValue::Double(value.as_float().ok_or_else(|| self.mismatch(value))?)
            }
            (ValueType::Boolean, _) => {
                let b = value.as_boolean().ok_or_else(|| self.mismatch(value))?;
                EncodedValue::Long(b as i64)
            }
            (ValueType::DateTime, _) => {
                let dt = value.as_datetime().ok_or_else(|| self.mismatch(value))?;
                EncodedValue::Long(dt.timestamp_millis())
            }
            (ValueType::Binary, FieldValue::Binary(bytes)) => EncodedValue::Bytes(bytes.clone()),
            _ => return Err(self.mismatch(value)),
        };
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_codec_encodes_by_type() {
        assert_eq!(
            DefaultCodec(ValueType::Text).encode(&"rust".into()).unwrap(),
            EncodedValue::Text("rust".into())
        );
        assert_eq!(
            DefaultCodec(ValueType::Boolean).encode(&true.into()).unwrap(),
            EncodedValue::Long(1)
        );
        assert_eq!(
            DefaultCodec(ValueType::Float).encode(&3i64.into()).unwrap(),
            EncodedValue::Double(3.0)
        );
        assert_eq!(
            DefaultCodec(ValueType::DateTime)
                .encode(&FieldValue::Text("1970-01-01T00:00:01Z".into()))
                .unwrap(),
            EncodedValue::Long(1000)
        );
    }

    #[test]
    fn test_default_codec_rejects_mismatch() {
        let err = DefaultCodec(ValueType::Integer)
            .encode(&FieldValue::Text("not a number".into()))
            .unwrap_err();
        assert!(err.is_schema_error());

        assert!(
            DefaultCodec(ValueType::Binary)
                .encode(&FieldValue::Text("x".into()))
                .is_err()
        );
    }
}
