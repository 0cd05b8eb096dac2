//! Field value types for documents.
//!
//! This module defines the [`FieldValue`] enum which represents the raw values
//! an entity payload hands to the document assembler. Values are converted to
//! their engine representation by the field's codec.
//!
//! # Type Conversion
//!
//! ```
//! use searchsync::document::field_value::FieldValue;
//!
//! let text_value = FieldValue::from("hello");
//! assert_eq!(text_value.as_text(), Some("hello"));
//!
//! let int_value = FieldValue::from(42i64);
//! assert_eq!(int_value.as_integer(), Some(42));
//!
//! let bool_value = FieldValue::Text("yes".to_string());
//! assert_eq!(bool_value.as_boolean(), Some(true));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Represents a value for a field in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Binary data
    Binary(Vec<u8>),
    /// DateTime value
    DateTime(DateTime<Utc>),
    /// Null value
    Null,
}

impl FieldValue {
    /// Whether this is the explicit null value.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// A short name for the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Binary(_) => "binary",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Null => "null",
        }
    }

    /// Convert to text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, if possible.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Get the value as a float, if possible.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert to boolean.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            FieldValue::Text(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" | "on" => Some(true),
                "false" | "f" | "no" | "n" | "0" | "off" => Some(false),
                _ => None,
            },
            FieldValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Get the value as a UTC timestamp.
    ///
    /// Text is parsed as RFC 3339, integers are treated as Unix seconds.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            FieldValue::Text(s) => s.parse::<DateTime<Utc>>().ok(),
            FieldValue::Integer(timestamp) => DateTime::from_timestamp(*timestamp, 0),
            _ => None,
        }
    }

    /// Get the value as binary data, if possible.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Binary(data) => Some(data),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Binary(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(FieldValue::from("abc").as_text(), Some("abc"));
        assert_eq!(FieldValue::from(7i32).as_integer(), Some(7));
        assert_eq!(FieldValue::from(7i64).as_float(), Some(7.0));
        assert_eq!(FieldValue::Text("12".into()).as_integer(), Some(12));
        assert_eq!(FieldValue::Text("off".into()).as_boolean(), Some(false));
        assert!(FieldValue::from(None::<String>).is_null());
        assert_eq!(FieldValue::from(Some(3i64)), FieldValue::Integer(3));
    }

    #[test]
    fn test_datetime_parsing() {
        let parsed = FieldValue::Text("2024-01-02T03:04:05Z".into())
            .as_datetime()
            .unwrap();
        assert_eq!(parsed.timestamp(), 1_704_164_645);

        let from_seconds = FieldValue::Integer(0).as_datetime().unwrap();
        assert_eq!(from_seconds.timestamp(), 0);
        assert!(FieldValue::Boolean(true).as_datetime().is_none());
    }
}
