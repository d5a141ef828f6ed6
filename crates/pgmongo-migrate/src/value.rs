//! Column metadata and untyped row values.
//!
//! A [`RawValue`] keeps the native kind a source column was decoded as, so a
//! row can travel to the destination without coercion. Values are owned: a
//! row is fully copied out of the driver buffers before the cursor moves on.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

/// Name and position of one column in a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name as reported by the result set metadata.
    pub name: String,
    /// 0-based position in the result set.
    pub ordinal: usize,
    /// Source type name (e.g. `INT4`, `TIMESTAMPTZ`).
    pub type_name: String,
}

impl ColumnDescriptor {
    /// Creates a descriptor.
    pub fn new(name: impl Into<String>, ordinal: usize, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            type_name: type_name.into(),
        }
    }
}

/// A single column value in its native representation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 16-bit integer (smallint).
    Int16(i16),
    /// 32-bit integer (integer).
    Int32(i32),
    /// 64-bit integer (bigint).
    Int64(i64),
    /// Single precision float (real).
    Float32(f32),
    /// Double precision float.
    Float64(f64),
    /// Arbitrary precision decimal (numeric) as its exact decimal text.
    /// Special values are spelled `NaN`, `Infinity` and `-Infinity`.
    Numeric(String),
    /// Text of any character type.
    Text(String),
    /// Binary data (bytea).
    Bytes(Vec<u8>),
    /// UUID.
    Uuid(Uuid),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone, normalized to UTC.
    TimestampTz(DateTime<Utc>),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// JSON or JSONB document.
    Json(serde_json::Value),
    /// One-dimensional array; NULL elements are kept as [`RawValue::Null`].
    Array(Vec<RawValue>),
    /// A type without a native decoder, kept as its binary wire form.
    Other {
        /// Source type name (e.g. `INTERVAL`, `INET`).
        type_name: String,
        /// Value bytes exactly as the server sent them.
        bytes: Vec<u8>,
    },
}

impl RawValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the value kind, used in logs and error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Numeric(_) => "numeric",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
            Self::TimestampTz(_) => "timestamptz",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::Json(_) => "json",
            Self::Array(_) => "array",
            Self::Other { .. } => "other",
        }
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

macro_rules! impl_from_native {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for RawValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_native! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    NaiveDate => Date,
    NaiveTime => Time,
    serde_json::Value => Json,
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_none_is_null() {
        let value: RawValue = Option::<i32>::None.into();
        assert!(value.is_null());
        assert_eq!(value.kind(), "null");
    }

    #[test]
    fn test_option_some_keeps_kind() {
        let value: RawValue = Some(7_i64).into();
        assert_eq!(value, RawValue::Int64(7));
    }

    #[test]
    fn test_integer_widths_are_distinct() {
        assert_ne!(RawValue::from(1_i16), RawValue::from(1_i32));
        assert_ne!(RawValue::from(1_i32), RawValue::from(1_i64));
    }

    #[test]
    fn test_empty_text_is_not_null() {
        let value = RawValue::from("");
        assert!(!value.is_null());
        assert_eq!(value.kind(), "text");
    }

    #[test]
    fn test_array_with_null_elements() {
        let value = RawValue::Array(vec![RawValue::Int32(1), RawValue::Null]);
        match value {
            RawValue::Array(items) => {
                assert_eq!(items.len(), 2);
                assert!(items[1].is_null());
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_other_keeps_type_name_and_bytes() {
        let value = RawValue::Other {
            type_name: "INET".to_string(),
            bytes: vec![2, 32, 0, 4, 10, 0, 0, 1],
        };
        assert!(!value.is_null());
        assert_eq!(value.kind(), "other");
    }

    #[test]
    fn test_numeric_special_values_are_text() {
        let value = RawValue::Numeric("NaN".to_string());
        assert_eq!(value.kind(), "numeric");
        assert_ne!(value, RawValue::Text("NaN".to_string()));
    }
}
