//! Decoded field values.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::protocol::Oid;

/// A single decoded field value.
///
/// Rows are vectors of `Value`; SQL NULL is represented by [`Value::Null`].
/// Which variant a field decodes to is decided by the connection's
/// [`TypeRegistry`](crate::types::TypeRegistry) from the field's type OID.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// `bool`, wire text `t` / `f`
    Bool(bool),
    /// `int2` / `int4`
    Int(i32),
    /// `int8`
    BigInt(i64),
    /// `float4` / `float8`
    Float(f64),
    /// `numeric`, arbitrary precision
    Numeric(Decimal),
    /// `oid`, unsigned 32-bit
    Oid(Oid),
    /// `char` / `varchar` / `text`, and any type without a registered decoder
    Text(String),
    /// `bytea`, raw bytes
    Bytes(Vec<u8>),
    /// `date`
    Date(NaiveDate),
}

/// Discriminant of a [`Value`], used to key literal encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    BigInt,
    Float,
    Numeric,
    Oid,
    Text,
    Bytes,
    Date,
}

impl Value {
    /// The discriminant of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::BigInt(_) => ValueKind::BigInt,
            Value::Float(_) => ValueKind::Float,
            Value::Numeric(_) => ValueKind::Numeric,
            Value::Oid(_) => ValueKind::Oid,
            Value::Text(_) => ValueKind::Text,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Date(_) => ValueKind::Date,
        }
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string content of a `Text` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Narrow to `i32`.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Narrow to `i64`, widening `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(i64::from(*n)),
            Value::BigInt(n) => Some(*n),
            _ => None,
        }
    }

    /// Interpret this value as an OID.
    ///
    /// Accepts a decoded `Oid` as well as `Text` (the bootstrap `pg_type`
    /// query runs before any OID is registered, so its `oid` column arrives
    /// as text).
    pub fn as_oid(&self) -> Option<Oid> {
        match self {
            Value::Oid(oid) => Some(*oid),
            Value::Int(n) => u32::try_from(*n).ok(),
            Value::Text(s) => s.parse().ok(),
            _ => None,
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
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Numeric(v)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Value::Null.kind(), ValueKind::Null);
        assert_eq!(Value::from(1_i32).kind(), ValueKind::Int);
        assert_eq!(Value::from("x").kind(), ValueKind::Text);
    }

    #[test]
    fn as_oid_accepts_text() {
        assert_eq!(Value::Text("26".into()).as_oid(), Some(26));
        assert_eq!(Value::Oid(26).as_oid(), Some(26));
        assert_eq!(Value::Text("nope".into()).as_oid(), None);
    }

    #[test]
    fn option_becomes_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(7_i32)), Value::Int(7));
    }
}
