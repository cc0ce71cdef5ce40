use std::fmt;

use duckdb::types::{TimeUnit, Value as NativeValue};
use serde::{Serialize, Serializer};

use crate::error::{DbResult, Error};

mod convert;
pub use convert::*;

mod native;
pub use native::*;

mod temporal;
pub use temporal::*;
pub(crate) use temporal::{
    DATE_TOKEN, DECIMAL_TOKEN, INTERVAL_TOKEN, TIMESTAMP_TOKEN, TIME_TOKEN, UUID_TOKEN,
};

/// A single cell or bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    HugeInt(i128),
    UTinyInt(u8),
    USmallInt(u16),
    UInt(u32),
    UBigInt(u64),
    UHugeInt(u128),
    Float(f32),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(Date),
    Time(Time),
    Timestamp(Timestamp),
    Interval(Interval),
    Decimal(Decimal),
    Uuid(uuid::Uuid),
    /// A composite engine value (list, struct, map, ...) in its textual form.
    Unsupported { ty: NativeType, text: String },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the engine type this value binds as.
    pub fn native_type(&self) -> NativeType {
        match self {
            Value::Null => NativeType::SqlNull,
            Value::Bool(_) => NativeType::Boolean,
            Value::TinyInt(_) => NativeType::TinyInt,
            Value::SmallInt(_) => NativeType::SmallInt,
            Value::Int(_) => NativeType::Integer,
            Value::BigInt(_) => NativeType::BigInt,
            Value::HugeInt(_) => NativeType::HugeInt,
            Value::UTinyInt(_) => NativeType::UTinyInt,
            Value::USmallInt(_) => NativeType::USmallInt,
            Value::UInt(_) => NativeType::UInteger,
            Value::UBigInt(_) => NativeType::UBigInt,
            Value::UHugeInt(_) => NativeType::UHugeInt,
            Value::Float(_) => NativeType::Float,
            Value::Double(_) => NativeType::Double,
            Value::Text(_) => NativeType::Varchar,
            Value::Blob(_) => NativeType::Blob,
            Value::Date(_) => NativeType::Date,
            Value::Time(_) => NativeType::Time,
            Value::Timestamp(_) => NativeType::Timestamp,
            Value::Interval(_) => NativeType::Interval,
            Value::Decimal(_) => NativeType::Decimal,
            Value::Uuid(_) => NativeType::Uuid,
            Value::Unsupported { ty, .. } => *ty,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.native_type().name()
    }

    /// Integer view.
    ///
    /// Booleans map to 0/1, floats are truncated when finite and in range, text
    /// is parsed and decimals are accepted when they have no fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Bool(b) => Some(i64::from(b)),
            Value::TinyInt(v) => Some(v.into()),
            Value::SmallInt(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::BigInt(v) => Some(v),
            Value::HugeInt(v) => v.try_into().ok(),
            Value::UTinyInt(v) => Some(v.into()),
            Value::USmallInt(v) => Some(v.into()),
            Value::UInt(v) => Some(v.into()),
            Value::UBigInt(v) => v.try_into().ok(),
            Value::UHugeInt(v) => v.try_into().ok(),
            Value::Float(v) => float_to_i64(f64::from(v)),
            Value::Double(v) => float_to_i64(v),
            Value::Text(ref s) => s.trim().parse().ok(),
            Value::Decimal(d) => d.to_i128()?.try_into().ok(),
            _ => None,
        }
    }

    /// Floating-point view of every numeric variant, booleans and numeric text.
    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            Value::TinyInt(v) => Some(v.into()),
            Value::SmallInt(v) => Some(v.into()),
            Value::Int(v) => Some(v.into()),
            Value::BigInt(v) => Some(v as f64),
            Value::HugeInt(v) => Some(v as f64),
            Value::UTinyInt(v) => Some(v.into()),
            Value::USmallInt(v) => Some(v.into()),
            Value::UInt(v) => Some(v.into()),
            Value::UBigInt(v) => Some(v as f64),
            Value::UHugeInt(v) => Some(v as f64),
            Value::Float(v) => Some(v.into()),
            Value::Double(v) => Some(v),
            Value::Decimal(d) => Some(d.to_f64()),
            Value::Text(ref s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Canonical text of any non-null value. Blobs only convert when they hold
    /// valid UTF-8.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Blob(bytes) => String::from_utf8(bytes.clone()).ok(),
            other => Some(other.to_string()),
        }
    }

    /// Borrowed text, for text cells only.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view. Numbers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(true),
                "false" | "f" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Float(_) | Value::Double(_) | Value::Decimal(_) => {
                self.as_double().map(|v| v != 0.0)
            }
            Value::HugeInt(v) => Some(*v != 0),
            Value::UBigInt(v) => Some(*v != 0),
            Value::UHugeInt(v) => Some(*v != 0),
            _ => self.as_integer().map(|v| v != 0),
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Converts into the engine's own value type for binding.
    ///
    /// Types the engine binder has no native entry point for are bound as
    /// their canonical text and cast by the engine.
    pub(crate) fn to_native(&self) -> NativeValue {
        match self {
            Value::Null => NativeValue::Null,
            Value::Bool(v) => NativeValue::Boolean(*v),
            Value::TinyInt(v) => NativeValue::TinyInt(*v),
            Value::SmallInt(v) => NativeValue::SmallInt(*v),
            Value::Int(v) => NativeValue::Int(*v),
            Value::BigInt(v) => NativeValue::BigInt(*v),
            Value::HugeInt(v) => NativeValue::HugeInt(*v),
            Value::UTinyInt(v) => NativeValue::UTinyInt(*v),
            Value::USmallInt(v) => NativeValue::USmallInt(*v),
            Value::UInt(v) => NativeValue::UInt(*v),
            Value::UBigInt(v) => NativeValue::UBigInt(*v),
            Value::Float(v) => NativeValue::Float(*v),
            Value::Double(v) => NativeValue::Double(*v),
            Value::Text(v) => NativeValue::Text(v.clone()),
            Value::Blob(v) => NativeValue::Blob(v.clone()),
            Value::Timestamp(ts) => NativeValue::Timestamp(TimeUnit::Microsecond, ts.micros()),
            Value::Interval(i) => NativeValue::Interval {
                months: i.months,
                days: i.days,
                nanos: i.micros.saturating_mul(1_000),
            },
            Value::UHugeInt(_)
            | Value::Date(_)
            | Value::Time(_)
            | Value::Decimal(_)
            | Value::Uuid(_)
            | Value::Unsupported { .. } => NativeValue::Text(self.to_string()),
        }
    }

    /// Binds this value at the given 1-based parameter position.
    pub(crate) fn bind(&self, stmt: &mut duckdb::Statement<'_>, position: usize) -> DbResult<()> {
        stmt.raw_bind_parameter(position, self.to_native())
            .map_err(|error| Error::Bind {
                position,
                message: error.to_string(),
            })
    }
}

fn float_to_i64(v: f64) -> Option<i64> {
    // `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
    if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v.trunc() as i64)
    } else {
        None
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::TinyInt(v) => write!(f, "{v}"),
            Value::SmallInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::HugeInt(v) => write!(f, "{v}"),
            Value::UTinyInt(v) => write!(f, "{v}"),
            Value::USmallInt(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::UBigInt(v) => write!(f, "{v}"),
            Value::UHugeInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Blob(bytes) => {
                for &b in bytes {
                    if b.is_ascii_graphic() && b != b'\\' || b == b' ' {
                        write!(f, "{}", b as char)?;
                    } else {
                        write!(f, "\\x{b:02X}")?;
                    }
                }
                Ok(())
            }
            Value::Date(v) => write!(f, "{v}"),
            Value::Time(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::Interval(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Uuid(v) => write!(f, "{}", v.hyphenated()),
            Value::Unsupported { text, .. } => f.write_str(text),
        }
    }
}

/// Serializes raw bytes without going through a sequence.
struct Bytes<'a>(&'a [u8]);

impl Serialize for Bytes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::TinyInt(v) => serializer.serialize_i8(*v),
            Value::SmallInt(v) => serializer.serialize_i16(*v),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::BigInt(v) => serializer.serialize_i64(*v),
            Value::HugeInt(v) => serializer.serialize_i128(*v),
            Value::UTinyInt(v) => serializer.serialize_u8(*v),
            Value::USmallInt(v) => serializer.serialize_u16(*v),
            Value::UInt(v) => serializer.serialize_u32(*v),
            Value::UBigInt(v) => serializer.serialize_u64(*v),
            Value::UHugeInt(v) => serializer.serialize_u128(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Blob(v) => serializer.serialize_bytes(v),
            Value::Date(v) => v.serialize(serializer),
            Value::Time(v) => v.serialize(serializer),
            Value::Timestamp(v) => v.serialize(serializer),
            Value::Interval(v) => v.serialize(serializer),
            Value::Decimal(v) => v.serialize(serializer),
            Value::Uuid(v) if serializer.is_human_readable() => v.serialize(serializer),
            Value::Uuid(v) => serializer.serialize_newtype_struct(UUID_TOKEN, &Bytes(v.as_bytes())),
            Value::Unsupported { text, .. } => serializer.serialize_str(text),
        }
    }
}
