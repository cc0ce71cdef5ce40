use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::{
    error::{DbResult, Error},
    value::{Date, Decimal, Interval, Time, Timestamp, Value},
};

/// Types with a direct cell representation.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Types that can be read directly out of a cell.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> DbResult<Self>;
}

fn mismatch<T>(value: &Value) -> Error {
    Error::mismatch(value.type_name(), std::any::type_name::<T>())
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> DbResult<Self> {
        Ok(value.clone())
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> DbResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

macro_rules! direct {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Value {
                    Value::$variant(v)
                }
            }
        )*
    };
}

direct! {
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    i128 => HugeInt,
    u8 => UTinyInt,
    u16 => USmallInt,
    u32 => UInt,
    u64 => UBigInt,
    u128 => UHugeInt,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Blob,
    Date => Date,
    Time => Time,
    Timestamp => Timestamp,
    Interval => Interval,
    Decimal => Decimal,
    Uuid => Uuid,
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_owned())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Text(v.to_owned())
    }
}

impl ToValue for [u8] {
    fn to_value(&self) -> Value {
        Value::Blob(self.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        v.map_or(Value::Null, Into::into)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> DbResult<Self> {
        value.as_bool().ok_or_else(|| mismatch::<bool>(value))
    }
}

macro_rules! integer {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> DbResult<Self> {
                    let wide = match *value {
                        Value::HugeInt(v) => <$ty>::try_from(v).ok(),
                        Value::UBigInt(v) => <$ty>::try_from(v).ok(),
                        Value::UHugeInt(v) => <$ty>::try_from(v).ok(),
                        _ => None,
                    };
                    wide.or_else(|| value.as_integer().and_then(|v| <$ty>::try_from(v).ok()))
                        .ok_or_else(|| mismatch::<$ty>(value))
                }
            }
        )*
    };
}

integer!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128);

impl FromValue for f64 {
    fn from_value(value: &Value) -> DbResult<Self> {
        value.as_double().ok_or_else(|| mismatch::<f64>(value))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> DbResult<Self> {
        match *value {
            Value::Float(v) => Ok(v),
            _ => value
                .as_double()
                .map(|v| v as f32)
                .ok_or_else(|| mismatch::<f32>(value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> DbResult<Self> {
        value.as_string().ok_or_else(|| mismatch::<String>(value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> DbResult<Self> {
        match value {
            Value::Blob(bytes) => Ok(bytes.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            Value::Uuid(uuid) => Ok(uuid.as_bytes().to_vec()),
            other => Err(mismatch::<Vec<u8>>(other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> DbResult<Self> {
        match value {
            Value::Uuid(uuid) => Ok(*uuid),
            Value::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| mismatch::<Uuid>(value)),
            Value::Blob(bytes) => Uuid::from_slice(bytes).map_err(|_| mismatch::<Uuid>(value)),
            Value::UHugeInt(v) => Ok(Uuid::from_u128(*v)),
            other => Err(mismatch::<Uuid>(other)),
        }
    }
}

// Temporal types accept their own variant or canonical text.
macro_rules! textual {
    ($($ty:ident),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> DbResult<Self> {
                    match value {
                        Value::$ty(v) => Ok(*v),
                        Value::Text(s) => s.parse(),
                        other => Err(mismatch::<$ty>(other)),
                    }
                }
            }
        )*
    };
}

textual!(Date, Time, Timestamp, Decimal);

impl FromValue for Interval {
    fn from_value(value: &Value) -> DbResult<Self> {
        match value {
            Value::Interval(v) => Ok(*v),
            other => Err(mismatch::<Interval>(other)),
        }
    }
}

impl ToValue for NaiveDate {
    fn to_value(&self) -> Value {
        Value::Date(Date::from(*self))
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> DbResult<Self> {
        Date::from_value(value)?
            .to_naive()
            .ok_or_else(|| mismatch::<NaiveDate>(value))
    }
}

impl ToValue for NaiveTime {
    fn to_value(&self) -> Value {
        Value::Time(Time::from(*self))
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> DbResult<Self> {
        Time::from_value(value)?
            .to_naive()
            .ok_or_else(|| mismatch::<NaiveTime>(value))
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self) -> Value {
        Value::Timestamp(Timestamp::from(*self))
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> DbResult<Self> {
        Timestamp::from_value(value)?
            .to_naive()
            .ok_or_else(|| mismatch::<NaiveDateTime>(value))
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(Timestamp::from(*self))
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> DbResult<Self> {
        Timestamp::from_value(value)?
            .to_datetime()
            .ok_or_else(|| mismatch::<DateTime<Utc>>(value))
    }
}
