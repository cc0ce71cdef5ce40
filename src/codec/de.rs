use serde::de::{
    self,
    value::{BorrowedStrDeserializer, SeqDeserializer},
    IntoDeserializer, Visitor,
};
use serde_json::de::SliceRead;

use crate::{
    error::{DbResult, Error},
    value::{
        FromValue, Value, DATE_TOKEN, DECIMAL_TOKEN, INTERVAL_TOKEN, TIMESTAMP_TOKEN, TIME_TOKEN,
    },
};

/// Reads Rust values out of a borrowed cell.
///
/// Scalar requests go through the cell's coercion views, wrappers see the cell
/// as their single inner value, and containers are parsed from the cell's
/// JSON payload.
#[derive(Debug, Clone, Copy)]
pub struct ValueDeserializer<'de> {
    value: &'de Value,
}

impl<'de> ValueDeserializer<'de> {
    pub fn new(value: &'de Value) -> ValueDeserializer<'de> {
        ValueDeserializer { value }
    }

    fn mismatch(&self, target: &str) -> Error {
        Error::mismatch(self.value.type_name(), target)
    }

    /// The raw bytes of a cell that may hold a JSON document.
    fn payload(&self) -> Option<&'de [u8]> {
        match self.value {
            Value::Text(s) | Value::Unsupported { text: s, .. } => Some(s.as_bytes()),
            Value::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }

    fn document<V, F>(&self, target: &str, visitor: V, f: F) -> DbResult<V::Value>
    where
        V: Visitor<'de>,
        F: FnOnce(&mut serde_json::Deserializer<SliceRead<'de>>, V) -> serde_json::Result<V::Value>,
    {
        let payload = self.payload().ok_or_else(|| self.mismatch(target))?;
        let mut de = serde_json::Deserializer::from_slice(payload);
        let value = f(&mut de, visitor).map_err(|error| Error::TypeMismatch {
            message: format!("cannot decode `{target}` from document: {error}"),
        })?;
        de.end().map_err(|error| Error::TypeMismatch {
            message: format!("trailing data after `{target}` document: {error}"),
        })?;
        Ok(value)
    }
}

fn payload<'de, T: IntoDeserializer<'de, Error>>(value: T) -> T::Deserializer {
    value.into_deserializer()
}

fn looks_like_document(s: &str, openers: &[char]) -> bool {
    s.trim_start().starts_with(openers)
}

macro_rules! direct {
    ($($method:ident => $visit:ident : $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
                visitor.$visit(<$ty>::from_value(self.value)?)
            }
        )*
    };
}

macro_rules! document {
    ($($method:ident ( $($arg:ident : $ty:ty),* ) => $target:literal),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, $($arg: $ty,)* visitor: V) -> DbResult<V::Value> {
                self.document($target, visitor, |de, visitor| {
                    de::Deserializer::$method(de, $($arg,)* visitor)
                })
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ValueDeserializer<'de> {
    type Error = Error;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(v) => visitor.visit_bool(*v),
            Value::TinyInt(v) => visitor.visit_i8(*v),
            Value::SmallInt(v) => visitor.visit_i16(*v),
            Value::Int(v) => visitor.visit_i32(*v),
            Value::BigInt(v) => visitor.visit_i64(*v),
            Value::HugeInt(v) => visitor.visit_i128(*v),
            Value::UTinyInt(v) => visitor.visit_u8(*v),
            Value::USmallInt(v) => visitor.visit_u16(*v),
            Value::UInt(v) => visitor.visit_u32(*v),
            Value::UBigInt(v) => visitor.visit_u64(*v),
            Value::UHugeInt(v) => visitor.visit_u128(*v),
            Value::Float(v) => visitor.visit_f32(*v),
            Value::Double(v) => visitor.visit_f64(*v),
            Value::Text(s) | Value::Unsupported { text: s, .. } => visitor.visit_borrowed_str(s),
            Value::Blob(bytes) => visitor.visit_borrowed_bytes(bytes),
            other => visitor.visit_string(other.to_string()),
        }
    }

    direct! {
        deserialize_bool => visit_bool: bool,
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        let text = self.value.as_string().unwrap_or_default();
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(self.mismatch("char")),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        match self.value {
            Value::Text(s) | Value::Unsupported { text: s, .. } => visitor.visit_borrowed_str(s),
            other => match other.as_string() {
                Some(s) => visitor.visit_string(s),
                None => Err(self.mismatch("string")),
            },
        }
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        match self.value {
            Value::Blob(bytes) => visitor.visit_borrowed_bytes(bytes),
            Value::Uuid(uuid) => visitor.visit_borrowed_bytes(uuid.as_bytes()),
            Value::Text(s) => visitor.visit_borrowed_str(s),
            _ => Err(self.mismatch("bytes")),
        }
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            _ => Err(self.mismatch("()")),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> DbResult<V::Value> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            _ => Err(self.mismatch(name)),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> DbResult<V::Value> {
        match (name, self.value) {
            (DATE_TOKEN, Value::Date(d)) => visitor.visit_newtype_struct(payload(d.days())),
            (TIME_TOKEN, Value::Time(t)) => visitor.visit_newtype_struct(payload(t.micros())),
            (TIMESTAMP_TOKEN, Value::Timestamp(ts)) => {
                visitor.visit_newtype_struct(payload(ts.micros()))
            }
            (INTERVAL_TOKEN, Value::Interval(i)) => visitor.visit_newtype_struct(payload(i.pack())),
            (DECIMAL_TOKEN, Value::Decimal(d)) => {
                visitor.visit_newtype_struct(payload(d.to_string()))
            }
            (DATE_TOKEN | TIME_TOKEN | TIMESTAMP_TOKEN | DECIMAL_TOKEN, Value::Text(s)) => {
                visitor.visit_borrowed_str(s)
            }
            (DECIMAL_TOKEN, number) if number.as_double().is_some() => {
                visitor.visit_string(number.to_string())
            }
            (DATE_TOKEN | TIME_TOKEN | TIMESTAMP_TOKEN | INTERVAL_TOKEN | DECIMAL_TOKEN, _) => {
                Err(self.mismatch(name))
            }
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        match self.value {
            Value::Blob(bytes) => {
                let mut seq = SeqDeserializer::<_, Error>::new(bytes.iter().copied());
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            _ => self.document("sequence", visitor, |de, visitor| {
                de::Deserializer::deserialize_seq(de, visitor)
            }),
        }
    }

    document! {
        deserialize_tuple(len: usize) => "tuple",
        deserialize_tuple_struct(name: &'static str, len: usize) => "tuple struct",
        deserialize_map() => "map",
        deserialize_struct(name: &'static str, fields: &'static [&'static str]) => "struct",
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> DbResult<V::Value> {
        match self.value {
            Value::Text(s) if looks_like_document(s, &['{', '"']) => {
                self.document(name, visitor, |de, visitor| {
                    de::Deserializer::deserialize_enum(de, name, variants, visitor)
                })
            }
            Value::Text(s) => visitor.visit_enum(BorrowedStrDeserializer::<Error>::new(s)),
            _ => Err(self.mismatch(name)),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> DbResult<V::Value> {
        visitor.visit_unit()
    }
}

impl<'de> IntoDeserializer<'de, Error> for ValueDeserializer<'de> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}
