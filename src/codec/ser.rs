use serde::{ser, Serialize};

use crate::{
    error::{DbResult, Error},
    value::{
        Date, Decimal, Interval, Time, Timestamp, Value, DATE_TOKEN, DECIMAL_TOKEN,
        INTERVAL_TOKEN, TIMESTAMP_TOKEN, TIME_TOKEN, UUID_TOKEN,
    },
};

/// Outcome of serializing a value into a single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// The value maps onto one cell.
    Scalar(Value),
    /// The value is a keyed or sequential container and needs the document
    /// fallback.
    Composite,
}

/// Serializes scalars (and single-value wrappers around them) into a cell.
pub struct ValueSerializer;

impl ValueSerializer {
    fn token(name: &'static str, payload: Encoded) -> DbResult<Encoded> {
        let mismatch = || Error::Encode(format!("malformed `{name}` payload"));
        let Encoded::Scalar(payload) = payload else {
            return Err(mismatch());
        };
        let value = match (name, payload) {
            (DATE_TOKEN, Value::Int(days)) => Value::Date(Date::from_days(days)),
            (TIME_TOKEN, Value::BigInt(micros)) => Value::Time(Time::from_micros(micros)),
            (TIMESTAMP_TOKEN, Value::BigInt(micros)) => {
                Value::Timestamp(Timestamp::from_micros(micros))
            }
            (INTERVAL_TOKEN, Value::UHugeInt(packed)) => Value::Interval(Interval::unpack(packed)),
            (DECIMAL_TOKEN, Value::Text(text)) => Value::Decimal(text.parse::<Decimal>()?),
            (UUID_TOKEN, Value::Blob(bytes)) => {
                Value::Uuid(uuid::Uuid::from_slice(&bytes).map_err(|_| mismatch())?)
            }
            _ => return Err(mismatch()),
        };
        Ok(Encoded::Scalar(value))
    }
}

fn scalar(value: Value) -> DbResult<Encoded> {
    Ok(Encoded::Scalar(value))
}

impl ser::Serializer for ValueSerializer {
    type Ok = Encoded;
    type Error = Error;

    type SerializeSeq = ByteSeq;
    type SerializeTuple = Composite;
    type SerializeTupleStruct = Composite;
    type SerializeTupleVariant = Composite;
    type SerializeMap = Composite;
    type SerializeStruct = Composite;
    type SerializeStructVariant = Composite;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> DbResult<Encoded> {
        scalar(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> DbResult<Encoded> {
        scalar(Value::TinyInt(v))
    }

    fn serialize_i16(self, v: i16) -> DbResult<Encoded> {
        scalar(Value::SmallInt(v))
    }

    fn serialize_i32(self, v: i32) -> DbResult<Encoded> {
        scalar(Value::Int(v))
    }

    fn serialize_i64(self, v: i64) -> DbResult<Encoded> {
        scalar(Value::BigInt(v))
    }

    fn serialize_i128(self, v: i128) -> DbResult<Encoded> {
        scalar(Value::HugeInt(v))
    }

    fn serialize_u8(self, v: u8) -> DbResult<Encoded> {
        scalar(Value::UTinyInt(v))
    }

    fn serialize_u16(self, v: u16) -> DbResult<Encoded> {
        scalar(Value::USmallInt(v))
    }

    fn serialize_u32(self, v: u32) -> DbResult<Encoded> {
        scalar(Value::UInt(v))
    }

    fn serialize_u64(self, v: u64) -> DbResult<Encoded> {
        scalar(Value::UBigInt(v))
    }

    fn serialize_u128(self, v: u128) -> DbResult<Encoded> {
        scalar(Value::UHugeInt(v))
    }

    fn serialize_f32(self, v: f32) -> DbResult<Encoded> {
        scalar(Value::Float(v))
    }

    fn serialize_f64(self, v: f64) -> DbResult<Encoded> {
        scalar(Value::Double(v))
    }

    fn serialize_char(self, v: char) -> DbResult<Encoded> {
        scalar(Value::Text(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> DbResult<Encoded> {
        scalar(Value::Text(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> DbResult<Encoded> {
        scalar(Value::Blob(v.to_vec()))
    }

    fn serialize_none(self) -> DbResult<Encoded> {
        scalar(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> DbResult<Encoded> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> DbResult<Encoded> {
        scalar(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> DbResult<Encoded> {
        scalar(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> DbResult<Encoded> {
        scalar(Value::Text(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> DbResult<Encoded> {
        let inner = value.serialize(ValueSerializer)?;
        match name {
            DATE_TOKEN | TIME_TOKEN | TIMESTAMP_TOKEN | INTERVAL_TOKEN | DECIMAL_TOKEN
            | UUID_TOKEN => ValueSerializer::token(name, inner),
            _ => Ok(inner),
        }
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> DbResult<Encoded> {
        Ok(Encoded::Composite)
    }

    fn serialize_seq(self, _len: Option<usize>) -> DbResult<ByteSeq> {
        Ok(ByteSeq {
            bytes: Some(Vec::new()),
        })
    }

    fn serialize_tuple(self, _len: usize) -> DbResult<Composite> {
        Ok(Composite)
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> DbResult<Composite> {
        Ok(Composite)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> DbResult<Composite> {
        Ok(Composite)
    }

    fn serialize_map(self, _len: Option<usize>) -> DbResult<Composite> {
        Ok(Composite)
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> DbResult<Composite> {
        Ok(Composite)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> DbResult<Composite> {
        Ok(Composite)
    }
}

/// Collects a sequence as a blob while every element is a `u8`. Any other
/// sequence, and the empty one, is a container.
pub struct ByteSeq {
    bytes: Option<Vec<u8>>,
}

impl ser::SerializeSeq for ByteSeq {
    type Ok = Encoded;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> DbResult<()> {
        self.bytes = self.bytes.take().and_then(|mut bytes| {
            match value.serialize(ValueSerializer) {
                Ok(Encoded::Scalar(Value::UTinyInt(byte))) => {
                    bytes.push(byte);
                    Some(bytes)
                }
                _ => None,
            }
        });
        Ok(())
    }

    fn end(self) -> DbResult<Encoded> {
        match self.bytes {
            Some(bytes) if !bytes.is_empty() => Ok(Encoded::Scalar(Value::Blob(bytes))),
            _ => Ok(Encoded::Composite),
        }
    }
}

/// Accepts and discards the elements of a container. Containers are encoded
/// as a whole by the document fallback.
pub struct Composite;

macro_rules! composite {
    ($($trait:ident :: $method:ident ( $($arg:ident : $ty:ty),* )),* $(,)?) => {
        $(
            impl ser::$trait for Composite {
                type Ok = Encoded;
                type Error = Error;

                fn $method<T: Serialize + ?Sized>(&mut self, $($arg: $ty,)* _value: &T) -> DbResult<()> {
                    $(let _ = $arg;)*
                    Ok(())
                }

                fn end(self) -> DbResult<Encoded> {
                    Ok(Encoded::Composite)
                }
            }
        )*
    };
}

composite! {
    SerializeTuple::serialize_element(),
    SerializeTupleStruct::serialize_field(),
    SerializeTupleVariant::serialize_field(),
    SerializeStruct::serialize_field(key: &'static str),
    SerializeStructVariant::serialize_field(key: &'static str),
}

impl ser::SerializeMap for Composite {
    type Ok = Encoded;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, _key: &T) -> DbResult<()> {
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, _value: &T) -> DbResult<()> {
        Ok(())
    }

    fn end(self) -> DbResult<Encoded> {
        Ok(Encoded::Composite)
    }
}
