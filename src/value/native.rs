use std::{collections::HashMap, fmt};

use duckdb::arrow::{
    array::{Array, AsArray},
    datatypes::{
        DataType, Field, Date32Type, Date64Type, Decimal128Type, Float16Type, Float32Type, Float64Type,
        Int16Type, Int32Type, Int64Type, Int8Type, IntervalDayTimeType, IntervalMonthDayNanoType,
        IntervalUnit, IntervalYearMonthType, Time32MillisecondType, Time32SecondType,
        Time64MicrosecondType, Time64NanosecondType, TimeUnit, TimestampMicrosecondType,
        TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
        UInt32Type, UInt64Type, UInt8Type,
    },
    util::display::array_value_to_string,
};
use serde::Deserialize;

use crate::value::{Date, Decimal, Interval, Time, Timestamp, Value};

/// Engine logical type tags.
///
/// Discriminants follow the engine's C API type ids.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NativeType {
    Invalid = 0,
    Boolean = 1,
    TinyInt = 2,
    SmallInt = 3,
    Integer = 4,
    BigInt = 5,
    UTinyInt = 6,
    USmallInt = 7,
    UInteger = 8,
    UBigInt = 9,
    Float = 10,
    Double = 11,
    Timestamp = 12,
    Date = 13,
    Time = 14,
    Interval = 15,
    HugeInt = 16,
    Varchar = 17,
    Blob = 18,
    Decimal = 19,
    TimestampS = 20,
    TimestampMs = 21,
    TimestampNs = 22,
    Enum = 23,
    List = 24,
    Struct = 25,
    Map = 26,
    Uuid = 27,
    Union = 28,
    Bit = 29,
    TimeTz = 30,
    TimestampTz = 31,
    UHugeInt = 32,
    Array = 33,
    Any = 34,
    VarInt = 35,
    SqlNull = 36,
}

impl NativeType {
    /// The engine's SQL name for this type.
    pub fn name(self) -> &'static str {
        match self {
            NativeType::Invalid => "INVALID",
            NativeType::Boolean => "BOOLEAN",
            NativeType::TinyInt => "TINYINT",
            NativeType::SmallInt => "SMALLINT",
            NativeType::Integer => "INTEGER",
            NativeType::BigInt => "BIGINT",
            NativeType::UTinyInt => "UTINYINT",
            NativeType::USmallInt => "USMALLINT",
            NativeType::UInteger => "UINTEGER",
            NativeType::UBigInt => "UBIGINT",
            NativeType::Float => "FLOAT",
            NativeType::Double => "DOUBLE",
            NativeType::Timestamp => "TIMESTAMP",
            NativeType::Date => "DATE",
            NativeType::Time => "TIME",
            NativeType::Interval => "INTERVAL",
            NativeType::HugeInt => "HUGEINT",
            NativeType::Varchar => "VARCHAR",
            NativeType::Blob => "BLOB",
            NativeType::Decimal => "DECIMAL",
            NativeType::TimestampS => "TIMESTAMP_S",
            NativeType::TimestampMs => "TIMESTAMP_MS",
            NativeType::TimestampNs => "TIMESTAMP_NS",
            NativeType::Enum => "ENUM",
            NativeType::List => "LIST",
            NativeType::Struct => "STRUCT",
            NativeType::Map => "MAP",
            NativeType::Uuid => "UUID",
            NativeType::Union => "UNION",
            NativeType::Bit => "BIT",
            NativeType::TimeTz => "TIME WITH TIME ZONE",
            NativeType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            NativeType::UHugeInt => "UHUGEINT",
            NativeType::Array => "ARRAY",
            NativeType::Any => "ANY",
            NativeType::VarInt => "VARINT",
            NativeType::SqlNull => "NULL",
        }
    }

    /// Whether values of this type have no scalar cell representation.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            NativeType::Enum
                | NativeType::List
                | NativeType::Struct
                | NativeType::Map
                | NativeType::Union
                | NativeType::Array
        )
    }

    /// Derives the tag of a result column, preferring the engine's extension
    /// type annotation over the plain Arrow type.
    pub fn from_field(field: &Field) -> NativeType {
        extension_type(field.metadata()).unwrap_or_else(|| NativeType::from_arrow(field.data_type()))
    }

    /// Derives the tag of a result column from its Arrow type.
    pub fn from_arrow(ty: &DataType) -> NativeType {
        match ty {
            DataType::Null => NativeType::SqlNull,
            DataType::Boolean => NativeType::Boolean,
            DataType::Int8 => NativeType::TinyInt,
            DataType::Int16 => NativeType::SmallInt,
            DataType::Int32 => NativeType::Integer,
            DataType::Int64 => NativeType::BigInt,
            DataType::UInt8 => NativeType::UTinyInt,
            DataType::UInt16 => NativeType::USmallInt,
            DataType::UInt32 => NativeType::UInteger,
            DataType::UInt64 => NativeType::UBigInt,
            DataType::Float16 | DataType::Float32 => NativeType::Float,
            DataType::Float64 => NativeType::Double,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => NativeType::Varchar,
            DataType::Binary | DataType::LargeBinary | DataType::BinaryView => NativeType::Blob,
            DataType::FixedSizeBinary(16) => NativeType::Uuid,
            DataType::Date32 | DataType::Date64 => NativeType::Date,
            DataType::Time32(_) | DataType::Time64(_) => NativeType::Time,
            DataType::Timestamp(_, Some(_)) => NativeType::TimestampTz,
            DataType::Timestamp(TimeUnit::Second, None) => NativeType::TimestampS,
            DataType::Timestamp(TimeUnit::Millisecond, None) => NativeType::TimestampMs,
            DataType::Timestamp(TimeUnit::Microsecond, None) => NativeType::Timestamp,
            DataType::Timestamp(TimeUnit::Nanosecond, None) => NativeType::TimestampNs,
            DataType::Interval(_) => NativeType::Interval,
            DataType::Decimal128(..) => NativeType::Decimal,
            DataType::Dictionary(..) => NativeType::Enum,
            DataType::List(_) | DataType::LargeList(_) => NativeType::List,
            DataType::FixedSizeList(..) => NativeType::Array,
            DataType::Struct(_) => NativeType::Struct,
            DataType::Map(..) => NativeType::Map,
            DataType::Union(..) => NativeType::Union,
            _ => NativeType::Invalid,
        }
    }

    /// Reads the cell at `pos` of a column tagged with this type.
    ///
    /// Cells whose type has no mapping decode to [`Value::Null`], so the row
    /// keeps its shape.
    pub fn decode(self, array: &dyn Array, pos: usize) -> Value {
        if array.is_null(pos) {
            return Value::Null;
        }
        self.decode_valid(array, pos).unwrap_or(Value::Null)
    }

    fn decode_valid(self, array: &dyn Array, pos: usize) -> Option<Value> {
        let value = match self {
            NativeType::Boolean => Value::Bool(array.as_boolean_opt()?.value(pos)),
            NativeType::TinyInt => Value::TinyInt(array.as_primitive_opt::<Int8Type>()?.value(pos)),
            NativeType::SmallInt => {
                Value::SmallInt(array.as_primitive_opt::<Int16Type>()?.value(pos))
            }
            NativeType::Integer => Value::Int(array.as_primitive_opt::<Int32Type>()?.value(pos)),
            NativeType::BigInt => Value::BigInt(array.as_primitive_opt::<Int64Type>()?.value(pos)),
            NativeType::UTinyInt => {
                Value::UTinyInt(array.as_primitive_opt::<UInt8Type>()?.value(pos))
            }
            NativeType::USmallInt => {
                Value::USmallInt(array.as_primitive_opt::<UInt16Type>()?.value(pos))
            }
            NativeType::UInteger => Value::UInt(array.as_primitive_opt::<UInt32Type>()?.value(pos)),
            NativeType::UBigInt => {
                Value::UBigInt(array.as_primitive_opt::<UInt64Type>()?.value(pos))
            }
            NativeType::Float => match array.data_type() {
                DataType::Float16 => {
                    Value::Float(array.as_primitive_opt::<Float16Type>()?.value(pos).to_f32())
                }
                _ => Value::Float(array.as_primitive_opt::<Float32Type>()?.value(pos)),
            },
            NativeType::Double => Value::Double(array.as_primitive_opt::<Float64Type>()?.value(pos)),
            NativeType::HugeInt => match array.data_type() {
                DataType::FixedSizeBinary(16) => Value::HugeInt(i128::from_le_bytes(wide(array, pos)?)),
                _ => Value::HugeInt(array.as_primitive_opt::<Decimal128Type>()?.value(pos)),
            },
            NativeType::UHugeInt => match array.data_type() {
                DataType::FixedSizeBinary(16) => Value::UHugeInt(u128::from_le_bytes(wide(array, pos)?)),
                _ => {
                    let value = array.as_primitive_opt::<Decimal128Type>()?.value(pos);
                    Value::UHugeInt(u128::try_from(value).ok()?)
                }
            },
            NativeType::Decimal => {
                let DataType::Decimal128(_, scale) = array.data_type() else {
                    return None;
                };
                let value = array.as_primitive_opt::<Decimal128Type>()?.value(pos);
                Value::Decimal(Decimal::new(value, u8::try_from(*scale).ok()?))
            }
            NativeType::Varchar => Value::Text(text(array, pos)?.to_owned()),
            NativeType::Blob | NativeType::Bit => Value::Blob(bytes(array, pos)?.to_vec()),
            NativeType::Uuid => match array.data_type() {
                DataType::FixedSizeBinary(16) => Value::Uuid(uuid::Uuid::from_bytes(wide(array, pos)?)),
                _ => Value::Uuid(uuid::Uuid::parse_str(text(array, pos)?).ok()?),
            },
            NativeType::VarInt => Value::Unsupported {
                ty: self,
                text: match text(array, pos) {
                    Some(text) => text.to_owned(),
                    None => varint_text(bytes(array, pos)?)?,
                },
            },
            NativeType::Date => Value::Date(date(array, pos)?),
            NativeType::Time => Value::Time(time(array, pos)?),
            NativeType::TimeTz => Value::Time(time_tz(array, pos)?),
            NativeType::Timestamp
            | NativeType::TimestampS
            | NativeType::TimestampMs
            | NativeType::TimestampNs
            | NativeType::TimestampTz => Value::Timestamp(timestamp(array, pos)?),
            NativeType::Interval => Value::Interval(interval(array, pos)?),
            ty if ty.is_composite() => Value::Unsupported {
                ty,
                text: array_value_to_string(array, pos).ok()?,
            },
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const EXTENSION_NAME: &str = "ARROW:extension:name";
const EXTENSION_METADATA: &str = "ARROW:extension:metadata";

#[derive(Deserialize)]
struct OpaqueType {
    type_name: String,
}

/// Reads the engine type named by a field's Arrow extension annotation, either
/// `duckdb.<type>` or an `arrow.opaque` type carrying the name in its metadata.
fn extension_type(metadata: &HashMap<String, String>) -> Option<NativeType> {
    let name = metadata.get(EXTENSION_NAME)?;
    let type_name = match name.as_str() {
        "arrow.uuid" => return Some(NativeType::Uuid),
        "arrow.opaque" => {
            let raw = metadata.get(EXTENSION_METADATA)?;
            serde_json::from_str::<OpaqueType>(raw).ok()?.type_name
        }
        other => other.strip_prefix("duckdb.")?.to_owned(),
    };
    let ty = match type_name.to_ascii_lowercase().as_str() {
        "uuid" => NativeType::Uuid,
        "hugeint" => NativeType::HugeInt,
        "uhugeint" => NativeType::UHugeInt,
        "time_tz" => NativeType::TimeTz,
        "bit" => NativeType::Bit,
        "varint" => NativeType::VarInt,
        _ => return None,
    };
    Some(ty)
}

/// The 16 raw bytes of a 128-bit cell.
fn wide(array: &dyn Array, pos: usize) -> Option<[u8; 16]> {
    array.as_fixed_size_binary_opt()?.value(pos).try_into().ok()
}

/// Renders the engine's variable-length integer encoding as decimal text.
///
/// The encoding is a 3-byte header whose top bit is set for non-negative
/// values, followed by the big-endian magnitude. Negative values have every
/// byte inverted.
fn varint_text(raw: &[u8]) -> Option<String> {
    if raw.len() < 3 {
        return None;
    }
    let negative = raw[0] & 0x80 == 0;
    let mut magnitude: Vec<u8> = raw[3..]
        .iter()
        .map(|&b| if negative { !b } else { b })
        .collect();

    let mut digits = Vec::new();
    while magnitude.iter().any(|&b| b != 0) {
        let mut rem = 0u32;
        for byte in magnitude.iter_mut() {
            let cur = (rem << 8) | u32::from(*byte);
            *byte = (cur / 10) as u8;
            rem = cur % 10;
        }
        digits.push(b'0' + rem as u8);
    }
    if digits.is_empty() {
        digits.push(b'0');
    } else if negative {
        digits.push(b'-');
    }
    digits.reverse();
    String::from_utf8(digits).ok()
}

fn text(array: &dyn Array, pos: usize) -> Option<&str> {
    match array.data_type() {
        DataType::Utf8 => Some(array.as_string_opt::<i32>()?.value(pos)),
        DataType::LargeUtf8 => Some(array.as_string_opt::<i64>()?.value(pos)),
        DataType::Utf8View => Some(array.as_string_view_opt()?.value(pos)),
        _ => None,
    }
}

fn bytes(array: &dyn Array, pos: usize) -> Option<&[u8]> {
    match array.data_type() {
        DataType::Binary => Some(array.as_binary_opt::<i32>()?.value(pos)),
        DataType::LargeBinary => Some(array.as_binary_opt::<i64>()?.value(pos)),
        DataType::BinaryView => Some(array.as_binary_view_opt()?.value(pos)),
        DataType::FixedSizeBinary(_) => Some(array.as_fixed_size_binary_opt()?.value(pos)),
        _ => None,
    }
}

fn date(array: &dyn Array, pos: usize) -> Option<Date> {
    let days = match array.data_type() {
        DataType::Date32 => array.as_primitive_opt::<Date32Type>()?.value(pos),
        DataType::Date64 => {
            let millis = array.as_primitive_opt::<Date64Type>()?.value(pos);
            i32::try_from(millis.div_euclid(86_400_000)).ok()?
        }
        _ => return None,
    };
    Some(Date::from_days(days))
}

fn time(array: &dyn Array, pos: usize) -> Option<Time> {
    let micros = match array.data_type() {
        DataType::Time32(TimeUnit::Second) => {
            i64::from(array.as_primitive_opt::<Time32SecondType>()?.value(pos)) * 1_000_000
        }
        DataType::Time32(TimeUnit::Millisecond) => {
            i64::from(array.as_primitive_opt::<Time32MillisecondType>()?.value(pos)) * 1_000
        }
        DataType::Time64(TimeUnit::Microsecond) => {
            array.as_primitive_opt::<Time64MicrosecondType>()?.value(pos)
        }
        DataType::Time64(TimeUnit::Nanosecond) => {
            array.as_primitive_opt::<Time64NanosecondType>()?.value(pos) / 1_000
        }
        _ => return None,
    };
    Some(Time::from_micros(micros))
}

/// Local time of a `TIME WITH TIME ZONE` cell. Lossless exports carry the
/// engine's packed form: microseconds in the upper 40 bits, offset below.
fn time_tz(array: &dyn Array, pos: usize) -> Option<Time> {
    let bits = match array.data_type() {
        DataType::Int64 => array.as_primitive_opt::<Int64Type>()?.value(pos) as u64,
        DataType::UInt64 => array.as_primitive_opt::<UInt64Type>()?.value(pos),
        _ => return time(array, pos),
    };
    Some(Time::from_micros((bits >> 24) as i64))
}

fn timestamp(array: &dyn Array, pos: usize) -> Option<Timestamp> {
    let DataType::Timestamp(unit, _) = array.data_type() else {
        return None;
    };
    let micros = match unit {
        TimeUnit::Second => array
            .as_primitive_opt::<TimestampSecondType>()?
            .value(pos)
            .checked_mul(1_000_000)?,
        TimeUnit::Millisecond => array
            .as_primitive_opt::<TimestampMillisecondType>()?
            .value(pos)
            .checked_mul(1_000)?,
        TimeUnit::Microsecond => array.as_primitive_opt::<TimestampMicrosecondType>()?.value(pos),
        TimeUnit::Nanosecond => {
            array.as_primitive_opt::<TimestampNanosecondType>()?.value(pos) / 1_000
        }
    };
    Some(Timestamp::from_micros(micros))
}

fn interval(array: &dyn Array, pos: usize) -> Option<Interval> {
    let interval = match array.data_type() {
        DataType::Interval(IntervalUnit::MonthDayNano) => {
            let raw = array.as_primitive_opt::<IntervalMonthDayNanoType>()?.value(pos);
            let (months, days, nanos) = IntervalMonthDayNanoType::to_parts(raw);
            Interval::new(months, days, nanos / 1_000)
        }
        DataType::Interval(IntervalUnit::DayTime) => {
            let raw = array.as_primitive_opt::<IntervalDayTimeType>()?.value(pos);
            let (days, millis) = IntervalDayTimeType::to_parts(raw);
            Interval::new(0, days, i64::from(millis) * 1_000)
        }
        DataType::Interval(IntervalUnit::YearMonth) => {
            let raw = array.as_primitive_opt::<IntervalYearMonthType>()?.value(pos);
            Interval::new(IntervalYearMonthType::to_months(raw), 0, 0)
        }
        _ => return None,
    };
    Some(interval)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use duckdb::arrow::{
        array::{FixedSizeBinaryArray, Int32Array, ListArray, StringArray},
        datatypes::Int32Type,
    };

    use super::*;

    #[test]
    fn test_from_arrow() {
        assert_eq!(NativeType::from_arrow(&DataType::Int64), NativeType::BigInt);
        assert_eq!(NativeType::from_arrow(&DataType::Decimal128(38, 0)), NativeType::Decimal);
        assert_eq!(NativeType::from_arrow(&DataType::Decimal128(18, 3)), NativeType::Decimal);
        assert_eq!(
            NativeType::from_arrow(&DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from("UTC")))),
            NativeType::TimestampTz
        );
        assert_eq!(NativeType::from_arrow(&DataType::Float16), NativeType::Float);
        assert_eq!(NativeType::from_arrow(&DataType::Duration(TimeUnit::Second)), NativeType::Invalid);
    }

    fn annotated(ty: DataType, metadata: &[(&str, &str)]) -> Field {
        let metadata = metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Field::new("c", ty, true).with_metadata(metadata)
    }

    #[test]
    fn test_from_field_extension_types() {
        let wide = DataType::FixedSizeBinary(16);
        let cases = [
            (annotated(wide.clone(), &[]), NativeType::Uuid),
            (annotated(wide.clone(), &[(EXTENSION_NAME, "arrow.uuid")]), NativeType::Uuid),
            (annotated(wide.clone(), &[(EXTENSION_NAME, "duckdb.hugeint")]), NativeType::HugeInt),
            (annotated(wide.clone(), &[(EXTENSION_NAME, "duckdb.uhugeint")]), NativeType::UHugeInt),
            (
                annotated(
                    wide.clone(),
                    &[
                        (EXTENSION_NAME, "arrow.opaque"),
                        (EXTENSION_METADATA, r#"{"type_name":"uhugeint","vendor_name":"DuckDB"}"#),
                    ],
                ),
                NativeType::UHugeInt,
            ),
            (annotated(DataType::Binary, &[(EXTENSION_NAME, "duckdb.varint")]), NativeType::VarInt),
            (annotated(DataType::Int32, &[(EXTENSION_NAME, "other.thing")]), NativeType::Integer),
        ];
        for (field, expected) in cases {
            assert_eq!(NativeType::from_field(&field), expected, "{field:?}");
        }
    }

    #[test]
    fn test_decode_wide_integers() {
        let array = FixedSizeBinaryArray::try_from_iter(
            [(-5i128).to_le_bytes(), 7i128.to_le_bytes()].into_iter(),
        )
        .unwrap();
        assert_eq!(NativeType::HugeInt.decode(&array, 0), Value::HugeInt(-5));
        assert_eq!(NativeType::UHugeInt.decode(&array, 1), Value::UHugeInt(7));
        assert_eq!(
            NativeType::Uuid.decode(&array, 1),
            Value::Uuid(uuid::Uuid::from_bytes(7i128.to_le_bytes()))
        );
    }

    #[test]
    fn test_varint_text() {
        assert_eq!(varint_text(&[0x80, 0x00, 0x01, 0x05]).as_deref(), Some("5"));
        assert_eq!(varint_text(&[0x80, 0x00, 0x02, 0x01, 0x00]).as_deref(), Some("256"));
        assert_eq!(varint_text(&[0x7F, 0xFF, 0xFE, !0x05]).as_deref(), Some("-5"));
        assert_eq!(varint_text(&[0x80]), None);
    }

    #[test]
    fn test_decode_nulls_and_values() {
        let array = Int32Array::from(vec![Some(1), None, Some(3)]);
        let decoded: Vec<_> = (0..3).map(|i| NativeType::Integer.decode(&array, i)).collect();
        assert_eq!(decoded, vec![Value::Int(1), Value::Null, Value::Int(3)]);
    }

    #[test]
    fn test_decode_mismatched_tag_is_null() {
        let array = StringArray::from(vec!["x"]);
        assert_eq!(NativeType::Integer.decode(&array, 0), Value::Null);
        assert_eq!(NativeType::Invalid.decode(&array, 0), Value::Null);
    }

    #[test]
    fn test_decode_composite() {
        let array = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![Some(vec![
            Some(1),
            Some(2),
        ])]);
        let ty = NativeType::from_arrow(array.data_type());
        assert_eq!(ty, NativeType::List);
        assert_eq!(
            ty.decode(&array, 0),
            Value::Unsupported {
                ty: NativeType::List,
                text: "[1, 2]".into()
            }
        );
    }
}
