//! Generic conversion between Rust values and cells.
//!
//! Encoding tries, in order: a direct scalar mapping (non-empty `u8`
//! sequences become blobs), unwrapping a single-value wrapper (newtypes,
//! `Some`, unit variants) and finally a JSON document stored as text.
//! Decoding mirrors the same chain.

use std::ops::Deref;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::{DbResult, Error},
    value::{ToValue, Value},
};

mod de;
pub use de::ValueDeserializer;

mod ser;
pub use ser::{Encoded, ValueSerializer};

/// Encodes `value` into a single cell.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> DbResult<Value> {
    match value.serialize(ValueSerializer)? {
        Encoded::Scalar(value) => Ok(value),
        Encoded::Composite => serde_json::to_string(value)
            .map(Value::Text)
            .map_err(|error| Error::Encode(error.to_string())),
    }
}

/// Decodes a cell into `T`.
pub fn decode<T: DeserializeOwned>(value: &Value) -> DbResult<T> {
    T::deserialize(ValueDeserializer::new(value))
}

/// An ordered set of bind parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binds {
    values: Vec<Value>,
}

impl Binds {
    pub fn new() -> Binds {
        Binds::default()
    }

    /// Appends a value through its direct conversion.
    pub fn push<T: ToValue + ?Sized>(&mut self, value: &T) -> &mut Binds {
        self.values.push(value.to_value());
        self
    }

    /// Appends a value through the generic codec.
    pub fn encode<T: Serialize + ?Sized>(&mut self, value: &T) -> DbResult<&mut Binds> {
        self.values.push(encode(value)?);
        Ok(self)
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }
}

impl Deref for Binds {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for Binds {
    fn from(values: Vec<Value>) -> Binds {
        Binds { values }
    }
}
