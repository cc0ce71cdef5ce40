use std::{collections::HashMap, fmt, sync::Arc};

use serde::{
    de::{value::MapDeserializer, DeserializeOwned},
    ser::SerializeMap,
    Serialize, Serializer,
};

use crate::{
    codec::{self, ValueDeserializer},
    error::{DbResult, Error},
    value::{FromValue, Value},
};

/// Name to offset lookup shared by every row of one result.
#[derive(Debug, Default)]
pub struct ColumnIndex {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Builds the index. When a name repeats, lookups resolve to its first
    /// occurrence.
    pub fn new(names: Vec<String>) -> ColumnIndex {
        let mut lookup = HashMap::with_capacity(names.len());
        for (offset, name) in names.iter().enumerate() {
            lookup.entry(name.clone()).or_insert(offset);
        }
        ColumnIndex { names, lookup }
    }

    pub fn offset(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A named cell of a [`Row`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column<'a> {
    pub name: &'a str,
    pub value: &'a Value,
}

/// One result row. Rows own their values and never borrow engine memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnIndex>,
    values: Vec<Value>,
}

impl PartialEq for ColumnIndex {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Row {
    pub(crate) fn new(columns: Arc<ColumnIndex>, values: Vec<Value>) -> Row {
        debug_assert_eq!(columns.len(), values.len());
        Row { columns, values }
    }

    /// Returns the value of the named column (case-sensitive).
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns.offset(name).and_then(|i| self.values.get(i))
    }

    /// Reads the named column through its direct conversion.
    pub fn get<T: FromValue>(&self, name: &str) -> DbResult<T> {
        let value = self
            .column(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_owned()))?;
        T::from_value(value)
    }

    /// Decodes the named column with the generic codec.
    pub fn get_decoded<T: DeserializeOwned>(&self, name: &str) -> DbResult<T> {
        let value = self
            .column(name)
            .ok_or_else(|| Error::UnknownColumn(name.to_owned()))?;
        codec::decode(value)
    }

    /// Decodes the whole row as a map of column names to cells, e.g. into a
    /// struct with matching field names.
    pub fn decode<T: DeserializeOwned>(&self) -> DbResult<T> {
        let entries = self
            .columns()
            .map(|column| (column.name, ValueDeserializer::new(column.value)));
        T::deserialize(MapDeserializer::<_, Error>::new(entries))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    pub fn columns(&self) -> impl Iterator<Item = Column<'_>> {
        self.columns
            .names()
            .iter()
            .zip(&self.values)
            .map(|(name, value)| Column { name, value })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, column) in self.columns().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", column.name, column.value)?;
        }
        f.write_str("]")
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for column in self.columns() {
            map.serialize_entry(column.name, column.value)?;
        }
        map.end()
    }
}
