//! Row-to-document conversion.

use crate::value::{ColumnDescriptor, RawValue};

/// An ordered, schema-less record built from one source row.
///
/// Entries follow the column order of the query that produced the row. A
/// NULL column is an explicit `(name, RawValue::Null)` entry, never a
/// missing key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    fields: Vec<(String, RawValue)>,
}

impl Document {
    /// Zips column names with row values by position.
    ///
    /// Duplicate column names are kept as separate entries.
    ///
    /// # Panics
    ///
    /// Panics if `values` and `columns` differ in length. A row always has
    /// exactly one value per result column, so a mismatch is a bug in the
    /// row source.
    #[must_use]
    pub fn build(columns: &[ColumnDescriptor], values: Vec<RawValue>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "row has {} values for {} columns",
            values.len(),
            columns.len()
        );

        let fields = columns
            .iter()
            .map(|column| column.name.clone())
            .zip(values)
            .collect();

        Self { fields }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keys in column order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    /// Iterates over `(key, value)` entries in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Looks up a value by key. With duplicate keys the last entry wins.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// Consumes the document, returning its entries.
    #[must_use]
    pub fn into_fields(self) -> Vec<(String, RawValue)> {
        self.fields
    }
}

impl IntoIterator for Document {
    type Item = (String, RawValue);
    type IntoIter = std::vec::IntoIter<(String, RawValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}
