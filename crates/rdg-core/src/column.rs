//! # Columnar Tables
//!
//! Named, typed columns grouped into tables with a fixed row count.
//!
//! A partition keeps one table for node attributes and one for edge
//! attributes. Columns are the unit of persistence: each one is written to
//! its own file so a later load can fetch any subset.

use crate::RdgError;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// DATA TYPES
// =============================================================================

/// Physical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// `bool`
    Boolean,
    /// `i32`
    Int32,
    /// `i64`
    Int64,
    /// `u32`
    UInt32,
    /// `u64`
    UInt64,
    /// `f64`
    Float64,
    /// UTF-8 `String`
    Utf8,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float64 => "double",
            Self::Utf8 => "string",
        };
        f.write_str(name)
    }
}

/// Values of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    /// `bool` values.
    Boolean(Vec<bool>),
    /// `i32` values.
    Int32(Vec<i32>),
    /// `i64` values.
    Int64(Vec<i64>),
    /// `u32` values.
    UInt32(Vec<u32>),
    /// `u64` values.
    UInt64(Vec<u64>),
    /// `f64` values.
    Float64(Vec<f64>),
    /// String values.
    Utf8(Vec<String>),
}

impl ColumnData {
    /// Physical type of the values.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt32(_) => DataType::UInt32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Boolean(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::UInt64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Utf8(v) => v.len(),
        }
    }

    /// True if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// TYPED ACCESS
// =============================================================================

/// A Rust type that can be viewed in place inside a `ColumnData`.
///
/// Views never convert: a column is only visible as the exact type it was
/// written with.
pub trait ColumnValue: Sized + 'static {
    /// Physical type this Rust type maps to.
    const DATA_TYPE: DataType;

    /// Borrow the values if `data` has this type.
    fn values(data: &ColumnData) -> Option<&[Self]>;

    /// Mutably borrow the values if `data` has this type.
    fn values_mut(data: &mut ColumnData) -> Option<&mut [Self]>;

    /// Wrap owned values.
    fn into_column_data(values: Vec<Self>) -> ColumnData;
}

macro_rules! impl_column_value {
    ($ty:ty, $variant:ident) => {
        impl ColumnValue for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn values(data: &ColumnData) -> Option<&[Self]> {
                match data {
                    ColumnData::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn values_mut(data: &mut ColumnData) -> Option<&mut [Self]> {
                match data {
                    ColumnData::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn into_column_data(values: Vec<Self>) -> ColumnData {
                ColumnData::$variant(values)
            }
        }

        impl From<Vec<$ty>> for ColumnData {
            fn from(values: Vec<$ty>) -> Self {
                ColumnData::$variant(values)
            }
        }
    };
}

impl_column_value!(bool, Boolean);
impl_column_value!(i32, Int32);
impl_column_value!(i64, Int64);
impl_column_value!(u32, UInt32);
impl_column_value!(u64, UInt64);
impl_column_value!(f64, Float64);
impl_column_value!(String, Utf8);

// =============================================================================
// COLUMN
// =============================================================================

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    /// Create a column from a name and values.
    pub fn new(name: impl Into<String>, data: impl Into<ColumnData>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// The same values under another name.
    #[must_use]
    pub fn renamed(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: self.data,
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column values.
    #[must_use]
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Physical type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Typed view of the values.
    pub fn typed<T: ColumnValue>(&self) -> Result<&[T], RdgError> {
        T::values(&self.data).ok_or_else(|| self.type_mismatch::<T>())
    }

    /// Typed mutable view of the values. Values change in place; the row
    /// count cannot.
    pub fn typed_mut<T: ColumnValue>(&mut self) -> Result<&mut [T], RdgError> {
        let err = self.type_mismatch::<T>();
        T::values_mut(&mut self.data).ok_or(err)
    }

    fn type_mismatch<T: ColumnValue>(&self) -> RdgError {
        RdgError::TypeMismatch {
            name: self.name.clone(),
            expected: T::DATA_TYPE.to_string(),
            actual: self.data_type().to_string(),
        }
    }
}

// =============================================================================
// TABLE
// =============================================================================

/// An ordered collection of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, checking row counts and name uniqueness.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, RdgError> {
        let mut table = Self::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Row count (0 for a table without columns).
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Column count.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True if the table has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// All columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column at position `i`.
    #[must_use]
    pub fn column(&self, i: usize) -> Option<&Column> {
        self.columns.get(i)
    }

    /// Mutable column at position `i`.
    pub fn column_mut(&mut self, i: usize) -> Option<&mut Column> {
        self.columns.get_mut(i)
    }

    /// Position and column with the given name.
    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name() == name)
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Append one column.
    pub fn push_column(&mut self, column: Column) -> Result<(), RdgError> {
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(RdgError::InvalidArgument(format!(
                "column {} has {} rows, table has {}",
                column.name(),
                column.len(),
                self.num_rows()
            )));
        }
        if self.column_by_name(column.name()).is_some() {
            return Err(RdgError::InvalidArgument(format!(
                "duplicate column {}",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Append every column of `other`. Nothing is added on failure.
    pub fn add_columns(&mut self, other: Table) -> Result<(), RdgError> {
        let mut next = self.clone();
        for column in other.columns {
            next.push_column(column)?;
        }
        *self = next;
        Ok(())
    }

    /// Remove and return the column at position `i`.
    pub fn remove_column(&mut self, i: usize) -> Result<Column, RdgError> {
        if i >= self.columns.len() {
            return Err(RdgError::InvalidArgument(format!(
                "column index {} out of range ({} columns)",
                i,
                self.columns.len()
            )));
        }
        Ok(self.columns.remove(i))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::new("id", vec![1i64, 2]),
            Column::new("label", vec!["A".to_string(), "B".to_string()]),
        ])
        .expect("table")
    }

    #[test]
    fn typed_view_requires_exact_type() {
        let table = sample();
        let (_, id) = table.column_by_name("id").expect("id");
        assert_eq!(id.typed::<i64>().expect("i64"), &[1, 2]);

        let (_, label) = table.column_by_name("label").expect("label");
        let err = label.typed::<i64>().expect_err("string is not int64");
        match err {
            RdgError::TypeMismatch {
                name,
                expected,
                actual,
            } => {
                assert_eq!(name, "label");
                assert_eq!(expected, "int64");
                assert_eq!(actual, "string");
            }
            other => unreachable!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn row_count_mismatch_rejected() {
        let mut table = sample();
        let result = table.push_column(Column::new("short", vec![1u32]));
        assert!(result.is_err());
        assert_eq!(table.num_columns(), 2);
    }

    #[test]
    fn add_columns_is_all_or_nothing() {
        let mut table = sample();
        let other = Table::from_columns(vec![
            Column::new("weight", vec![0.5f64, 1.5]),
            Column::new("id", vec![9i64, 9]),
        ])
        .expect("other");
        assert!(table.add_columns(other).is_err());
        assert_eq!(table.column_names(), vec!["id", "label"]);
    }

    #[test]
    fn remove_column_shifts_order() {
        let mut table = sample();
        let removed = table.remove_column(0).expect("remove");
        assert_eq!(removed.name(), "id");
        assert_eq!(table.column_names(), vec!["label"]);
        assert!(table.remove_column(5).is_err());
    }

    #[test]
    fn typed_mut_writes_in_place() {
        let mut column = Column::new("rank", vec![0u64; 3]);
        column.typed_mut::<u64>().expect("u64")[1] = 42;
        assert_eq!(column.data(), &ColumnData::UInt64(vec![0, 42, 0]));
    }

    #[test]
    fn mutable_access_keeps_row_count() {
        let mut table = sample();
        let id = table.column_mut(0).expect("id");
        id.typed_mut::<i64>().expect("i64").fill(7);
        assert_eq!(id.len(), 2);
        table
            .push_column(Column::new("score", vec![0.5f64, 1.0]))
            .expect("rows still match");
        assert_eq!(table.num_rows(), 2);
    }
}
