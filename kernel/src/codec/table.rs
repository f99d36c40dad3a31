// Tables
//
// Named-column, row-oriented text tables with per-column logical types.
// Cells are always stored as text; the logical type only drives the
// best-effort typed view.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Bool,
    Timestamp,
}

impl ColumnType {
    /// Descriptor string written into `_coltypes`.
    pub fn descriptor(&self) -> &'static str {
        match self {
            ColumnType::Text => "str",
            ColumnType::Integer => "int64",
            ColumnType::Float => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Timestamp => "datetime",
        }
    }

    /// Parse a descriptor, including the numpy-style spellings found in
    /// older files.
    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        let d = descriptor.trim();
        let ty = match d {
            "str" | "string" | "object" | "O" | "|O" => ColumnType::Text,
            "int64" | "int32" | "int" | "i64" | "<i8" | "i8" | "<i4" | "i4" => {
                ColumnType::Integer
            }
            "float64" | "float32" | "float" | "f64" | "<f8" | "f8" | "<f4" | "f4" => {
                ColumnType::Float
            }
            "bool" | "|b1" | "b1" | "?" => ColumnType::Bool,
            "datetime" | "timestamp" | "<M8[ns]" | "M8[ns]" | "datetime64[ns]" => {
                ColumnType::Timestamp
            }
            _ if d.starts_with("<U") || d.starts_with("|S") => ColumnType::Text,
            _ => return None,
        };
        Some(ty)
    }

    fn coerce(&self, raw: &str) -> Option<Value> {
        let value = match self {
            ColumnType::Text => Value::Text(raw.to_string()),
            ColumnType::Integer => Value::Integer(raw.trim().parse().ok()?),
            ColumnType::Float => Value::Float(raw.trim().parse().ok()?),
            ColumnType::Bool => match raw.trim() {
                "true" | "True" | "1" => Value::Bool(true),
                "false" | "False" | "0" => Value::Bool(false),
                _ => return None,
            },
            ColumnType::Timestamp => Value::Timestamp(parse_timestamp(raw.trim())?),
        };
        Some(value)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_descriptor(s).ok_or_else(|| format!("unknown column type `{s}`"))
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// A coerced cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(NaiveDateTime),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("{names} column names for {types} column types")]
    ArityMismatch { names: usize, types: usize },

    #[error("duplicate column name `{0}`")]
    DuplicateColumn(String),

    #[error("row has {actual} values, table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot coerce `{value}` in column `{column}` (row {row}) to {ty}")]
pub struct CoercionError {
    pub column: String,
    pub row: usize,
    pub value: String,
    pub ty: ColumnType,
}

/// Raw text view of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table.
    pub fn new(columns: Vec<String>, types: Vec<ColumnType>) -> Result<Self, TableError> {
        if columns.len() != types.len() {
            return Err(TableError::ArityMismatch {
                names: columns.len(),
                types: types.len(),
            });
        }
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self {
            columns,
            types,
            rows: Vec::new(),
        })
    }

    /// Create an empty table where every column is text.
    pub fn text(columns: Vec<String>) -> Result<Self, TableError> {
        let types = vec![ColumnType::Text; columns.len()];
        Self::new(columns, types)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn types(&self) -> &[ColumnType] {
        &self.types
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }

    /// Overwrite the cell at (`row`, `column`). Returns false when out of range.
    pub fn set_cell(&mut self, row: usize, column: usize, value: impl Into<String>) -> bool {
        match self.rows.get_mut(row).and_then(|r| r.get_mut(column)) {
            Some(cell) => {
                *cell = value.into();
                true
            }
            None => false,
        }
    }

    /// Drop the logical types, keeping every column as text.
    pub fn into_text(mut self) -> Self {
        self.types = vec![ColumnType::Text; self.columns.len()];
        self
    }

    pub(crate) fn with_types(mut self, types: Vec<ColumnType>) -> Result<Self, TableError> {
        if types.len() != self.columns.len() {
            return Err(TableError::ArityMismatch {
                names: self.columns.len(),
                types: types.len(),
            });
        }
        self.types = types;
        Ok(self)
    }

    /// Best-effort typed view. All-or-nothing: the first bad cell fails
    /// the whole conversion.
    pub fn coerce(&self) -> Result<TypedTable, CoercionError> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for (r, row) in self.rows.iter().enumerate() {
            let mut values = Vec::with_capacity(row.len());
            for (c, raw) in row.iter().enumerate() {
                let ty = self.types[c];
                let value = ty.coerce(raw).ok_or_else(|| CoercionError {
                    column: self.columns[c].clone(),
                    row: r,
                    value: raw.clone(),
                    ty,
                })?;
                values.push(value);
            }
            rows.push(values);
        }
        Ok(TypedTable {
            columns: self.columns.clone(),
            types: self.types.clone(),
            rows,
        })
    }
}

/// Typed view of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedTable {
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<Value>>,
}
