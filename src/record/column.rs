//! Column definitions and table schemas consumed from the catalog.

use std::fmt;
use std::str::FromStr;

use super::codec::CodecError;
use super::value::{Key, Row, Value};

/// Closed set of supported column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 32-bit signed integer.
    Int,
    /// Variable-length string of at most `n` bytes.
    Varchar(u16),
    /// String of at most `n` bytes, stored without padding.
    Char(u16),
    /// IEEE-754 double.
    Decimal,
}

impl ColumnType {
    /// Declared length: fixed width for numbers, maximum bytes for strings.
    pub fn length(&self) -> u16 {
        match self {
            ColumnType::Int => 4,
            ColumnType::Varchar(n) | ColumnType::Char(n) => *n,
            ColumnType::Decimal => 8,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Varchar(n) => write!(f, "VARCHAR({n})"),
            ColumnType::Char(n) => write!(f, "CHAR({n})"),
            ColumnType::Decimal => write!(f, "DECIMAL"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = CodecError;

    /// Parse a catalog type name: `INT`, `INTEGER`, `VARCHAR(n)`, `CHAR(n)`,
    /// `DECIMAL` or `DECIMAL(p,s)`. Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let unsupported = || CodecError::UnsupportedType(s.trim().to_string());

        let (name, arg) = match normalized.split_once('(') {
            Some((name, rest)) => {
                let arg = rest.strip_suffix(')').ok_or_else(unsupported)?;
                (name.trim(), Some(arg.trim()))
            }
            None => (normalized.as_str(), None),
        };

        match (name, arg) {
            ("INT" | "INTEGER", None) => Ok(ColumnType::Int),
            ("DECIMAL", None) => Ok(ColumnType::Decimal),
            ("DECIMAL", Some(_)) => Ok(ColumnType::Decimal),
            ("VARCHAR", Some(n)) => n.parse().map(ColumnType::Varchar).map_err(|_| unsupported()),
            ("CHAR", Some(n)) => n.parse().map(ColumnType::Char).map_err(|_| unsupported()),
            _ => Err(unsupported()),
        }
    }
}

/// One column of a table, as described by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Digits after the decimal point (DECIMAL only, informational).
    pub scale: u8,
    /// Ordinal position in the row, assigned by [`TableSchema::new`].
    pub position: u16,
    pub is_primary_key: bool,
    pub is_nullable: bool,
    pub default_value: Option<Value>,
}

impl Column {
    /// A non-nullable, non-key column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            scale: 0,
            position: 0,
            is_primary_key: false,
            is_nullable: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_scale(mut self, scale: u8) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn length(&self) -> u16 {
        self.column_type.length()
    }
}

/// Columns of one table in ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    columns: Vec<Column>,
}

impl TableSchema {
    /// Build a schema; column positions follow the given order.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(position, mut column)| {
                column.position = position as u16;
                column
            })
            .collect();
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Key columns in ordinal order.
    pub fn key_columns(&self) -> Vec<Column> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .cloned()
            .collect()
    }

    /// Project a full row onto its primary-key columns.
    ///
    /// # Errors
    /// `CodecError::ColumnCountMismatch` if the row is not one value per column.
    pub fn key_of(&self, row: &[Value]) -> Result<Key, CodecError> {
        if row.len() != self.columns.len() {
            return Err(CodecError::ColumnCountMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        Ok(Key(self
            .columns
            .iter()
            .zip(row)
            .filter(|(column, _)| column.is_primary_key)
            .map(|(_, value)| value.clone())
            .collect()))
    }

    /// Assemble a full row from named values, filling the rest from column
    /// defaults (or NULL for nullable columns).
    ///
    /// # Errors
    /// `TypeMismatch` for an unknown column name, `NullViolation` when a
    /// required column has neither a value nor a default.
    pub fn build_row(&self, values: &[(&str, Value)]) -> Result<Row, CodecError> {
        let mut row: Vec<Option<Value>> = vec![None; self.columns.len()];
        for (name, value) in values {
            let column = self.column(name).ok_or_else(|| CodecError::TypeMismatch {
                column: (*name).to_string(),
                expected: format!("a column of table '{}'", self.name),
            })?;
            row[column.position as usize] = Some(value.clone());
        }

        self.columns
            .iter()
            .zip(row)
            .map(|(column, value)| match value {
                Some(value) => Ok(value),
                None => match &column.default_value {
                    Some(default) => Ok(default.clone()),
                    None if column.is_nullable => Ok(Value::Null),
                    None => Err(CodecError::NullViolation(column.name.clone())),
                },
            })
            .collect()
    }
}
