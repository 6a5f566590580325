//! Row and key serialization.
//!
//! Each column is written in schema order as a presence byte (`0` = NULL,
//! `1` = present) followed, when present, by the value:
//!
//! | type              | encoding                               |
//! |-------------------|----------------------------------------|
//! | `INT`             | 4 bytes, signed, little-endian         |
//! | `VARCHAR`/`CHAR`  | u16 LE byte length, then UTF-8 bytes   |
//! | `DECIMAL`         | 8 bytes, IEEE-754 double, little-endian|
//!
//! Internal-node entries append a u32 LE child page number to the key.

use thiserror::Error;

use crate::common::PageNo;

use super::column::{Column, ColumnType};
use super::value::Value;

const NULL_MARKER: u8 = 0;
const PRESENT_MARKER: u8 = 1;

/// Errors raised while encoding or decoding rows and keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unsupported column type '{0}'")]
    UnsupportedType(String),

    #[error("truncated record: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("column '{column}' expects {expected}")]
    TypeMismatch { column: String, expected: String },

    #[error("value of {actual} bytes exceeds column '{column}' limit of {max}")]
    ValueTooLong {
        column: String,
        max: usize,
        actual: usize,
    },

    #[error("column '{0}' does not accept NULL")]
    NullViolation(String),

    #[error("column '{0}' holds invalid UTF-8")]
    InvalidUtf8(String),

    #[error("invalid presence byte {0:#04x}")]
    InvalidPresence(u8),

    #[error("expected {expected} values, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("{0} trailing bytes after the last column")]
    TrailingBytes(usize),
}

/// Encode `values` against `columns`.
pub fn encode(values: &[Value], columns: &[Column]) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(encoded_size_hint(columns));
    encode_into(&mut buf, values, columns)?;
    Ok(buf)
}

/// Append the encoding of `values` to `buf`.
///
/// On error `buf` may hold a partial encoding.
pub fn encode_into(buf: &mut Vec<u8>, values: &[Value], columns: &[Column]) -> Result<(), CodecError> {
    if values.len() != columns.len() {
        return Err(CodecError::ColumnCountMismatch {
            expected: columns.len(),
            actual: values.len(),
        });
    }

    for (value, column) in values.iter().zip(columns) {
        encode_value(buf, value, column)?;
    }
    Ok(())
}

/// Decode a record that holds exactly one value per column.
pub fn decode(bytes: &[u8], columns: &[Column]) -> Result<Vec<Value>, CodecError> {
    let (values, consumed) = decode_prefix(bytes, columns)?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - consumed));
    }
    Ok(values)
}

/// Decode one value per column from the front of `bytes`.
///
/// Returns the values and the number of bytes consumed, so a caller can
/// decode a key and then continue with whatever follows it.
pub fn decode_prefix(bytes: &[u8], columns: &[Column]) -> Result<(Vec<Value>, usize), CodecError> {
    let mut reader = Reader { bytes, pos: 0 };
    let values = columns
        .iter()
        .map(|column| reader.value(column))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((values, reader.pos))
}

/// Encode an internal-node entry: the key followed by a u32 LE child page.
pub fn encode_key_with_child(
    key: &[Value],
    key_columns: &[Column],
    child: PageNo,
) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(encoded_size_hint(key_columns) + 4);
    encode_into(&mut buf, key, key_columns)?;
    buf.extend_from_slice(&child.0.to_le_bytes());
    Ok(buf)
}

/// Inverse of [`encode_key_with_child`].
pub fn decode_key_with_child(
    bytes: &[u8],
    key_columns: &[Column],
) -> Result<(Vec<Value>, PageNo), CodecError> {
    let (key, consumed) = decode_prefix(bytes, key_columns)?;
    let rest = &bytes[consumed..];
    if rest.len() < 4 {
        return Err(CodecError::Truncated {
            needed: 4,
            available: rest.len(),
        });
    }
    if rest.len() > 4 {
        return Err(CodecError::TrailingBytes(rest.len() - 4));
    }
    let child = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
    Ok((key, PageNo::new(child)))
}

fn encoded_size_hint(columns: &[Column]) -> usize {
    columns
        .iter()
        .map(|c| match c.column_type {
            ColumnType::Int => 5,
            ColumnType::Decimal => 9,
            ColumnType::Varchar(_) | ColumnType::Char(_) => 3 + 8,
        })
        .sum()
}

fn encode_value(buf: &mut Vec<u8>, value: &Value, column: &Column) -> Result<(), CodecError> {
    let mismatch = || CodecError::TypeMismatch {
        column: column.name.clone(),
        expected: column.column_type.to_string(),
    };

    match (value, column.column_type) {
        (Value::Null, _) => {
            if !column.is_nullable {
                return Err(CodecError::NullViolation(column.name.clone()));
            }
            buf.push(NULL_MARKER);
        }
        (Value::Int(v), ColumnType::Int) => {
            buf.push(PRESENT_MARKER);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        (Value::Decimal(v), ColumnType::Decimal) => {
            buf.push(PRESENT_MARKER);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        (Value::Str(s), ColumnType::Varchar(max) | ColumnType::Char(max)) => {
            if s.len() > max as usize {
                return Err(CodecError::ValueTooLong {
                    column: column.name.clone(),
                    max: max as usize,
                    actual: s.len(),
                });
            }
            buf.push(PRESENT_MARKER);
            // max is a u16, so the length fits
            buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let available = self.bytes.len() - self.pos;
        if available < n {
            return Err(CodecError::Truncated {
                needed: n,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn value(&mut self, column: &Column) -> Result<Value, CodecError> {
        match self.take(1)?[0] {
            NULL_MARKER => return Ok(Value::Null),
            PRESENT_MARKER => {}
            other => return Err(CodecError::InvalidPresence(other)),
        }

        Ok(match column.column_type {
            ColumnType::Int => Value::Int(i32::from_le_bytes(self.array()?)),
            ColumnType::Decimal => Value::Decimal(f64::from_le_bytes(self.array()?)),
            ColumnType::Varchar(_) | ColumnType::Char(_) => {
                let len = u16::from_le_bytes(self.array()?) as usize;
                let raw = self.take(len)?;
                let s = std::str::from_utf8(raw)
                    .map_err(|_| CodecError::InvalidUtf8(column.name.clone()))?;
                Value::Str(s.to_string())
            }
        })
    }
}
