//! Record and key codec.
//!
//! Converts rows of typed values to and from the byte strings stored in page
//! slots, driven by the column metadata the catalog provides.

mod codec;
mod column;
mod value;

pub use codec::{
    decode, decode_key_with_child, decode_prefix, encode, encode_into, encode_key_with_child,
    CodecError,
};
pub use column::{Column, ColumnType, TableSchema};
pub use value::{Key, Row, Value};
