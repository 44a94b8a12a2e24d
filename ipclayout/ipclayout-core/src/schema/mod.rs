//! Decoded schema representation.

mod format;
mod types;

pub use format::format_schema;
pub use types::{
    DataType, DictionaryEncoding, Endianness, Field, FloatPrecision, IntType, Schema, TypeTag,
};
