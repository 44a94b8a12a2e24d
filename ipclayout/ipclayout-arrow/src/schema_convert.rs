use std::collections::HashMap;

use arrow::datatypes::{DataType, Field, Schema};
use ipclayout_core::{self as ipc, FloatPrecision, IntType};

/// Converts a decoded IPC schema into an Arrow `Schema`.
///
/// Dictionary-encoded fields become `Dictionary(index, value)` columns;
/// custom metadata is carried over.
pub fn schema_to_arrow_schema(schema: &ipc::Schema) -> Schema {
    let fields: Vec<Field> = schema.iter().map(field_to_arrow_field).collect();
    let metadata: HashMap<String, String> = schema.metadata().iter().cloned().collect();
    Schema::new_with_metadata(fields, metadata)
}

fn field_to_arrow_field(f: &ipc::Field) -> Field {
    let value_type = value_datatype(&f.data_type);
    let data_type = match f.dictionary {
        Some(encoding) => DataType::Dictionary(
            Box::new(int_datatype(encoding.index_type)),
            Box::new(value_type),
        ),
        None => value_type,
    };
    Field::new(&f.name, data_type, f.nullable)
}

pub(crate) fn int_datatype(int: IntType) -> DataType {
    match (int.bit_width, int.signed) {
        (8, true) => DataType::Int8,
        (16, true) => DataType::Int16,
        (32, true) => DataType::Int32,
        (64, true) => DataType::Int64,
        (8, false) => DataType::UInt8,
        (16, false) => DataType::UInt16,
        (32, false) => DataType::UInt32,
        _ => DataType::UInt64,
    }
}

fn value_datatype(data_type: &ipc::DataType) -> DataType {
    match data_type {
        ipc::DataType::Int(int) => int_datatype(*int),
        ipc::DataType::Float(FloatPrecision::Single) => DataType::Float32,
        ipc::DataType::Float(FloatPrecision::Double) => DataType::Float64,
        ipc::DataType::Bool => DataType::Boolean,
        ipc::DataType::Utf8 => DataType::Utf8,
        ipc::DataType::Binary => DataType::Binary,
    }
}
