//! JSON rendering of decoded schemas and bound layouts.
//!
//! Fields follow the Arrow integration-test JSON layout (`name`, `nullable`,
//! `type`, `children`, `dictionary`). Dictionaries are rendered as
//! single-column batches whose values sit under `DATA`.

use ipclayout_core::{
    BufferDescriptor, DataType, DictionaryRegistry, FieldLayout, FloatPrecision, IntType,
    RecordBatchLayout, Schema,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct SchemaReport<'a> {
    schema: SchemaJson<'a>,
    dictionaries: Vec<DictionaryJson<'a>>,
}

#[derive(Serialize)]
struct SchemaJson<'a> {
    fields: Vec<FieldJson<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    metadata: Vec<KeyValueJson<'a>>,
}

#[derive(Serialize)]
struct KeyValueJson<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct FieldJson<'a> {
    name: &'a str,
    nullable: bool,
    #[serde(rename = "type")]
    data_type: TypeJson,
    children: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dictionary: Option<DictionaryEncodingJson>,
}

#[derive(Serialize)]
#[serde(tag = "name", rename_all = "lowercase")]
enum TypeJson {
    Int {
        #[serde(rename = "bitWidth")]
        bit_width: u8,
        #[serde(rename = "isSigned")]
        is_signed: bool,
    },
    #[serde(rename = "floatingpoint")]
    FloatingPoint { precision: &'static str },
    Bool {},
    Utf8 {},
    Binary {},
}

impl From<IntType> for TypeJson {
    fn from(int: IntType) -> Self {
        TypeJson::Int {
            bit_width: int.bit_width,
            is_signed: int.signed,
        }
    }
}

impl From<DataType> for TypeJson {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Int(int) => int.into(),
            DataType::Float(FloatPrecision::Single) => TypeJson::FloatingPoint {
                precision: "SINGLE",
            },
            DataType::Float(FloatPrecision::Double) => TypeJson::FloatingPoint {
                precision: "DOUBLE",
            },
            DataType::Bool => TypeJson::Bool {},
            DataType::Utf8 => TypeJson::Utf8 {},
            DataType::Binary => TypeJson::Binary {},
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DictionaryEncodingJson {
    id: i64,
    index_type: TypeJson,
    is_ordered: bool,
}

#[derive(Serialize)]
struct DictionaryJson<'a> {
    id: i64,
    data: DictionaryBatchJson<'a>,
}

#[derive(Serialize)]
struct DictionaryBatchJson<'a> {
    count: usize,
    columns: [DictionaryColumnJson<'a>; 1],
}

#[derive(Serialize)]
struct DictionaryColumnJson<'a> {
    name: String,
    count: usize,
    #[serde(rename = "VALIDITY")]
    validity: Vec<u8>,
    #[serde(rename = "DATA")]
    data: &'a [String],
}

#[derive(Serialize)]
struct FieldLayoutJson<'a> {
    name: &'a str,
    dtype: TagJson,
    length: usize,
    null_count: usize,
    data_buffer: BufferJson,
    #[serde(skip_serializing_if = "Option::is_none")]
    validity_buffer: Option<BufferJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offsets_buffer: Option<BufferJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dictionary_id: Option<i64>,
}

#[derive(Serialize)]
struct TagJson {
    name: &'static str,
}

#[derive(Serialize)]
struct BufferJson {
    offset: usize,
    length: usize,
}

impl From<BufferDescriptor> for BufferJson {
    fn from(buffer: BufferDescriptor) -> Self {
        Self {
            offset: buffer.offset,
            length: buffer.length,
        }
    }
}

impl<'a> From<&'a FieldLayout> for FieldLayoutJson<'a> {
    fn from(field: &'a FieldLayout) -> Self {
        Self {
            name: &field.name,
            dtype: TagJson {
                name: field.type_tag.name(),
            },
            length: field.row_count,
            null_count: field.null_count,
            data_buffer: field.data.into(),
            validity_buffer: field.validity.map(Into::into),
            offsets_buffer: field.offsets.map(Into::into),
            dictionary_id: field.dictionary_id,
        }
    }
}

/// Render `schema` and its dictionaries as
/// `{"schema": {"fields": [...]}, "dictionaries": [...]}`.
pub fn schema_report(
    schema: &Schema,
    dictionaries: &DictionaryRegistry,
) -> serde_json::Result<Value> {
    let fields = schema
        .iter()
        .map(|field| FieldJson {
            name: &field.name,
            nullable: field.nullable,
            data_type: field.data_type.into(),
            children: Vec::new(),
            dictionary: field.dictionary.map(|encoding| DictionaryEncodingJson {
                id: encoding.id,
                index_type: encoding.index_type.into(),
                is_ordered: encoding.ordered,
            }),
        })
        .collect();
    let metadata = schema
        .metadata()
        .iter()
        .map(|(key, value)| KeyValueJson { key, value })
        .collect();
    let dictionaries = dictionaries
        .iter()
        .map(|dictionary| DictionaryJson {
            id: dictionary.id,
            data: DictionaryBatchJson {
                count: dictionary.len(),
                columns: [DictionaryColumnJson {
                    name: format!("DICT{}", dictionary.id),
                    count: dictionary.len(),
                    validity: vec![1; dictionary.len()],
                    data: dictionary.values(),
                }],
            },
        })
        .collect();

    let report = SchemaReport {
        schema: SchemaJson { fields, metadata },
        dictionaries,
    };
    serde_json::to_value(report)
}

/// Render `layout` as one object per field, in schema order.
pub fn layout_report(layout: &RecordBatchLayout) -> serde_json::Result<Value> {
    let fields: Vec<FieldLayoutJson<'_>> = layout.fields.iter().map(Into::into).collect();
    serde_json::to_value(fields)
}
