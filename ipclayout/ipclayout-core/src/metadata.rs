//! Metadata decoding: schema message plus any dictionary batches bundled
//! with it.

use tracing::{debug, instrument};

use crate::{
    dictionary::{DictionaryRegistry, read_dictionary_batch},
    error::{IpcError, Result},
    fbs::{self, Buffer, TYPE_BINARY, TYPE_BOOL, TYPE_FLOATING_POINT, TYPE_INT, TYPE_UTF8},
    message::{MessageKind, MessageReader, MetadataVersion},
    options::ParserOptions,
    schema::{DataType, DictionaryEncoding, Endianness, Field, FloatPrecision, IntType, Schema},
};

/// Names of the `Type` union members, indexed by union tag.
const TYPE_NAMES: [&str; 27] = [
    "NONE",
    "Null",
    "Int",
    "FloatingPoint",
    "Binary",
    "Utf8",
    "Bool",
    "Decimal",
    "Date",
    "Time",
    "Timestamp",
    "Interval",
    "List",
    "Struct",
    "Union",
    "FixedSizeBinary",
    "FixedSizeList",
    "Map",
    "Duration",
    "LargeBinary",
    "LargeUtf8",
    "LargeList",
    "RunEndEncoded",
    "BinaryView",
    "Utf8View",
    "ListView",
    "LargeListView",
];

/// Output of [`decode_schema`].
#[derive(Debug, Clone)]
pub struct DecodedSchema {
    pub schema: Schema,
    pub dictionaries: DictionaryRegistry,
}

/// Decode a schema buffer with default options.
pub fn decode_schema(bytes: &[u8]) -> Result<DecodedSchema> {
    decode_schema_with(bytes, &ParserOptions::default())
}

/// Decode the schema message at the start of `bytes` and register every
/// dictionary batch that follows it.
#[instrument(level = "debug", skip_all, fields(len = bytes.len()))]
pub fn decode_schema_with(bytes: &[u8], options: &ParserOptions) -> Result<DecodedSchema> {
    let mut reader = MessageReader::new(bytes, options);
    let message = reader
        .next_message()?
        .ok_or_else(|| IpcError::malformed("schema buffer contains no message"))?;
    if message.kind != MessageKind::Schema {
        return Err(IpcError::malformed(format!(
            "schema buffer starts with a {} message",
            message.kind
        )));
    }
    let header = message
        .view::<Buffer>()?
        .header_as_schema()
        .ok_or_else(|| IpcError::malformed("schema message has no header table"))?;
    let schema = parse_schema(header, message.version)?;
    debug!(fields = schema.len(), version = %schema.version(), "decoded schema");

    let mut dictionaries = DictionaryRegistry::new();
    while let Some(message) = reader.next_message()? {
        if message.kind != MessageKind::DictionaryBatch {
            return Err(IpcError::malformed(format!(
                "unexpected {} message at offset {} of the schema buffer",
                message.kind, message.frame.offset
            )));
        }
        dictionaries.register(read_dictionary_batch(&schema, bytes, &message)?)?;
    }

    Ok(DecodedSchema {
        schema,
        dictionaries,
    })
}

fn parse_schema(table: fbs::Schema<'_>, version: MetadataVersion) -> Result<Schema> {
    let endianness = match table.endianness() {
        0 => Endianness::Little,
        1 => Endianness::Big,
        other => return Err(IpcError::malformed(format!("unknown endianness {other}"))),
    };
    if endianness == Endianness::Big {
        return Err(IpcError::UnsupportedFeature(
            "big-endian schemas are not supported".to_string(),
        ));
    }

    let fields = match table.fields() {
        Some(vector) => vector
            .iter()
            .enumerate()
            .map(|(index, field)| parse_field(field, index))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let metadata: Vec<(String, String)> = table
        .custom_metadata()
        .map(|vector| {
            vector
                .iter()
                .map(|entry| {
                    let key = entry.key().unwrap_or_default();
                    let value = entry.value().unwrap_or_default();
                    (key.to_string(), value.to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Schema::new(fields)
        .with_metadata(metadata)
        .with_version(version))
}

fn parse_field(table: fbs::Field<'_>, index: usize) -> Result<Field> {
    let name = table.name().unwrap_or_default().to_string();
    let nullable = table.nullable();

    if table.children().is_some_and(|children| !children.is_empty()) {
        return Err(IpcError::UnsupportedType(format!(
            "field {index} '{name}' has child fields; nested types are not supported"
        )));
    }

    let data_type = parse_type(&table, &name)?;
    let mut field = Field::new(name, data_type, nullable);

    if let Some(encoding) = table.dictionary() {
        let index_type = match encoding.index_type() {
            Some(int) => parse_int(int, &field.name)?,
            None => IntType::INT32,
        };
        field = field.with_dictionary(DictionaryEncoding {
            id: encoding.id(),
            index_type,
            ordered: encoding.is_ordered(),
        });
    }
    Ok(field)
}

fn parse_type(table: &fbs::Field<'_>, name: &str) -> Result<DataType> {
    let missing = |what: &str| {
        IpcError::malformed(format!("field '{name}' is missing its {what} type table"))
    };
    match table.type_type() {
        TYPE_INT => {
            let int = table.type_as_int().ok_or_else(|| missing("Int"))?;
            Ok(DataType::Int(parse_int(int, name)?))
        }
        TYPE_FLOATING_POINT => {
            let float = table
                .type_as_floating_point()
                .ok_or_else(|| missing("FloatingPoint"))?;
            match float.precision() {
                0 => Err(IpcError::UnsupportedType(format!(
                    "field '{name}' uses half precision floats"
                ))),
                1 => Ok(DataType::Float(FloatPrecision::Single)),
                2 => Ok(DataType::Float(FloatPrecision::Double)),
                other => Err(IpcError::malformed(format!(
                    "field '{name}' has unknown float precision {other}"
                ))),
            }
        }
        TYPE_BINARY => Ok(DataType::Binary),
        TYPE_UTF8 => Ok(DataType::Utf8),
        TYPE_BOOL => Ok(DataType::Bool),
        0 => Err(IpcError::malformed(format!("field '{name}' has no type"))),
        other => {
            let type_name = TYPE_NAMES
                .get(usize::from(other))
                .copied()
                .unwrap_or("unknown");
            Err(IpcError::UnsupportedType(format!(
                "field '{name}' has type {type_name} (tag {other})"
            )))
        }
    }
}

fn parse_int(table: fbs::Int<'_>, name: &str) -> Result<IntType> {
    let bit_width = table.bit_width();
    let signed = table.is_signed();
    match bit_width {
        8 | 16 | 32 | 64 => Ok(IntType::new(bit_width as u8, signed)),
        other => Err(IpcError::UnsupportedType(format!(
            "field '{name}' has a {other}-bit integer"
        ))),
    }
}
