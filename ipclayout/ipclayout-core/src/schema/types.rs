use std::{fmt, ops::Deref};

use crate::message::MetadataVersion;

/// Integer type: bit width and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntType {
    pub bit_width: u8,
    pub signed: bool,
}

impl IntType {
    pub const INT8: Self = Self::new(8, true);
    pub const INT16: Self = Self::new(16, true);
    pub const INT32: Self = Self::new(32, true);
    pub const INT64: Self = Self::new(64, true);
    pub const UINT8: Self = Self::new(8, false);
    pub const UINT16: Self = Self::new(16, false);
    pub const UINT32: Self = Self::new(32, false);
    pub const UINT64: Self = Self::new(64, false);

    pub const fn new(bit_width: u8, signed: bool) -> Self {
        Self { bit_width, signed }
    }

    pub fn byte_width(&self) -> usize {
        usize::from(self.bit_width / 8)
    }

    pub fn type_name(&self) -> &'static str {
        match (self.bit_width, self.signed) {
            (8, true) => "int8",
            (16, true) => "int16",
            (32, true) => "int32",
            (64, true) => "int64",
            (8, false) => "uint8",
            (16, false) => "uint16",
            (32, false) => "uint32",
            (64, false) => "uint64",
            _ => "int",
        }
    }

    fn tag(&self) -> TypeTag {
        match (self.bit_width, self.signed) {
            (8, true) => TypeTag::Int8,
            (16, true) => TypeTag::Int16,
            (32, true) => TypeTag::Int32,
            (64, true) => TypeTag::Int64,
            (8, false) => TypeTag::UInt8,
            (16, false) => TypeTag::UInt16,
            (32, false) => TypeTag::UInt32,
            _ => TypeTag::UInt64,
        }
    }
}

/// Floating point precision. Half precision is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatPrecision {
    Single,
    Double,
}

/// Physical value type of a field.
///
/// For dictionary-encoded fields this is the type of the dictionary values,
/// not of the indices stored in the record batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int(IntType),
    Float(FloatPrecision),
    Bool,
    Utf8,
    Binary,
}

impl DataType {
    /// Number of record-batch buffers a column of this type occupies:
    /// validity + data, plus an offsets buffer for variable-length types.
    pub fn buffer_count(&self) -> usize {
        if self.is_variable_length() { 3 } else { 2 }
    }

    pub fn is_variable_length(&self) -> bool {
        matches!(self, DataType::Utf8 | DataType::Binary)
    }

    /// Width of one value in bytes; `None` for bit-packed and variable-length types.
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            DataType::Int(int) => Some(int.byte_width()),
            DataType::Float(FloatPrecision::Single) => Some(4),
            DataType::Float(FloatPrecision::Double) => Some(8),
            DataType::Bool | DataType::Utf8 | DataType::Binary => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Int(int) => int.type_name(),
            DataType::Float(FloatPrecision::Single) => "float",
            DataType::Float(FloatPrecision::Double) => "double",
            DataType::Bool => "bool",
            DataType::Utf8 => "utf8",
            DataType::Binary => "binary",
        }
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            DataType::Int(int) => int.tag(),
            DataType::Float(FloatPrecision::Single) => TypeTag::Float,
            DataType::Float(FloatPrecision::Double) => TypeTag::Double,
            DataType::Bool => TypeTag::Bool,
            DataType::Utf8 => TypeTag::String,
            DataType::Binary => TypeTag::Binary,
        }
    }
}

/// Reporting tag of a column in a record batch layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    String,
    Binary,
    Dictionary,
}

impl TypeTag {
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Int8 => "INT8",
            TypeTag::Int16 => "INT16",
            TypeTag::Int32 => "INT32",
            TypeTag::Int64 => "INT64",
            TypeTag::UInt8 => "UINT8",
            TypeTag::UInt16 => "UINT16",
            TypeTag::UInt32 => "UINT32",
            TypeTag::UInt64 => "UINT64",
            TypeTag::Float => "FLOAT",
            TypeTag::Double => "DOUBLE",
            TypeTag::Bool => "BOOL",
            TypeTag::String => "STRING",
            TypeTag::Binary => "BINARY",
            TypeTag::Dictionary => "DICTIONARY",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dictionary encoding attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DictionaryEncoding {
    pub id: i64,
    pub index_type: IntType,
    pub ordered: bool,
}

impl DictionaryEncoding {
    pub fn new(id: i64, index_type: IntType) -> Self {
        Self {
            id,
            index_type,
            ordered: false,
        }
    }
}

/// A schema field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub dictionary: Option<DictionaryEncoding>,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            dictionary: None,
        }
    }

    pub fn with_dictionary(mut self, encoding: DictionaryEncoding) -> Self {
        self.dictionary = Some(encoding);
        self
    }

    pub fn type_tag(&self) -> TypeTag {
        match self.dictionary {
            Some(_) => TypeTag::Dictionary,
            None => self.data_type.tag(),
        }
    }

    pub fn dictionary_id(&self) -> Option<i64> {
        self.dictionary.map(|encoding| encoding.id)
    }

    /// Buffers this field occupies in a record batch. Dictionary-encoded
    /// columns store validity + indices only.
    pub fn buffer_count(&self) -> usize {
        match self.dictionary {
            Some(_) => 2,
            None => self.data_type.buffer_count(),
        }
    }
}

/// Byte order declared by a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Ordered, immutable field list plus schema-level metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
    metadata: Vec<(String, String)>,
    version: MetadataVersion,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            metadata: Vec::new(),
            version: MetadataVersion::V5,
        }
    }

    pub fn with_metadata(mut self, metadata: Vec<(String, String)>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_version(mut self, version: MetadataVersion) -> Self {
        self.version = version;
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Custom key/value metadata, in declaration order.
    pub fn metadata(&self) -> &[(String, String)] {
        &self.metadata
    }

    /// Metadata version of the schema message this schema was decoded from.
    pub fn version(&self) -> MetadataVersion {
        self.version
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The field that declares dictionary `id`, if any.
    pub fn field_for_dictionary(&self, id: i64) -> Option<&Field> {
        self.fields.iter().find(|f| f.dictionary_id() == Some(id))
    }
}

impl Deref for Schema {
    type Target = [Field];

    fn deref(&self) -> &Self::Target {
        &self.fields
    }
}

impl AsRef<[Field]> for Schema {
    fn as_ref(&self) -> &[Field] {
        &self.fields
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = super::format_schema(self)?;
        f.write_str(&text)
    }
}
