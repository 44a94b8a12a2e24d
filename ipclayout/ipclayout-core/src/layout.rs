//! Record-batch layout resolution.
//!
//! Binds a record batch header to a decoded [`Schema`] and produces, for every
//! field in schema order, the `(offset, length)` of its buffers relative to the
//! start of the message body.

use std::fmt;

use tracing::{debug, instrument};

use crate::{
    dictionary::{DictionaryRegistry, read_dictionary_batch},
    error::{IpcError, Result},
    fbs::{self, Buffer, BufferStruct, LegacyBuffer},
    message::{MessageKind, MessageReader, RawMessage},
    options::ParserOptions,
    region::DataRegion,
    schema::{Field, Schema, TypeTag},
};

/// Location of one physical buffer, relative to the payload body start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub offset: usize,
    pub length: usize,
}

impl BufferDescriptor {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl fmt::Display for BufferDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, +{})", self.offset, self.length)
    }
}

/// Per-field node metadata from a record batch header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldNode {
    pub length: usize,
    pub null_count: usize,
}

impl FieldNode {
    pub fn new(length: usize, null_count: usize) -> Self {
        Self { length, null_count }
    }
}

/// Contents of a `RecordBatch` header table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordBatchHeader {
    pub length: usize,
    pub nodes: Vec<FieldNode>,
    pub buffers: Vec<BufferDescriptor>,
    pub compressed: bool,
}

fn non_negative(value: i64, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| IpcError::malformed(format!("negative {what}: {value}")))
}

impl RecordBatchHeader {
    /// Read the header of a record batch message.
    pub(crate) fn read(message: &RawMessage) -> Result<Self> {
        if message.uses_legacy_buffers() {
            Self::read_with::<LegacyBuffer>(message)
        } else {
            Self::read_with::<Buffer>(message)
        }
    }

    fn read_with<B: BufferStruct>(message: &RawMessage) -> Result<Self> {
        let batch = message
            .view::<B>()?
            .header_as_record_batch()
            .ok_or_else(|| IpcError::malformed("record batch message has no header table"))?;
        Self::from_view(batch)
    }

    pub(crate) fn from_view<B: BufferStruct>(batch: fbs::RecordBatch<'_, B>) -> Result<Self> {
        let length = non_negative(batch.length(), "record batch length")?;

        let nodes = batch
            .nodes()
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|node| {
                        Ok(FieldNode {
                            length: non_negative(node.length(), "field node length")?,
                            null_count: non_negative(node.null_count(), "field node null count")?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let buffers = batch
            .buffers()
            .map(|buffers| {
                buffers
                    .iter()
                    .map(|buffer| {
                        Ok(BufferDescriptor {
                            offset: non_negative(buffer.offset(), "buffer offset")?,
                            length: non_negative(buffer.length(), "buffer length")?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let compressed = match batch.compression() {
            Some(compression) => {
                debug!(codec = compression.codec(), "record batch body is compressed");
                true
            }
            None => false,
        };
        Ok(Self {
            length,
            nodes,
            buffers,
            compressed,
        })
    }
}

/// Where a record batch body sits inside its data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyPlacement {
    /// Absolute offset of the body start within the region.
    pub data_offset: usize,
    pub body_length: usize,
    pub region_size: usize,
}

/// Resolved buffers of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub type_tag: TypeTag,
    pub row_count: usize,
    pub null_count: usize,
    /// Validity bitmap; absent when the header gives it zero length.
    pub validity: Option<BufferDescriptor>,
    /// Offsets buffer of variable-length columns.
    pub offsets: Option<BufferDescriptor>,
    /// Values, or dictionary indices for dictionary-encoded columns.
    pub data: BufferDescriptor,
    pub dictionary_id: Option<i64>,
}

/// Buffer layout of a bound record batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatchLayout {
    pub row_count: usize,
    /// Absolute offset of the body start within the data region.
    pub data_offset: usize,
    pub body_length: usize,
    pub region_size: usize,
    pub fields: Vec<FieldLayout>,
}

impl RecordBatchLayout {
    pub fn field(&self, index: usize) -> Option<&FieldLayout> {
        self.fields.get(index)
    }

    /// Absolute region range of `descriptor`.
    pub fn absolute(&self, descriptor: &BufferDescriptor) -> std::ops::Range<usize> {
        let start = self.data_offset + descriptor.offset;
        start..start + descriptor.length
    }
}

/// Resolve the first record batch in `region` against `schema`.
///
/// Dictionary batches that precede the record batch are decoded and added to
/// `dictionaries` first, so both the legacy layout (dictionaries bundled with
/// the schema) and the stream layout (dictionaries ahead of each batch) bind.
#[instrument(level = "debug", skip_all, fields(region_size = region.size()))]
pub fn resolve_record_batch<R: DataRegion + ?Sized>(
    schema: &Schema,
    dictionaries: &mut DictionaryRegistry,
    region: &R,
    options: &ParserOptions,
) -> Result<RecordBatchLayout> {
    let mut reader = MessageReader::new(region, options);
    while let Some(message) = reader.next_message()? {
        match message.kind {
            MessageKind::DictionaryBatch => {
                let dictionary = read_dictionary_batch(schema, region, &message)?;
                dictionaries.register(dictionary)?;
            }
            MessageKind::RecordBatch => {
                return resolve_message(schema, dictionaries, &message, region.size(), options);
            }
            MessageKind::Schema => {
                return Err(IpcError::malformed(format!(
                    "unexpected schema message at offset {} of the data region",
                    message.frame.offset
                )));
            }
        }
    }
    Err(IpcError::malformed(
        "data region holds no record batch message",
    ))
}

fn resolve_message(
    schema: &Schema,
    dictionaries: &DictionaryRegistry,
    message: &RawMessage,
    region_size: usize,
    options: &ParserOptions,
) -> Result<RecordBatchLayout> {
    let header = RecordBatchHeader::read(message)?;
    let placement = BodyPlacement {
        data_offset: message.frame.body_offset(),
        body_length: message.frame.body_len,
        region_size,
    };
    resolve_header(schema, dictionaries, &header, placement, options)
}

/// Bind an already parsed header to `schema`.
pub fn resolve_header(
    schema: &Schema,
    dictionaries: &DictionaryRegistry,
    header: &RecordBatchHeader,
    placement: BodyPlacement,
    options: &ParserOptions,
) -> Result<RecordBatchLayout> {
    if header.compressed {
        return Err(IpcError::UnsupportedFeature(
            "compressed record batch bodies are not supported".to_string(),
        ));
    }
    for field in schema.iter() {
        if let Some(id) = field.dictionary_id() {
            if !dictionaries.contains(id) {
                return Err(IpcError::UnknownDictionary(id));
            }
        }
    }
    if header.nodes.len() != schema.len() {
        return Err(IpcError::malformed(format!(
            "record batch declares {} field nodes, schema has {} fields",
            header.nodes.len(),
            schema.len()
        )));
    }
    let consumed: usize = schema.iter().map(Field::buffer_count).sum();
    if consumed != header.buffers.len() {
        return Err(IpcError::BufferCountMismatch {
            consumed,
            declared: header.buffers.len(),
        });
    }

    let mut checker = BufferChecker::new(placement, options.buffer_alignment);
    let mut remaining = header.buffers.as_slice();
    let mut fields = Vec::with_capacity(schema.len());
    for (field, node) in schema.iter().zip(&header.nodes) {
        if node.length != header.length {
            return Err(IpcError::RowCountMismatch {
                field: field.name.clone(),
                expected: header.length,
                actual: node.length,
            });
        }
        if node.null_count > node.length {
            return Err(IpcError::malformed(format!(
                "field '{}' reports {} nulls in {} rows",
                field.name, node.null_count, node.length
            )));
        }

        let (buffers, rest) = remaining.split_at(field.buffer_count());
        remaining = rest;
        for buffer in buffers {
            checker.check(&field.name, buffer)?;
        }

        let validity = (!buffers[0].is_empty()).then_some(buffers[0]);
        if node.null_count > 0 && validity.is_none() {
            return Err(IpcError::malformed(format!(
                "field '{}' has {} nulls but no validity bitmap",
                field.name, node.null_count
            )));
        }
        let offsets = (buffers.len() == 3).then(|| buffers[1]);
        fields.push(FieldLayout {
            name: field.name.clone(),
            type_tag: field.type_tag(),
            row_count: node.length,
            null_count: node.null_count,
            validity,
            offsets,
            data: buffers[buffers.len() - 1],
            dictionary_id: field.dictionary_id(),
        });
    }

    debug!(
        rows = header.length,
        fields = fields.len(),
        data_offset = placement.data_offset,
        "resolved record batch layout"
    );
    Ok(RecordBatchLayout {
        row_count: header.length,
        data_offset: placement.data_offset,
        body_length: placement.body_length,
        region_size: placement.region_size,
        fields,
    })
}

/// Range, ordering and alignment checks for buffers in header order.
struct BufferChecker {
    placement: BodyPlacement,
    alignment: Option<usize>,
    index: usize,
    previous_end: usize,
}

impl BufferChecker {
    fn new(placement: BodyPlacement, alignment: Option<usize>) -> Self {
        Self {
            placement,
            alignment,
            index: 0,
            previous_end: 0,
        }
    }

    fn check(&mut self, field: &str, buffer: &BufferDescriptor) -> Result<()> {
        let index = self.index;
        self.index += 1;

        let end = buffer.offset.checked_add(buffer.length).ok_or_else(|| {
            IpcError::out_of_range(format!(
                "buffer {index} of field '{field}' {buffer} overflows"
            ))
        })?;
        if end > self.placement.body_length {
            return Err(IpcError::out_of_range(format!(
                "buffer {index} of field '{field}' {buffer} exceeds the body length of {} bytes",
                self.placement.body_length
            )));
        }
        let absolute_end = self.placement.data_offset.saturating_add(end);
        if absolute_end > self.placement.region_size {
            return Err(IpcError::out_of_range(format!(
                "buffer {index} of field '{field}' ends at region offset {absolute_end}, past the {} byte data region",
                self.placement.region_size
            )));
        }
        if buffer.is_empty() {
            return Ok(());
        }
        if buffer.offset < self.previous_end {
            return Err(IpcError::malformed(format!(
                "buffer {index} of field '{field}' {buffer} overlaps the previous buffer ending at {}",
                self.previous_end
            )));
        }
        if let Some(alignment) = self.alignment.filter(|a| *a > 1) {
            if buffer.offset % alignment != 0 {
                return Err(IpcError::malformed(format!(
                    "buffer {index} of field '{field}' starts at {} which is not {alignment}-byte aligned",
                    buffer.offset
                )));
            }
        }
        self.previous_end = end;
        Ok(())
    }
}
