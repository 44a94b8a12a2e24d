//! Dictionary batches and the per-session registry that owns them.

use std::{collections::HashMap, sync::Arc};

use bytes::{Buf, Bytes};
use tracing::debug;

use crate::{
    error::{IpcError, Result},
    fbs::{Buffer, BufferStruct, LegacyBuffer},
    layout::{BufferDescriptor, RecordBatchHeader},
    message::{MessageKind, RawMessage},
    region::DataRegion,
    schema::{DataType, IntType, Schema},
};

/// Decoded string dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    pub id: i64,
    pub index_type: IntType,
    pub ordered: bool,
    values: Vec<String>,
}

impl Dictionary {
    pub fn new(id: i64, index_type: IntType, values: Vec<String>) -> Self {
        Self {
            id,
            index_type,
            ordered: false,
            values,
        }
    }

    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Map a raw index read from a record batch to its value.
    pub fn resolve(&self, index: i64) -> Option<&str> {
        usize::try_from(index).ok().and_then(|i| self.get(i))
    }
}

/// Id-keyed dictionary store, in registration order.
///
/// Dictionaries are immutable once registered and shared through `Arc`, so
/// lookups stay valid for as long as callers hold them.
#[derive(Debug, Clone, Default)]
pub struct DictionaryRegistry {
    dictionaries: Vec<Arc<Dictionary>>,
    by_id: HashMap<i64, usize>,
}

impl DictionaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `dictionary`; ids are unique for the life of the registry.
    pub fn register(&mut self, dictionary: Dictionary) -> Result<Arc<Dictionary>> {
        if self.by_id.contains_key(&dictionary.id) {
            return Err(IpcError::DuplicateDictionary(dictionary.id));
        }
        let dictionary = Arc::new(dictionary);
        self.by_id.insert(dictionary.id, self.dictionaries.len());
        self.dictionaries.push(Arc::clone(&dictionary));
        Ok(dictionary)
    }

    pub fn lookup(&self, id: i64) -> Result<&Arc<Dictionary>> {
        self.get(id).ok_or(IpcError::UnknownDictionary(id))
    }

    pub fn get(&self, id: i64) -> Option<&Arc<Dictionary>> {
        self.by_id.get(&id).map(|&index| &self.dictionaries[index])
    }

    pub fn contains(&self, id: i64) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Dictionary>> {
        self.dictionaries.iter()
    }

    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }
}

impl<'a> IntoIterator for &'a DictionaryRegistry {
    type Item = &'a Arc<Dictionary>;
    type IntoIter = std::slice::Iter<'a, Arc<Dictionary>>;

    fn into_iter(self) -> Self::IntoIter {
        self.dictionaries.iter()
    }
}

/// Decode the dictionary batch carried by `message`.
///
/// The batch must hold a single non-null utf8 column. Its body is copied from
/// `region`, which must be the region `message` was read from.
pub fn read_dictionary_batch<R: DataRegion + ?Sized>(
    schema: &Schema,
    region: &R,
    message: &RawMessage,
) -> Result<Dictionary> {
    if message.kind != MessageKind::DictionaryBatch {
        return Err(IpcError::malformed(format!(
            "expected a dictionary batch, found a {} message",
            message.kind
        )));
    }
    let batch = if message.uses_legacy_buffers() {
        DictionaryBatchHeader::read::<LegacyBuffer>(message)?
    } else {
        DictionaryBatchHeader::read::<Buffer>(message)?
    };
    let id = batch.id;
    if batch.is_delta {
        return Err(IpcError::UnsupportedFeature(format!(
            "delta dictionary batch for id {id}"
        )));
    }
    let field = schema
        .field_for_dictionary(id)
        .ok_or(IpcError::UnknownDictionary(id))?;
    let Some(encoding) = field.dictionary else {
        return Err(IpcError::UnknownDictionary(id));
    };
    if field.data_type != DataType::Utf8 {
        return Err(IpcError::UnsupportedType(format!(
            "dictionary {id} of field '{}' has {} values, only utf8 dictionaries are supported",
            field.name,
            field.data_type.type_name()
        )));
    }

    let header = batch.data?;
    if header.compressed {
        return Err(IpcError::UnsupportedFeature(format!(
            "compressed dictionary batch for id {id}"
        )));
    }
    let [node] = header.nodes.as_slice() else {
        return Err(IpcError::malformed(format!(
            "dictionary batch {id} has {} field nodes, expected 1",
            header.nodes.len()
        )));
    };
    let [_, offsets, data] = header.buffers.as_slice() else {
        return Err(IpcError::BufferCountMismatch {
            consumed: 3,
            declared: header.buffers.len(),
        });
    };
    if node.length != header.length {
        return Err(IpcError::RowCountMismatch {
            field: format!("dictionary {id}"),
            expected: header.length,
            actual: node.length,
        });
    }
    if node.null_count > 0 {
        return Err(IpcError::UnsupportedFeature(format!(
            "dictionary {id} contains {} null values",
            node.null_count
        )));
    }

    let body = region.copy_to_host(message.frame.body_offset(), message.frame.body_len)?;
    let offsets = body_slice(&body, offsets, id, "offsets")?;
    let data = body_slice(&body, data, id, "data")?;
    let values = decode_utf8_values(id, node.length, &offsets, &data)?;

    debug!(id, values = values.len(), "decoded dictionary batch");
    Ok(Dictionary::new(id, encoding.index_type, values).with_ordered(encoding.ordered))
}

struct DictionaryBatchHeader {
    id: i64,
    is_delta: bool,
    /// Parse errors surface only once id and delta flag have been checked.
    data: Result<RecordBatchHeader>,
}

impl DictionaryBatchHeader {
    fn read<B: BufferStruct>(message: &RawMessage) -> Result<Self> {
        let batch = message
            .view::<B>()?
            .header_as_dictionary_batch()
            .ok_or_else(|| IpcError::malformed("dictionary batch message has no header table"))?;
        let id = batch.id();
        let data = batch
            .data()
            .ok_or_else(|| IpcError::malformed(format!("dictionary batch {id} has no data")))
            .and_then(RecordBatchHeader::from_view);
        Ok(Self {
            id,
            is_delta: batch.is_delta(),
            data,
        })
    }
}

fn body_slice(body: &Bytes, buffer: &BufferDescriptor, id: i64, what: &str) -> Result<Bytes> {
    if buffer
        .offset
        .checked_add(buffer.length)
        .is_none_or(|end| end > body.len())
    {
        return Err(IpcError::out_of_range(format!(
            "{what} buffer {buffer} of dictionary {id} exceeds the {} byte body",
            body.len()
        )));
    }
    Ok(body.slice(buffer.offset..buffer.end()))
}

fn decode_utf8_values(id: i64, count: usize, offsets: &[u8], data: &[u8]) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let needed = count
        .checked_add(1)
        .and_then(|n| n.checked_mul(4))
        .filter(|n| *n <= offsets.len())
        .ok_or_else(|| {
            IpcError::out_of_range(format!(
                "offsets buffer of dictionary {id} holds {} bytes, {count} values need more",
                offsets.len()
            ))
        })?;

    let mut bounds = Vec::with_capacity(count + 1);
    let mut cursor = &offsets[..needed];
    while cursor.has_remaining() {
        let raw = cursor.get_i32_le();
        let offset = usize::try_from(raw).map_err(|_| {
            IpcError::malformed(format!("negative offset {raw} in dictionary {id}"))
        })?;
        bounds.push(offset);
    }

    let mut values = Vec::with_capacity(count);
    for (index, pair) in bounds.windows(2).enumerate() {
        let (start, end) = (pair[0], pair[1]);
        if start > end || end > data.len() {
            return Err(IpcError::malformed(format!(
                "value {index} of dictionary {id} spans [{start}, {end}) outside the {} byte data buffer",
                data.len()
            )));
        }
        let value = std::str::from_utf8(&data[start..end]).map_err(|e| {
            IpcError::malformed(format!("value {index} of dictionary {id} is not utf8: {e}"))
        })?;
        values.push(value.to_string());
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_values_from_offsets() {
        let values =
            decode_utf8_values(3, 3, &offsets(&[0, 3, 5, 9]), b"redgoblue").unwrap();
        assert_eq!(values, ["red", "go", "blue"]);
    }

    #[test]
    fn empty_dictionary_needs_no_offsets() {
        assert!(decode_utf8_values(0, 0, &[], &[]).unwrap().is_empty());
    }

    #[test]
    fn rejects_decreasing_offsets() {
        let err = decode_utf8_values(1, 2, &offsets(&[0, 4, 2]), b"abcd").unwrap_err();
        assert!(matches!(err, IpcError::MalformedMetadata(_)));
    }

    #[test]
    fn rejects_short_offsets_buffer() {
        let err = decode_utf8_values(1, 2, &offsets(&[0, 1]), b"ab").unwrap_err();
        assert!(matches!(err, IpcError::BufferOutOfRange(_)));
    }

    #[test]
    fn registry_rejects_duplicates_and_unknown_ids() {
        let mut registry = DictionaryRegistry::new();
        registry
            .register(Dictionary::new(7, IntType::INT32, vec!["a".into()]))
            .unwrap();
        assert_eq!(
            registry.register(Dictionary::new(7, IntType::INT32, vec![])),
            Err(IpcError::DuplicateDictionary(7))
        );
        assert_eq!(registry.lookup(8).unwrap_err(), IpcError::UnknownDictionary(8));
        assert_eq!(registry.lookup(7).unwrap().get(0), Some("a"));
        assert_eq!(registry.len(), 1);
    }
}
