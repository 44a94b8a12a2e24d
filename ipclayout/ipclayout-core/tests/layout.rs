use std::{cell::RefCell, ops::Range};

use bytes::Bytes;
use ipclayout_core::{
    BodyPlacement, BufferDescriptor, DataRegion, DataType, DictionaryRegistry, Field, FieldNode,
    FloatPrecision, IntType, IpcError, ParserOptions, RecordBatchHeader, Schema, TypeTag,
    decode_schema, resolve_header, resolve_record_batch,
};
use proptest::prelude::*;

const LEGACY_SCHEMA: &[u8] = include_bytes!("fixtures/legacy_schema.bin");
const LEGACY_BATCH: &[u8] = include_bytes!("fixtures/legacy_batch.bin");
const MODERN_SCHEMA: &[u8] = include_bytes!("fixtures/modern_schema.bin");
const MODERN_BATCH: &[u8] = include_bytes!("fixtures/modern_batch.bin");

// ── helpers ──────────────────────────────────────────────────────────

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_f64(bytes: &[u8], at: usize) -> f64 {
    f64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

fn buf(offset: usize, length: usize) -> BufferDescriptor {
    BufferDescriptor::new(offset, length)
}

fn placement(body_length: usize) -> BodyPlacement {
    BodyPlacement {
        data_offset: 0,
        body_length,
        region_size: body_length,
    }
}

/// Region that records every range copied to the host.
struct CountingRegion {
    bytes: Vec<u8>,
    copies: RefCell<Vec<Range<usize>>>,
}

impl CountingRegion {
    fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            copies: RefCell::new(Vec::new()),
        }
    }
}

impl DataRegion for CountingRegion {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn copy_to_host(&self, offset: usize, len: usize) -> ipclayout_core::Result<Bytes> {
        self.copies.borrow_mut().push(offset..offset + len);
        self.bytes.copy_to_host(offset, len)
    }
}

// ── fixtures ─────────────────────────────────────────────────────────

#[test]
fn legacy_batch_layout() {
    let mut decoded = decode_schema(LEGACY_SCHEMA).unwrap();
    let layout = resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        LEGACY_BATCH,
        &ParserOptions::default(),
    )
    .unwrap();

    assert_eq!(layout.row_count, 30);
    assert_eq!(layout.data_offset, 288);
    assert_eq!(layout.body_length, 512);
    assert_eq!(layout.region_size, LEGACY_BATCH.len());

    let names: Vec<&str> = layout.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["idx", "name", "weight"]);

    let idx = &layout.fields[0];
    assert_eq!(idx.type_tag, TypeTag::Int32);
    assert_eq!(idx.validity, None);
    assert_eq!(idx.data, buf(0, 128));

    let name = &layout.fields[1];
    assert_eq!(name.type_tag, TypeTag::Dictionary);
    assert_eq!(name.dictionary_id, Some(1));
    assert_eq!(name.offsets, None);
    assert_eq!(name.data, buf(128, 128));

    let weight = &layout.fields[2];
    assert_eq!(weight.type_tag, TypeTag::Double);
    assert_eq!(weight.data, buf(256, 256));
    assert!(layout.fields.iter().all(|f| f.row_count == 30 && f.null_count == 0));
}

#[test]
fn legacy_batch_first_row() {
    let mut decoded = decode_schema(LEGACY_SCHEMA).unwrap();
    let layout = resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        LEGACY_BATCH,
        &ParserOptions::default(),
    )
    .unwrap();

    let idx = read_i32(LEGACY_BATCH, layout.absolute(&layout.fields[0].data).start);
    let key = read_i32(LEGACY_BATCH, layout.absolute(&layout.fields[1].data).start);
    let weight = read_f64(LEGACY_BATCH, layout.absolute(&layout.fields[2].data).start);
    let dictionary = decoded.dictionaries.lookup(1).unwrap();

    assert_eq!(idx, 0);
    assert_eq!(dictionary.resolve(i64::from(key)), Some("orange"));
    assert_eq!(weight, 0.4713545411053003);
}

#[test]
fn modern_batch_registers_leading_dictionary() {
    let mut decoded = decode_schema(MODERN_SCHEMA).unwrap();
    let layout = resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        MODERN_BATCH,
        &ParserOptions::default(),
    )
    .unwrap();

    assert_eq!(
        decoded.dictionaries.lookup(0).unwrap().values(),
        ["red", "green", "blue"]
    );
    assert_eq!(layout.row_count, 5);
    assert_eq!(layout.data_offset, 608);
    assert_eq!(layout.body_length, 136);

    let label = &layout.fields[3];
    assert_eq!(label.type_tag, TypeTag::String);
    assert_eq!(label.null_count, 2);
    assert_eq!(label.validity, Some(buf(88, 1)));
    assert_eq!(label.offsets, Some(buf(96, 24)));
    assert_eq!(label.data, buf(120, 4));

    let flag = &layout.fields[4];
    assert_eq!(flag.type_tag, TypeTag::Bool);
    assert_eq!(flag.validity, None);
    assert_eq!(flag.data, buf(128, 1));

    let weights: Vec<f64> = (0..5)
        .map(|i| read_f64(MODERN_BATCH, layout.absolute(&layout.fields[2].data).start + 8 * i))
        .collect();
    assert_eq!(weights, [1.5, 2.25, -0.5, 0.0, 10.125]);
}

#[test]
fn record_batch_body_is_never_copied() {
    let mut decoded = decode_schema(LEGACY_SCHEMA).unwrap();
    let region = CountingRegion::new(LEGACY_BATCH);
    let layout = resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        &region,
        &ParserOptions::default(),
    )
    .unwrap();

    let copies = region.copies.borrow();
    assert!(!copies.is_empty());
    assert!(copies.iter().all(|range| range.end <= layout.data_offset));
}

#[test]
fn alignment_is_checked_when_configured() {
    let aligned = ParserOptions {
        buffer_alignment: Some(8),
        ..ParserOptions::default()
    };
    let mut decoded = decode_schema(MODERN_SCHEMA).unwrap();
    resolve_record_batch(&decoded.schema, &mut decoded.dictionaries, MODERN_BATCH, &aligned)
        .unwrap();

    let strict = ParserOptions {
        buffer_alignment: Some(16),
        ..ParserOptions::default()
    };
    let mut decoded = decode_schema(MODERN_SCHEMA).unwrap();
    let err = resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        MODERN_BATCH,
        &strict,
    )
    .unwrap_err();
    assert!(matches!(err, IpcError::MalformedMetadata(_)), "{err}");
}

// ── failures on fixtures ─────────────────────────────────────────────

#[test]
fn truncated_region_is_out_of_range() {
    let mut decoded = decode_schema(LEGACY_SCHEMA).unwrap();
    let err = resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        &LEGACY_BATCH[..700],
        &ParserOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IpcError::BufferOutOfRange(_)), "{err}");
}

#[test]
fn missing_dictionary_is_unknown() {
    let decoded = decode_schema(LEGACY_SCHEMA).unwrap();
    let mut empty = DictionaryRegistry::new();
    let err = resolve_record_batch(
        &decoded.schema,
        &mut empty,
        LEGACY_BATCH,
        &ParserOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err, IpcError::UnknownDictionary(1));
}

#[test]
fn dictionary_repeated_across_batches_is_duplicate() {
    let mut decoded = decode_schema(MODERN_SCHEMA).unwrap();
    let options = ParserOptions::default();
    resolve_record_batch(&decoded.schema, &mut decoded.dictionaries, MODERN_BATCH, &options)
        .unwrap();
    let err = resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        MODERN_BATCH,
        &options,
    )
    .unwrap_err();
    assert_eq!(err, IpcError::DuplicateDictionary(0));
}

#[test]
fn region_without_record_batch_is_malformed() {
    let mut decoded = decode_schema(MODERN_SCHEMA).unwrap();
    let options = ParserOptions::default();
    for region in [&MODERN_BATCH[..240], &[0u8; 4][..], LEGACY_SCHEMA] {
        let mut dictionaries = decoded.dictionaries.clone();
        let err = resolve_record_batch(&decoded.schema, &mut dictionaries, region, &options)
            .unwrap_err();
        assert!(matches!(err, IpcError::MalformedMetadata(_)), "{err}");
    }
    // the dictionary-only region still registered its dictionary
    resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        &MODERN_BATCH[..240],
        &options,
    )
    .unwrap_err();
    assert!(decoded.dictionaries.contains(0));
}

#[test]
fn batch_for_another_schema_is_rejected() {
    let modern = decode_schema(MODERN_SCHEMA).unwrap();
    let mut registry = DictionaryRegistry::new();
    registry
        .register(ipclayout_core::Dictionary::new(0, IntType::INT32, vec![]))
        .unwrap();

    let err = resolve_record_batch(
        &modern.schema,
        &mut registry,
        LEGACY_BATCH,
        &ParserOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IpcError::MalformedMetadata(_)), "{err}");
}

#[test]
fn buffer_vector_past_metadata_end_is_malformed() {
    // legacy batch metadata starts at 4; the buffers vector length sits at 76
    let mut bytes = LEGACY_BATCH.to_vec();
    assert_eq!(read_i32(&bytes, 80), 6);
    bytes[80..84].copy_from_slice(&100u32.to_le_bytes());

    let mut decoded = decode_schema(LEGACY_SCHEMA).unwrap();
    let err = resolve_record_batch(
        &decoded.schema,
        &mut decoded.dictionaries,
        &bytes,
        &ParserOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, IpcError::MalformedMetadata(_)), "{err}");
}

// ── header checks ────────────────────────────────────────────────────

fn two_int_schema() -> Schema {
    Schema::new(vec![
        Field::new("a", DataType::Int(IntType::INT32), true),
        Field::new("b", DataType::Int(IntType::INT64), false),
    ])
}

fn two_int_header() -> RecordBatchHeader {
    RecordBatchHeader {
        length: 4,
        nodes: vec![FieldNode::new(4, 1), FieldNode::new(4, 0)],
        buffers: vec![buf(0, 1), buf(8, 16), buf(24, 0), buf(24, 32)],
        compressed: false,
    }
}

fn resolve(header: &RecordBatchHeader, body_length: usize) -> Result<(), IpcError> {
    resolve_header(
        &two_int_schema(),
        &DictionaryRegistry::new(),
        header,
        placement(body_length),
        &ParserOptions::default(),
    )
    .map(|_| ())
}

#[test]
fn valid_header_resolves() {
    let layout = resolve_header(
        &two_int_schema(),
        &DictionaryRegistry::new(),
        &two_int_header(),
        placement(56),
        &ParserOptions::default(),
    )
    .unwrap();
    assert_eq!(layout.fields[0].validity, Some(buf(0, 1)));
    assert_eq!(layout.fields[1].data, buf(24, 32));
    assert_eq!(layout.field(2), None);
}

#[test]
fn buffer_count_must_match() {
    let mut header = two_int_header();
    header.buffers.push(buf(56, 0));
    assert_eq!(
        resolve(&header, 56),
        Err(IpcError::BufferCountMismatch {
            consumed: 4,
            declared: 5
        })
    );
}

#[test]
fn node_count_must_match() {
    let mut header = two_int_header();
    header.nodes.pop();
    assert!(matches!(
        resolve(&header, 56),
        Err(IpcError::MalformedMetadata(_))
    ));
}

#[test]
fn node_length_must_match_row_count() {
    let mut header = two_int_header();
    header.nodes[1].length = 3;
    assert_eq!(
        resolve(&header, 56),
        Err(IpcError::RowCountMismatch {
            field: "b".to_string(),
            expected: 4,
            actual: 3
        })
    );
}

#[test]
fn buffer_past_body_is_out_of_range() {
    assert!(matches!(
        resolve(&two_int_header(), 55),
        Err(IpcError::BufferOutOfRange(_))
    ));
}

#[test]
fn buffer_past_region_is_out_of_range() {
    let result = resolve_header(
        &two_int_schema(),
        &DictionaryRegistry::new(),
        &two_int_header(),
        BodyPlacement {
            data_offset: 16,
            body_length: 56,
            region_size: 60,
        },
        &ParserOptions::default(),
    );
    assert!(matches!(result, Err(IpcError::BufferOutOfRange(_))));
}

#[test]
fn overflowing_buffer_is_out_of_range() {
    let mut header = two_int_header();
    header.buffers[3] = buf(usize::MAX, 2);
    assert!(matches!(
        resolve(&header, 56),
        Err(IpcError::BufferOutOfRange(_))
    ));
}

#[test]
fn overlapping_buffers_are_malformed() {
    let mut header = two_int_header();
    header.buffers[3] = buf(16, 32);
    assert!(matches!(
        resolve(&header, 56),
        Err(IpcError::MalformedMetadata(_))
    ));
}

#[test]
fn nulls_require_a_validity_bitmap() {
    let mut header = two_int_header();
    header.buffers[0] = buf(0, 0);
    assert!(matches!(
        resolve(&header, 56),
        Err(IpcError::MalformedMetadata(_))
    ));

    let mut header = two_int_header();
    header.nodes[0].null_count = 5;
    assert!(matches!(
        resolve(&header, 56),
        Err(IpcError::MalformedMetadata(_))
    ));
}

#[test]
fn compressed_body_is_unsupported() {
    let mut header = two_int_header();
    header.compressed = true;
    assert!(matches!(
        resolve(&header, 56),
        Err(IpcError::UnsupportedFeature(_))
    ));
}

// ── generated layouts ────────────────────────────────────────────────

/// `(type choice, gap before each buffer, has nulls)`.
type FieldShape = (u8, usize, bool);

fn data_type(choice: u8) -> DataType {
    match choice {
        0 => DataType::Int(IntType::INT32),
        1 => DataType::Int(IntType::UINT8),
        2 => DataType::Float(FloatPrecision::Double),
        3 => DataType::Bool,
        _ => DataType::Utf8,
    }
}

/// Lay out a batch for `shapes`, returning the schema, header and body length.
fn build(rows: usize, shapes: &[FieldShape]) -> (Schema, RecordBatchHeader, usize) {
    let mut fields = Vec::new();
    let mut nodes = Vec::new();
    let mut buffers = Vec::new();
    let mut cursor = 0;
    let mut push = |cursor: &mut usize, gap: usize, length: usize| {
        *cursor += gap;
        buffers.push(buf(*cursor, length));
        *cursor += length;
    };

    for (i, &(choice, gap, has_nulls)) in shapes.iter().enumerate() {
        let data_type = data_type(choice);
        let nulls = if has_nulls { rows / 2 } else { 0 };
        let validity = if nulls > 0 { rows.div_ceil(8) } else { 0 };
        push(&mut cursor, gap, validity);
        let data = match data_type {
            DataType::Bool => rows.div_ceil(8),
            DataType::Utf8 => {
                push(&mut cursor, gap, (rows + 1) * 4);
                rows * 3
            }
            other => rows * other.byte_width().unwrap_or(0),
        };
        push(&mut cursor, gap, data);
        fields.push(Field::new(format!("f{i}"), data_type, has_nulls));
        nodes.push(FieldNode::new(rows, nulls));
    }

    let header = RecordBatchHeader {
        length: rows,
        nodes,
        buffers,
        compressed: false,
    };
    (Schema::new(fields), header, cursor)
}

fn arb_shapes() -> impl Strategy<Value = Vec<FieldShape>> {
    proptest::collection::vec((0u8..5, 0usize..16, any::<bool>()), 1..8)
}

proptest::proptest! {
    #[test]
    fn generated_layouts_resolve_in_schema_order(rows in 0usize..64, shapes in arb_shapes()) {
        let (schema, header, body_length) = build(rows, &shapes);
        let layout = resolve_header(
            &schema,
            &DictionaryRegistry::new(),
            &header,
            placement(body_length),
            &ParserOptions::default(),
        )
        .unwrap();

        prop_assert_eq!(layout.fields.len(), schema.len());
        let mut previous_end = 0;
        for (field, resolved) in schema.iter().zip(&layout.fields) {
            prop_assert_eq!(&field.name, &resolved.name);
            prop_assert_eq!(field.type_tag(), resolved.type_tag);
            prop_assert_eq!(resolved.offsets.is_some(), field.data_type.is_variable_length());
            let buffers = resolved
                .validity
                .iter()
                .chain(resolved.offsets.iter())
                .chain(std::iter::once(&resolved.data));
            for buffer in buffers.filter(|b| !b.is_empty()) {
                prop_assert!(buffer.offset >= previous_end);
                prop_assert!(buffer.end() <= body_length);
                previous_end = buffer.end();
            }
        }
    }

    #[test]
    fn shortened_body_is_out_of_range(rows in 1usize..64, shapes in arb_shapes()) {
        let (schema, header, body_length) = build(rows, &shapes);
        let max_end = header.buffers.iter().map(BufferDescriptor::end).max().unwrap_or(0);
        prop_assume!(max_end > 0);
        let result = resolve_header(
            &schema,
            &DictionaryRegistry::new(),
            &header,
            placement(max_end - 1),
            &ParserOptions::default(),
        );
        prop_assert!(matches!(result, Err(IpcError::BufferOutOfRange(_))));
        prop_assert!(body_length >= max_end);
    }
}
