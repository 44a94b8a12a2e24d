//! Typed views over the Arrow IPC metadata tables of `Message.fbs` and
//! `Schema.fbs`, declared the way flatc lays them out.
//!
//! Views are only handed out by [`message`], which runs the flatbuffers
//! verifier over the whole metadata block first. Only the slots this crate
//! reads are declared and verified; the legacy `Field.layout` vector of V3
//! writers therefore never reaches the verifier.
//!
//! `Buffer` structs changed width in V4, so the record batch views are
//! generic over the struct that describes one body buffer.

use std::marker::PhantomData;

use bytes::Buf;
use flatbuffers::{
    Follow, ForwardsUOffset, InvalidFlatbuffer, SimpleToVerifyInSlice, Table, VOffsetT, Vector,
    Verifiable, Verifier,
};

use crate::error::{IpcError, Result};

pub(crate) const HEADER_SCHEMA: u8 = 1;
pub(crate) const HEADER_DICTIONARY_BATCH: u8 = 2;
pub(crate) const HEADER_RECORD_BATCH: u8 = 3;

pub(crate) const TYPE_INT: u8 = 2;
pub(crate) const TYPE_FLOATING_POINT: u8 = 3;
pub(crate) const TYPE_BINARY: u8 = 4;
pub(crate) const TYPE_UTF8: u8 = 5;
pub(crate) const TYPE_BOOL: u8 = 6;

/// Verify `metadata` and return its root `Message` table.
pub(crate) fn message<B: BufferStruct>(metadata: &[u8]) -> Result<Message<'_, B>> {
    flatbuffers::root::<Message<'_, B>>(metadata)
        .map_err(|e| IpcError::malformed(format!("invalid message flatbuffer: {e}")))
}

fn get<'a, T: Follow<'a> + 'a>(tab: &Table<'a>, slot: VOffsetT) -> Option<T::Inner> {
    // SAFETY: views are built from buffers accepted by `flatbuffers::root`,
    // which verified every slot read through this helper.
    unsafe { tab.get::<T>(slot, None) }
}

macro_rules! table_view {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        pub(crate) struct $name<'a> {
            tab: Table<'a>,
        }

        impl<'a> Follow<'a> for $name<'a> {
            type Inner = $name<'a>;

            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                Self {
                    tab: unsafe { Table::new(buf, loc) },
                }
            }
        }
    };
}

macro_rules! generic_table_view {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub(crate) struct $name<'a, B> {
            tab: Table<'a>,
            buffers: PhantomData<B>,
        }

        impl<B> Clone for $name<'_, B> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<B> Copy for $name<'_, B> {}

        impl<'a, B: BufferStruct> Follow<'a> for $name<'a, B> {
            type Inner = $name<'a, B>;

            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                Self {
                    tab: unsafe { Table::new(buf, loc) },
                    buffers: PhantomData,
                }
            }
        }
    };
}

// ── structs ──────────────────────────────────────────────────────────

macro_rules! fixed_struct {
    ($(#[$meta:meta])* $name:ident, $len:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        pub(crate) struct $name([u8; $len]);

        impl<'a> Follow<'a> for $name {
            type Inner = $name;

            unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
                let mut raw = [0; $len];
                raw.copy_from_slice(&buf[loc..loc + $len]);
                Self(raw)
            }
        }

        impl SimpleToVerifyInSlice for $name {}

        impl $name {
            fn i64_at(&self, at: usize) -> i64 {
                (&self.0[at..]).get_i64_le()
            }
        }
    };
}

fixed_struct!(
    /// `FieldNode { length: long, null_count: long }`.
    FieldNode,
    16
);

impl FieldNode {
    pub(crate) fn length(&self) -> i64 {
        self.i64_at(0)
    }

    pub(crate) fn null_count(&self) -> i64 {
        self.i64_at(8)
    }
}

fixed_struct!(
    /// `Buffer { offset: long, length: long }` (V4 and later).
    Buffer,
    16
);

fixed_struct!(
    /// `Buffer { page: int, offset: long, length: long }` written before V4.
    LegacyBuffer,
    24
);

/// Wire struct describing one body buffer.
pub(crate) trait BufferStruct:
    for<'a> Follow<'a, Inner = Self> + SimpleToVerifyInSlice + Copy + 'static
{
    fn offset(&self) -> i64;
    fn length(&self) -> i64;
}

impl BufferStruct for Buffer {
    fn offset(&self) -> i64 {
        self.i64_at(0)
    }

    fn length(&self) -> i64 {
        self.i64_at(8)
    }
}

impl BufferStruct for LegacyBuffer {
    // leading `page: int` plus four bytes of padding
    fn offset(&self) -> i64 {
        self.i64_at(8)
    }

    fn length(&self) -> i64 {
        self.i64_at(16)
    }
}

// ── Message.fbs ──────────────────────────────────────────────────────

generic_table_view!(Message);

impl<'a, B: BufferStruct> Message<'a, B> {
    const VT_VERSION: VOffsetT = 4;
    const VT_HEADER_TYPE: VOffsetT = 6;
    const VT_HEADER: VOffsetT = 8;
    const VT_BODY_LENGTH: VOffsetT = 10;

    pub(crate) fn version(&self) -> i16 {
        get::<i16>(&self.tab, Self::VT_VERSION).unwrap_or(0)
    }

    pub(crate) fn header_type(&self) -> u8 {
        get::<u8>(&self.tab, Self::VT_HEADER_TYPE).unwrap_or(0)
    }

    pub(crate) fn body_length(&self) -> i64 {
        get::<i64>(&self.tab, Self::VT_BODY_LENGTH).unwrap_or(0)
    }

    fn header_as<T: Follow<'a> + 'a>(&self, header_type: u8) -> Option<T::Inner> {
        if self.header_type() != header_type {
            return None;
        }
        get::<ForwardsUOffset<T>>(&self.tab, Self::VT_HEADER)
    }

    pub(crate) fn header_as_schema(&self) -> Option<Schema<'a>> {
        self.header_as::<Schema<'a>>(HEADER_SCHEMA)
    }

    pub(crate) fn header_as_dictionary_batch(&self) -> Option<DictionaryBatch<'a, B>> {
        self.header_as::<DictionaryBatch<'a, B>>(HEADER_DICTIONARY_BATCH)
    }

    pub(crate) fn header_as_record_batch(&self) -> Option<RecordBatch<'a, B>> {
        self.header_as::<RecordBatch<'a, B>>(HEADER_RECORD_BATCH)
    }
}

impl<B: BufferStruct> Verifiable for Message<'_, B> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i16>("version", Self::VT_VERSION, false)?
            .visit_union::<u8, _>(
                "header_type",
                Self::VT_HEADER_TYPE,
                "header",
                Self::VT_HEADER,
                false,
                |key, v, pos| match key {
                    HEADER_SCHEMA => v.verify_union_variant::<ForwardsUOffset<Schema>>(
                        "MessageHeader::Schema",
                        pos,
                    ),
                    HEADER_DICTIONARY_BATCH => v
                        .verify_union_variant::<ForwardsUOffset<DictionaryBatch<B>>>(
                            "MessageHeader::DictionaryBatch",
                            pos,
                        ),
                    HEADER_RECORD_BATCH => v
                        .verify_union_variant::<ForwardsUOffset<RecordBatch<B>>>(
                            "MessageHeader::RecordBatch",
                            pos,
                        ),
                    _ => Ok(()),
                },
            )?
            .visit_field::<i64>("bodyLength", Self::VT_BODY_LENGTH, false)?
            .finish();
        Ok(())
    }
}

generic_table_view!(RecordBatch);

impl<'a, B: BufferStruct> RecordBatch<'a, B> {
    const VT_LENGTH: VOffsetT = 4;
    const VT_NODES: VOffsetT = 6;
    const VT_BUFFERS: VOffsetT = 8;
    const VT_COMPRESSION: VOffsetT = 10;

    pub(crate) fn length(&self) -> i64 {
        get::<i64>(&self.tab, Self::VT_LENGTH).unwrap_or(0)
    }

    pub(crate) fn nodes(&self) -> Option<Vector<'a, FieldNode>> {
        get::<ForwardsUOffset<Vector<'a, FieldNode>>>(&self.tab, Self::VT_NODES)
    }

    pub(crate) fn buffers(&self) -> Option<Vector<'a, B>> {
        get::<ForwardsUOffset<Vector<'a, B>>>(&self.tab, Self::VT_BUFFERS)
    }

    pub(crate) fn compression(&self) -> Option<BodyCompression<'a>> {
        get::<ForwardsUOffset<BodyCompression<'a>>>(&self.tab, Self::VT_COMPRESSION)
    }
}

impl<B: BufferStruct> Verifiable for RecordBatch<'_, B> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i64>("length", Self::VT_LENGTH, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, FieldNode>>>("nodes", Self::VT_NODES, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, B>>>("buffers", Self::VT_BUFFERS, false)?
            .visit_field::<ForwardsUOffset<BodyCompression>>(
                "compression",
                Self::VT_COMPRESSION,
                false,
            )?
            .finish();
        Ok(())
    }
}

table_view!(BodyCompression);

impl BodyCompression<'_> {
    const VT_CODEC: VOffsetT = 4;

    /// `0` is LZ4 frame, `1` is zstd.
    pub(crate) fn codec(&self) -> i8 {
        get::<i8>(&self.tab, Self::VT_CODEC).unwrap_or(0)
    }
}

impl Verifiable for BodyCompression<'_> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i8>("codec", Self::VT_CODEC, false)?
            .finish();
        Ok(())
    }
}

generic_table_view!(DictionaryBatch);

impl<'a, B: BufferStruct> DictionaryBatch<'a, B> {
    const VT_ID: VOffsetT = 4;
    const VT_DATA: VOffsetT = 6;
    const VT_IS_DELTA: VOffsetT = 8;

    pub(crate) fn id(&self) -> i64 {
        get::<i64>(&self.tab, Self::VT_ID).unwrap_or(0)
    }

    pub(crate) fn data(&self) -> Option<RecordBatch<'a, B>> {
        get::<ForwardsUOffset<RecordBatch<'a, B>>>(&self.tab, Self::VT_DATA)
    }

    pub(crate) fn is_delta(&self) -> bool {
        get::<bool>(&self.tab, Self::VT_IS_DELTA).unwrap_or(false)
    }
}

impl<B: BufferStruct> Verifiable for DictionaryBatch<'_, B> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i64>("id", Self::VT_ID, false)?
            .visit_field::<ForwardsUOffset<RecordBatch<B>>>("data", Self::VT_DATA, false)?
            .visit_field::<bool>("isDelta", Self::VT_IS_DELTA, false)?
            .finish();
        Ok(())
    }
}

// ── Schema.fbs ───────────────────────────────────────────────────────

table_view!(Schema);

impl<'a> Schema<'a> {
    const VT_ENDIANNESS: VOffsetT = 4;
    const VT_FIELDS: VOffsetT = 6;
    const VT_CUSTOM_METADATA: VOffsetT = 8;

    pub(crate) fn endianness(&self) -> i16 {
        get::<i16>(&self.tab, Self::VT_ENDIANNESS).unwrap_or(0)
    }

    pub(crate) fn fields(&self) -> Option<Vector<'a, ForwardsUOffset<Field<'a>>>> {
        get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Field<'a>>>>>(&self.tab, Self::VT_FIELDS)
    }

    pub(crate) fn custom_metadata(&self) -> Option<Vector<'a, ForwardsUOffset<KeyValue<'a>>>> {
        get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<KeyValue<'a>>>>>(
            &self.tab,
            Self::VT_CUSTOM_METADATA,
        )
    }
}

impl Verifiable for Schema<'_> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i16>("endianness", Self::VT_ENDIANNESS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Field>>>>(
                "fields",
                Self::VT_FIELDS,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<KeyValue>>>>(
                "custom_metadata",
                Self::VT_CUSTOM_METADATA,
                false,
            )?
            .finish();
        Ok(())
    }
}

table_view!(Field);

impl<'a> Field<'a> {
    const VT_NAME: VOffsetT = 4;
    const VT_NULLABLE: VOffsetT = 6;
    const VT_TYPE_TYPE: VOffsetT = 8;
    const VT_TYPE: VOffsetT = 10;
    const VT_DICTIONARY: VOffsetT = 12;
    const VT_CHILDREN: VOffsetT = 14;

    pub(crate) fn name(&self) -> Option<&'a str> {
        get::<ForwardsUOffset<&str>>(&self.tab, Self::VT_NAME)
    }

    pub(crate) fn nullable(&self) -> bool {
        get::<bool>(&self.tab, Self::VT_NULLABLE).unwrap_or(false)
    }

    pub(crate) fn type_type(&self) -> u8 {
        get::<u8>(&self.tab, Self::VT_TYPE_TYPE).unwrap_or(0)
    }

    pub(crate) fn type_as_int(&self) -> Option<Int<'a>> {
        if self.type_type() != TYPE_INT {
            return None;
        }
        get::<ForwardsUOffset<Int<'a>>>(&self.tab, Self::VT_TYPE)
    }

    pub(crate) fn type_as_floating_point(&self) -> Option<FloatingPoint<'a>> {
        if self.type_type() != TYPE_FLOATING_POINT {
            return None;
        }
        get::<ForwardsUOffset<FloatingPoint<'a>>>(&self.tab, Self::VT_TYPE)
    }

    pub(crate) fn dictionary(&self) -> Option<DictionaryEncoding<'a>> {
        get::<ForwardsUOffset<DictionaryEncoding<'a>>>(&self.tab, Self::VT_DICTIONARY)
    }

    pub(crate) fn children(&self) -> Option<Vector<'a, ForwardsUOffset<Field<'a>>>> {
        get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Field<'a>>>>>(
            &self.tab,
            Self::VT_CHILDREN,
        )
    }
}

impl Verifiable for Field<'_> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<&str>>("name", Self::VT_NAME, false)?
            .visit_field::<bool>("nullable", Self::VT_NULLABLE, false)?
            .visit_union::<u8, _>(
                "type_type",
                Self::VT_TYPE_TYPE,
                "type",
                Self::VT_TYPE,
                false,
                |key, v, pos| match key {
                    TYPE_INT => v.verify_union_variant::<ForwardsUOffset<Int>>("Type::Int", pos),
                    TYPE_FLOATING_POINT => v.verify_union_variant::<ForwardsUOffset<FloatingPoint>>(
                        "Type::FloatingPoint",
                        pos,
                    ),
                    _ => Ok(()),
                },
            )?
            .visit_field::<ForwardsUOffset<DictionaryEncoding>>(
                "dictionary",
                Self::VT_DICTIONARY,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<Field>>>>(
                "children",
                Self::VT_CHILDREN,
                false,
            )?
            .finish();
        Ok(())
    }
}

table_view!(DictionaryEncoding);

impl<'a> DictionaryEncoding<'a> {
    const VT_ID: VOffsetT = 4;
    const VT_INDEX_TYPE: VOffsetT = 6;
    const VT_IS_ORDERED: VOffsetT = 8;

    pub(crate) fn id(&self) -> i64 {
        get::<i64>(&self.tab, Self::VT_ID).unwrap_or(0)
    }

    pub(crate) fn index_type(&self) -> Option<Int<'a>> {
        get::<ForwardsUOffset<Int<'a>>>(&self.tab, Self::VT_INDEX_TYPE)
    }

    pub(crate) fn is_ordered(&self) -> bool {
        get::<bool>(&self.tab, Self::VT_IS_ORDERED).unwrap_or(false)
    }
}

impl Verifiable for DictionaryEncoding<'_> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i64>("id", Self::VT_ID, false)?
            .visit_field::<ForwardsUOffset<Int>>("indexType", Self::VT_INDEX_TYPE, false)?
            .visit_field::<bool>("isOrdered", Self::VT_IS_ORDERED, false)?
            .finish();
        Ok(())
    }
}

table_view!(Int);

impl Int<'_> {
    const VT_BIT_WIDTH: VOffsetT = 4;
    const VT_IS_SIGNED: VOffsetT = 6;

    pub(crate) fn bit_width(&self) -> i32 {
        get::<i32>(&self.tab, Self::VT_BIT_WIDTH).unwrap_or(0)
    }

    pub(crate) fn is_signed(&self) -> bool {
        get::<bool>(&self.tab, Self::VT_IS_SIGNED).unwrap_or(false)
    }
}

impl Verifiable for Int<'_> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i32>("bitWidth", Self::VT_BIT_WIDTH, false)?
            .visit_field::<bool>("is_signed", Self::VT_IS_SIGNED, false)?
            .finish();
        Ok(())
    }
}

table_view!(FloatingPoint);

impl FloatingPoint<'_> {
    const VT_PRECISION: VOffsetT = 4;

    /// `0` half, `1` single, `2` double.
    pub(crate) fn precision(&self) -> i16 {
        get::<i16>(&self.tab, Self::VT_PRECISION).unwrap_or(0)
    }
}

impl Verifiable for FloatingPoint<'_> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i16>("precision", Self::VT_PRECISION, false)?
            .finish();
        Ok(())
    }
}

table_view!(KeyValue);

impl<'a> KeyValue<'a> {
    const VT_KEY: VOffsetT = 4;
    const VT_VALUE: VOffsetT = 6;

    pub(crate) fn key(&self) -> Option<&'a str> {
        get::<ForwardsUOffset<&str>>(&self.tab, Self::VT_KEY)
    }

    pub(crate) fn value(&self) -> Option<&'a str> {
        get::<ForwardsUOffset<&str>>(&self.tab, Self::VT_VALUE)
    }
}

impl Verifiable for KeyValue<'_> {
    fn run_verifier(v: &mut Verifier, pos: usize) -> std::result::Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<&str>>("key", Self::VT_KEY, false)?
            .visit_field::<ForwardsUOffset<&str>>("value", Self::VT_VALUE, false)?
            .finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_SCHEMA: &[u8] = include_bytes!("../tests/fixtures/legacy_schema.bin");
    const LEGACY_BATCH: &[u8] = include_bytes!("../tests/fixtures/legacy_batch.bin");

    #[test]
    fn legacy_schema_fields_are_readable() {
        let message = message::<Buffer>(&LEGACY_SCHEMA[4..428]).unwrap();
        assert_eq!(message.version(), 2);
        let schema = message.header_as_schema().unwrap();
        assert!(message.header_as_record_batch().is_none());

        let fields = schema.fields().unwrap();
        let names: Vec<&str> = fields.iter().filter_map(|f| f.name()).collect();
        assert_eq!(names, ["idx", "name", "weight"]);
        assert_eq!(fields.get(0).type_as_int().unwrap().bit_width(), 32);
        assert_eq!(fields.get(1).dictionary().unwrap().id(), 1);
        assert_eq!(fields.get(2).type_as_floating_point().unwrap().precision(), 2);
    }

    #[test]
    fn legacy_buffers_use_the_wide_struct() {
        let message = message::<LegacyBuffer>(&LEGACY_BATCH[4..288]).unwrap();
        let batch = message.header_as_record_batch().unwrap();
        assert_eq!(batch.length(), 30);

        let buffers: Vec<(i64, i64)> = batch
            .buffers()
            .unwrap()
            .iter()
            .map(|b| (b.offset(), b.length()))
            .collect();
        assert_eq!(buffers[1], (0, 128));
        assert_eq!(buffers[5], (256, 256));
        assert!(batch.nodes().unwrap().iter().all(|n| n.length() == 30));
    }

    #[test]
    fn truncated_metadata_is_rejected() {
        let err = message::<Buffer>(&LEGACY_SCHEMA[4..64]).unwrap_err();
        assert!(matches!(err, IpcError::MalformedMetadata(_)));
        assert!(message::<Buffer>(&[1, 0]).is_err());
    }
}
