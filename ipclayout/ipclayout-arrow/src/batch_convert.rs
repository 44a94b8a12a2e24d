use std::sync::Arc;

use arrow::{
    array::{
        ArrayRef, BinaryArray, BooleanArray, DictionaryArray, PrimitiveArray, StringArray,
    },
    buffer::{BooleanBuffer, Buffer, NullBuffer, OffsetBuffer, ScalarBuffer},
    datatypes::{
        ArrowDictionaryKeyType, ArrowPrimitiveType, Float32Type, Float64Type, Int8Type,
        Int16Type, Int32Type, Int64Type, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
    },
    record_batch::RecordBatch,
};
use bytes::{Buf, Bytes};
use ipclayout::ParserSession;
use ipclayout_core::{
    BufferDescriptor, DataRegion, DataType, Dictionary, Field, FieldLayout, FloatPrecision,
    IntType,
};
use tracing::debug;

use crate::{error::ArrowConvertError, schema_convert::schema_to_arrow_schema};

/// Materializes the batch bound to `session` as an Arrow `RecordBatch`.
///
/// Every buffer is copied out of `region`, which must be the region the batch
/// was bound from. Dictionary columns are resolved against the session's
/// registry.
pub fn layout_to_record_batch<R: DataRegion + ?Sized>(
    session: &ParserSession,
    region: &R,
) -> Result<RecordBatch, ArrowConvertError> {
    let schema = session.schema()?;
    let layout = session.layout()?;

    let mut columns = Vec::with_capacity(layout.fields.len());
    for (field, field_layout) in schema.iter().zip(&layout.fields) {
        let column = ColumnReader {
            session,
            region,
            field,
            layout: field_layout,
        };
        columns.push(column.read()?);
    }

    let arrow_schema = Arc::new(schema_to_arrow_schema(schema));
    let batch = RecordBatch::try_new(arrow_schema, columns)?;
    debug!(rows = batch.num_rows(), columns = batch.num_columns(), "materialized record batch");
    Ok(batch)
}

struct ColumnReader<'a, R: DataRegion + ?Sized> {
    session: &'a ParserSession,
    region: &'a R,
    field: &'a Field,
    layout: &'a FieldLayout,
}

impl<R: DataRegion + ?Sized> ColumnReader<'_, R> {
    fn read(&self) -> Result<ArrayRef, ArrowConvertError> {
        let nulls = self.nulls()?;
        if let Some(encoding) = self.field.dictionary {
            let dictionary = self.session.dictionary(encoding.id)?;
            return self.dictionary_column(encoding.index_type, dictionary, nulls);
        }

        let array: ArrayRef = match self.field.data_type {
            DataType::Int(int) => match (int.bit_width, int.signed) {
                (8, true) => Arc::new(self.primitive::<Int8Type>(nulls)?),
                (16, true) => Arc::new(self.primitive::<Int16Type>(nulls)?),
                (32, true) => Arc::new(self.primitive::<Int32Type>(nulls)?),
                (64, true) => Arc::new(self.primitive::<Int64Type>(nulls)?),
                (8, false) => Arc::new(self.primitive::<UInt8Type>(nulls)?),
                (16, false) => Arc::new(self.primitive::<UInt16Type>(nulls)?),
                (32, false) => Arc::new(self.primitive::<UInt32Type>(nulls)?),
                _ => Arc::new(self.primitive::<UInt64Type>(nulls)?),
            },
            DataType::Float(FloatPrecision::Single) => {
                Arc::new(self.primitive::<Float32Type>(nulls)?)
            }
            DataType::Float(FloatPrecision::Double) => {
                Arc::new(self.primitive::<Float64Type>(nulls)?)
            }
            DataType::Bool => {
                let rows = self.layout.row_count;
                let data = self.read_exact(&self.layout.data, "data", rows.div_ceil(8))?;
                let values = BooleanBuffer::new(Buffer::from(data), 0, rows);
                Arc::new(BooleanArray::new(values, nulls))
            }
            DataType::Utf8 => {
                let (offsets, values) = self.variable_length()?;
                Arc::new(StringArray::try_new(offsets, values, nulls)?)
            }
            DataType::Binary => {
                let (offsets, values) = self.variable_length()?;
                Arc::new(BinaryArray::try_new(offsets, values, nulls)?)
            }
        };
        Ok(array)
    }

    /// Copy `buffer` and check it holds at least `needed` bytes.
    fn read_exact(
        &self,
        buffer: &BufferDescriptor,
        name: &'static str,
        needed: usize,
    ) -> Result<Bytes, ArrowConvertError> {
        let bytes = self.session.read_buffer(self.region, buffer)?;
        if bytes.len() < needed {
            return Err(ArrowConvertError::ShortBuffer {
                field: self.field.name.clone(),
                buffer: name,
                expected: needed,
                actual: bytes.len(),
            });
        }
        Ok(bytes)
    }

    fn nulls(&self) -> Result<Option<NullBuffer>, ArrowConvertError> {
        let Some(validity) = self.layout.validity else {
            return Ok(None);
        };
        let rows = self.layout.row_count;
        let bits = self.read_exact(&validity, "validity", rows.div_ceil(8))?;
        Ok(Some(NullBuffer::new(BooleanBuffer::new(
            Buffer::from(bits),
            0,
            rows,
        ))))
    }

    fn primitive<T>(
        &self,
        nulls: Option<NullBuffer>,
    ) -> Result<PrimitiveArray<T>, ArrowConvertError>
    where
        T: ArrowPrimitiveType,
        T::Native: ReadLe,
    {
        let rows = self.layout.row_count;
        let width = size_of::<T::Native>();
        // row counts come from the header; saturate so oversized ones fail as short buffers
        let data = self.read_exact(&self.layout.data, "data", rows.saturating_mul(width))?;
        let mut cursor = &data[..];
        let values: Vec<T::Native> = (0..rows)
            .map(|_| <T::Native as ReadLe>::read_le(&mut cursor))
            .collect();
        Ok(PrimitiveArray::<T>::try_new(ScalarBuffer::from(values), nulls)?)
    }

    fn variable_length(&self) -> Result<(OffsetBuffer<i32>, Buffer), ArrowConvertError> {
        let rows = self.layout.row_count;
        let values = self.session.read_buffer(self.region, &self.layout.data)?;
        let Some(offsets) = self.layout.offsets else {
            return Err(self.invalid_offsets("offsets buffer is missing"));
        };
        if rows == 0 && offsets.is_empty() {
            return Ok((OffsetBuffer::new_empty(), Buffer::from(values)));
        }

        let needed = rows.saturating_add(1).saturating_mul(4);
        let raw = self.read_exact(&offsets, "offsets", needed)?;
        let mut cursor = &raw[..];
        let offsets: Vec<i32> = (0..=rows).map(|_| cursor.get_i32_le()).collect();
        if offsets[0] < 0 {
            return Err(self.invalid_offsets("first offset is negative"));
        }
        if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(self.invalid_offsets("offsets decrease"));
        }
        Ok((
            OffsetBuffer::new(ScalarBuffer::from(offsets)),
            Buffer::from(values),
        ))
    }

    fn invalid_offsets(&self, reason: &str) -> ArrowConvertError {
        ArrowConvertError::InvalidOffsets {
            field: self.field.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn dictionary_column(
        &self,
        index_type: IntType,
        dictionary: &Dictionary,
        nulls: Option<NullBuffer>,
    ) -> Result<ArrayRef, ArrowConvertError> {
        let values: ArrayRef = Arc::new(StringArray::from_iter_values(dictionary.values()));
        let array: ArrayRef = match (index_type.bit_width, index_type.signed) {
            (8, true) => self.dictionary::<Int8Type>(nulls, values)?,
            (16, true) => self.dictionary::<Int16Type>(nulls, values)?,
            (32, true) => self.dictionary::<Int32Type>(nulls, values)?,
            (64, true) => self.dictionary::<Int64Type>(nulls, values)?,
            (8, false) => self.dictionary::<UInt8Type>(nulls, values)?,
            (16, false) => self.dictionary::<UInt16Type>(nulls, values)?,
            (32, false) => self.dictionary::<UInt32Type>(nulls, values)?,
            _ => self.dictionary::<UInt64Type>(nulls, values)?,
        };
        Ok(array)
    }

    fn dictionary<K>(
        &self,
        nulls: Option<NullBuffer>,
        values: ArrayRef,
    ) -> Result<ArrayRef, ArrowConvertError>
    where
        K: ArrowDictionaryKeyType,
        K::Native: ReadLe,
    {
        let keys = self.primitive::<K>(nulls)?;
        Ok(Arc::new(DictionaryArray::<K>::try_new(keys, values)?))
    }
}

/// Little-endian decoding of one fixed-width value.
trait ReadLe: Sized {
    fn read_le(cursor: &mut &[u8]) -> Self;
}

macro_rules! impl_read_le {
    ($($ty:ty => $get:ident),* $(,)?) => {
        $(
            impl ReadLe for $ty {
                fn read_le(cursor: &mut &[u8]) -> Self {
                    cursor.$get()
                }
            }
        )*
    };
}

impl_read_le!(
    i8 => get_i8,
    i16 => get_i16_le,
    i32 => get_i32_le,
    i64 => get_i64_le,
    u8 => get_u8,
    u16 => get_u16_le,
    u32 => get_u32_le,
    u64 => get_u64_le,
    f32 => get_f32_le,
    f64 => get_f64_le,
);
