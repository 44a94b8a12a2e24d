//! Arrow IPC metadata decoding and record-batch layout resolution.
//!
//! This crate turns the flatbuffer metadata of Arrow IPC messages into plain
//! Rust structures:
//! - [`decode_schema`] decodes a schema message and the dictionary batches
//!   that follow it into a [`Schema`] and a [`DictionaryRegistry`].
//! - [`resolve_record_batch`] binds a record batch stored in a [`DataRegion`]
//!   to that schema and reports every column's buffers as
//!   `(offset, length)` pairs relative to the body start.
//!
//! Record batch bodies are never read; only message prefixes, metadata and
//! dictionary bodies are copied to the host.
//!
//! # Typical Flow
//! ```rust,no_run
//! use ipclayout_core::{ParserOptions, decode_schema, resolve_record_batch};
//!
//! # fn run(schema_bytes: &[u8], batch: &[u8]) -> ipclayout_core::Result<()> {
//! let mut decoded = decode_schema(schema_bytes)?;
//! let layout = resolve_record_batch(
//!     &decoded.schema,
//!     &mut decoded.dictionaries,
//!     batch,
//!     &ParserOptions::default(),
//! )?;
//! for field in &layout.fields {
//!     println!("{} data at {}", field.name, layout.data_offset + field.data.offset);
//! }
//! # Ok(())
//! # }
//! ```

mod dictionary;
mod error;
mod fbs;
mod layout;
mod message;
mod metadata;
mod options;
mod region;
mod schema;

pub use dictionary::{Dictionary, DictionaryRegistry, read_dictionary_batch};
pub use error::{IpcError, Result};
pub use layout::{
    BodyPlacement, BufferDescriptor, FieldLayout, FieldNode, RecordBatchHeader, RecordBatchLayout,
    resolve_header, resolve_record_batch,
};
pub use message::{
    CONTINUATION_MARKER, Framing, MessageFrame, MessageKind, MessageReader, MetadataVersion,
    Prefix, RawMessage, decode_prefix, read_frames,
};
pub use metadata::{DecodedSchema, decode_schema, decode_schema_with};
pub use options::{DEFAULT_MAX_METADATA_LEN, ParserOptions};
pub use region::{DataRegion, checked_range};
pub use schema::{
    DataType, DictionaryEncoding, Endianness, Field, FloatPrecision, IntType, Schema, TypeTag,
    format_schema,
};
