//! Message framing: length prefixes, continuation markers and the `Message`
//! flatbuffer envelope.
//!
//! Two framings are accepted:
//! - legacy (metadata V3 writers): `u32 metadata_len`, metadata, body
//! - current: `0xFFFFFFFF`, `i32 metadata_len`, metadata, body
//!
//! A zero metadata length in either framing marks the end of the stream.

use std::fmt;

use bytes::{Buf, Bytes};
use tracing::debug;

use crate::{
    error::{IpcError, Result},
    fbs::{self, Buffer, BufferStruct},
    options::ParserOptions,
    region::DataRegion,
};

/// Marker that precedes the metadata length in the current framing.
pub const CONTINUATION_MARKER: u32 = 0xFFFF_FFFF;

/// Arrow metadata versions, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataVersion {
    V1,
    V2,
    V3,
    V4,
    V5,
}

impl MetadataVersion {
    fn from_raw(raw: i16) -> Result<Self> {
        match raw {
            0 => Ok(Self::V1),
            1 => Ok(Self::V2),
            2 => Ok(Self::V3),
            3 => Ok(Self::V4),
            4 => Ok(Self::V5),
            other => Err(IpcError::malformed(format!(
                "unknown metadata version {other}"
            ))),
        }
    }

    /// Width of one `Buffer` struct in a record batch header.
    ///
    /// Before V4 the struct carried a leading `page` field plus padding.
    pub fn buffer_struct_len(self) -> usize {
        if self < Self::V4 { 24 } else { 16 }
    }
}

impl fmt::Display for MetadataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V1 => "V1",
            Self::V2 => "V2",
            Self::V3 => "V3",
            Self::V4 => "V4",
            Self::V5 => "V5",
        };
        f.write_str(name)
    }
}

/// How a message's metadata length was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Legacy,
    Continuation,
}

impl Framing {
    pub fn prefix_len(self) -> usize {
        match self {
            Self::Legacy => 4,
            Self::Continuation => 8,
        }
    }
}

/// Result of decoding a message prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    EndOfStream,
    Message { framing: Framing, metadata_len: usize },
}

/// Decode the length prefix at the start of `bytes`.
///
/// `bytes` should hold up to the next eight bytes of the stream.
pub fn decode_prefix(bytes: &[u8]) -> Result<Prefix> {
    let mut cursor = bytes;
    let first = cursor
        .try_get_u32_le()
        .map_err(|_| IpcError::malformed("truncated message length prefix"))?;
    let (framing, raw_len) = if first == CONTINUATION_MARKER {
        let len = cursor.try_get_i32_le().map_err(|_| {
            IpcError::malformed("continuation marker is not followed by a metadata length")
        })?;
        (Framing::Continuation, len)
    } else {
        (Framing::Legacy, first as i32)
    };
    if raw_len == 0 {
        return Ok(Prefix::EndOfStream);
    }
    let metadata_len = usize::try_from(raw_len)
        .map_err(|_| IpcError::malformed(format!("negative metadata length {raw_len}")))?;
    Ok(Prefix::Message {
        framing,
        metadata_len,
    })
}

/// Kind of payload carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Schema,
    DictionaryBatch,
    RecordBatch,
}

impl MessageKind {
    fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            1 => Ok(Self::Schema),
            2 => Ok(Self::DictionaryBatch),
            3 => Ok(Self::RecordBatch),
            4 | 5 => Err(IpcError::UnsupportedFeature(
                "tensor messages are not supported".to_string(),
            )),
            0 => Err(IpcError::malformed("message has no header")),
            other => Err(IpcError::malformed(format!(
                "unknown message header type {other}"
            ))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schema => "schema",
            Self::DictionaryBatch => "dictionary batch",
            Self::RecordBatch => "record batch",
        };
        f.write_str(name)
    }
}

/// Location of one message inside a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFrame {
    /// Offset of the length prefix.
    pub offset: usize,
    pub framing: Framing,
    pub metadata_len: usize,
    pub body_len: usize,
}

impl MessageFrame {
    pub fn metadata_offset(&self) -> usize {
        self.offset + self.framing.prefix_len()
    }

    /// Offset of the first body byte; buffer descriptors are relative to it.
    pub fn body_offset(&self) -> usize {
        self.metadata_offset() + self.metadata_len
    }

    pub fn end(&self) -> usize {
        self.body_offset().saturating_add(self.body_len)
    }
}

/// Version, kind and body length of a `Message` envelope.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Envelope {
    pub(crate) version: MetadataVersion,
    pub(crate) kind: MessageKind,
    pub(crate) body_len: usize,
}

impl Envelope {
    pub(crate) fn parse(metadata: &[u8]) -> Result<Self> {
        // buffer struct width does not matter for the envelope fields
        let message = fbs::message::<Buffer>(metadata)?;
        let version = MetadataVersion::from_raw(message.version())?;
        if version < MetadataVersion::V3 {
            return Err(IpcError::UnsupportedFeature(format!(
                "metadata version {version} predates V3"
            )));
        }
        let kind = MessageKind::from_raw(message.header_type())?;
        let has_header = match kind {
            MessageKind::Schema => message.header_as_schema().is_some(),
            MessageKind::DictionaryBatch => message.header_as_dictionary_batch().is_some(),
            MessageKind::RecordBatch => message.header_as_record_batch().is_some(),
        };
        if !has_header {
            return Err(IpcError::malformed(format!(
                "{kind} message has no header table"
            )));
        }
        let raw_body_len = message.body_length();
        let body_len = usize::try_from(raw_body_len)
            .map_err(|_| IpcError::malformed(format!("invalid body length {raw_body_len}")))?;
        Ok(Self {
            version,
            kind,
            body_len,
        })
    }
}

/// A message whose prefix and metadata have been copied to the host.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub frame: MessageFrame,
    pub version: MetadataVersion,
    pub kind: MessageKind,
    metadata: Bytes,
}

impl RawMessage {
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// Whether record batch headers use the 24-byte pre-V4 `Buffer` struct.
    pub(crate) fn uses_legacy_buffers(&self) -> bool {
        self.version < MetadataVersion::V4
    }

    pub(crate) fn view<B: BufferStruct>(&self) -> Result<fbs::Message<'_, B>> {
        fbs::message(&self.metadata)
    }
}

/// Sequential reader over the messages stored in a [`DataRegion`].
///
/// Only prefixes and metadata are copied to the host; bodies are skipped.
pub struct MessageReader<'r, R: DataRegion + ?Sized> {
    region: &'r R,
    position: usize,
    max_metadata_len: usize,
    finished: bool,
}

impl<'r, R: DataRegion + ?Sized> MessageReader<'r, R> {
    pub fn new(region: &'r R, options: &ParserOptions) -> Self {
        Self {
            region,
            position: 0,
            max_metadata_len: options.max_metadata_len,
            finished: false,
        }
    }

    /// Read the next message, or `None` at end of stream / end of region.
    pub fn next_message(&mut self) -> Result<Option<RawMessage>> {
        let size = self.region.size();
        if self.finished || size.saturating_sub(self.position) < 4 {
            self.finished = true;
            return Ok(None);
        }
        let offset = self.position;
        let remaining = size - offset;
        let prefix = self.region.copy_to_host(offset, remaining.min(8))?;
        let (framing, metadata_len) = match decode_prefix(&prefix)? {
            Prefix::EndOfStream => {
                debug!(offset, "end of stream marker");
                self.finished = true;
                return Ok(None);
            }
            Prefix::Message {
                framing,
                metadata_len,
            } => (framing, metadata_len),
        };
        if metadata_len < 4 {
            return Err(IpcError::malformed(format!(
                "metadata length {metadata_len} at offset {offset} is too short for a flatbuffer"
            )));
        }
        if metadata_len > self.max_metadata_len {
            return Err(IpcError::malformed(format!(
                "metadata length {metadata_len} at offset {offset} exceeds the limit of {} bytes",
                self.max_metadata_len
            )));
        }
        let available = remaining - framing.prefix_len().min(remaining);
        if metadata_len > available {
            return Err(IpcError::malformed(format!(
                "metadata length {metadata_len} at offset {offset} exceeds the {available} bytes that follow the prefix"
            )));
        }
        let metadata = self
            .region
            .copy_to_host(offset + framing.prefix_len(), metadata_len)?;
        let envelope = Envelope::parse(&metadata)?;
        let frame = MessageFrame {
            offset,
            framing,
            metadata_len,
            body_len: envelope.body_len,
        };
        let (version, kind) = (envelope.version, envelope.kind);
        debug!(
            offset,
            %version,
            %kind,
            metadata_len,
            body_len = frame.body_len,
            "read ipc message"
        );
        self.position = frame.end();
        Ok(Some(RawMessage {
            frame,
            version,
            kind,
            metadata,
        }))
    }
}

/// List the frames of every message in `bytes`, up to the end-of-stream marker.
pub fn read_frames(bytes: &[u8]) -> Result<Vec<MessageFrame>> {
    let mut reader = MessageReader::new(bytes, &ParserOptions::default());
    let mut frames = Vec::new();
    while let Some(message) = reader.next_message()? {
        frames.push(message.frame);
    }
    Ok(frames)
}
