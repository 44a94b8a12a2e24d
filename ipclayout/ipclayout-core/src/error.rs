//! Error taxonomy shared by the decoder, registry, resolver and session.

/// Error returned by every decode, resolve and session operation.
///
/// The type is `Clone` and `PartialEq` so a failed session can hand back the
/// exact error it first recorded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpcError {
    /// Framing, flatbuffer structure or header contents are invalid.
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    /// A field uses a type outside the supported flat subset.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// The message uses a format feature this parser does not implement
    /// (compression, delta dictionaries, big-endian data, ...).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Two dictionary batches share an id within one session.
    #[error("duplicate dictionary id {0}")]
    DuplicateDictionary(i64),

    /// A dictionary id is referenced but was never registered or declared.
    #[error("unknown dictionary id {0}")]
    UnknownDictionary(i64),

    /// Fields consume a different number of buffers than the header declares.
    #[error("buffer count mismatch: schema fields consume {consumed} buffers, record batch declares {declared}")]
    BufferCountMismatch { consumed: usize, declared: usize },

    /// A field node's length differs from the record batch row count.
    #[error("row count mismatch for field '{field}': node has {actual} rows, record batch declares {expected}")]
    RowCountMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// A buffer (or message body) extends past the bytes available to it.
    #[error("buffer out of range: {0}")]
    BufferOutOfRange(String),

    /// An operation was called in a session state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A [`DataRegion`](crate::DataRegion) failed to copy bytes to the host.
    #[error("data region transfer failed: {0}")]
    Transfer(String),
}

impl IpcError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedMetadata(detail.into())
    }

    pub(crate) fn out_of_range(detail: impl Into<String>) -> Self {
        Self::BufferOutOfRange(detail.into())
    }
}

pub type Result<T, E = IpcError> = std::result::Result<T, E>;
