use arrow::error::ArrowError;
use ipclayout_core::IpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArrowConvertError {
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error(transparent)]
    Arrow(#[from] ArrowError),
    /// A buffer is too short for the rows its field declares.
    #[error("{buffer} buffer of field '{field}' holds {actual} bytes, {expected} are needed")]
    ShortBuffer {
        field: String,
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("invalid offsets in field '{field}': {reason}")]
    InvalidOffsets { field: String, reason: String },
}
