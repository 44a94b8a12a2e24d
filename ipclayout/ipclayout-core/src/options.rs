/// Default upper bound for a single flatbuffer metadata block (64 MiB).
pub const DEFAULT_MAX_METADATA_LEN: usize = 64 * 1024 * 1024;

/// Limits and checks applied while decoding metadata and resolving layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserOptions {
    /// Largest metadata length accepted from a message prefix.
    pub max_metadata_len: usize,
    /// When set, every buffer offset must be a multiple of this many bytes.
    pub buffer_alignment: Option<usize>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            max_metadata_len: DEFAULT_MAX_METADATA_LEN,
            buffer_alignment: None,
        }
    }
}
