//! Parser session: one schema, its dictionaries and at most one bound batch.

use std::{fmt, mem, sync::Arc};

use bytes::Bytes;
use ipclayout_core::{
    BufferDescriptor, DataRegion, Dictionary, DictionaryRegistry, IpcError, ParserOptions,
    RecordBatchLayout, Result, Schema, checked_range, decode_schema_with, resolve_record_batch,
};
use tracing::{debug, warn};

/// Observable lifecycle state of a [`ParserSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStateKind {
    Opened,
    BatchBound,
    Failed,
    Closed,
}

impl fmt::Display for SessionStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opened => "opened",
            Self::BatchBound => "batch bound",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

enum SessionState {
    Opened {
        schema: Schema,
        dictionaries: DictionaryRegistry,
    },
    BatchBound {
        schema: Schema,
        dictionaries: DictionaryRegistry,
        layout: RecordBatchLayout,
    },
    Failed {
        error: IpcError,
    },
    Closed {
        error: Option<IpcError>,
    },
}

impl SessionState {
    fn kind(&self) -> SessionStateKind {
        match self {
            Self::Opened { .. } => SessionStateKind::Opened,
            Self::BatchBound { .. } => SessionStateKind::BatchBound,
            Self::Failed { .. } => SessionStateKind::Failed,
            Self::Closed { .. } => SessionStateKind::Closed,
        }
    }
}

/// Decodes a schema once and binds a single record batch against it.
///
/// Every decode or resolve error moves the session to a failed state; from
/// then on every operation except [`close`](Self::close) returns that same
/// error.
pub struct ParserSession {
    state: SessionState,
    options: ParserOptions,
}

/// Builder for configuring [`ParserSession`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionBuilder {
    options: ParserOptions,
}

impl ParserSession {
    /// Create a builder for [`ParserSession`].
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Open a session over `schema_bytes` with default options.
    ///
    /// Decoding failures do not return early; they leave the session failed.
    pub fn open(schema_bytes: &[u8]) -> Self {
        Self::builder().open(schema_bytes)
    }

    fn with_options(schema_bytes: &[u8], options: ParserOptions) -> Self {
        let state = match decode_schema_with(schema_bytes, &options) {
            Ok(decoded) => {
                debug!(
                    fields = decoded.schema.len(),
                    dictionaries = decoded.dictionaries.len(),
                    "session opened"
                );
                SessionState::Opened {
                    schema: decoded.schema,
                    dictionaries: decoded.dictionaries,
                }
            }
            Err(error) => {
                warn!(%error, "failed to decode schema");
                SessionState::Failed { error }
            }
        };
        Self { state, options }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Bind the first record batch found in `region` to the session schema.
    ///
    /// The region is only borrowed; later [`read_buffer`](Self::read_buffer)
    /// calls take it again.
    pub fn bind_batch<R: DataRegion + ?Sized>(&mut self, region: &R) -> Result<&RecordBatchLayout> {
        match &self.state {
            SessionState::Opened { .. } => {}
            SessionState::Failed { error } => return Err(error.clone()),
            state => {
                return Err(IpcError::InvalidState(format!(
                    "cannot bind a record batch to a {} session",
                    state.kind()
                )));
            }
        }

        let SessionState::Opened {
            schema,
            mut dictionaries,
        } = mem::replace(&mut self.state, SessionState::Closed { error: None })
        else {
            return Err(IpcError::InvalidState("session is not open".to_string()));
        };

        match resolve_record_batch(&schema, &mut dictionaries, region, &self.options) {
            Ok(layout) => {
                debug!(
                    rows = layout.row_count,
                    data_offset = layout.data_offset,
                    "record batch bound"
                );
                self.state = SessionState::BatchBound {
                    schema,
                    dictionaries,
                    layout,
                };
                self.layout()
            }
            Err(error) => {
                warn!(%error, "failed to bind record batch");
                self.state = SessionState::Failed {
                    error: error.clone(),
                };
                Err(error)
            }
        }
    }

    /// Release the schema, dictionaries and layout. Idempotent; the first
    /// recorded error stays available through [`error`](Self::error).
    pub fn close(&mut self) {
        let error = match &self.state {
            SessionState::Closed { .. } => return,
            SessionState::Failed { error } => Some(error.clone()),
            _ => None,
        };
        debug!(from = %self.state.kind(), "session closed");
        self.state = SessionState::Closed { error };
    }

    pub fn state(&self) -> SessionStateKind {
        self.state.kind()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SessionState::Failed { .. })
    }

    /// The error that failed this session, if any.
    pub fn error(&self) -> Option<&IpcError> {
        match &self.state {
            SessionState::Failed { error } => Some(error),
            SessionState::Closed { error } => error.as_ref(),
            _ => None,
        }
    }

    /// Message of [`error`](Self::error), or an empty string.
    pub fn error_message(&self) -> String {
        self.error().map(ToString::to_string).unwrap_or_default()
    }

    pub fn schema(&self) -> Result<&Schema> {
        match &self.state {
            SessionState::Opened { schema, .. } | SessionState::BatchBound { schema, .. } => {
                Ok(schema)
            }
            other => Err(Self::unavailable(other, "schema")),
        }
    }

    pub fn dictionaries(&self) -> Result<&DictionaryRegistry> {
        match &self.state {
            SessionState::Opened { dictionaries, .. }
            | SessionState::BatchBound { dictionaries, .. } => Ok(dictionaries),
            other => Err(Self::unavailable(other, "dictionaries")),
        }
    }

    pub fn dictionary(&self, id: i64) -> Result<&Arc<Dictionary>> {
        self.dictionaries()?.lookup(id)
    }

    pub fn layout(&self) -> Result<&RecordBatchLayout> {
        match &self.state {
            SessionState::BatchBound { layout, .. } => Ok(layout),
            other => Err(Self::unavailable(other, "record batch layout")),
        }
    }

    /// Absolute offset of the bound batch body inside its region.
    pub fn data_offset(&self) -> Result<usize> {
        Ok(self.layout()?.data_offset)
    }

    /// Copy the bytes of `buffer` (relative to the body start) out of `region`.
    ///
    /// `region` must be the region passed to [`bind_batch`](Self::bind_batch).
    pub fn read_buffer<R: DataRegion + ?Sized>(
        &self,
        region: &R,
        buffer: &BufferDescriptor,
    ) -> Result<Bytes> {
        let layout = self.layout()?;
        if region.size() != layout.region_size {
            return Err(IpcError::InvalidState(format!(
                "region of {} bytes is not the {} byte region the batch was bound to",
                region.size(),
                layout.region_size
            )));
        }
        let start = layout.data_offset.checked_add(buffer.offset).ok_or_else(|| {
            IpcError::BufferOutOfRange(format!("buffer {buffer} overflows the data region"))
        })?;
        let range = checked_range(start, buffer.length, layout.region_size)?;
        region.copy_to_host(range.start, range.len())
    }

    fn unavailable(state: &SessionState, what: &str) -> IpcError {
        match state {
            SessionState::Failed { error } => error.clone(),
            SessionState::Closed { .. } => {
                IpcError::InvalidState(format!("{what} requested from a closed session"))
            }
            _ => IpcError::InvalidState(format!(
                "{what} is not available in a {} session",
                state.kind()
            )),
        }
    }
}

impl fmt::Debug for ParserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserSession")
            .field("state", &self.state.kind())
            .field("options", &self.options)
            .field("error", &self.error())
            .finish()
    }
}

impl SessionBuilder {
    /// Largest metadata block accepted from a message prefix (default: 64 MiB).
    pub fn with_max_metadata_len(mut self, len: usize) -> Self {
        self.options.max_metadata_len = len;
        self
    }

    /// Require every buffer offset to be a multiple of `alignment` bytes.
    pub fn with_buffer_alignment(mut self, alignment: usize) -> Self {
        self.options.buffer_alignment = Some(alignment);
        self
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    /// Decode `schema_bytes` and open the session.
    pub fn open(self, schema_bytes: &[u8]) -> ParserSession {
        ParserSession::with_options(schema_bytes, self.options)
    }
}
