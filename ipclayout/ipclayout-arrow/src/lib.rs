//! Arrow integration layer for `ipclayout`.
//!
//! This crate focuses on two responsibilities:
//! 1. Convert a decoded IPC [`Schema`](ipclayout_core::Schema) to an Arrow `Schema`.
//! 2. Copy a bound record batch out of its data region into an Arrow
//!    `RecordBatch`, resolving dictionary columns on the way.
//!
//! # Typical Flow
//! ```rust,no_run
//! use ipclayout::ParserSession;
//! use ipclayout_arrow::layout_to_record_batch;
//!
//! # fn run(schema_bytes: &[u8], region: &[u8]) -> Result<(), ipclayout_arrow::ArrowConvertError> {
//! let mut session = ParserSession::open(schema_bytes);
//! session.bind_batch(region)?;
//! let batch = layout_to_record_batch(&session, region)?;
//! println!("{} rows", batch.num_rows());
//! # Ok(())
//! # }
//! ```
pub mod batch_convert;
pub mod error;
pub mod schema_convert;

/// Re-export of [`batch_convert::layout_to_record_batch`].
pub use batch_convert::layout_to_record_batch;
/// Re-export of [`error::ArrowConvertError`].
pub use error::ArrowConvertError;
/// Re-export of [`schema_convert::schema_to_arrow_schema`].
pub use schema_convert::schema_to_arrow_schema;
