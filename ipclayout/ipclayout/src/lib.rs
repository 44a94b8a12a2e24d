//! Arrow IPC parser session.
//!
//! A [`ParserSession`] decodes a schema buffer once, binds one record batch
//! held in a [`DataRegion`](ipclayout_core::DataRegion) and answers layout
//! queries until it is closed:
//!
//! ```rust,no_run
//! use ipclayout::ParserSession;
//!
//! # fn run(schema_bytes: &[u8], region: &[u8]) -> ipclayout::core::Result<()> {
//! let mut session = ParserSession::builder()
//!     .with_buffer_alignment(8)
//!     .open(schema_bytes);
//! session.bind_batch(region)?;
//! let weight = session.layout()?.fields[2].data;
//! let bytes = session.read_buffer(region, &weight)?;
//! # let _ = bytes;
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod report;
mod session;

pub use ipclayout_core as core;
pub use session::{ParserSession, SessionBuilder, SessionStateKind};
