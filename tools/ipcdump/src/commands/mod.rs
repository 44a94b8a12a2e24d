pub mod dump;
pub mod layout;
pub mod schema;

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use ipclayout::{ParserSession, SessionBuilder};
use tracing::debug;

/// Shared session options.
#[derive(clap::Args)]
pub struct SessionOptions {
    /// Largest metadata flatbuffer accepted, in bytes
    #[arg(long)]
    max_metadata_len: Option<usize>,

    /// Required alignment of body buffers, in bytes
    #[arg(long)]
    buffer_alignment: Option<usize>,
}

impl SessionOptions {
    fn builder(&self) -> SessionBuilder {
        let mut builder = ParserSession::builder();
        if let Some(len) = self.max_metadata_len {
            builder = builder.with_max_metadata_len(len);
        }
        if let Some(alignment) = self.buffer_alignment {
            builder = builder.with_buffer_alignment(alignment);
        }
        builder
    }

    /// Opens a session over the schema stream at `path`.
    pub fn open(&self, path: &Path) -> Result<ParserSession> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let session = self.builder().open(&bytes);
        if let Some(err) = session.error() {
            bail!("{}: {err}", path.display());
        }
        debug!(path = %path.display(), "opened schema stream");
        Ok(session)
    }

    /// Opens a session and binds the record batch stored at `batch`.
    pub fn bind(&self, schema: &Path, batch: &Path) -> Result<(ParserSession, Vec<u8>)> {
        let mut session = self.open(schema)?;
        let region = fs::read(batch).with_context(|| format!("reading {}", batch.display()))?;
        session
            .bind_batch(&region)
            .with_context(|| format!("binding {}", batch.display()))?;
        Ok((session, region))
    }
}
