use std::{io::Write, path::PathBuf};

use anyhow::Result;
use arrow::record_batch::RecordBatch;
use clap::Args;
use ipclayout_arrow::layout_to_record_batch;

use super::SessionOptions;
use crate::output;

#[derive(Args)]
pub struct DumpArgs {
    /// Path to the schema message stream
    schema: PathBuf,

    /// Path to the data region holding the record batch
    batch: PathBuf,

    /// Print at most this many rows
    #[arg(short, long)]
    limit: Option<usize>,

    /// Output file path (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    session: SessionOptions,
}

impl DumpArgs {
    pub fn run(self) -> Result<()> {
        let (session, region) = self.session.bind(&self.schema, &self.batch)?;
        let batch = layout_to_record_batch(&session, &region)?;

        let mut dest = output::open(self.output.as_deref())?;
        write_csv(&batch, self.limit, &mut dest)?;
        dest.flush()?;
        Ok(())
    }
}

/// Writes a header row and at most `limit` rows of `batch` as CSV.
fn write_csv<W: Write>(batch: &RecordBatch, limit: Option<usize>, dest: W) -> Result<()> {
    let rows = limit.map_or(batch.num_rows(), |limit| limit.min(batch.num_rows()));
    let mut csv_writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(dest);
    csv_writer.write(&batch.slice(0, rows))?;
    Ok(())
}
