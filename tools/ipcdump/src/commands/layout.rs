use std::{io::Write, path::PathBuf};

use anyhow::Result;
use clap::Args;
use ipclayout::report::layout_report;

use super::SessionOptions;
use crate::output;

#[derive(Args)]
pub struct LayoutArgs {
    /// Path to the schema message stream
    schema: PathBuf,

    /// Path to the data region holding the record batch
    batch: PathBuf,

    /// Emit a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// Output file path (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    session: SessionOptions,
}

impl LayoutArgs {
    pub fn run(self) -> Result<()> {
        let (session, _region) = self.session.bind(&self.schema, &self.batch)?;
        let layout = session.layout()?;
        let mut dest = output::open(self.output.as_deref())?;

        if self.json {
            let report = layout_report(layout)?;
            writeln!(dest, "{}", serde_json::to_string_pretty(&report)?)?;
        } else {
            writeln!(
                dest,
                "rows={} body=[{}, +{})",
                layout.row_count, layout.data_offset, layout.body_length
            )?;
            for field in &layout.fields {
                write!(
                    dest,
                    "{}: {} nulls={} data={}",
                    field.name,
                    field.type_tag.name(),
                    field.null_count,
                    field.data
                )?;
                if let Some(validity) = field.validity {
                    write!(dest, " validity={validity}")?;
                }
                if let Some(offsets) = field.offsets {
                    write!(dest, " offsets={offsets}")?;
                }
                if let Some(id) = field.dictionary_id {
                    write!(dest, " dictionary={id}")?;
                }
                writeln!(dest)?;
            }
        }
        dest.flush()?;
        Ok(())
    }
}
