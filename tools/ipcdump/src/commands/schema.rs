use std::{io::Write, path::PathBuf};

use anyhow::Result;
use clap::Args;
use ipclayout::{core::format_schema, report::schema_report};

use super::SessionOptions;
use crate::output;

#[derive(Args)]
pub struct SchemaArgs {
    /// Path to the schema message stream
    input: PathBuf,

    /// Emit a JSON report instead of text
    #[arg(long)]
    json: bool,

    /// Output file path (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    session: SessionOptions,
}

impl SchemaArgs {
    pub fn run(self) -> Result<()> {
        let session = self.session.open(&self.input)?;
        let schema = session.schema()?;
        let dictionaries = session.dictionaries()?;

        let text = if self.json {
            serde_json::to_string_pretty(&schema_report(schema, dictionaries)?)?
        } else {
            let mut text = format_schema(schema)?;
            for dictionary in dictionaries {
                text.push_str(&format!(
                    "dictionary {}: {}\n",
                    dictionary.id,
                    dictionary.values().join(", ")
                ));
            }
            text.trim_end().to_string()
        };

        let mut dest = output::open(self.output.as_deref())?;
        writeln!(dest, "{text}")?;
        dest.flush()?;
        Ok(())
    }
}
