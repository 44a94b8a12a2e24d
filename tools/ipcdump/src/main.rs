mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{dump::DumpArgs, layout::LayoutArgs, schema::SchemaArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ipcdump", about = "Inspect Arrow IPC schema and record-batch messages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema and dictionaries of a schema message stream
    Schema(SchemaArgs),
    /// Print the buffer layout of a record batch
    Layout(LayoutArgs),
    /// Print the rows of a record batch as CSV
    Dump(DumpArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Schema(args) => args.run(),
        Commands::Layout(args) => args.run(),
        Commands::Dump(args) => args.run(),
    }
}
