use std::{
    fs,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::Result;

/// Opens `output` for writing, or stdout when no path is given.
pub fn open(output: Option<&Path>) -> Result<Box<dyn Write>> {
    let dest: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(fs::File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    Ok(dest)
}
