use crate::ingest::MeterProcessor;
use crate::render::{self, OutputFormat};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// Open the line source: the given file, or standard input when no path is set.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open input file {}", path.display()))?;
            tracing::info!(path = %path.display(), "reading telemetry from file");
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            tracing::info!("reading telemetry from stdin");
            Ok(Box::new(BufReader::new(io::stdin())))
        }
    }
}

/// Feed every line of `input` through `processor`, writing rendered output
/// after each line. Returns once the input is exhausted.
pub fn run_stream<R, W>(
    mut input: R,
    out: &mut W,
    processor: &mut MeterProcessor,
    format: OutputFormat,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = input
            .read_until(b'\n', &mut buf)
            .context("failed to read telemetry line")?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let outcome = processor.process_line(&line);
        render::write_outcome(out, &outcome, format).context("failed to write output")?;
        out.flush().context("failed to flush output")?;
    }
    Ok(())
}
