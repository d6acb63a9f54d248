use anyhow::Result;
use clap::Parser;
use meter_events::cli::Cli;
use meter_events::config::Config;
use meter_events::ingest::{MeterProcessor, SampleWindow};
use meter_events::pipeline;
use meter_events::render::OutputFormat;
use std::io;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,meter_events=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let mut config = Config::from_env(cli.config.as_deref())?;
    if let Some(window_ms) = cli.window_ms {
        config.window_ms = window_ms;
    }
    if let Some(gap_threshold_ms) = cli.gap_threshold_ms {
        config.gap_threshold_ms = gap_threshold_ms;
    }
    if cli.json {
        config.output = OutputFormat::Json;
    }
    config.validate()?;
    tracing::debug!(
        window_ms = config.window_ms,
        gap_threshold_ms = config.gap_threshold_ms,
        output = ?config.output,
        "meter-events configured"
    );

    let input = pipeline::open_input(cli.filename.as_deref())?;
    let mut processor = MeterProcessor::new(SampleWindow::new(
        config.window_duration(),
        config.gap_threshold(),
    ));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = pipeline::run_stream(input, &mut out, &mut processor, config.output);
    processor.stats().log_summary();
    result
}
