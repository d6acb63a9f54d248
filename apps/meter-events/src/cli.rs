use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "meter-events",
    version,
    about = "Process lines of meter telemetry data from stdin"
)]
pub struct Cli {
    /// Read lines from a dat file, not stdin
    #[arg(short = 'f', long)]
    pub filename: Option<PathBuf>,
    /// JSON settings file (falls back to METER_EVENTS_CONFIG_PATH)
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub window_ms: Option<u64>,
    #[arg(long)]
    pub gap_threshold_ms: Option<u64>,
    /// Emit one JSON object per output line
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_file_and_overrides() {
        let cli = Cli::try_parse_from([
            "meter-events",
            "-f",
            "meter.dat",
            "--window-ms",
            "3000",
            "--json",
        ])
        .expect("parsed");
        assert_eq!(cli.filename, Some(PathBuf::from("meter.dat")));
        assert_eq!(cli.window_ms, Some(3000));
        assert_eq!(cli.gap_threshold_ms, None);
        assert!(cli.json);
    }

    #[test]
    fn defaults_to_stdin() {
        let cli = Cli::try_parse_from(["meter-events"]).expect("parsed");
        assert!(cli.filename.is_none());
        assert!(!cli.json);
    }
}
