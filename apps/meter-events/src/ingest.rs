mod stats;
mod window;


pub use stats::ProcessStats;
pub use window::{
    ChronologyError, SampleWindow, WindowUpdate, DEFAULT_GAP_THRESHOLD_MS, DEFAULT_WINDOW_MS,
};

use crate::telemetry::{parse_line, FormatError, MeterSample, Metric};
use thiserror::Error;

/// Why a line was discarded. Both cases leave the window untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectedLine {
    #[error("malformed sample: {0}")]
    Format(#[from] FormatError),
    #[error("non-chronological sample: {0}")]
    Chronology(#[from] ChronologyError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSample {
    pub sample: MeterSample,
    pub time_gap: bool,
    pub anomalies: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Processed(ProcessedSample),
    Rejected(RejectedLine),
}

/// Per-stream processing state: the sample window and running counters.
#[derive(Debug, Default)]
pub struct MeterProcessor {
    window: SampleWindow,
    stats: ProcessStats,
}

impl MeterProcessor {
    pub fn new(window: SampleWindow) -> Self {
        Self {
            window,
            stats: ProcessStats::new(),
        }
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    pub fn stats(&self) -> &ProcessStats {
        &self.stats
    }

    pub fn process_line(&mut self, line: &str) -> LineOutcome {
        self.stats.lines_read += 1;
        match self.ingest_line(line) {
            Ok(processed) => {
                self.stats.record_processed(&processed);
                LineOutcome::Processed(processed)
            }
            Err(rejected) => {
                tracing::warn!(
                    line = self.stats.lines_read,
                    error = %rejected,
                    "skipping telemetry line"
                );
                self.stats.record_rejected(&rejected);
                LineOutcome::Rejected(rejected)
            }
        }
    }

    fn ingest_line(&mut self, line: &str) -> Result<ProcessedSample, RejectedLine> {
        let sample = parse_line(line)?;
        let update = self.window.ingest(sample)?;
        let anomalies = update.sample.point_anomalies();
        Ok(ProcessedSample {
            sample: update.sample,
            time_gap: update.time_gap,
            anomalies,
        })
    }
}
