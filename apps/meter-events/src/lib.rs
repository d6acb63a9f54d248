pub mod cli;
pub mod config;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod telemetry;

pub use ingest::{LineOutcome, MeterProcessor, ProcessStats, SampleWindow};
pub use telemetry::{parse_line, MeterSample, Metric};
