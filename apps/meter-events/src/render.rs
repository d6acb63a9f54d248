use crate::ingest::{LineOutcome, ProcessedSample};
use crate::telemetry::Metric;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::str::FromStr;

pub const TIME_GAP_NOTICE: &str = "* Anomaly - time gap detected";
pub const SKIP_NOTICE: &str = "* Skipping non-chronological or malformed Sample...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format {other:?} (expected text or json)")),
        }
    }
}

pub fn anomaly_notice(metric: Metric) -> String {
    format!("* Anomaly - {} problem detected", metric.label())
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum JsonEvent {
    TimeGap,
    Sample {
        timestamp: String,
        power: f64,
        voltage: f64,
        current: f64,
        power_avg: Option<f64>,
        voltage_avg: Option<f64>,
        current_avg: Option<f64>,
    },
    Anomaly {
        metric: Metric,
    },
    Skipped {
        reason: String,
    },
}

/// Write every output line for one processed input line: the gap notice,
/// then the sample, then its point anomalies.
pub fn write_outcome<W: Write>(
    out: &mut W,
    outcome: &LineOutcome,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Text => write_text(out, outcome),
        OutputFormat::Json => write_json(out, outcome),
    }
}

fn write_text<W: Write>(out: &mut W, outcome: &LineOutcome) -> io::Result<()> {
    let processed = match outcome {
        LineOutcome::Processed(processed) => processed,
        LineOutcome::Rejected(_) => return writeln!(out, "{SKIP_NOTICE}"),
    };
    if processed.time_gap {
        writeln!(out, "{TIME_GAP_NOTICE}")?;
    }
    writeln!(out, "{}", processed.sample)?;
    for metric in &processed.anomalies {
        writeln!(out, "{}", anomaly_notice(*metric))?;
    }
    Ok(())
}

fn write_json<W: Write>(out: &mut W, outcome: &LineOutcome) -> io::Result<()> {
    for event in json_events(outcome) {
        serde_json::to_writer(&mut *out, &event)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn json_events(outcome: &LineOutcome) -> Vec<JsonEvent> {
    let processed: &ProcessedSample = match outcome {
        LineOutcome::Processed(processed) => processed,
        LineOutcome::Rejected(err) => {
            return vec![JsonEvent::Skipped {
                reason: err.to_string(),
            }]
        }
    };

    let mut events = Vec::with_capacity(2 + processed.anomalies.len());
    if processed.time_gap {
        events.push(JsonEvent::TimeGap);
    }
    let sample = &processed.sample;
    events.push(JsonEvent::Sample {
        timestamp: sample.render_timestamp(),
        power: sample.power(),
        voltage: sample.voltage(),
        current: sample.current(),
        power_avg: sample.average(Metric::Power),
        voltage_avg: sample.average(Metric::Voltage),
        current_avg: sample.average(Metric::Current),
    });
    events.extend(
        processed
            .anomalies
            .iter()
            .map(|metric| JsonEvent::Anomaly { metric: *metric }),
    );
    events
}
