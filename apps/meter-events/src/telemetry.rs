use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::num::ParseFloatError;
use std::str::FromStr;
use thiserror::Error;

pub const FIELD_SEPARATOR: &str = ", ";
const FIELD_COUNT: usize = 4;

/// Nominal 480 V with a ±5 V tolerance band.
pub const VOLTAGE_MIN: f64 = 475.0;
pub const VOLTAGE_MAX: f64 = 485.0;

/// Calendar years a timestamp may fall in.
const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

const TIMESTAMP_RENDER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Power,
    Voltage,
    Current,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Power, Metric::Voltage, Metric::Current];

    /// Short unit label used in anomaly notices.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Power => "kW",
            Metric::Voltage => "V",
            Metric::Current => "I",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::Power => "power",
            Metric::Voltage => "voltage",
            Metric::Current => "current",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0:?} is not a valid averaging field")]
pub struct InvalidFieldError(pub String);

impl FromStr for Metric {
    type Err = InvalidFieldError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "power" | "kW" => Ok(Metric::Power),
            "voltage" | "V" => Ok(Metric::Voltage),
            "current" | "I" => Ok(Metric::Current),
            other => Err(InvalidFieldError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("field count = {0}, must be 4")]
    FieldCount(usize),
    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
    #[error("timestamp {value:?} is outside years 1 to 9999")]
    OutOfRange { value: String },
    #[error("invalid {metric} value {value:?}: {source}")]
    Number {
        metric: Metric,
        value: String,
        source: ParseFloatError,
    },
    #[error("{metric} value {value:?} is not finite")]
    NonFinite { metric: Metric, value: String },
}

/// Trailing averages attached to a sample whose window was contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowAverages {
    pub power: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
}

impl WindowAverages {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Power => self.power,
            Metric::Voltage => self.voltage,
            Metric::Current => self.current,
        }
    }
}

/// One validated power-meter observation.
///
/// The measured fields are fixed at construction. Window averages start out
/// absent and can be attached exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSample {
    timestamp: NaiveDateTime,
    power: f64,
    voltage: f64,
    current: f64,
    averages: Option<WindowAverages>,
}

impl MeterSample {
    pub fn new(timestamp: NaiveDateTime, power: f64, voltage: f64, current: f64) -> Self {
        Self {
            timestamp,
            power,
            voltage,
            current,
            averages: None,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Power => self.power,
            Metric::Voltage => self.voltage,
            Metric::Current => self.current,
        }
    }

    pub fn averages(&self) -> Option<&WindowAverages> {
        self.averages.as_ref()
    }

    pub fn average(&self, metric: Metric) -> Option<f64> {
        self.averages.and_then(|avg| avg.get(metric))
    }

    /// Attach window averages. Returns `false` and leaves the sample untouched
    /// when averages were already attached.
    pub fn attach_averages(&mut self, averages: WindowAverages) -> bool {
        if self.averages.is_some() {
            return false;
        }
        self.averages = Some(averages);
        true
    }

    pub fn has_power_anomaly(&self) -> bool {
        self.power < 0.0
    }

    pub fn has_voltage_anomaly(&self) -> bool {
        self.voltage < VOLTAGE_MIN || self.voltage > VOLTAGE_MAX
    }

    pub fn has_current_anomaly(&self) -> bool {
        self.current < 0.0
    }

    pub fn has_anomaly(&self, metric: Metric) -> bool {
        match metric {
            Metric::Power => self.has_power_anomaly(),
            Metric::Voltage => self.has_voltage_anomaly(),
            Metric::Current => self.has_current_anomaly(),
        }
    }

    pub fn has_point_anomaly(&self) -> bool {
        Metric::ALL.into_iter().any(|metric| self.has_anomaly(metric))
    }

    /// Point anomalies present on this sample, in power, voltage, current order.
    pub fn point_anomalies(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|metric| self.has_anomaly(*metric))
            .collect()
    }

    pub fn render_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_RENDER_FORMAT).to_string()
    }
}

impl FromStr for MeterSample {
    type Err = FormatError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        parse_line(line)
    }
}

impl fmt::Display for MeterSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {:.3}, {:.3}, {:.3}, ",
            self.render_timestamp(),
            self.power,
            self.voltage,
            self.current
        )?;
        let averages = self.averages.unwrap_or_default();
        write_slot(f, averages.power)?;
        f.write_str(FIELD_SEPARATOR)?;
        write_slot(f, averages.voltage)?;
        f.write_str(FIELD_SEPARATOR)?;
        write_slot(f, averages.current)
    }
}

fn write_slot(f: &mut fmt::Formatter<'_>, value: Option<f64>) -> fmt::Result {
    match value {
        Some(value) => write!(f, "{value:.3}"),
        None => Ok(()),
    }
}

/// Parse one telemetry line: `<timestamp>, <power>, <voltage>, <current>`.
pub fn parse_line(line: &str) -> Result<MeterSample, FormatError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(FormatError::FieldCount(fields.len()));
    }

    let timestamp = parse_timestamp(fields[0]).map_err(|source| FormatError::Timestamp {
        value: fields[0].to_string(),
        source,
    })?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&timestamp.year()) {
        return Err(FormatError::OutOfRange {
            value: fields[0].to_string(),
        });
    }
    let power = parse_value(Metric::Power, fields[1])?;
    let voltage = parse_value(Metric::Voltage, fields[2])?;
    let current = parse_value(Metric::Current, fields[3])?;

    Ok(MeterSample::new(timestamp, power, voltage, current))
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    let raw = raw.trim();
    let first_err = match NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMATS[0]) {
        Ok(ts) => return Ok(ts),
        Err(err) => err,
    };
    for format in &TIMESTAMP_FORMATS[1..] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    if let Some(ts) = NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(ts);
    }
    Err(first_err)
}

fn parse_value(metric: Metric, raw: &str) -> Result<f64, FormatError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|source| FormatError::Number {
            metric,
            value: raw.to_string(),
            source,
        })?;
    if !value.is_finite() {
        return Err(FormatError::NonFinite {
            metric,
            value: raw.to_string(),
        });
    }
    Ok(value)
}
