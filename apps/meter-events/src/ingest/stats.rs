use super::{ProcessedSample, RejectedLine};
use crate::telemetry::Metric;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessStats {
    pub lines_read: u64,
    pub samples: u64,
    pub rejected_format: u64,
    pub rejected_chronology: u64,
    pub averaged: u64,
    pub time_gaps: u64,
    pub power_anomalies: u64,
    pub voltage_anomalies: u64,
    pub current_anomalies: u64,
}

impl ProcessStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_format + self.rejected_chronology
    }

    pub(super) fn record_processed(&mut self, processed: &ProcessedSample) {
        self.samples += 1;
        if processed.sample.averages().is_some() {
            self.averaged += 1;
        }
        if processed.time_gap {
            self.time_gaps += 1;
        }
        for metric in &processed.anomalies {
            match metric {
                Metric::Power => self.power_anomalies += 1,
                Metric::Voltage => self.voltage_anomalies += 1,
                Metric::Current => self.current_anomalies += 1,
            }
        }
    }

    pub(super) fn record_rejected(&mut self, rejected: &RejectedLine) {
        match rejected {
            RejectedLine::Format(_) => self.rejected_format += 1,
            RejectedLine::Chronology(_) => self.rejected_chronology += 1,
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            lines_read = self.lines_read,
            samples = self.samples,
            rejected_format = self.rejected_format,
            rejected_chronology = self.rejected_chronology,
            averaged = self.averaged,
            time_gaps = self.time_gaps,
            power_anomalies = self.power_anomalies,
            voltage_anomalies = self.voltage_anomalies,
            current_anomalies = self.current_anomalies,
            "meter stream finished"
        );
    }
}
