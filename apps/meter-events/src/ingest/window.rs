use crate::telemetry::{InvalidFieldError, MeterSample, Metric, WindowAverages};
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use std::collections::VecDeque;
use thiserror::Error;

pub const DEFAULT_WINDOW_MS: i64 = 5_000;
pub const DEFAULT_GAP_THRESHOLD_MS: i64 = 1_500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sample at {sample} precedes window tail at {tail}")]
pub struct ChronologyError {
    pub sample: NaiveDateTime,
    pub tail: NaiveDateTime,
}

#[derive(Clone, Debug)]
struct WindowConfig {
    duration: ChronoDuration,
    gap_threshold: ChronoDuration,
}

/// Result of ingesting one sample into the window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowUpdate {
    /// Copy of the buffered sample, with averages attached when the window was contiguous.
    pub sample: MeterSample,
    /// The sample arrived more than the gap threshold after its predecessor.
    pub time_gap: bool,
    pub contiguous: bool,
}

/// Trailing window of samples covering a fixed duration, oldest first.
#[derive(Debug)]
pub struct SampleWindow {
    config: WindowConfig,
    buffer: VecDeque<MeterSample>,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(
            ChronoDuration::milliseconds(DEFAULT_WINDOW_MS),
            ChronoDuration::milliseconds(DEFAULT_GAP_THRESHOLD_MS),
        )
    }
}

impl SampleWindow {
    pub fn new(duration: ChronoDuration, gap_threshold: ChronoDuration) -> Self {
        Self {
            config: WindowConfig {
                duration: duration.max(ChronoDuration::milliseconds(1)),
                gap_threshold: gap_threshold.max(ChronoDuration::zero()),
            },
            buffer: VecDeque::new(),
        }
    }

    pub fn duration(&self) -> ChronoDuration {
        self.config.duration
    }

    pub fn gap_threshold(&self) -> ChronoDuration {
        self.config.gap_threshold
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeterSample> {
        self.buffer.iter()
    }

    pub fn latest(&self) -> Option<&MeterSample> {
        self.buffer.back()
    }

    /// Append a sample as the new tail and evict everything older than
    /// `duration` relative to it. A sample earlier than the current tail is
    /// refused and the window is left as it was.
    pub fn append(&mut self, sample: MeterSample) -> Result<(), ChronologyError> {
        if let Some(tail) = self.buffer.back() {
            if sample.timestamp() < tail.timestamp() {
                return Err(ChronologyError {
                    sample: sample.timestamp(),
                    tail: tail.timestamp(),
                });
            }
        }

        let newest = sample.timestamp();
        self.buffer.push_back(sample);

        let mut evicted = 0usize;
        while let Some(front) = self.buffer.front() {
            if newest - front.timestamp() > self.config.duration {
                self.buffer.pop_front();
                evicted += 1;
            } else {
                break;
            }
        }
        if evicted > 0 {
            tracing::trace!(
                evicted,
                remaining = self.buffer.len(),
                "evicted samples outside window"
            );
        }
        Ok(())
    }

    /// Whether the newest sample arrived more than `gap_threshold` after its predecessor.
    pub fn has_time_gap(&self) -> bool {
        match self.buffer.len() {
            0 | 1 => false,
            len => self.has_time_gap_at(len - 1),
        }
    }

    /// Whether the sample at `index` is more than `gap_threshold` after the one before it.
    pub fn has_time_gap_at(&self, index: usize) -> bool {
        if index == 0 {
            return false;
        }
        match (self.buffer.get(index - 1), self.buffer.get(index)) {
            (Some(prev), Some(current)) => {
                current.timestamp() - prev.timestamp() > self.config.gap_threshold
            }
            _ => false,
        }
    }

    /// Left edge of a full window anchored at the newest sample.
    pub fn window_start_time(&self) -> Option<NaiveDateTime> {
        self.buffer
            .back()
            .and_then(|tail| tail.timestamp().checked_sub_signed(self.config.duration))
    }

    /// A window is contiguous when no member has a point anomaly, no two
    /// neighbours are further apart than the gap threshold, and the oldest
    /// member sits within the gap threshold of the window start.
    pub fn is_contiguous(&self) -> bool {
        let (Some(oldest), Some(window_start)) = (self.buffer.front(), self.window_start_time())
        else {
            return false;
        };

        if self.buffer.iter().any(MeterSample::has_point_anomaly) {
            return false;
        }
        if (1..self.buffer.len()).any(|index| self.has_time_gap_at(index)) {
            return false;
        }

        oldest.timestamp() - window_start <= self.config.gap_threshold
    }

    /// Unweighted mean of `metric` across the buffered samples.
    pub fn average(&self, metric: Metric) -> Option<f64> {
        if self.buffer.is_empty() {
            return None;
        }
        let total: f64 = self.buffer.iter().map(|sample| sample.value(metric)).sum();
        Some(total / self.buffer.len() as f64)
    }

    pub fn average_by_name(&self, name: &str) -> Result<Option<f64>, InvalidFieldError> {
        let metric: Metric = name.parse()?;
        Ok(self.average(metric))
    }

    pub fn averages(&self) -> WindowAverages {
        WindowAverages {
            power: self.average(Metric::Power),
            voltage: self.average(Metric::Voltage),
            current: self.average(Metric::Current),
        }
    }

    /// Append `sample`, then report whether it opened a time gap and attach
    /// the window averages to it when the window is contiguous.
    pub fn ingest(&mut self, sample: MeterSample) -> Result<WindowUpdate, ChronologyError> {
        let mut annotated = sample.clone();
        self.append(sample)?;

        let time_gap = self.has_time_gap();
        let contiguous = self.is_contiguous();
        if contiguous {
            let averages = self.averages();
            if let Some(tail) = self.buffer.back_mut() {
                tail.attach_averages(averages);
            }
            annotated.attach_averages(averages);
        } else {
            tracing::debug!(
                len = self.buffer.len(),
                time_gap,
                "window not contiguous; averages withheld"
            );
        }

        Ok(WindowUpdate {
            sample: annotated,
            time_gap,
            contiguous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 1, 8)
            .and_then(|d| d.and_hms_milli_opt(14, 54, 42, 630))
            .expect("base timestamp")
    }

    fn at(offset_ms: i64) -> MeterSample {
        MeterSample::new(
            base() + ChronoDuration::milliseconds(offset_ms),
            441.781,
            477.470,
            925.254,
        )
    }

    fn with_values(offset_ms: i64, power: f64, voltage: f64, current: f64) -> MeterSample {
        MeterSample::new(
            base() + ChronoDuration::milliseconds(offset_ms),
            power,
            voltage,
            current,
        )
    }

    fn approx(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|value| (value - expected).abs() < 1e-9)
    }

    #[test]
    fn defaults_match_five_second_window() {
        let window = SampleWindow::default();
        assert_eq!(window.duration(), ChronoDuration::seconds(5));
        assert_eq!(window.gap_threshold(), ChronoDuration::milliseconds(1500));
        assert!(window.is_empty());
        assert_eq!(window.window_start_time(), None);
        assert!(!window.is_contiguous());
        assert_eq!(window.average(Metric::Power), None);
    }

    #[test]
    fn contiguous_only_once_window_is_full() {
        let mut window = SampleWindow::default();
        for second in 0..4 {
            window.append(at(second * 1000)).expect("append");
            assert!(!window.is_contiguous(), "contiguous after {} samples", second + 1);
        }
        window.append(at(4000)).expect("append");
        assert!(window.is_contiguous());
        assert!(approx(window.average(Metric::Power), 441.781));
        assert!(approx(window.average(Metric::Voltage), 477.470));
        assert!(approx(window.average(Metric::Current), 925.254));
    }

    #[test]
    fn fullness_boundary_is_inclusive() {
        let mut window = SampleWindow::default();
        for offset in [0, 1000, 2000, 3000, 3500] {
            window.append(at(offset)).expect("append");
        }
        let start = window.window_start_time().expect("start");
        assert_eq!(base() - start, ChronoDuration::milliseconds(1500));
        assert!(window.is_contiguous());

        let mut window = SampleWindow::default();
        for offset in [0, 1000, 2000, 3000, 3499] {
            window.append(at(offset)).expect("append");
        }
        let start = window.window_start_time().expect("start");
        assert_eq!(base() - start, ChronoDuration::milliseconds(1501));
        assert!(!window.has_time_gap());
        assert!(!window.is_contiguous());
    }

    #[test]
    fn window_start_before_the_earliest_date_is_not_contiguous() {
        let earliest = NaiveDate::MIN.and_hms_opt(0, 0, 0).expect("earliest");
        let mut window = SampleWindow::default();
        let update = window
            .ingest(MeterSample::new(earliest, 441.781, 477.470, 925.254))
            .expect("ingest");

        assert_eq!(window.window_start_time(), None);
        assert!(!update.contiguous);
        assert!(update.sample.averages().is_none());
        assert!(!window.is_contiguous());
    }

    #[test]
    fn detects_gap_on_newest_sample() {
        let mut window = SampleWindow::default();
        window.append(at(0)).expect("append");
        assert!(!window.has_time_gap());
        window.append(at(2000)).expect("append");
        assert!(window.has_time_gap());
        assert!(!window.is_contiguous());
    }

    #[test]
    fn gap_equal_to_threshold_is_not_a_gap() {
        let mut window = SampleWindow::default();
        window.append(at(0)).expect("append");
        window.append(at(1500)).expect("append");
        assert!(!window.has_time_gap());
        assert!(!window.has_time_gap_at(0));
        assert!(!window.has_time_gap_at(5));
    }

    #[test]
    fn internal_gap_breaks_contiguity_until_evicted() {
        let mut window = SampleWindow::default();
        for offset in [0, 1000, 3000, 4000, 5000] {
            window.append(at(offset)).expect("append");
        }
        assert!(window.has_time_gap_at(2));
        assert!(!window.has_time_gap());
        assert!(!window.is_contiguous());

        for offset in [6000, 7000, 8000] {
            window.append(at(offset)).expect("append");
        }
        // oldest remaining sample is at 3000
        assert_eq!(
            window.iter().next().map(MeterSample::timestamp),
            Some(base() + ChronoDuration::milliseconds(3000))
        );
        assert!(window.is_contiguous());
    }

    #[test]
    fn evicts_samples_older_than_duration() {
        let mut window = SampleWindow::default();
        for offset in (0..=9000).step_by(1000) {
            window.append(at(offset)).expect("append");
            let newest = window.latest().map(MeterSample::timestamp).expect("tail");
            assert!(window
                .iter()
                .all(|sample| newest - sample.timestamp() <= window.duration()));
        }
        // a sample exactly `duration` old stays in the window
        assert_eq!(window.len(), 6);
        assert_eq!(
            window.window_start_time(),
            Some(base() + ChronoDuration::milliseconds(4000))
        );
    }

    #[test]
    fn rejects_out_of_order_sample_without_mutation() {
        let mut window = SampleWindow::default();
        window.append(at(1000)).expect("append");
        window.append(at(2000)).expect("append");

        let err = window.append(at(1500)).expect_err("regression");
        assert_eq!(err.tail, base() + ChronoDuration::milliseconds(2000));
        assert_eq!(window.len(), 2);
        assert_eq!(
            window.latest().map(MeterSample::timestamp),
            Some(base() + ChronoDuration::milliseconds(2000))
        );
    }

    #[test]
    fn rejects_regression_on_second_append() {
        let mut window = SampleWindow::default();
        window.append(at(1000)).expect("append");
        assert!(window.append(at(0)).is_err());
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut window = SampleWindow::default();
        window.append(at(1000)).expect("append");
        window.append(at(1000)).expect("append");
        window.append(at(1000)).expect("append");
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn point_anomaly_in_window_blocks_contiguity() {
        let mut window = SampleWindow::default();
        window.append(with_values(0, -1.0, 480.0, 1.0)).expect("append");
        for offset in [1000, 2000, 3000, 4000] {
            window.append(at(offset)).expect("append");
        }
        assert!(!window.is_contiguous());

        // anomalous sample leaves the window after the next two appends
        window.append(at(5000)).expect("append");
        assert!(!window.is_contiguous());
        window.append(at(5001)).expect("append");
        assert!(window.is_contiguous());
    }

    #[test]
    fn averages_are_unweighted_means() {
        let mut window = SampleWindow::default();
        window.append(with_values(0, 1.0, 476.0, 10.0)).expect("append");
        window.append(with_values(100, 2.0, 478.0, 20.0)).expect("append");
        window.append(with_values(4000, 6.0, 484.0, 30.0)).expect("append");
        assert!(approx(window.average(Metric::Power), 3.0));
        assert!(approx(window.average(Metric::Voltage), 479.333_333_333_333_3));
        assert!(approx(window.average(Metric::Current), 20.0));
    }

    #[test]
    fn average_by_name_rejects_unknown_metric() {
        let mut window = SampleWindow::default();
        window.append(at(0)).expect("append");
        assert!(approx(
            window.average_by_name("kW").expect("known metric"),
            441.781
        ));
        let err = window.average_by_name("frequency").expect_err("unknown");
        assert_eq!(err, InvalidFieldError("frequency".to_string()));
    }

    #[test]
    fn ingest_attaches_averages_only_when_contiguous() {
        let mut window = SampleWindow::default();
        for offset in [0, 1000, 2000, 3000] {
            let update = window.ingest(at(offset)).expect("ingest");
            assert!(!update.contiguous);
            assert!(update.sample.averages().is_none());
            assert!(window.latest().and_then(MeterSample::averages).is_none());
        }

        let update = window.ingest(at(4000)).expect("ingest");
        assert!(update.contiguous);
        assert!(!update.time_gap);
        assert!(approx(update.sample.average(Metric::Power), 441.781));
        assert_eq!(
            window.latest().and_then(MeterSample::averages),
            update.sample.averages()
        );
    }

    #[test]
    fn ingest_reports_gap_and_withholds_averages() {
        let mut window = SampleWindow::default();
        for offset in [0, 1000, 2000, 3000, 4000] {
            window.ingest(at(offset)).expect("ingest");
        }
        let update = window.ingest(at(6000)).expect("ingest");
        assert!(update.time_gap);
        assert!(!update.contiguous);
        assert!(update.sample.averages().is_none());
    }

    #[test]
    fn ingest_propagates_chronology_error() {
        let mut window = SampleWindow::default();
        window.ingest(at(1000)).expect("ingest");
        let err = window.ingest(at(500)).expect_err("regression");
        assert_eq!(err.sample, base() + ChronoDuration::milliseconds(500));
        assert_eq!(window.len(), 1);
    }
}
