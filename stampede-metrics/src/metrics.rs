use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::registry::MetricId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Trend,
}

/// Upper bound of the relative error of a reported trend percentile.
///
/// Trends keep an HDR histogram with 3 significant digits; the value reported for a
/// percentile is the highest value equivalent to the sample at that rank.
pub const PERCENTILE_RELATIVE_ERROR: f64 = 0.001;

/// Trend values are milliseconds, stored at microsecond resolution.
pub(crate) const TREND_SCALE: f64 = 1000.0;

pub(crate) fn new_trend_histogram() -> Histogram<u64> {
    // 1us ..= 1h
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Write handle for a counter, resolved once against a [`crate::Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Counter(pub(crate) MetricId);

/// Write handle for a trend, resolved once against a [`crate::Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trend(pub(crate) MetricId);

impl Counter {
    #[must_use]
    pub fn id(self) -> MetricId {
        self.0
    }
}

impl Trend {
    #[must_use]
    pub fn id(self) -> MetricId {
        self.0
    }
}

#[derive(Debug, Default)]
pub(crate) struct CounterCell {
    // f64 bits
    total: AtomicU64,
    samples: AtomicU64,
}

impl CounterCell {
    #[inline]
    pub(crate) fn add(&self, value: f64) {
        let _ = self
            .total
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn load(&self) -> (f64, u64) {
        (
            f64::from_bits(self.total.load(Ordering::Relaxed)),
            self.samples.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TrendState {
    pub(crate) histogram: Histogram<u64>,
    pub(crate) count: u64,
    pub(crate) sum: f64,
    pub(crate) min: f64,
    pub(crate) max: f64,
}

impl TrendState {
    pub(crate) fn new() -> Self {
        Self {
            histogram: new_trend_histogram(),
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn record(&mut self, value: f64) {
        // Sub-microsecond values land in the zero bucket; values above the bound saturate.
        self.histogram
            .saturating_record((value * TREND_SCALE).round() as u64);
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Folds `other` into `self`.
    pub(crate) fn absorb(&mut self, other: &TrendState) {
        if other.count == 0 {
            return;
        }
        let merged = self.histogram.add(&other.histogram);
        // Both sides come from `new_trend_histogram`, so the ranges always match.
        debug_assert!(merged.is_ok(), "trend histogram ranges differ");
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub(crate) fn clear(&mut self) {
        self.histogram.reset();
        self.count = 0;
        self.sum = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }
}

/// Samples recorded since the last snapshot. The registry folds them into its
/// running total when it takes the next cut.
#[derive(Debug)]
pub(crate) struct TrendCell {
    live: Mutex<TrendState>,
}

impl Default for TrendCell {
    fn default() -> Self {
        Self {
            live: Mutex::new(TrendState::new()),
        }
    }
}

impl TrendCell {
    #[inline]
    pub(crate) fn record(&self, value: f64) {
        self.live.lock().record(value);
    }

    /// Moves the live samples into `empty` and leaves its cleared buffer in their place.
    pub(crate) fn take_into(&self, empty: &mut TrendState) {
        std::mem::swap(&mut *self.live.lock(), empty);
    }
}

#[derive(Debug)]
pub(crate) enum MetricCell {
    Counter(CounterCell),
    Trend(TrendCell),
}

impl MetricCell {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(CounterCell::default()),
            MetricKind::Trend => Self::Trend(TrendCell::default()),
        }
    }

    pub(crate) fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Trend(_) => MetricKind::Trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn metric_kind_parses_lowercase_names() {
        assert_eq!(MetricKind::from_str("counter").ok(), Some(MetricKind::Counter));
        assert_eq!(MetricKind::from_str("trend").ok(), Some(MetricKind::Trend));
        assert!(MetricKind::from_str("gauge").is_err());
        assert_eq!(MetricKind::Trend.to_string(), "trend");
    }

    #[test]
    fn counter_cell_sums_fractional_values() {
        let c = CounterCell::default();
        c.add(0.5);
        c.add(2.0);
        c.add(0.0);
        assert_eq!(c.load(), (2.5, 3));
    }

    #[test]
    fn trend_state_tracks_exact_extremes() {
        let mut t = TrendState::new();
        t.record(0.2);
        t.record(12.5);
        t.record(4.0);
        assert_eq!(t.count, 3);
        assert_eq!(t.min, 0.2);
        assert_eq!(t.max, 12.5);
        assert!((t.sum - 16.7).abs() < 1e-9);
        assert_eq!(t.histogram.len(), 3);
    }

    #[test]
    fn absorb_merges_totals_and_extremes() {
        let mut total = TrendState::new();
        total.record(5.0);

        let mut delta = TrendState::new();
        delta.record(1.0);
        delta.record(9.0);
        total.absorb(&delta);
        total.absorb(&TrendState::new());

        assert_eq!(total.count, 3);
        assert_eq!(total.min, 1.0);
        assert_eq!(total.max, 9.0);
        assert_eq!(total.sum, 15.0);
        assert_eq!(total.histogram.len(), 3);

        delta.clear();
        assert_eq!(delta.count, 0);
        assert_eq!(delta.histogram.len(), 0);
        assert_eq!(delta.min, f64::INFINITY);
    }

    #[test]
    fn take_into_leaves_the_cell_empty() {
        let cell = TrendCell::default();
        cell.record(3.0);

        let mut taken = TrendState::new();
        cell.take_into(&mut taken);
        assert_eq!(taken.count, 1);

        let mut again = TrendState::new();
        cell.take_into(&mut again);
        assert_eq!(again.count, 0);
    }

    #[test]
    fn trend_state_saturates_out_of_range_values() {
        let mut t = TrendState::new();
        t.record(10_000_000.0);
        assert_eq!(t.histogram.len(), 1);
        assert_eq!(t.max, 10_000_000.0);
    }
}
