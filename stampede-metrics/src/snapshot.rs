use hdrhistogram::Histogram;
use std::sync::Arc;

use crate::metrics::{MetricKind, TREND_SCALE, TrendState};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSummary {
    pub total: f64,
    /// Number of `add` calls, regardless of the added value.
    pub samples: u64,
}

#[derive(Debug, Clone)]
pub struct TrendSummary {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    histogram: Histogram<u64>,
}

impl TrendSummary {
    pub(crate) fn from_state(state: TrendState) -> Self {
        Self {
            count: state.count,
            sum: state.sum,
            min: state.min,
            max: state.max,
            histogram: state.histogram,
        }
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    #[must_use]
    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Nearest-rank percentile, `p` in `0..=100`.
    ///
    /// Returns `None` with no samples or when `p` is out of range. The result is within
    /// [`crate::PERCENTILE_RELATIVE_ERROR`] of the sample at that rank and never leaves
    /// the observed `min..=max` range.
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.count == 0 || !(0.0..=100.0).contains(&p) {
            return None;
        }

        // Guard against `0.95 * 100.0` landing a hair above an integer rank.
        let rank = ((p / 100.0) * self.count as f64 - 1e-9).ceil().max(1.0) as u64;

        let mut seen = 0u64;
        for v in self.histogram.iter_recorded() {
            seen += v.count_at_value();
            if seen >= rank {
                let value = v.value_iterated_to() as f64 / TREND_SCALE;
                return Some(value.clamp(self.min, self.max));
            }
        }
        Some(self.max)
    }
}

#[derive(Debug, Clone)]
pub enum MetricValues {
    Counter(CounterSummary),
    Trend(TrendSummary),
}

impl MetricValues {
    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Trend(_) => MetricKind::Trend,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricSummary {
    pub name: Arc<str>,
    pub kind: MetricKind,
    pub values: MetricValues,
}

/// Immutable view of a [`crate::Registry`] at one instant.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    metrics: Vec<MetricSummary>,
}

impl MetricsSnapshot {
    pub(crate) fn new(metrics: Vec<MetricSummary>) -> Self {
        Self { metrics }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name.as_ref() == name)
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<&CounterSummary> {
        match &self.get(name)?.values {
            MetricValues::Counter(c) => Some(c),
            MetricValues::Trend(_) => None,
        }
    }

    #[must_use]
    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match &self.get(name)?.values {
            MetricValues::Trend(t) => Some(t),
            MetricValues::Counter(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSummary> {
        self.metrics.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
