use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::metrics::{Counter, MetricCell, MetricKind, Trend, TrendState};
use crate::snapshot::{CounterSummary, MetricSummary, MetricValues, MetricsSnapshot, TrendSummary};

static NEXT_REGISTRY: AtomicU32 = AtomicU32::new(1);

/// Position of a metric in the table of the registry that declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId {
    registry: u32,
    index: u32,
}

impl MetricId {
    fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
struct MetricDef {
    name: Arc<str>,
    kind: MetricKind,
}

/// Declares the metric table before the run starts.
///
/// Handles returned here stay valid for the [`Registry`] this builder turns into,
/// and only for it.
#[derive(Debug)]
pub struct RegistryBuilder {
    stamp: u32,
    defs: Vec<MetricDef>,
    index: AHashMap<Arc<str>, MetricId>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            stamp: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            defs: Vec::new(),
            index: AHashMap::new(),
        }
    }
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declaring an existing name again with the same kind returns the existing id.
    pub fn declare(&mut self, name: &str, kind: MetricKind) -> Result<MetricId> {
        if name.trim().is_empty() {
            return Err(Error::EmptyName);
        }

        if let Some(&id) = self.index.get(name) {
            let existing = self.defs[id.index()].kind;
            if existing != kind {
                return Err(Error::KindConflict {
                    name: name.to_string(),
                    existing,
                    requested: kind,
                });
            }
            return Ok(id);
        }

        let id = MetricId {
            registry: self.stamp,
            index: self.defs.len() as u32,
        };
        let name: Arc<str> = Arc::from(name);
        self.defs.push(MetricDef {
            name: name.clone(),
            kind,
        });
        self.index.insert(name, id);
        Ok(id)
    }

    pub fn counter(&mut self, name: &str) -> Result<Counter> {
        self.declare(name, MetricKind::Counter).map(Counter)
    }

    pub fn trend(&mut self, name: &str) -> Result<Trend> {
        self.declare(name, MetricKind::Trend).map(Trend)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    #[must_use]
    pub fn build(self) -> Registry {
        let cells = self
            .defs
            .iter()
            .map(|d| MetricCell::new(d.kind))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let history = self
            .defs
            .iter()
            .map(|d| (d.kind == MetricKind::Trend).then(TrendHistory::default))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Registry {
            stamp: self.stamp,
            defs: self.defs.into_boxed_slice(),
            cells,
            index: self.index,
            gate: RwLock::new(()),
            history: Mutex::new(history),
        }
    }
}

/// Trend samples already folded by earlier snapshots, plus the cleared buffer that
/// is swapped into the live cell at the next cut.
#[derive(Debug)]
struct TrendHistory {
    total: TrendState,
    spare: TrendState,
}

impl Default for TrendHistory {
    fn default() -> Self {
        Self {
            total: TrendState::new(),
            spare: TrendState::new(),
        }
    }
}

/// Fixed table of metrics shared by every VU of a run.
///
/// Counters accumulate lock-free; trends take a short per-metric lock. Writers share
/// `gate` while [`Registry::snapshot`] holds it exclusively, so a snapshot observes
/// either all or none of a concurrent write. The exclusive section reads two atomics
/// per counter and swaps one buffer per trend, so writers wait O(metrics) regardless
/// of how many samples the trends hold.
#[derive(Debug)]
pub struct Registry {
    stamp: u32,
    defs: Box<[MetricDef]>,
    cells: Box<[MetricCell]>,
    index: AHashMap<Arc<str>, MetricId>,
    gate: RwLock<()>,
    /// Indexed like `cells`; `None` for counters. Also serializes snapshots.
    history: Mutex<Box<[Option<TrendHistory>]>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    #[must_use]
    pub fn id(&self, name: &str) -> Option<MetricId> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<MetricKind> {
        self.id(name).map(|id| self.defs[id.index()].kind)
    }

    #[must_use]
    pub fn name(&self, id: MetricId) -> Option<&str> {
        if id.registry != self.stamp {
            return None;
        }
        self.defs.get(id.index()).map(|d| d.name.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, MetricKind)> + '_ {
        self.defs.iter().map(|d| (d.name.as_ref(), d.kind))
    }

    pub fn counter(&self, name: &str) -> Result<Counter> {
        self.resolve(name, MetricKind::Counter).map(Counter)
    }

    pub fn trend(&self, name: &str) -> Result<Trend> {
        self.resolve(name, MetricKind::Trend).map(Trend)
    }

    fn resolve(&self, name: &str, expected: MetricKind) -> Result<MetricId> {
        let id = self
            .id(name)
            .ok_or_else(|| Error::UnknownMetric(name.to_string()))?;
        let actual = self.defs[id.index()].kind;
        if actual != expected {
            return Err(Error::KindMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        Ok(id)
    }

    /// Records `value` into the metric called `name`, which must be declared with `kind`.
    pub fn record(&self, name: &str, kind: MetricKind, value: f64) -> Result<()> {
        let id = self.resolve(name, kind)?;
        self.record_id(id, kind, value)
    }

    #[inline]
    pub fn add(&self, counter: Counter, value: f64) -> Result<()> {
        self.record_id(counter.0, MetricKind::Counter, value)
    }

    /// Trend values are milliseconds.
    #[inline]
    pub fn observe(&self, trend: Trend, value: f64) -> Result<()> {
        self.record_id(trend.0, MetricKind::Trend, value)
    }

    #[inline]
    pub fn observe_duration(&self, trend: Trend, elapsed: Duration) -> Result<()> {
        self.record_id(trend.0, MetricKind::Trend, elapsed.as_secs_f64() * 1000.0)
    }

    fn record_id(&self, id: MetricId, expected: MetricKind, value: f64) -> Result<()> {
        if id.registry != self.stamp {
            return Err(Error::ForeignHandle);
        }
        let cell = self.cells.get(id.index()).ok_or(Error::ForeignHandle)?;
        if cell.kind() != expected {
            return Err(Error::KindMismatch {
                name: self.defs[id.index()].name.to_string(),
                expected,
                actual: cell.kind(),
            });
        }

        let valid = match cell {
            MetricCell::Counter(_) => value.is_finite(),
            MetricCell::Trend(_) => value.is_finite() && value >= 0.0,
        };
        if !valid {
            return Err(Error::InvalidValue {
                name: self.defs[id.index()].name.to_string(),
                value,
            });
        }

        let _gate = self.gate.read();
        match cell {
            MetricCell::Counter(c) => c.add(value),
            MetricCell::Trend(t) => t.record(value),
        }
        Ok(())
    }

    /// Point-in-time copy of every metric, in declaration order.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut history = self.history.lock();

        let counters = {
            let _gate = self.gate.write();
            self.cells
                .iter()
                .zip(history.iter_mut())
                .map(|(cell, hist)| match (cell, hist) {
                    (MetricCell::Counter(c), _) => Some(c.load()),
                    (MetricCell::Trend(t), Some(hist)) => {
                        t.take_into(&mut hist.spare);
                        None
                    }
                    (MetricCell::Trend(_), None) => None,
                })
                .collect::<Vec<_>>()
        };

        let metrics = self
            .defs
            .iter()
            .zip(counters)
            .zip(history.iter_mut())
            .map(|((def, counter), hist)| {
                let values = match (counter, hist) {
                    (Some((total, samples)), _) => {
                        MetricValues::Counter(CounterSummary { total, samples })
                    }
                    (None, Some(hist)) => {
                        hist.total.absorb(&hist.spare);
                        hist.spare.clear();
                        MetricValues::Trend(TrendSummary::from_state(hist.total.clone()))
                    }
                    (None, None) => MetricValues::Trend(TrendSummary::from_state(TrendState::new())),
                };
                debug_assert_eq!(values.kind(), def.kind);
                MetricSummary {
                    name: def.name.clone(),
                    kind: def.kind,
                    values,
                }
            })
            .collect();

        MetricsSnapshot::new(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let mut b = Registry::builder();
        b.counter("Errors").unwrap_or_else(|e| panic!("{e}"));
        b.trend("RTT").unwrap_or_else(|e| panic!("{e}"));
        b.build()
    }

    #[test]
    fn builder_redeclare_same_kind_is_idempotent() {
        let mut b = RegistryBuilder::new();
        let a = b.counter("Success").unwrap_or_else(|e| panic!("{e}"));
        let c = b.counter("Success").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(a, c);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn builder_rejects_kind_conflict() {
        let mut b = RegistryBuilder::new();
        b.counter("RTT").unwrap_or_else(|e| panic!("{e}"));
        let err = b.trend("RTT").err();
        assert_eq!(
            err,
            Some(Error::KindConflict {
                name: "RTT".to_string(),
                existing: MetricKind::Counter,
                requested: MetricKind::Trend,
            })
        );
    }

    #[test]
    fn builder_rejects_empty_name() {
        let mut b = RegistryBuilder::new();
        assert_eq!(b.counter("  ").err(), Some(Error::EmptyName));
    }

    #[test]
    fn record_by_name_checks_declaration_and_kind() {
        let r = registry();
        assert!(r.record("Errors", MetricKind::Counter, 1.0).is_ok());
        assert_eq!(
            r.record("Nope", MetricKind::Counter, 1.0).err(),
            Some(Error::UnknownMetric("Nope".to_string()))
        );
        assert!(matches!(
            r.record("RTT", MetricKind::Counter, 1.0),
            Err(Error::KindMismatch { .. })
        ));
    }

    #[test]
    fn rejects_non_finite_and_negative_trend_values() {
        let r = registry();
        let rtt = r.trend("RTT").unwrap_or_else(|e| panic!("{e}"));
        let errors = r.counter("Errors").unwrap_or_else(|e| panic!("{e}"));

        assert!(r.observe(rtt, f64::NAN).is_err());
        assert!(r.observe(rtt, -1.0).is_err());
        assert!(r.add(errors, f64::INFINITY).is_err());
        assert!(r.add(errors, -1.0).is_ok());

        let snap = r.snapshot();
        assert_eq!(snap.trend("RTT").map(TrendSummary::count), Some(0));
    }

    #[test]
    fn foreign_handle_is_rejected() {
        let r = registry();
        let mut other = Registry::builder();
        for i in 0..5 {
            other
                .counter(&format!("c{i}"))
                .unwrap_or_else(|e| panic!("{e}"));
        }
        let other = other.build();
        let foreign = other.counter("c4").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(r.add(foreign, 1.0).err(), Some(Error::ForeignHandle));
    }

    #[test]
    fn handle_from_a_same_shaped_registry_is_rejected() {
        let r = registry();
        let other = registry();
        let foreign = other.counter("Errors").unwrap_or_else(|e| panic!("{e}"));
        let foreign_rtt = other.trend("RTT").unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(r.add(foreign, 1.0).err(), Some(Error::ForeignHandle));
        assert_eq!(r.observe(foreign_rtt, 350.0).err(), Some(Error::ForeignHandle));
        assert_eq!(r.name(foreign.id()), None);

        let snap = r.snapshot();
        assert_eq!(snap.counter("Errors").map(|c| c.samples), Some(0));
        assert_eq!(snap.trend("RTT").map(TrendSummary::count), Some(0));
    }

    #[test]
    fn handle_of_the_wrong_kind_is_rejected() {
        let r = registry();
        let rtt = r.trend("RTT").unwrap_or_else(|e| panic!("{e}"));
        let errors = r.counter("Errors").unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(
            r.add(Counter(rtt.0), 350.0).err(),
            Some(Error::KindMismatch {
                name: "RTT".to_string(),
                expected: MetricKind::Counter,
                actual: MetricKind::Trend,
            })
        );
        assert!(matches!(
            r.observe(Trend(errors.0), 1.0),
            Err(Error::KindMismatch { .. })
        ));
        assert_eq!(r.snapshot().counter("Errors").map(|c| c.total), Some(0.0));
    }

    #[test]
    fn successive_snapshots_accumulate_trend_samples() {
        let r = registry();
        let rtt = r.trend("RTT").unwrap_or_else(|e| panic!("{e}"));

        r.observe(rtt, 10.0).unwrap_or_else(|e| panic!("{e}"));
        let first = r.snapshot();
        r.observe(rtt, 30.0).unwrap_or_else(|e| panic!("{e}"));
        let second = r.snapshot();
        let third = r.snapshot();

        assert_eq!(first.trend("RTT").map(TrendSummary::count), Some(1));
        for snap in [&second, &third] {
            let t = snap.trend("RTT").unwrap_or_else(|| panic!("missing RTT"));
            assert_eq!(t.count(), 2);
            assert_eq!(t.min(), Some(10.0));
            assert_eq!(t.max(), Some(30.0));
            assert_eq!(t.avg(), Some(20.0));
        }
    }

    #[test]
    fn snapshot_keeps_declaration_order() {
        let r = registry();
        let names: Vec<_> = r.snapshot().iter().map(|m| m.name.to_string()).collect();
        assert_eq!(names, vec!["Errors", "RTT"]);
    }

    #[test]
    fn observe_duration_records_milliseconds() {
        let r = registry();
        let rtt = r.trend("RTT").unwrap_or_else(|e| panic!("{e}"));
        r.observe_duration(rtt, Duration::from_millis(50))
            .unwrap_or_else(|e| panic!("{e}"));

        let snap = r.snapshot();
        let t = snap.trend("RTT").unwrap_or_else(|| panic!("missing RTT"));
        assert_eq!(t.count(), 1);
        assert_eq!(t.avg(), Some(50.0));
    }
}
