use std::time::Duration;

use stampede_metrics::{Counter, Registry, RegistryBuilder, Trend};

pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATIONS_FAILED: &str = "iterations_failed";
pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
pub const INTERRUPTED_ITERATIONS: &str = "interrupted_iterations";

/// Metrics every run records regardless of the workload.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinMetrics {
    pub iterations: Counter,
    pub iteration_duration: Trend,
    pub iterations_failed: Counter,
    pub dropped_iterations: Counter,
    pub interrupted_iterations: Counter,
}

impl BuiltinMetrics {
    pub fn declare(builder: &mut RegistryBuilder) -> stampede_metrics::Result<Self> {
        Ok(Self {
            iterations: builder.counter(ITERATIONS)?,
            iteration_duration: builder.trend(ITERATION_DURATION)?,
            iterations_failed: builder.counter(ITERATIONS_FAILED)?,
            dropped_iterations: builder.counter(DROPPED_ITERATIONS)?,
            interrupted_iterations: builder.counter(INTERRUPTED_ITERATIONS)?,
        })
    }

    pub fn record_iteration(&self, registry: &Registry, elapsed: Duration, failed: bool) {
        let res = registry
            .add(self.iterations, 1.0)
            .and_then(|()| registry.observe_duration(self.iteration_duration, elapsed))
            .and_then(|()| {
                if failed {
                    registry.add(self.iterations_failed, 1.0)
                } else {
                    Ok(())
                }
            });
        if let Err(err) = res {
            tracing::warn!(error = %err, "failed to record iteration");
        }
    }

    pub fn record_dropped(&self, registry: &Registry, count: u64) {
        Self::add_count(registry, self.dropped_iterations, count);
    }

    pub fn record_interrupted(&self, registry: &Registry, count: u64) {
        Self::add_count(registry, self.interrupted_iterations, count);
    }

    fn add_count(registry: &Registry, counter: Counter, count: u64) {
        if count == 0 {
            return;
        }
        if let Err(err) = registry.add(counter, count as f64) {
            tracing::warn!(error = %err, "failed to record counter");
        }
    }
}
