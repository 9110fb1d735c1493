#![forbid(unsafe_code)]

mod error;
mod metrics;
mod registry;
mod snapshot;

pub use error::{Error, Result};
pub use metrics::{Counter, MetricKind, PERCENTILE_RELATIVE_ERROR, Trend};
pub use registry::{MetricId, Registry, RegistryBuilder};
pub use snapshot::{CounterSummary, MetricSummary, MetricValues, MetricsSnapshot, TrendSummary};
