use crate::metrics::MetricKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("metric `{name}` is already declared as a {existing}, cannot redeclare it as a {requested}")]
    KindConflict {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("metric name must not be empty")]
    EmptyName,

    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("metric `{name}` is a {actual}, not a {expected}")]
    KindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },

    #[error("metric `{name}` rejected value {value}")]
    InvalidValue { name: String, value: f64 },

    #[error("metric handle does not belong to this registry")]
    ForeignHandle,
}
