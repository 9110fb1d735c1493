use crate::auth::AuthSetupError;
use crate::script::ScriptError;
use crate::thresholds::ThresholdError;

pub type Result<T> = std::result::Result<T, Error>;

/// Stage of a run an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum RunPhase {
    Config,
    Setup,
    Run,
    Teardown,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error(
        "invalid `executor` `{0}` (expected `constant-vus`, `ramping-vus`, `constant-arrival-rate`, or `ramping-arrival-rate`)"
    )]
    InvalidExecutor(String),

    #[error("`stages` must be a non-empty array of {{ duration, target }}")]
    InvalidStages,

    #[error("`rate` must be a positive integer")]
    InvalidRate,

    #[error("`time_unit` must be a positive duration")]
    InvalidTimeUnit,

    #[error("`pre_allocated_vus` must be a positive integer")]
    InvalidPreAllocatedVus,

    #[error("`max_vus` must be >= `pre_allocated_vus`")]
    InvalidMaxVus,

    #[error("scenario `{0}` needs a positive `duration`")]
    InvalidDuration(String),

    #[error("`pacing` is only supported by closed-model executors (scenario `{0}`)")]
    InvalidPacing(String),

    #[error("duplicate scenario name `{0}`")]
    DuplicateScenario(String),

    #[error("no scenarios configured")]
    NoScenarios,

    #[error("`threshold_interval` must be a positive duration")]
    InvalidThresholdInterval,

    #[error("`request_timeout` must be a positive duration")]
    InvalidRequestTimeout,

    #[error("invalid metric declaration: {0}")]
    Metrics(#[from] stampede_metrics::Error),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    AuthSetup(#[from] AuthSetupError),

    #[error("setup failed: {0}")]
    Setup(#[source] ScriptError),
}

impl Error {
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        match self {
            Self::Join(_) => RunPhase::Run,
            Self::AuthSetup(_) | Self::Setup(_) => RunPhase::Setup,
            Self::InvalidVus
            | Self::InvalidIterations
            | Self::InvalidExecutor(_)
            | Self::InvalidStages
            | Self::InvalidRate
            | Self::InvalidTimeUnit
            | Self::InvalidPreAllocatedVus
            | Self::InvalidMaxVus
            | Self::InvalidDuration(_)
            | Self::InvalidPacing(_)
            | Self::DuplicateScenario(_)
            | Self::NoScenarios
            | Self::InvalidThresholdInterval
            | Self::InvalidRequestTimeout
            | Self::Metrics(_)
            | Self::Threshold(_) => RunPhase::Config,
        }
    }
}
