pub mod auth;
pub mod builtin;
mod config;
mod controller;
mod error;
mod options;
mod report;
pub mod runner;
mod script;
pub mod thresholds;

pub use auth::{
    AuthExchange, AuthSetupError, ClientCredentialsExchange, Credential, Token, TokenManager,
    TokenPool,
};
pub use builtin::BuiltinMetrics;
pub use config::{
    DEFAULT_GRACEFUL_STOP, DEFAULT_THRESHOLD_INTERVAL, DEFAULT_TIME_UNIT, HarnessConfig,
    RunConfig, ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind, ScenarioOptions, Stage,
    TestOptions,
};
pub use controller::{AbortHandle, RunController};
pub use error::{Error, Result, RunPhase};
pub use options::{DEFAULT_SCENARIO, scenarios_from_options};
pub use report::{AbortCause, RunReport};
pub use runner::{
    PhaseTransition, ScenarioPhase, ScenarioSummary, StopReason, Vu, VuFailure,
};
pub use script::{IterationError, Script, ScriptError, SetupContext};
pub use thresholds::{ThresholdOutcome, ThresholdSet, ThresholdSpec};

pub use stampede_http as http;
pub use stampede_metrics as metrics;
