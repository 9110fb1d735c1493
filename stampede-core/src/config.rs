use std::time::Duration;

use crate::auth::Credential;
use crate::thresholds::ThresholdSet;

pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_THRESHOLD_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// CLI-level overrides. They win over anything the plan says.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub iterations: Option<u64>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioExecutor {
    /// Fixed number of VUs looping until the duration elapses or the shared
    /// iteration budget is spent.
    ConstantVus { vus: u64 },

    /// Ramp the number of active VUs up/down over time.
    RampingVus { start_vus: u64, stages: Vec<Stage> },

    /// Open model: `rate` iterations started per `time_unit` for the scenario duration.
    ConstantArrivalRate {
        rate: u64,
        time_unit: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
    },

    /// Open model with ramping stages.
    RampingArrivalRate {
        start_rate: u64,
        time_unit: Duration,
        pre_allocated_vus: u64,
        max_vus: u64,
        stages: Vec<Stage>,
    },
}

impl ScenarioExecutor {
    #[must_use]
    pub fn kind(&self) -> ScenarioExecutorKind {
        match self {
            Self::ConstantVus { .. } => ScenarioExecutorKind::ConstantVus,
            Self::RampingVus { .. } => ScenarioExecutorKind::RampingVus,
            Self::ConstantArrivalRate { .. } => ScenarioExecutorKind::ConstantArrivalRate,
            Self::RampingArrivalRate { .. } => ScenarioExecutorKind::RampingArrivalRate,
        }
    }

    /// Number of VUs the scheduler allocates for the scenario.
    #[must_use]
    pub fn max_vus(&self) -> u64 {
        match self {
            Self::ConstantVus { vus } => *vus,
            Self::RampingVus { start_vus, stages } => {
                let max_stage = stages.iter().map(|st| st.target).max().unwrap_or(0);
                max_stage.max(*start_vus)
            }
            Self::ConstantArrivalRate { max_vus, .. } | Self::RampingArrivalRate { max_vus, .. } => {
                *max_vus
            }
        }
    }
}

/// Scenario executor kind (the string form used by plans and the CLI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ScenarioExecutorKind {
    #[strum(to_string = "constant-vus", serialize = "constant")]
    ConstantVus,

    #[strum(to_string = "ramping-vus")]
    RampingVus,

    #[strum(to_string = "constant-arrival-rate", serialize = "constant-rps")]
    ConstantArrivalRate,

    #[strum(to_string = "ramping-arrival-rate", serialize = "ramping-rps")]
    RampingArrivalRate,
}

impl ScenarioExecutorKind {
    #[must_use]
    pub fn is_ramping(self) -> bool {
        matches!(self, Self::RampingVus | Self::RampingArrivalRate)
    }

    #[must_use]
    pub fn is_arrival_rate(self) -> bool {
        matches!(self, Self::ConstantArrivalRate | Self::RampingArrivalRate)
    }
}

/// Fully resolved scenario. Read-only once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,
    pub tags: Vec<(String, String)>,
    pub executor: ScenarioExecutor,
    /// Shared iteration budget (constant-vus only).
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub graceful_stop: Duration,
    /// Offset from the run start.
    pub start_time: Duration,
    /// Delay between iterations of one VU (closed-model executors only).
    pub pacing: Option<Duration>,
}

impl ScenarioConfig {
    pub fn constant_vus(name: impl Into<String>, vus: u64, duration: Duration) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            executor: ScenarioExecutor::ConstantVus { vus },
            iterations: None,
            duration: Some(duration),
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            start_time: Duration::ZERO,
            pacing: None,
        }
    }

    #[must_use]
    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    #[must_use]
    pub fn with_start_time(mut self, start_time: Duration) -> Self {
        self.start_time = start_time;
        self
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Time after which the scheduler stops the scenario. `None` means the scenario
    /// ends when its VUs run out of work (iteration budget).
    #[must_use]
    pub fn nominal_duration(&self) -> Option<Duration> {
        match &self.executor {
            ScenarioExecutor::ConstantVus { .. } | ScenarioExecutor::ConstantArrivalRate { .. } => {
                self.duration
            }
            ScenarioExecutor::RampingVus { stages, .. }
            | ScenarioExecutor::RampingArrivalRate { stages, .. } => Some(total_duration(stages)),
        }
    }
}

pub(crate) fn total_duration(stages: &[Stage]) -> Duration {
    stages
        .iter()
        .fold(Duration::ZERO, |acc, st| acc.saturating_add(st.duration))
}

/// Raw scenario options as written in a plan; resolved by [`crate::scenarios_from_options`].
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub name: String,

    pub tags: Vec<(String, String)>,

    /// Scenario executor. If missing, defaults to constant VUs.
    pub executor: Option<String>,

    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub graceful_stop: Option<Duration>,
    pub start_time: Option<Duration>,
    pub pacing: Option<Duration>,

    // Ramping VUs
    pub start_vus: Option<u64>,
    pub stages: Vec<Stage>,

    // Arrival rate
    pub rate: Option<u64>,
    pub start_rate: Option<u64>,
    pub time_unit: Option<Duration>,
    pub pre_allocated_vus: Option<u64>,
    pub max_vus: Option<u64>,
}

/// Test-level options: top-level shortcuts, scenarios and thresholds.
#[derive(Debug, Clone, Default)]
pub struct TestOptions {
    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub scenarios: Vec<ScenarioOptions>,

    /// Threshold assertions.
    pub thresholds: Vec<ThresholdSet>,
}

/// Everything a [`crate::RunController`] needs. Built once at the process boundary.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Base URL of the system under test.
    pub target: String,
    pub credentials: Vec<Credential>,
    pub scenarios: Vec<ScenarioConfig>,
    pub thresholds: Vec<ThresholdSet>,
    /// Periodic threshold evaluation. Defaults to [`DEFAULT_THRESHOLD_INTERVAL`] when a
    /// threshold is marked `abort_on_fail`.
    pub threshold_interval: Option<Duration>,
    /// Extra time after a scenario's graceful-stop window before still-running
    /// iterations are aborted. `None` waits for them indefinitely.
    pub hard_stop: Option<Duration>,
    /// Bound on HTTP requests that set no timeout of their own. `None` keeps
    /// [`stampede_http::DEFAULT_REQUEST_TIMEOUT`].
    pub request_timeout: Option<Duration>,
}

impl HarnessConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            credentials: Vec::new(),
            scenarios: Vec::new(),
            thresholds: Vec::new(),
            threshold_interval: None,
            hard_stop: None,
            request_timeout: None,
        }
    }
}
