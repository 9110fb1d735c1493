use std::time::Duration;

use stampede_metrics::MetricsSnapshot;

use crate::error::RunPhase;
use crate::runner::ScenarioSummary;
use crate::script::ScriptError;
use crate::thresholds::ThresholdOutcome;

/// Why a run stopped before its scenarios finished on their own.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortCause {
    /// [`crate::AbortHandle::abort`] was called.
    User,
    /// A threshold marked `abort_on_fail` failed during periodic evaluation.
    Threshold(ThresholdOutcome),
}

/// Final result of a run that got past setup.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub scenarios: Vec<ScenarioSummary>,
    pub metrics: MetricsSnapshot,
    pub thresholds: Vec<ThresholdOutcome>,
    pub aborted: Option<AbortCause>,
    pub teardown_error: Option<ScriptError>,
    /// Scenario tasks that died instead of reporting a summary.
    pub run_errors: Vec<String>,
    /// Tokens whose advertised lifetime ran out before the run ended.
    pub stale_tokens: usize,
    pub elapsed: Duration,
}

impl RunReport {
    #[must_use]
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
            && !matches!(self.aborted, Some(AbortCause::Threshold(_)))
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| !t.passed)
    }

    /// Phase whose failure fails the run regardless of thresholds.
    #[must_use]
    pub fn failure_phase(&self) -> Option<RunPhase> {
        if !self.run_errors.is_empty() {
            Some(RunPhase::Run)
        } else if self.teardown_error.is_some() {
            Some(RunPhase::Teardown)
        } else {
            None
        }
    }

    #[must_use]
    pub fn overall_pass(&self) -> bool {
        self.failure_phase().is_none() && self.thresholds_passed()
    }

    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<&ScenarioSummary> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}
