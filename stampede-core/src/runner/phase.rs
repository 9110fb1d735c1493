use std::time::Duration;

use tokio::time::Instant;

/// Lifecycle of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ScenarioPhase {
    Idle,
    RampUp,
    Steady,
    RampDown,
    GracefulStop,
    Done,
}

impl ScenarioPhase {
    /// Running phases may alternate freely; the tail is strictly ordered.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use ScenarioPhase::*;
        match (self, next) {
            (Idle, RampUp | Steady | RampDown | Done) => true,
            (RampUp | Steady | RampDown, RampUp | Steady | RampDown) => self != next,
            (RampDown, GracefulStop) => true,
            (GracefulStop, Done) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::RampUp | Self::Steady | Self::RampDown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub phase: ScenarioPhase,
    /// Offset from the run start.
    pub at: Duration,
}

#[derive(Debug)]
pub(crate) struct PhaseTracker {
    scenario: String,
    origin: Instant,
    history: Vec<PhaseTransition>,
}

impl PhaseTracker {
    pub(crate) fn new(scenario: &str, origin: Instant) -> Self {
        Self {
            scenario: scenario.to_string(),
            origin,
            history: vec![PhaseTransition {
                phase: ScenarioPhase::Idle,
                at: Duration::ZERO,
            }],
        }
    }

    pub(crate) fn current(&self) -> ScenarioPhase {
        self.history
            .last()
            .map_or(ScenarioPhase::Idle, |t| t.phase)
    }

    /// Records `next` unless it is already current. Running phases always pass through
    /// `RampDown` before `GracefulStop`.
    pub(crate) fn advance(&mut self, next: ScenarioPhase) {
        let current = self.current();
        if current == next {
            return;
        }
        if current.is_running() && next == ScenarioPhase::GracefulStop {
            self.advance(ScenarioPhase::RampDown);
        }
        let current = self.current();
        if !current.can_advance_to(next) {
            tracing::debug!(
                scenario = %self.scenario,
                from = %current,
                to = %next,
                "ignored phase transition"
            );
            return;
        }

        let at = self.origin.elapsed();
        tracing::info!(
            scenario = %self.scenario,
            phase = %next,
            at_ms = at.as_millis() as u64,
            "scenario phase"
        );
        self.history.push(PhaseTransition { phase: next, at });
    }

    pub(crate) fn into_history(self) -> Vec<PhaseTransition> {
        self.history
    }
}
