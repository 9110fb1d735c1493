use stampede_core::{RunPhase, RunReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed (including a threshold that aborted the run).
    ThresholdsFailed = 11,

    /// Token acquisition or workload setup failed; no VU was started.
    SetupFailed = 20,

    /// Teardown failed or a scenario task died.
    RunFailed = 21,

    /// Invalid CLI/plan/options (bad flags, invalid durations, threshold syntax, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Phase failures outrank threshold failures.
    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        match report.failure_phase() {
            Some(RunPhase::Run | RunPhase::Teardown) => Self::RunFailed,
            Some(RunPhase::Setup) => Self::SetupFailed,
            Some(RunPhase::Config) => Self::InvalidInput,
            None if !report.thresholds_passed() => Self::ThresholdsFailed,
            None => Self::Success,
        }
    }
}
