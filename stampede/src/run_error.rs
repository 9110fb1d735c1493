use stampede_core::RunPhase;

use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    SetupFailed(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::SetupFailed(_) => ExitCode::SetupFailed,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::SetupFailed(e) | Self::RuntimeError(e) => e,
        }
    }
}

impl From<stampede_core::Error> for RunError {
    fn from(err: stampede_core::Error) -> Self {
        let phase = err.phase();
        let err = anyhow::Error::new(err).context(format!("{phase} failed"));
        match phase {
            RunPhase::Config => Self::InvalidInput(err),
            RunPhase::Setup => Self::SetupFailed(err),
            RunPhase::Run | RunPhase::Teardown => Self::RuntimeError(err),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::ScriptError;

    #[test]
    fn core_errors_map_to_exit_codes_by_phase() {
        let err = RunError::from(stampede_core::Error::NoScenarios);
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
        assert!(err.to_string().starts_with("config failed"));

        let err = RunError::from(stampede_core::Error::Setup(ScriptError::new("no tokens")));
        assert_eq!(err.exit_code(), ExitCode::SetupFailed);
        assert!(err.to_string().contains("no tokens"));
    }
}
