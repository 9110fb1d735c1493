use std::fmt;
use std::future::Future;

use stampede_http::HttpClient;
use stampede_metrics::{Registry, RegistryBuilder};

use crate::auth::TokenPool;
use crate::runner::Vu;

/// Failure of `setup` or `teardown`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<stampede_http::Error> for ScriptError {
    fn from(err: stampede_http::Error) -> Self {
        Self::new(err)
    }
}

impl From<stampede_metrics::Error> for ScriptError {
    fn from(err: stampede_metrics::Error) -> Self {
        Self::new(err)
    }
}

/// Outcome of a failed iteration.
///
/// Everything except [`IterationError::Fatal`] is absorbed into metrics and the VU keeps
/// looping. A fatal error retires the VU; its siblings keep running.
#[derive(Debug, thiserror::Error)]
pub enum IterationError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Http(#[from] stampede_http::Error),

    #[error(transparent)]
    Metric(#[from] stampede_metrics::Error),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl IterationError {
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }

    pub fn fatal(message: impl fmt::Display) -> Self {
        Self::Fatal(message.to_string())
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// What `setup` and `teardown` can see. Both run with no VU alive.
#[derive(Debug, Clone, Copy)]
pub struct SetupContext<'a> {
    pub target: &'a str,
    pub http: &'a HttpClient,
    pub tokens: &'a TokenPool,
    pub metrics: &'a Registry,
}

/// Iteration logic scheduled by the VU runtime.
///
/// `setup` runs once before any VU starts and produces the context shared read-only by
/// every VU. `run` is one iteration. `teardown` runs once after every VU has finished,
/// provided `setup` succeeded.
pub trait Script: Send + Sync + 'static {
    type Context: Send + Sync + 'static;

    /// Declares the custom metrics recorded by `run`.
    fn declare_metrics(&self, _metrics: &mut RegistryBuilder) -> stampede_metrics::Result<()> {
        Ok(())
    }

    fn setup(
        &self,
        ctx: &SetupContext<'_>,
    ) -> impl Future<Output = Result<Self::Context, ScriptError>> + Send;

    fn run(
        &self,
        vu: &Vu<'_, Self::Context>,
    ) -> impl Future<Output = Result<(), IterationError>> + Send;

    fn teardown(
        &self,
        _context: &Self::Context,
        _ctx: &SetupContext<'_>,
    ) -> impl Future<Output = Result<(), ScriptError>> + Send {
        async { Ok(()) }
    }
}
