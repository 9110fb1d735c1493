use stampede_core::http::HttpRequest;
use stampede_core::{IterationError, Script, ScriptError, SetupContext, TestOptions, Vu};

use super::{THINK_TIME, minimal_load};
use crate::plan_yaml::Plan;

pub(crate) const PATH: &str = "/liveness";

/// Polls the liveness endpoint once per second per VU.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Liveness;

pub(super) fn default_plan() -> Plan {
    Plan {
        options: TestOptions {
            scenarios: vec![minimal_load("min_load", "ToDoApp-Liveness")],
            ..TestOptions::default()
        },
        ..Plan::default()
    }
}

impl Script for Liveness {
    type Context = ();

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<(), ScriptError> {
        tracing::info!(url = %ctx.target, "checking liveness endpoint");
        Ok(())
    }

    async fn run(&self, vu: &Vu<'_, ()>) -> Result<(), IterationError> {
        let outcome = match vu.http().request(HttpRequest::get(vu.url(PATH))).await {
            Ok(res) if res.is_success() => Ok(()),
            Ok(res) => Err(IterationError::failed(format!(
                "liveness returned {}",
                res.status
            ))),
            Err(err) => Err(err.into()),
        };

        vu.sleep(THINK_TIME).await;
        outcome
    }
}
