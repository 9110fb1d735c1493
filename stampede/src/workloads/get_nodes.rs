use stampede_core::http::HttpRequest;
use stampede_core::metrics::{Counter, RegistryBuilder, Trend};
use stampede_core::{
    IterationError, Script, ScriptError, SetupContext, TestOptions, ThresholdSet, ThresholdSpec,
    Vu,
};

use super::{THINK_TIME, minimal_load};
use crate::plan_yaml::Plan;

pub(crate) const API_VERSION: &str = "/topologymanagement/api/v6/";
const NODES_QUERY: &str = "nodes?topologies=20";

pub(crate) const RTT: &str = "RTT";
pub(crate) const ERRORS: &str = "Errors";
pub(crate) const SUCCESS: &str = "Success";

/// Lists topology nodes with the VU's bearer token.
///
/// Every response lands in `RTT`; `Success` counts 200s and `Errors` sums the status
/// codes of everything that is neither 200 nor 404.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct GetNodes;

pub(crate) struct GetNodesContext {
    rtt: Trend,
    errors: Counter,
    success: Counter,
}

pub(super) fn default_plan() -> Plan {
    let mut scenario = minimal_load("Minimal_Load", "GetNodesEndpointMinimalLoad");
    scenario.graceful_stop = Some(std::time::Duration::from_secs(5));
    scenario
        .tags
        .push(("Api".to_string(), API_VERSION.to_string()));

    Plan {
        options: TestOptions {
            scenarios: vec![scenario],
            thresholds: vec![
                ThresholdSet::new(ERRORS, ["count<100"]),
                ThresholdSet::new(SUCCESS, ["count>100"]),
                ThresholdSet {
                    metric: RTT.to_string(),
                    thresholds: ["p(95)<350", "p(90)<300", "avg<200"]
                        .into_iter()
                        .map(ThresholdSpec::new)
                        .collect(),
                },
            ],
            ..TestOptions::default()
        },
        ..Plan::default()
    }
}

impl Script for GetNodes {
    type Context = GetNodesContext;

    fn declare_metrics(&self, metrics: &mut RegistryBuilder) -> stampede_core::metrics::Result<()> {
        metrics.trend(RTT)?;
        metrics.counter(ERRORS)?;
        metrics.counter(SUCCESS)?;
        Ok(())
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<GetNodesContext, ScriptError> {
        if ctx.tokens.is_empty() {
            return Err(ScriptError::new(
                "get-nodes needs at least one credential (--client-id/--client-secret or plan `credentials`)",
            ));
        }
        tracing::info!(tokens = ctx.tokens.len(), "bearer tokens ready");

        Ok(GetNodesContext {
            rtt: ctx.metrics.trend(RTT)?,
            errors: ctx.metrics.counter(ERRORS)?,
            success: ctx.metrics.counter(SUCCESS)?,
        })
    }

    async fn run(&self, vu: &Vu<'_, GetNodesContext>) -> Result<(), IterationError> {
        let token = vu
            .token()
            .ok_or_else(|| IterationError::fatal("no bearer token assigned"))?;

        let outcome = list_nodes(vu, token.value()).await;
        vu.sleep(THINK_TIME).await;
        outcome
    }
}

async fn list_nodes(vu: &Vu<'_, GetNodesContext>, token: &str) -> Result<(), IterationError> {
    let ctx = vu.context();
    let req =
        HttpRequest::get(vu.url(&format!("{API_VERSION}{NODES_QUERY}"))).with_bearer(token);
    let res = vu.http().request(req).await?;

    let metrics = vu.metrics();
    metrics.observe_duration(ctx.rtt, res.elapsed)?;
    metrics.add(ctx.success, if res.status == 200 { 1.0 } else { 0.0 })?;
    if res.status != 200 && res.status != 404 {
        metrics.add(ctx.errors, f64::from(res.status))?;
    }
    Ok(())
}
