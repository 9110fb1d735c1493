use std::time::{Duration, SystemTime};

use stampede_core::ScenarioOptions;

use crate::plan_yaml::Plan;

mod get_nodes;
mod liveness;

pub(crate) use get_nodes::GetNodes;
pub(crate) use liveness::Liveness;

/// Pause between iterations of the built-in workloads.
const THINK_TIME: Duration = Duration::from_secs(1);

/// Built-in iteration logic selectable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Workload {
    /// GET `/liveness`, no authentication.
    Liveness,
    /// GET the topology nodes endpoint with a bearer token.
    GetNodes,
}

impl Workload {
    /// Plan used when `--plan` is not given.
    pub(crate) fn default_plan(self) -> Plan {
        match self {
            Self::Liveness => liveness::default_plan(),
            Self::GetNodes => get_nodes::default_plan(),
        }
    }
}

/// One constant-vus scenario: 1 VU for two minutes.
fn minimal_load(name: &str, test_id: &str) -> ScenarioOptions {
    ScenarioOptions {
        name: name.to_string(),
        executor: Some("constant-vus".to_string()),
        vus: Some(1),
        duration: Some(Duration::from_secs(120)),
        tags: vec![("testId".to_string(), tagged_test_id(test_id))],
        ..ScenarioOptions::default()
    }
}

fn tagged_test_id(prefix: &str) -> String {
    format!(
        "{prefix}-{}",
        humantime::format_rfc3339_seconds(SystemTime::now())
    )
}
