use stampede_core::{
    Credential, HarnessConfig, RunConfig, RunController, RunReport, Script, scenarios_from_options,
};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::plan_yaml::{self, Plan};
use crate::run_error::RunError;
use crate::workloads::{GetNodes, Liveness, Workload};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let plan = match &args.plan {
        Some(path) => plan_yaml::load_plan(path)
            .await
            .map_err(RunError::InvalidInput)?,
        None => args.workload.default_plan(),
    };
    let config = harness_config(&args, plan)?;

    out.print_header(args.workload, &config.target, &config.scenarios);

    let report = match args.workload {
        Workload::Liveness => execute(config, Liveness).await?,
        Workload::GetNodes => execute(config, GetNodes).await?,
    };

    out.print_summary(&report).map_err(RunError::RuntimeError)?;
    Ok(ExitCode::from_report(&report))
}

fn harness_config(args: &RunArgs, plan: Plan) -> Result<HarnessConfig, RunError> {
    let Plan {
        options,
        credentials,
        hard_stop,
        threshold_interval,
        request_timeout,
    } = plan;

    let target = args.target.trim();
    if !(target.starts_with("http://") || target.starts_with("https://")) {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "invalid --target `{target}` (expected an http:// or https:// base URL)"
        )));
    }

    let thresholds = options.thresholds.clone();
    let scenarios = scenarios_from_options(options, run_config(args))?;

    let mut config = HarnessConfig::new(target);
    config.credentials = cli_credentials(args)?.unwrap_or(credentials);
    config.scenarios = scenarios;
    config.thresholds = thresholds;
    config.threshold_interval = threshold_interval;
    config.hard_stop = args.hard_stop.or(hard_stop);
    config.request_timeout = args.request_timeout.or(request_timeout);
    Ok(config)
}

fn run_config(args: &RunArgs) -> RunConfig {
    RunConfig {
        iterations: args.iterations,
        vus: args.vus,
        duration: args.duration,
    }
}

/// `None` when no credential was given on the command line.
fn cli_credentials(args: &RunArgs) -> Result<Option<Vec<Credential>>, RunError> {
    if args.client_ids.len() != args.client_secrets.len() {
        return Err(RunError::InvalidInput(anyhow::anyhow!(
            "--client-id was given {} time(s) but --client-secret {} time(s)",
            args.client_ids.len(),
            args.client_secrets.len()
        )));
    }
    if args.client_ids.is_empty() {
        return Ok(None);
    }

    Ok(Some(
        args.client_ids
            .iter()
            .zip(&args.client_secrets)
            .map(|(id, secret)| Credential::new(id.clone(), secret.clone()))
            .collect(),
    ))
}

async fn execute<S: Script>(config: HarnessConfig, script: S) -> Result<RunReport, RunError> {
    let controller = RunController::new(config, script);

    let abort = controller.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping scenarios");
            abort.abort();
        }
    });

    let res = controller.run().await;
    interrupt.abort();
    Ok(res?)
}
