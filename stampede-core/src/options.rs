use std::collections::HashSet;
use std::time::Duration;

use crate::config::{
    DEFAULT_GRACEFUL_STOP, DEFAULT_TIME_UNIT, RunConfig, ScenarioConfig, ScenarioExecutor,
    ScenarioExecutorKind, ScenarioOptions, Stage, TestOptions, total_duration,
};
use crate::error::{Error, Result};

pub const DEFAULT_SCENARIO: &str = "default";

fn positive(value: Option<u64>, err: Error) -> Result<Option<u64>> {
    match value {
        Some(0) => Err(err),
        v => Ok(v),
    }
}

fn ramp_stages(stages: Vec<Stage>) -> Result<Vec<Stage>> {
    if stages.is_empty() || total_duration(&stages).is_zero() {
        return Err(Error::InvalidStages);
    }
    Ok(stages)
}

fn arrival_vus(s: &ScenarioOptions) -> Result<(Duration, u64, u64)> {
    let time_unit = s.time_unit.unwrap_or(DEFAULT_TIME_UNIT);
    if time_unit.is_zero() {
        return Err(Error::InvalidTimeUnit);
    }
    let pre_allocated_vus = positive(s.pre_allocated_vus, Error::InvalidPreAllocatedVus)?
        .unwrap_or(1);
    let max_vus = s.max_vus.unwrap_or(pre_allocated_vus);
    if max_vus < pre_allocated_vus {
        return Err(Error::InvalidMaxVus);
    }
    Ok((time_unit, pre_allocated_vus, max_vus))
}

/// Resolves plan options into scenarios.
///
/// Precedence is CLI flag, then scenario field, then top-level option, then default.
/// When the CLI sets `vus`, `iterations` or `duration`, every scenario becomes a
/// constant-VU scenario shaped by those flags. Without `scenarios`, a single
/// `default` scenario is built from the top-level options; it runs one iteration
/// unless a duration is given.
pub fn scenarios_from_options(opts: TestOptions, cfg: RunConfig) -> Result<Vec<ScenarioConfig>> {
    let cli_overrides_set = cfg.vus.is_some() || cfg.iterations.is_some() || cfg.duration.is_some();

    if opts.scenarios.is_empty() {
        let vus = positive(cfg.vus.or(opts.vus), Error::InvalidVus)?.unwrap_or(1);
        let duration = cfg.duration.or(opts.duration);
        let iterations = positive(cfg.iterations.or(opts.iterations), Error::InvalidIterations)?
            .or(if duration.is_some() { None } else { Some(1) });

        return Ok(vec![ScenarioConfig {
            name: DEFAULT_SCENARIO.to_string(),
            tags: Vec::new(),
            executor: ScenarioExecutor::ConstantVus { vus },
            iterations,
            duration,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            start_time: Duration::ZERO,
            pacing: None,
        }]);
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(opts.scenarios.len());

    for s in opts.scenarios {
        if !seen.insert(s.name.clone()) {
            return Err(Error::DuplicateScenario(s.name));
        }

        let executor_name = s.executor.as_deref().unwrap_or("constant-vus");
        let kind: ScenarioExecutorKind = executor_name
            .parse()
            .map_err(|_| Error::InvalidExecutor(executor_name.to_string()))?;

        let mut duration = cfg.duration.or(s.duration).or(opts.duration);
        let mut iterations = None;

        let kind = if cli_overrides_set {
            ScenarioExecutorKind::ConstantVus
        } else {
            kind
        };
        if kind != ScenarioExecutorKind::ConstantVus
            && (s.iterations.is_some() || opts.iterations.is_some())
        {
            return Err(Error::InvalidIterations);
        }

        let executor = match kind {
            ScenarioExecutorKind::ConstantVus => {
                let vus =
                    positive(cfg.vus.or(s.vus).or(opts.vus), Error::InvalidVus)?.unwrap_or(1);
                iterations = positive(
                    cfg.iterations.or(s.iterations).or(opts.iterations),
                    Error::InvalidIterations,
                )?;
                ScenarioExecutor::ConstantVus { vus }
            }
            ScenarioExecutorKind::RampingVus => {
                let start_vus = s.start_vus.unwrap_or(0);
                let stages = ramp_stages(s.stages)?;
                let executor = ScenarioExecutor::RampingVus { start_vus, stages };
                if executor.max_vus() == 0 {
                    return Err(Error::InvalidVus);
                }
                executor
            }
            ScenarioExecutorKind::ConstantArrivalRate => {
                let rate = positive(s.rate, Error::InvalidRate)?.ok_or(Error::InvalidRate)?;
                if duration.is_none_or(|d| d.is_zero()) {
                    return Err(Error::InvalidDuration(s.name));
                }
                let (time_unit, pre_allocated_vus, max_vus) = arrival_vus(&s)?;
                ScenarioExecutor::ConstantArrivalRate {
                    rate,
                    time_unit,
                    pre_allocated_vus,
                    max_vus,
                }
            }
            ScenarioExecutorKind::RampingArrivalRate => {
                let (time_unit, pre_allocated_vus, max_vus) = arrival_vus(&s)?;
                ScenarioExecutor::RampingArrivalRate {
                    start_rate: s.start_rate.unwrap_or(0),
                    time_unit,
                    pre_allocated_vus,
                    max_vus,
                    stages: ramp_stages(s.stages)?,
                }
            }
        };

        if let ScenarioExecutor::RampingVus { stages, .. }
        | ScenarioExecutor::RampingArrivalRate { stages, .. } = &executor
        {
            duration = Some(total_duration(stages));
        }

        if s.pacing.is_some() && executor.kind().is_arrival_rate() {
            return Err(Error::InvalidPacing(s.name));
        }

        out.push(ScenarioConfig {
            name: s.name,
            tags: s.tags,
            executor,
            iterations,
            duration,
            graceful_stop: s.graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
            start_time: s.start_time.unwrap_or(Duration::ZERO),
            pacing: s.pacing,
        });
    }

    Ok(out)
}
