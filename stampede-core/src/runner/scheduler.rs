use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument as _;

use super::gate::IterationGate;
use super::ids::VuIdPool;
use super::pacer::ArrivalPacer;
use super::phase::{PhaseTracker, PhaseTransition, ScenarioPhase};
use super::schedule::RampingU64Schedule;
use super::signal::Signal;
use super::vu::{RunShared, ScenarioState, VuOutcome, VuWork, run_vu};
use crate::config::{ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind};
use crate::script::Script;

const PACER_TICK: Duration = Duration::from_millis(10);

/// Why a scenario left its running phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum StopReason {
    /// Every VU ran out of work (iteration budget spent, or all VUs retired).
    Completed,
    DurationElapsed,
    Aborted,
    /// The run was aborted before the scenario's start time.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VuFailure {
    pub vu_id: u64,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ScenarioSummary {
    pub name: String,
    pub executor: ScenarioExecutorKind,
    pub phases: Vec<PhaseTransition>,
    pub stop_reason: StopReason,
    pub iterations: u64,
    pub failed_iterations: u64,
    /// Most iterations ever executing at the same instant.
    pub peak_concurrency: u64,
    pub dropped_iterations: u64,
    pub interrupted_iterations: u64,
    /// In-flight iterations outlived the graceful-stop window.
    pub graceful_overrun: bool,
    pub vu_failures: Vec<VuFailure>,
    /// Offset of the scenario start from the run start.
    pub started_at: Duration,
    pub elapsed: Duration,
}

impl ScenarioSummary {
    #[must_use]
    pub fn phase_sequence(&self) -> Vec<ScenarioPhase> {
        self.phases.iter().map(|t| t.phase).collect()
    }
}

/// Run-level inputs to one scenario.
pub(crate) struct ScenarioLaunch<S: Script> {
    pub(crate) shared: Arc<RunShared<S>>,
    pub(crate) config: ScenarioConfig,
    /// Run-wide VU indices are leased from here and returned at `Done`.
    pub(crate) vu_ids: Arc<VuIdPool>,
    pub(crate) run_started: Instant,
    pub(crate) run_stop: Arc<Signal>,
    pub(crate) hard_stop: Option<Duration>,
}

struct VuPool {
    tasks: JoinSet<VuOutcome>,
    ids: HashMap<tokio::task::Id, u64>,
    failures: Vec<VuFailure>,
}

impl VuPool {
    fn settle(&mut self, res: Result<(tokio::task::Id, VuOutcome), JoinError>) {
        match res {
            Ok((task, outcome)) => {
                if let Some(error) = outcome.fatal {
                    self.failures.push(VuFailure {
                        vu_id: self.ids.get(&task).copied().unwrap_or_default(),
                        error,
                    });
                }
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                let vu_id = self.ids.get(&err.id()).copied().unwrap_or_default();
                tracing::error!(vu = vu_id, error = %err, "virtual user panicked");
                self.failures.push(VuFailure {
                    vu_id,
                    error: err.to_string(),
                });
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn build_work(
    config: &ScenarioConfig,
) -> (VuWork, Option<(Arc<ArrivalPacer>, RampingU64Schedule, Duration)>) {
    match &config.executor {
        ScenarioExecutor::ConstantVus { .. } => (
            VuWork::Constant {
                gate: IterationGate::new(config.iterations, config.duration),
            },
            None,
        ),
        ScenarioExecutor::RampingVus { start_vus, stages } => (
            VuWork::RampingVus {
                schedule: RampingU64Schedule::new(*start_vus, stages.clone()),
            },
            None,
        ),
        ScenarioExecutor::ConstantArrivalRate {
            rate,
            time_unit,
            pre_allocated_vus,
            max_vus,
        } => {
            let schedule =
                RampingU64Schedule::constant(*rate, config.duration.unwrap_or(Duration::ZERO));
            let pacer = Arc::new(ArrivalPacer::new(*pre_allocated_vus, *max_vus));
            (
                VuWork::ArrivalRate {
                    pacer: pacer.clone(),
                },
                Some((pacer, schedule, *time_unit)),
            )
        }
        ScenarioExecutor::RampingArrivalRate {
            start_rate,
            time_unit,
            pre_allocated_vus,
            max_vus,
            stages,
        } => {
            let schedule = RampingU64Schedule::new(*start_rate, stages.clone());
            let pacer = Arc::new(ArrivalPacer::new(*pre_allocated_vus, *max_vus));
            (
                VuWork::ArrivalRate {
                    pacer: pacer.clone(),
                },
                Some((pacer, schedule, *time_unit)),
            )
        }
    }
}

/// Turns the scheduled rate into iteration starts until the schedule ends or the
/// scenario stops, then drops whatever backlog is left.
fn spawn_pacer_driver<S: Script>(
    shared: Arc<RunShared<S>>,
    state: Arc<ScenarioState>,
    pacer: Arc<ArrivalPacer>,
    schedule: RampingU64Schedule,
    time_unit: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let record_dropped =
            |n: u64| shared.builtins.record_dropped(&shared.metrics, n);

        let mut ticker = tokio::time::interval(PACER_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let unit = time_unit.as_secs_f64().max(1e-9);
        // Seeded so the first start happens at t=0 instead of one period in.
        let mut carry = if schedule.target_at(Duration::ZERO) > 0 {
            1.0
        } else {
            0.0
        };
        let mut last = Duration::ZERO;

        loop {
            tokio::select! {
                biased;
                () = state.stop.wait() => break,
                _ = ticker.tick() => {}
            }

            let elapsed = state.started.elapsed();
            if schedule.is_done(elapsed) {
                break;
            }

            let rate = schedule.target_at(elapsed) as f64;
            carry += rate * elapsed.saturating_sub(last).as_secs_f64() / unit;
            last = elapsed;

            let due = carry.floor();
            carry -= due;
            record_dropped(pacer.update_due(due as u64));
        }

        record_dropped(pacer.mark_done());
    })
}

/// Ramping executors follow the direction of the current stage; the others hold steady.
fn phase_at(ramp: Option<&RampingU64Schedule>, elapsed: Duration) -> ScenarioPhase {
    match ramp.map_or(Some(Ordering::Equal), |s| s.direction_at(elapsed)) {
        Some(Ordering::Greater) => ScenarioPhase::RampUp,
        Some(Ordering::Less) => ScenarioPhase::RampDown,
        _ => ScenarioPhase::Steady,
    }
}

/// Drives one scenario from `Idle` to `Done`.
pub(crate) async fn run_scenario<S: Script>(launch: ScenarioLaunch<S>) -> ScenarioSummary {
    let ScenarioLaunch {
        shared,
        config,
        vu_ids,
        run_started,
        run_stop,
        hard_stop,
    } = launch;

    let name = config.name.clone();
    let kind = config.executor.kind();
    let mut tracker = PhaseTracker::new(&name, run_started);

    let start_at = run_started + config.start_time;
    let skipped = run_stop.is_fired()
        || tokio::select! {
            biased;
            () = run_stop.wait() => true,
            () = tokio::time::sleep_until(start_at) => false,
        };
    if skipped {
        tracing::info!(scenario = %name, "run aborted before scenario start");
        tracker.advance(ScenarioPhase::Done);
        return ScenarioSummary {
            name,
            executor: kind,
            phases: tracker.into_history(),
            stop_reason: StopReason::Skipped,
            iterations: 0,
            failed_iterations: 0,
            peak_concurrency: 0,
            dropped_iterations: 0,
            interrupted_iterations: 0,
            graceful_overrun: false,
            vu_failures: Vec::new(),
            started_at: config.start_time,
            elapsed: Duration::ZERO,
        };
    }

    let started = Instant::now();
    let max_vus = config.executor.max_vus();
    let graceful_stop = config.graceful_stop;
    let nominal = config.nominal_duration();
    let ramp_schedule = match &config.executor {
        ScenarioExecutor::RampingVus {
            start_vus: start,
            stages,
        }
        | ScenarioExecutor::RampingArrivalRate {
            start_rate: start,
            stages,
            ..
        } => Some(RampingU64Schedule::new(*start, stages.clone())),
        _ => None,
    };

    let (work, arrival) = build_work(&config);
    if let VuWork::Constant { gate } = &work {
        gate.start_at(started);
    }
    let state = Arc::new(ScenarioState::new(config, work, started));
    let leased = vu_ids.acquire(max_vus);

    tracing::info!(
        scenario = %name,
        executor = %kind,
        vus = max_vus,
        "scenario started"
    );

    let mut pool = VuPool {
        tasks: JoinSet::new(),
        ids: HashMap::new(),
        failures: Vec::new(),
    };
    for (scenario_vu, &id) in (1..=max_vus).zip(&leased) {
        let span = tracing::debug_span!("vu", scenario = %name, vu = id);
        let handle = pool.tasks.spawn(
            run_vu(shared.clone(), state.clone(), id, scenario_vu).instrument(span),
        );
        pool.ids.insert(handle.id(), id);
    }

    let driver = arrival.map(|(pacer, schedule, time_unit)| {
        spawn_pacer_driver(shared.clone(), state.clone(), pacer, schedule, time_unit)
    });

    if !kind.is_ramping() {
        // All VUs are spawned at once.
        tracker.advance(ScenarioPhase::RampUp);
    }

    let stop_reason = loop {
        let elapsed = started.elapsed();
        let boundary = match &ramp_schedule {
            Some(schedule) => schedule.next_boundary(elapsed),
            None => nominal.filter(|end| *end > elapsed),
        };
        if boundary.is_none() && nominal.is_some() {
            break StopReason::DurationElapsed;
        }
        tracker.advance(phase_at(ramp_schedule.as_ref(), elapsed));

        tokio::select! {
            biased;
            () = run_stop.wait() => break StopReason::Aborted,
            () = sleep_until_opt(boundary.map(|b| started + b)) => {}
            res = pool.tasks.join_next_with_id() => match res {
                Some(res) => pool.settle(res),
                None => break StopReason::Completed,
            },
        }
    };

    state.stop.fire();
    tracker.advance(ScenarioPhase::RampDown);
    if let Some(driver) = driver
        && let Err(err) = driver.await
    {
        tracing::error!(scenario = %name, error = %err, "arrival pacer failed");
    }
    let dropped = match &state.work {
        VuWork::ArrivalRate { pacer } => pacer.dropped_total(),
        _ => 0,
    };

    tracker.advance(ScenarioPhase::GracefulStop);
    let graceful_deadline = Instant::now() + graceful_stop;
    let hard_deadline = hard_stop.map(|extra| graceful_deadline + extra);
    let mut window_closed = false;
    let mut overrun = false;
    let mut interrupted = 0;

    loop {
        tokio::select! {
            biased;
            res = pool.tasks.join_next_with_id() => match res {
                Some(res) => pool.settle(res),
                None => break,
            },
            () = tokio::time::sleep_until(graceful_deadline), if !window_closed => {
                window_closed = true;
                let in_flight = state.in_flight();
                if in_flight > 0 {
                    overrun = true;
                    tracing::warn!(
                        scenario = %name,
                        in_flight,
                        graceful_stop_ms = graceful_stop.as_millis() as u64,
                        "graceful stop window expired with iterations in flight; waiting for them"
                    );
                }
            }
            () = sleep_until_opt(hard_deadline), if window_closed => {
                interrupted = state.in_flight();
                tracing::warn!(scenario = %name, interrupted, "hard stop: aborting in-flight iterations");
                pool.tasks.abort_all();
                while let Some(res) = pool.tasks.join_next_with_id().await {
                    pool.settle(res);
                }
                shared.builtins.record_interrupted(&shared.metrics, interrupted);
                break;
            }
        }
    }

    vu_ids.release(&leased);
    tracker.advance(ScenarioPhase::Done);
    let elapsed = started.elapsed();
    tracing::info!(
        scenario = %name,
        reason = %stop_reason,
        iterations = state.iterations(),
        elapsed_ms = elapsed.as_millis() as u64,
        "scenario done"
    );

    ScenarioSummary {
        name,
        executor: kind,
        phases: tracker.into_history(),
        stop_reason,
        iterations: state.iterations(),
        failed_iterations: state.failed_iterations(),
        peak_concurrency: state.peak_in_flight(),
        dropped_iterations: dropped,
        interrupted_iterations: interrupted,
        graceful_overrun: overrun,
        vu_failures: pool.failures,
        started_at: started.saturating_duration_since(run_started),
        elapsed,
    }
}

/// Spawns a scenario on its own task, inside a `scenario` span.
pub(crate) fn spawn_scenario<S: Script>(
    launch: ScenarioLaunch<S>,
) -> JoinHandle<ScenarioSummary> {
    let span = tracing::info_span!("scenario", name = %launch.config.name);
    tokio::spawn(run_scenario(launch).instrument(span))
}
