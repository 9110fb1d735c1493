use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stampede_http::HttpClient;
use stampede_metrics::Registry;
use tokio::time::Instant;

use super::gate::IterationGate;
use super::pacer::ArrivalPacer;
use super::schedule::RampingU64Schedule;
use super::signal::Signal;
use crate::auth::{Token, TokenPool};
use crate::builtin::BuiltinMetrics;
use crate::config::ScenarioConfig;
use crate::script::{IterationError, Script};

/// A virtual user as seen by one iteration.
#[derive(Debug)]
pub struct Vu<'a, C> {
    id: u64,
    scenario_vu: u64,
    iteration: u64,
    scenario: &'a ScenarioConfig,
    context: &'a C,
    token: Option<&'a Token>,
    metrics: &'a Registry,
    http: &'a HttpClient,
    target: &'a str,
    stop: &'a Signal,
}

impl<'a, C> Vu<'a, C> {
    /// Run-wide, 1-based VU index.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 1-based index within the scenario.
    pub fn scenario_vu(&self) -> u64 {
        self.scenario_vu
    }

    /// Iterations this VU has started before the current one.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn scenario(&self) -> &'a str {
        &self.scenario.name
    }

    pub fn tags(&self) -> &'a [(String, String)] {
        &self.scenario.tags
    }

    /// Value produced by `setup`.
    pub fn context(&self) -> &'a C {
        self.context
    }

    /// Token assigned by `(id - 1) mod pool size`; `None` without credentials.
    pub fn token(&self) -> Option<&'a Token> {
        self.token
    }

    pub fn metrics(&self) -> &'a Registry {
        self.metrics
    }

    pub fn http(&self) -> &'a HttpClient {
        self.http
    }

    pub fn target(&self) -> &'a str {
        self.target
    }

    /// `target` joined with `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.target.trim_end_matches('/'))
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_fired()
    }

    /// Suspends this VU. Returns `false` if the scenario stopped first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.stop.wait() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }
}

/// What a VU waits on before each iteration.
#[derive(Debug)]
pub(crate) enum VuWork {
    Constant { gate: IterationGate },
    RampingVus { schedule: RampingU64Schedule },
    ArrivalRate { pacer: Arc<ArrivalPacer> },
}

/// Everything VUs of every scenario share once setup has returned.
pub(crate) struct RunShared<S: Script> {
    pub(crate) script: S,
    pub(crate) context: S::Context,
    pub(crate) tokens: TokenPool,
    pub(crate) metrics: Arc<Registry>,
    pub(crate) builtins: BuiltinMetrics,
    pub(crate) http: HttpClient,
    pub(crate) target: Arc<str>,
}

/// Per-scenario state shared by its VUs and its scheduler.
#[derive(Debug)]
pub(crate) struct ScenarioState {
    pub(crate) config: ScenarioConfig,
    pub(crate) work: VuWork,
    pub(crate) started: Instant,
    pub(crate) stop: Signal,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
    iterations: AtomicU64,
    failed_iterations: AtomicU64,
}

impl ScenarioState {
    pub(crate) fn new(config: ScenarioConfig, work: VuWork, started: Instant) -> Self {
        Self {
            config,
            work,
            started,
            stop: Signal::new(),
            in_flight: AtomicU64::new(0),
            peak_in_flight: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            failed_iterations: AtomicU64::new(0),
        }
    }

    pub(crate) fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Acquire)
    }

    pub(crate) fn failed_iterations(&self) -> u64 {
        self.failed_iterations.load(Ordering::Acquire)
    }
}

/// Counts an iteration as in flight until dropped, including when its task is aborted.
struct InFlight<'a>(&'a ScenarioState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a ScenarioState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        state.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub(crate) struct VuOutcome {
    pub(crate) iterations: u64,
    /// Set when a fatal iteration error retired the VU.
    pub(crate) fatal: Option<String>,
}

async fn ramping_slot(state: &ScenarioState, schedule: &RampingU64Schedule, vu: u64) -> bool {
    loop {
        let elapsed = state.started.elapsed();
        if schedule.is_done(elapsed) || state.stop.is_fired() {
            return false;
        }
        if vu <= schedule.target_at(elapsed) {
            return true;
        }

        let wait = schedule
            .next_recheck_in(elapsed, vu)
            .max(Duration::from_millis(1));
        tokio::select! {
            biased;
            () = state.stop.wait() => return false,
            () = tokio::time::sleep(wait) => {}
        }
    }
}

async fn admit(state: &ScenarioState, scenario_vu: u64) -> bool {
    if state.stop.is_fired() {
        return false;
    }
    match &state.work {
        VuWork::Constant { gate } => gate.next(),
        VuWork::RampingVus { schedule } => ramping_slot(state, schedule, scenario_vu).await,
        VuWork::ArrivalRate { pacer } => {
            pacer.wait_until_active(scenario_vu).await && pacer.claim_next().await
        }
    }
}

/// Iterates until the scenario stops admitting work or a fatal error retires the VU.
pub(crate) async fn run_vu<S: Script>(
    shared: Arc<RunShared<S>>,
    state: Arc<ScenarioState>,
    id: u64,
    scenario_vu: u64,
) -> VuOutcome {
    let token = shared.tokens.token_for_vu(id);
    let mut iteration = 0u64;

    while admit(&state, scenario_vu).await {
        let vu = Vu {
            id,
            scenario_vu,
            iteration,
            scenario: &state.config,
            context: &shared.context,
            token,
            metrics: &shared.metrics,
            http: &shared.http,
            target: &shared.target,
            stop: &state.stop,
        };

        let guard = InFlight::enter(&state);
        let started = Instant::now();
        let res = shared.script.run(&vu).await;
        let elapsed = started.elapsed();
        drop(guard);

        iteration += 1;
        state.iterations.fetch_add(1, Ordering::AcqRel);
        if res.is_err() {
            state.failed_iterations.fetch_add(1, Ordering::AcqRel);
        }
        shared
            .builtins
            .record_iteration(&shared.metrics, elapsed, res.is_err());

        match res {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                tracing::error!(vu = id, iteration, error = %err, "virtual user retired");
                return VuOutcome {
                    iterations: iteration,
                    fatal: Some(err.to_string()),
                };
            }
            Err(IterationError::Http(err)) => {
                tracing::debug!(vu = id, iteration, kind = %err.kind(), error = %err, "request failed");
            }
            Err(err) => {
                tracing::debug!(vu = id, iteration, error = %err, "iteration failed");
            }
        }

        if let Some(pacing) = state.config.pacing
            && !vu.sleep(pacing).await
        {
            break;
        }
    }

    VuOutcome {
        iterations: iteration,
        fatal: None,
    }
}
