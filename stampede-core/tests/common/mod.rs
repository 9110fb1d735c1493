#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stampede_core::metrics::{Counter, RegistryBuilder, Trend};
use stampede_core::{IterationError, Script, ScriptError, SetupContext, Vu};
use tokio::time::Instant;

/// In-process workload: each iteration "requests" for a while, records RTT and the
/// status outcome, then thinks.
#[derive(Debug, Clone)]
pub struct Sim {
    /// Request time per iteration index of a VU; the last entry repeats.
    pub request: Vec<Duration>,
    pub think: Duration,
    pub status: u16,
    pub fatal_vus: Vec<u64>,
    pub setup_error: Option<&'static str>,
    pub teardown_error: Option<&'static str>,
    pub calls: Arc<Calls>,
}

#[derive(Debug, Default)]
pub struct Calls {
    pub setup: AtomicU64,
    pub teardown: AtomicU64,
    pub iterations: AtomicU64,
    /// Iterations executing right now, across all VUs.
    pub running: AtomicU64,
    pub peak_running: AtomicU64,
    /// Token owner seen by each VU id.
    pub vu_tokens: parking_lot::Mutex<BTreeMap<u64, Option<usize>>>,
    /// VU ids seen per scenario.
    pub scenario_vus: parking_lot::Mutex<BTreeMap<String, BTreeSet<u64>>>,
}

impl Calls {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }

    pub fn vus_of(&self, scenario: &str) -> Vec<u64> {
        self.scenario_vus
            .lock()
            .get(scenario)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

pub struct SimContext {
    pub rtt: Trend,
    pub errors: Counter,
    pub success: Counter,
}

impl Sim {
    pub fn new(request: Duration, think: Duration) -> Self {
        Self {
            request: vec![request],
            think,
            status: 200,
            fatal_vus: Vec::new(),
            setup_error: None,
            teardown_error: None,
            calls: Arc::new(Calls::default()),
        }
    }

    fn request_for(&self, iteration: u64) -> Duration {
        let idx = (iteration as usize).min(self.request.len().saturating_sub(1));
        self.request.get(idx).copied().unwrap_or_default()
    }
}

impl Script for Sim {
    type Context = SimContext;

    fn declare_metrics(&self, metrics: &mut RegistryBuilder) -> stampede_core::metrics::Result<()> {
        metrics.trend("RTT")?;
        metrics.counter("Errors")?;
        metrics.counter("Success")?;
        Ok(())
    }

    async fn setup(&self, ctx: &SetupContext<'_>) -> Result<SimContext, ScriptError> {
        self.calls.setup.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.setup_error {
            return Err(ScriptError::new(err));
        }
        Ok(SimContext {
            rtt: ctx.metrics.trend("RTT")?,
            errors: ctx.metrics.counter("Errors")?,
            success: ctx.metrics.counter("Success")?,
        })
    }

    async fn run(&self, vu: &Vu<'_, SimContext>) -> Result<(), IterationError> {
        if self.fatal_vus.contains(&vu.id()) {
            return Err(IterationError::fatal("missing per-VU state"));
        }

        self.calls
            .vu_tokens
            .lock()
            .insert(vu.id(), vu.token().map(|t| t.owner()));
        self.calls
            .scenario_vus
            .lock()
            .entry(vu.scenario().to_string())
            .or_default()
            .insert(vu.id());

        let running = self.calls.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.peak_running.fetch_max(running, Ordering::SeqCst);
        self.calls.iterations.fetch_add(1, Ordering::SeqCst);

        let ctx = vu.context();
        let started = Instant::now();
        tokio::time::sleep(self.request_for(vu.iteration())).await;
        vu.metrics().observe_duration(ctx.rtt, started.elapsed())?;

        self.calls.running.fetch_sub(1, Ordering::SeqCst);

        match self.status {
            200 => vu.metrics().add(ctx.success, 1.0)?,
            404 => {}
            status => {
                vu.metrics().add(ctx.errors, f64::from(status))?;
                return Err(IterationError::failed(format!("status {status}")));
            }
        }

        if !self.think.is_zero() {
            vu.sleep(self.think).await;
        }
        Ok(())
    }

    async fn teardown(&self, _context: &SimContext, _ctx: &SetupContext<'_>) -> Result<(), ScriptError> {
        self.calls.teardown.fetch_add(1, Ordering::SeqCst);
        match self.teardown_error {
            Some(err) => Err(ScriptError::new(err)),
            None => Ok(()),
        }
    }
}
