use std::sync::Arc;
use std::time::Duration;

use stampede_http::HttpClient;
use stampede_metrics::Registry;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument as _;

use crate::auth::{AuthExchange, ClientCredentialsExchange, TokenManager};
use crate::builtin::BuiltinMetrics;
use crate::config::{DEFAULT_THRESHOLD_INTERVAL, HarnessConfig};
use crate::error::{Error, Result};
use crate::report::{AbortCause, RunReport};
use crate::runner::{RunShared, ScenarioLaunch, Signal, VuIdPool, spawn_scenario};
use crate::script::{Script, SetupContext};
use crate::thresholds::{Threshold, ThresholdOutcome, compile_thresholds, evaluate_thresholds};

/// Stops a running [`RunController::run`] as if every scenario's duration had elapsed.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    signal: Arc<Signal>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.signal.fire();
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_fired()
    }
}

/// Orchestrates one run: tokens, setup, scenarios, teardown, verdict.
pub struct RunController<S, E = ClientCredentialsExchange> {
    config: HarnessConfig,
    script: S,
    tokens: TokenManager<E>,
    http: HttpClient,
    stop: Arc<Signal>,
}

impl<S: Script> RunController<S> {
    pub fn new(config: HarnessConfig, script: S) -> Self {
        let mut http = HttpClient::default();
        if let Some(timeout) = config.request_timeout {
            http = http.with_request_timeout(timeout);
        }
        let exchange = ClientCredentialsExchange::new(http.clone(), &config.target);
        Self {
            config,
            script,
            tokens: TokenManager::new(exchange),
            http,
            stop: Arc::new(Signal::new()),
        }
    }
}

impl<S: Script, E: AuthExchange> RunController<S, E> {
    /// Replaces the token exchange (the default posts client credentials to the target).
    pub fn with_exchange<E2: AuthExchange>(self, exchange: E2) -> RunController<S, E2> {
        RunController {
            config: self.config,
            script: self.script,
            tokens: TokenManager::new(exchange),
            http: self.http,
            stop: self.stop,
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            signal: self.stop.clone(),
        }
    }

    /// Runs to completion.
    ///
    /// Configuration, authentication and setup failures are returned as errors and no
    /// VU is started. Once setup has succeeded the run always produces a report;
    /// teardown and scenario failures are carried in it.
    pub async fn run(self) -> Result<RunReport> {
        let Self {
            config,
            script,
            tokens,
            http,
            stop,
        } = self;

        if config.scenarios.is_empty() {
            return Err(Error::NoScenarios);
        }
        if config.threshold_interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::InvalidThresholdInterval);
        }
        if config.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidRequestTimeout);
        }

        let (registry, builtins) = build_registry(&script)?;

        let thresholds: Arc<[Threshold]> =
            compile_thresholds(&config.thresholds, &registry)?.into();
        tracing::debug!(
            metrics = registry.names().count(),
            thresholds = thresholds.len(),
            "metric table built"
        );

        let pool = tokens.acquire_all(&config.credentials).await?;
        let metrics = Arc::new(registry);

        let setup_ctx = SetupContext {
            target: &config.target,
            http: &http,
            tokens: &pool,
            metrics: &metrics,
        };
        let context = script
            .setup(&setup_ctx)
            .instrument(tracing::info_span!("setup"))
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "setup failed");
                Error::Setup(err)
            })?;
        tracing::info!("setup complete");

        let shared = Arc::new(RunShared {
            script,
            context,
            tokens: pool,
            metrics: metrics.clone(),
            builtins,
            http,
            target: Arc::from(config.target.as_str()),
        });

        let run_started = Instant::now();
        let run_done = Arc::new(Signal::new());

        let interval = config.threshold_interval.or_else(|| {
            thresholds
                .iter()
                .any(Threshold::abort_on_fail)
                .then_some(DEFAULT_THRESHOLD_INTERVAL)
        });
        let monitor = interval.filter(|_| !thresholds.is_empty()).map(|interval| {
            tokio::spawn(monitor_thresholds(
                thresholds.clone(),
                metrics.clone(),
                interval,
                run_started,
                stop.clone(),
                run_done.clone(),
            ))
        });

        let vu_ids = Arc::new(VuIdPool::new());
        let mut handles = Vec::with_capacity(config.scenarios.len());
        for scenario in &config.scenarios {
            handles.push((
                scenario.name.clone(),
                spawn_scenario(ScenarioLaunch {
                    shared: shared.clone(),
                    config: scenario.clone(),
                    vu_ids: vu_ids.clone(),
                    run_started,
                    run_stop: stop.clone(),
                    hard_stop: config.hard_stop,
                }),
            ));
        }

        let mut scenarios = Vec::with_capacity(handles.len());
        let mut run_errors = Vec::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(summary) => scenarios.push(summary),
                Err(err) => {
                    tracing::error!(scenario = %name, error = %err, "scenario task failed");
                    run_errors.push(format!("scenario `{name}`: {err}"));
                }
            }
        }

        run_done.fire();
        let threshold_abort = match monitor {
            Some(handle) => handle.await.unwrap_or_else(|err| {
                run_errors.push(format!("threshold monitor: {err}"));
                None
            }),
            None => None,
        };
        let aborted = match threshold_abort {
            Some(outcome) => Some(AbortCause::Threshold(outcome)),
            None if stop.is_fired() => Some(AbortCause::User),
            None => None,
        };

        let teardown_ctx = SetupContext {
            target: &config.target,
            http: &shared.http,
            tokens: &shared.tokens,
            metrics: &metrics,
        };
        let teardown_error = shared
            .script
            .teardown(&shared.context, &teardown_ctx)
            .instrument(tracing::info_span!("teardown"))
            .await
            .err();
        if let Some(err) = &teardown_error {
            tracing::error!(error = %err, "teardown failed");
        }

        let stale_tokens = shared.tokens.stale_count(Instant::now());
        if stale_tokens > 0 {
            tracing::warn!(
                stale_tokens,
                "tokens outlived their advertised lifetime; late failures may be auth errors"
            );
        }

        let snapshot = metrics.snapshot();
        let outcomes = evaluate_thresholds(&thresholds, &snapshot);
        for outcome in outcomes.iter().filter(|o| !o.passed) {
            tracing::warn!(
                metric = %outcome.metric,
                threshold = %outcome.expression,
                observed = ?outcome.observed,
                "threshold failed"
            );
        }

        Ok(RunReport {
            scenarios,
            metrics: snapshot,
            thresholds: outcomes,
            aborted,
            teardown_error,
            run_errors,
            stale_tokens,
            elapsed: run_started.elapsed(),
        })
    }
}

fn build_registry<S: Script>(script: &S) -> Result<(Registry, BuiltinMetrics)> {
    let mut builder = Registry::builder();
    let builtins = BuiltinMetrics::declare(&mut builder)?;
    script.declare_metrics(&mut builder)?;
    Ok((builder.build(), builtins))
}

/// Periodically evaluates thresholds; fires `stop` on the first abort-worthy failure.
async fn monitor_thresholds(
    thresholds: Arc<[Threshold]>,
    metrics: Arc<Registry>,
    interval: Duration,
    run_started: Instant,
    stop: Arc<Signal>,
    done: Arc<Signal>,
) -> Option<ThresholdOutcome> {
    let mut ticker = tokio::time::interval_at(run_started + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = done.wait() => return None,
            () = stop.wait() => return None,
            _ = ticker.tick() => {}
        }

        let elapsed = run_started.elapsed();
        let snapshot = metrics.snapshot();
        for threshold in thresholds.iter() {
            let outcome = threshold.evaluate(&snapshot);
            if outcome.passed {
                continue;
            }
            if threshold.may_abort_at(elapsed) {
                tracing::error!(
                    metric = %outcome.metric,
                    threshold = %outcome.expression,
                    observed = ?outcome.observed,
                    "threshold failed; aborting run"
                );
                stop.fire();
                return Some(outcome);
            }
            tracing::debug!(
                metric = %outcome.metric,
                threshold = %outcome.expression,
                observed = ?outcome.observed,
                "threshold failing"
            );
        }
    }
}
