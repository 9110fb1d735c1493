use serde::Serialize;
use std::io::Write as _;

use stampede_core::metrics::{MetricValues, MetricsSnapshot};
use stampede_core::{AbortCause, RunReport, ScenarioConfig, ScenarioSummary, ThresholdOutcome};

use super::OutputFormatter;
use crate::workloads::Workload;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _workload: Workload, _target: &str, _scenarios: &[ScenarioConfig]) {}

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        let mut out = std::io::stdout().lock();
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub passed: bool,
    pub thresholds_passed: bool,
    pub failure_phase: Option<String>,
    pub aborted: Option<JsonAbort>,
    pub teardown_error: Option<String>,
    pub run_errors: Vec<String>,
    pub stale_tokens: usize,
    pub elapsed_ms: f64,
    pub scenarios: Vec<JsonScenarioSummary>,
    pub metrics: Vec<JsonMetric>,
    pub thresholds: Vec<JsonThreshold>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub(crate) enum JsonAbort {
    User,
    Threshold { metric: String, expression: String },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonScenarioSummary {
    pub scenario: String,
    pub executor: String,
    pub stop_reason: String,
    pub phases: Vec<JsonPhase>,
    pub iterations: u64,
    pub failed_iterations: u64,
    pub dropped_iterations: u64,
    pub interrupted_iterations: u64,
    pub peak_concurrency: u64,
    pub graceful_overrun: bool,
    pub vu_failures: Vec<JsonVuFailure>,
    pub started_at_ms: f64,
    pub elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonPhase {
    pub phase: String,
    pub at_ms: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonVuFailure {
    pub vu: u64,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonMetric {
    pub name: String,
    pub kind: String,
    pub count: u64,
    /// Counter total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<JsonTrend>,
}

/// Milliseconds; `None` when the trend has no samples.
#[derive(Debug, Serialize)]
pub(crate) struct JsonTrend {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub passed: bool,
    pub observed: Option<f64>,
    pub limit: f64,
    pub margin: Option<f64>,
}

fn millis(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        passed: report.overall_pass(),
        thresholds_passed: report.thresholds_passed(),
        failure_phase: report.failure_phase().map(|p| p.to_string()),
        aborted: report.aborted.as_ref().map(|cause| match cause {
            AbortCause::User => JsonAbort::User,
            AbortCause::Threshold(t) => JsonAbort::Threshold {
                metric: t.metric.to_string(),
                expression: t.expression.clone(),
            },
        }),
        teardown_error: report.teardown_error.as_ref().map(|e| e.to_string()),
        run_errors: report.run_errors.clone(),
        stale_tokens: report.stale_tokens,
        elapsed_ms: millis(report.elapsed),
        scenarios: report.scenarios.iter().map(scenario_summary).collect(),
        metrics: metrics(&report.metrics),
        thresholds: report.thresholds.iter().map(threshold).collect(),
    }
}

fn scenario_summary(s: &ScenarioSummary) -> JsonScenarioSummary {
    JsonScenarioSummary {
        scenario: s.name.clone(),
        executor: s.executor.to_string(),
        stop_reason: s.stop_reason.to_string(),
        phases: s
            .phases
            .iter()
            .map(|t| JsonPhase {
                phase: t.phase.to_string(),
                at_ms: millis(t.at),
            })
            .collect(),
        iterations: s.iterations,
        failed_iterations: s.failed_iterations,
        dropped_iterations: s.dropped_iterations,
        interrupted_iterations: s.interrupted_iterations,
        peak_concurrency: s.peak_concurrency,
        graceful_overrun: s.graceful_overrun,
        vu_failures: s
            .vu_failures
            .iter()
            .map(|f| JsonVuFailure {
                vu: f.vu_id,
                error: f.error.clone(),
            })
            .collect(),
        started_at_ms: millis(s.started_at),
        elapsed_ms: millis(s.elapsed),
    }
}

fn metrics(snapshot: &MetricsSnapshot) -> Vec<JsonMetric> {
    snapshot
        .iter()
        .map(|m| match &m.values {
            MetricValues::Counter(c) => JsonMetric {
                name: m.name.to_string(),
                kind: m.kind.to_string(),
                count: c.samples,
                total: Some(c.total),
                trend: None,
            },
            MetricValues::Trend(t) => JsonMetric {
                name: m.name.to_string(),
                kind: m.kind.to_string(),
                count: t.count(),
                total: None,
                trend: Some(JsonTrend {
                    avg: t.avg(),
                    min: t.min(),
                    max: t.max(),
                    p90: t.percentile(90.0),
                    p95: t.percentile(95.0),
                    p99: t.percentile(99.0),
                }),
            },
        })
        .collect()
}

fn threshold(t: &ThresholdOutcome) -> JsonThreshold {
    JsonThreshold {
        metric: t.metric.to_string(),
        expression: t.expression.clone(),
        passed: t.passed,
        observed: t.observed,
        limit: t.limit,
        margin: t.margin(),
    }
}
