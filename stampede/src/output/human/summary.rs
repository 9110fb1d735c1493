use std::fmt::Write as _;

use stampede_core::metrics::{MetricValues, MetricsSnapshot};
use stampede_core::{AbortCause, RunReport, ScenarioSummary, ThresholdOutcome};

use super::format::*;

const TREND_PERCENTILES: [f64; 3] = [90.0, 95.0, 99.0];

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();

    writeln!(&mut out, "summary (elapsed {})", format_duration(report.elapsed)).ok();

    for s in &report.scenarios {
        render_scenario(s, &mut out);
    }

    render_metrics(&report.metrics, &mut out);
    render_thresholds(&report.thresholds, &mut out);

    match &report.aborted {
        Some(AbortCause::User) => {
            out.push_str("aborted: by user\n");
        }
        Some(AbortCause::Threshold(t)) => {
            writeln!(
                &mut out,
                "aborted: threshold {} {} failed (observed {})",
                t.metric,
                t.expression,
                observed(t)
            )
            .ok();
        }
        None => {}
    }

    if let Some(err) = &report.teardown_error {
        writeln!(&mut out, "teardown failed: {err}").ok();
    }
    for err in &report.run_errors {
        writeln!(&mut out, "run error: {err}").ok();
    }
    if report.stale_tokens > 0 {
        writeln!(
            &mut out,
            "warning: {} token(s) expired during the run",
            report.stale_tokens
        )
        .ok();
    }

    let verdict = if report.overall_pass() { "PASS" } else { "FAIL" };
    writeln!(&mut out, "result: {verdict}").ok();
    out
}

fn render_scenario(s: &ScenarioSummary, out: &mut String) {
    writeln!(
        out,
        "scenario: {} [{}] {}",
        s.name, s.executor, s.stop_reason
    )
    .ok();

    let phases = s
        .phases
        .iter()
        .map(|t| format!("{}@{}", t.phase, format_duration(t.at)))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(out, "  phases: {phases}").ok();

    writeln!(
        out,
        "  iterations: {} (failed {}, dropped {}, interrupted {})",
        s.iterations, s.failed_iterations, s.dropped_iterations, s.interrupted_iterations
    )
    .ok();
    writeln!(out, "  peak concurrency: {}", s.peak_concurrency).ok();

    if s.graceful_overrun {
        out.push_str("  graceful stop window overrun\n");
    }
    for f in &s.vu_failures {
        writeln!(out, "  vu {} retired: {}", f.vu_id, f.error).ok();
    }
}

fn render_metrics(metrics: &MetricsSnapshot, out: &mut String) {
    if metrics.is_empty() {
        return;
    }

    let width = metrics.iter().map(|m| m.name.len()).max().unwrap_or(0);

    out.push_str("metrics\n");
    for m in metrics.iter() {
        let line = match &m.values {
            MetricValues::Counter(c) => format!("count={}", format_number(c.total)),
            MetricValues::Trend(t) => {
                let mut line = format!(
                    "count={} avg={} min={} max={}",
                    t.count(),
                    format_ms_opt(t.avg()),
                    format_ms_opt(t.min()),
                    format_ms_opt(t.max()),
                );
                for p in TREND_PERCENTILES {
                    write!(&mut line, " p({p})={}", format_ms_opt(t.percentile(p))).ok();
                }
                line
            }
        };
        writeln!(out, "  {:<width$}  {line}", m.name).ok();
    }
}

fn render_thresholds(thresholds: &[ThresholdOutcome], out: &mut String) {
    if thresholds.is_empty() {
        return;
    }

    out.push_str("thresholds\n");
    for t in thresholds {
        let mark = if t.passed { "ok  " } else { "FAIL" };
        let margin = t
            .margin()
            .map(format_number)
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "  {mark} {} {} (observed {}, margin {margin})",
            t.metric,
            t.expression,
            observed(t)
        )
        .ok();
    }
}

fn observed(t: &ThresholdOutcome) -> String {
    t.observed
        .map(format_number)
        .unwrap_or_else(|| "no samples".to_string())
}
