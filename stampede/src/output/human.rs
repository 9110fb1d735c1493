mod format;
mod summary;

use stampede_core::{RunReport, ScenarioConfig};

use super::OutputFormatter;
use crate::workloads::Workload;
use format::{format_duration, format_tags_inline};
use summary::render;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, workload: Workload, target: &str, scenarios: &[ScenarioConfig]) {
        println!("workload: {workload}");
        println!("target: {target}");
        for s in scenarios {
            let duration = s
                .nominal_duration()
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "scenario: {} executor={} vus={} iterations={} duration={duration} graceful_stop={} start_time={}{}",
                s.name,
                s.executor.kind(),
                s.executor.max_vus(),
                s.iterations
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                format_duration(s.graceful_stop),
                format_duration(s.start_time),
                format_tags_inline(&s.tags),
            );
        }
        if !scenarios.is_empty() {
            println!();
        }
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        print!("{}", render(report));

        let failed = report.failed_thresholds().count();
        if failed > 0 {
            eprintln!("thresholds failed: {failed}");
            for t in report.failed_thresholds() {
                match t.observed {
                    Some(obs) => eprintln!("  {}: {} (observed {obs})", t.metric, t.expression),
                    None => eprintln!("  {}: {} (no samples)", t.metric, t.expression),
                }
            }
        }

        Ok(())
    }
}
