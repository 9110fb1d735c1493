use std::cmp::Ordering;
use std::time::Duration;

use crate::config::Stage;

const RECHECK_CAP: Duration = Duration::from_millis(50);

/// Piecewise-linear target (VUs or arrival rate) over a list of stages.
#[derive(Debug, Clone)]
pub struct RampingU64Schedule {
    start: u64,
    stages: Vec<Stage>,
    ends: Vec<Duration>,
}

/// The stage containing some instant.
#[derive(Debug, Clone, Copy)]
struct Span {
    begin: Duration,
    end: Duration,
    from: u64,
    to: u64,
}

impl Span {
    fn target_at(&self, elapsed: Duration) -> u64 {
        let len = self.end.saturating_sub(self.begin).as_nanos() as i128;
        if len == 0 {
            return self.to;
        }
        let into = elapsed.saturating_sub(self.begin).as_nanos() as i128;
        let from = i128::from(self.from);
        let delta = i128::from(self.to) - from;
        (from + delta * into / len).clamp(0, i128::from(u64::MAX)) as u64
    }
}

impl RampingU64Schedule {
    pub fn new(start: u64, stages: Vec<Stage>) -> Self {
        let ends = stages
            .iter()
            .scan(Duration::ZERO, |acc, st| {
                *acc = acc.saturating_add(st.duration);
                Some(*acc)
            })
            .collect();
        Self { start, stages, ends }
    }

    /// Flat target for `duration`.
    pub fn constant(target: u64, duration: Duration) -> Self {
        Self::new(target, vec![Stage { duration, target }])
    }

    pub fn total_duration(&self) -> Duration {
        self.ends.last().copied().unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    fn span_at(&self, elapsed: Duration) -> Option<Span> {
        // A stage owns `[begin, end)`; an instant on a boundary belongs to the next stage.
        let idx = self.ends.partition_point(|end| *end <= elapsed);
        let stage = self.stages.get(idx)?;
        Some(Span {
            begin: idx.checked_sub(1).map_or(Duration::ZERO, |i| self.ends[i]),
            end: self.ends[idx],
            from: idx.checked_sub(1).map_or(self.start, |i| self.stages[i].target),
            to: stage.target,
        })
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        match self.span_at(elapsed) {
            Some(span) => span.target_at(elapsed),
            None => self.stages.last().map_or(self.start, |st| st.target),
        }
    }

    /// Direction of the stage in effect at `elapsed`. `None` once the schedule is over.
    pub fn direction_at(&self, elapsed: Duration) -> Option<Ordering> {
        self.span_at(elapsed).map(|span| span.to.cmp(&span.from))
    }

    /// The first stage boundary strictly after `elapsed`.
    pub fn next_boundary(&self, elapsed: Duration) -> Option<Duration> {
        self.span_at(elapsed).map(|span| span.end)
    }

    /// How long an idle VU with 1-based `vu_index` should wait before looking again.
    pub fn next_recheck_in(&self, elapsed: Duration, vu_index: u64) -> Duration {
        let Some(span) = self.span_at(elapsed) else {
            return Duration::ZERO;
        };
        let until_stage_end = span.end.saturating_sub(elapsed).min(RECHECK_CAP);

        if vu_index <= span.target_at(elapsed) {
            return Duration::ZERO;
        }
        if span.to <= span.from || vu_index > span.to {
            return until_stage_end;
        }

        // Rising ramp: solve `from + (to - from) * t / len >= vu_index` for t.
        let len = span.end.saturating_sub(span.begin).as_nanos();
        let needed = u128::from(vu_index - span.from) * len / u128::from(span.to - span.from);
        let reached_at = span.begin + Duration::from_nanos(needed.min(u128::from(u64::MAX)) as u64);
        reached_at.saturating_sub(elapsed).min(RECHECK_CAP)
    }
}
