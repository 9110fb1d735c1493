use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Admission for constant-VU scenarios: a shared iteration budget and/or a deadline.
///
/// With neither configured exactly one iteration is admitted across all VUs.
#[derive(Debug)]
pub struct IterationGate {
    admitted: AtomicU64,
    budget: Option<u64>,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(budget: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            admitted: AtomicU64::new(0),
            budget,
            duration,
            deadline: OnceLock::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    /// Claims the right to start one more iteration.
    pub fn next(&self) -> bool {
        if let Some(deadline) = self.deadline.get()
            && Instant::now() >= *deadline
        {
            return false;
        }

        let limit = match (self.budget, self.duration) {
            (Some(budget), _) => budget,
            (None, Some(_)) => return true,
            (None, None) => 1,
        };

        // Never bump past the limit so `admitted` stays exact.
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Acquire)
    }
}
