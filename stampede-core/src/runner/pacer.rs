use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// Hands out iteration starts for arrival-rate scenarios.
///
/// A driver task schedules starts as time passes; VUs claim them one at a time. The
/// unclaimed backlog never exceeds `max_vus`; anything beyond it is dropped.
#[derive(Debug)]
pub struct ArrivalPacer {
    scheduled: AtomicU64,
    claimed: AtomicU64,
    dropped: AtomicU64,

    active_vus: AtomicU64,
    pre_allocated_vus: u64,
    max_vus: u64,

    done: AtomicBool,
    notify: Notify,
}

impl ArrivalPacer {
    pub fn new(pre_allocated_vus: u64, max_vus: u64) -> Self {
        let max_vus = max_vus.max(1);
        Self {
            scheduled: AtomicU64::new(0),
            claimed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            active_vus: AtomicU64::new(pre_allocated_vus.clamp(1, max_vus)),
            pre_allocated_vus,
            max_vus,
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn backlog(&self) -> u64 {
        let claimed = self.claimed.load(Ordering::Acquire);
        self.scheduled
            .load(Ordering::Acquire)
            .saturating_sub(claimed)
    }

    /// Schedules `due` more starts and returns how many of them were dropped.
    pub fn update_due(&self, due: u64) -> u64 {
        let room = self.max_vus.saturating_sub(self.backlog());
        let accepted = due.min(room);
        let dropped = due - accepted;

        if accepted != 0 {
            self.scheduled.fetch_add(accepted, Ordering::AcqRel);
        }
        if dropped != 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
        }

        self.resize();
        self.notify.notify_waiters();
        dropped
    }

    // Keep `pre_allocated_vus` awake, plus one per queued start, up to `max_vus`.
    fn resize(&self) {
        let backlog = self.backlog();
        let desired = if backlog == 0 {
            self.pre_allocated_vus
        } else {
            self.pre_allocated_vus.max(backlog.saturating_add(1))
        };
        self.active_vus
            .store(desired.clamp(1, self.max_vus), Ordering::Release);
    }

    /// Stops scheduling and drops the unclaimed backlog. Returns the number dropped here.
    pub fn mark_done(&self) -> u64 {
        self.done.store(true, Ordering::Release);

        let mut dropped = 0;
        loop {
            let claimed = self.claimed.load(Ordering::Acquire);
            let scheduled = self.scheduled.load(Ordering::Acquire);
            if claimed >= scheduled {
                break;
            }
            if self
                .claimed
                .compare_exchange(claimed, scheduled, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                dropped = scheduled - claimed;
                break;
            }
        }
        if dropped != 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
        }

        self.notify.notify_waiters();
        dropped
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn active_vus(&self) -> u64 {
        self.active_vus.load(Ordering::Acquire)
    }

    fn try_claim(&self) -> bool {
        self.claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |claimed| {
                (claimed < self.scheduled.load(Ordering::Acquire)).then_some(claimed + 1)
            })
            .is_ok()
    }

    /// Waits for a scheduled start. `false` once the pacer is done.
    pub async fn claim_next(&self) -> bool {
        loop {
            let notified = self.notify.notified();
            if self.is_done() {
                return false;
            }
            if self.try_claim() {
                return true;
            }
            notified.await;
        }
    }

    /// Parks VU `scenario_vu` (1-based) until the pacer wants it. `false` once done.
    pub async fn wait_until_active(&self, scenario_vu: u64) -> bool {
        loop {
            let notified = self.notify.notified();
            if self.is_done() {
                return false;
            }
            if scenario_vu <= self.active_vus() {
                return true;
            }
            notified.await;
        }
    }
}
