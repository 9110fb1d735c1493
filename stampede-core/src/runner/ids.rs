use std::collections::BTreeSet;

use parking_lot::Mutex;

/// Run-wide VU index allocator. Hands out the lowest free index, so scenarios
/// that run one after another reuse `1..=n` while overlapping scenarios get
/// disjoint indices.
#[derive(Debug)]
pub(crate) struct VuIdPool {
    inner: Mutex<IdState>,
}

#[derive(Debug)]
struct IdState {
    free: BTreeSet<u64>,
    next: u64,
}

impl Default for VuIdPool {
    fn default() -> Self {
        Self {
            inner: Mutex::new(IdState {
                free: BTreeSet::new(),
                next: 1,
            }),
        }
    }
}

impl VuIdPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Takes `n` indices, lowest first.
    pub(crate) fn acquire(&self, n: u64) -> Vec<u64> {
        let mut state = self.inner.lock();
        let mut ids = Vec::with_capacity(usize::try_from(n).unwrap_or_default());
        while (ids.len() as u64) < n {
            let id = match state.free.pop_first() {
                Some(id) => id,
                None => {
                    let id = state.next;
                    state.next += 1;
                    id
                }
            };
            ids.push(id);
        }
        ids
    }

    pub(crate) fn release(&self, ids: &[u64]) {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        state.free.extend(ids.iter().copied());
        // Fold the tail back into `next` so the free set stays small.
        while state.next > 1 && state.free.remove(&(state.next - 1)) {
            state.next -= 1;
        }
    }
}
