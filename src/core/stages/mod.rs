//! The five pipeline stages.
//!
//! Each stage runs once per clock cycle on its own worker thread. A
//! stage takes the shared-state lock for its work; when it depends on
//! another stage's output this cycle it waits on the progress condition
//! variable, which releases the lock so the producing stage can run.

pub mod decode;
pub mod execute;
pub mod fetch;
pub mod memory;
pub mod writeback;

use std::sync::{MutexGuard, PoisonError};

use super::{CoreState, Shared, NUM_STAGES};

/// Per-cycle stage entry points, indexed by stage number.
pub(crate) const STAGE_FNS: [fn(&Shared); NUM_STAGES] = [
    fetch::run,
    decode::run,
    execute::run,
    memory::run,
    writeback::run,
];

/// Holds the shared-state lock for the duration of one stage's cycle
/// and mediates intra-cycle waits on other stages.
pub(crate) struct StageCtx<'a> {
    shared: &'a Shared,
    guard: Option<MutexGuard<'a, CoreState>>,
}

impl<'a> StageCtx<'a> {
    pub(crate) fn new(shared: &'a Shared) -> Self {
        Self {
            guard: Some(shared.lock()),
            shared,
        }
    }

    pub(crate) fn st(&mut self) -> &mut CoreState {
        self.guard.as_mut().expect("stage context holds the state lock")
    }

    /// Blocks until `pred` holds, releasing the state lock while
    /// waiting. Progress is guaranteed as long as the producing stage
    /// finishes its output latch this cycle; an unfinished producer
    /// stalls the whole clock round, exactly like the consumer
    /// retrying against a failed access.
    pub(crate) fn wait_until(&mut self, pred: impl Fn(&CoreState) -> bool) {
        let mut guard = self
            .guard
            .take()
            .expect("stage context holds the state lock");
        while !pred(&guard) {
            guard = self
                .shared
                .progress
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.guard = Some(guard);
    }

    /// Marks the stage's output latch finished and wakes any stage
    /// waiting on it.
    pub(crate) fn finish(&mut self, stage: usize) {
        self.st().out_latch[stage].finished = true;
        self.shared.progress.notify_all();
    }

    /// Copies the stage's input latch into its output latch; every
    /// stage starts its cycle this way.
    pub(crate) fn take_input(&mut self, stage: usize) {
        let st = self.st();
        let src = st.in_latch[stage].clone();
        st.out_latch[stage].load_from(&src);
    }
}
