//! Clock barrier primitives for the stage workers.
//!
//! Each cycle the coordinator releases one permit per stage gate, then
//! collects five completions. Stage workers block on their gate between
//! cycles, so all latch bookkeeping happens while the pipe is quiescent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use super::NUM_STAGES;

/// A counting semaphore.
pub struct Semaphore {
    permits: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        let mut permits = self
            .permits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *permits == 0 {
            permits = self
                .cv
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    pub fn release(&self, count: usize) {
        let mut permits = self
            .permits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *permits += count;
        self.cv.notify_all();
    }
}

/// Synchronization context shared by the coordinator and the five
/// stage workers.
pub struct PipelineRuntime {
    gates: [Semaphore; NUM_STAGES],
    done: Semaphore,
    shutdown: AtomicBool,
}

impl Default for PipelineRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRuntime {
    pub fn new() -> Self {
        Self {
            gates: [
                Semaphore::new(0),
                Semaphore::new(0),
                Semaphore::new(0),
                Semaphore::new(0),
                Semaphore::new(0),
            ],
            done: Semaphore::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Blocks the given stage until the coordinator opens its gate.
    pub fn wait_for_release(&self, stage: usize) {
        self.gates[stage].acquire();
    }

    /// Signals that a stage completed its share of the cycle.
    pub fn post_done(&self) {
        self.done.release(1);
    }

    /// Opens every stage gate for one cycle.
    pub fn release_stages(&self) {
        for gate in &self.gates {
            gate.release(1);
        }
    }

    /// Waits until all five stages have posted completion.
    pub fn collect_done(&self) {
        for _ in 0..NUM_STAGES {
            self.done.acquire();
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.release_stages();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn semaphore_hands_over_permits() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = Arc::clone(&sem);
        let handle = thread::spawn(move || sem2.acquire());
        sem.release(1);
        handle.join().unwrap();
    }

    #[test]
    fn runtime_round_trips_a_cycle() {
        let rt = Arc::new(PipelineRuntime::new());
        let workers: Vec<_> = (0..NUM_STAGES)
            .map(|i| {
                let rt = Arc::clone(&rt);
                thread::spawn(move || {
                    rt.wait_for_release(i);
                    rt.post_done();
                })
            })
            .collect();
        rt.release_stages();
        rt.collect_done();
        for w in workers {
            w.join().unwrap();
        }
    }
}
