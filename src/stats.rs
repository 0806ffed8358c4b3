//! Simulation statistics.

use std::time::Instant;

/// Counters collected over a run. Cache and memory counters live with
/// their components; these cover the pipeline itself.
pub struct SimStats {
    pub cycles: u64,
    /// Instructions that reached Writeback (bubbles excluded).
    pub instructions: u64,
    /// Bubbles inserted by stalls.
    pub bubbles: u64,
    /// Latch pairs cleared by control-transfer flushes.
    pub flushes: u64,
    start: Instant,
}

impl Default for SimStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SimStats {
    pub fn new() -> Self {
        Self {
            cycles: 0,
            instructions: 0,
            bubbles: 0,
            flushes: 0,
            start: Instant::now(),
        }
    }

    pub fn print(&self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        println!("----------------------------------------");
        println!("Pipeline statistics");
        println!("----------------------------------------");
        println!("  cycles       : {}", self.cycles);
        println!("  instructions : {}", self.instructions);
        println!("  bubbles      : {}", self.bubbles);
        println!("  flushes      : {}", self.flushes);
        if self.cycles > 0 {
            println!(
                "  ipc          : {:.3}",
                self.instructions as f64 / self.cycles as f64
            );
        }
        println!("  wall clock   : {elapsed:.3}s");
        println!("----------------------------------------");
    }
}
