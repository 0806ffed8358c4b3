//! The processor core.
//!
//! Five stage workers run concurrently under a clock barrier owned by
//! [`Processor`]. All architectural and pipeline state sits in
//! [`CoreState`] behind one lock; intra-cycle dependencies (forwarding,
//! PC arbitration) wait on a condition variable that is notified each
//! time a stage marks its output latch finished.

pub mod latch;
pub mod regfile;
pub mod runtime;
pub mod stages;

use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::common::{ImageError, MemError, PortError};
use crate::config::Config;
use crate::mem::cache::CacheChain;
use crate::mem::{MainMemory, Storage};
use crate::ports::{PortManager, WordChannel};
use crate::stats::SimStats;

use latch::Latch;
use regfile::RegisterFile;
use runtime::PipelineRuntime;
use stages::STAGE_FNS;

pub const STAGE_FETCH: usize = 0;
pub const STAGE_DECODE: usize = 1;
pub const STAGE_EXECUTE: usize = 2;
pub const STAGE_MEMORY: usize = 3;
pub const STAGE_WRITEBACK: usize = 4;
pub const NUM_STAGES: usize = 5;

pub const BREAKPOINT_SLOTS: usize = 16;

/// Which stage last wrote the next-PC register this cycle. Later stages
/// outrank earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpcSource {
    NotWritten,
    Fetch,
    Decode,
    Execute,
}

impl NpcSource {
    fn rank(self) -> u8 {
        match self {
            NpcSource::NotWritten => 0,
            NpcSource::Fetch => 1,
            NpcSource::Decode => 2,
            NpcSource::Execute => 3,
        }
    }
}

/// How a control-transfer target is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcUpdate {
    Absolute,
    Relative,
}

/// Everything the stages share: latches, architectural state, the
/// memory hierarchy and the device ports.
pub(crate) struct CoreState {
    pub(crate) in_latch: [Latch; NUM_STAGES],
    pub(crate) out_latch: [Latch; NUM_STAGES],
    pub(crate) regs: RegisterFile,
    pub(crate) pc: u32,
    pub(crate) npc: u32,
    pub(crate) npc_from: NpcSource,
    pub(crate) flush: [bool; NUM_STAGES],
    /// When set, memory and register writes are skipped but still
    /// report success so the pipe drains cleanly at termination.
    pub(crate) block_updates: bool,
    pub(crate) trace: bool,
    pub(crate) mem: MainMemory,
    pub(crate) icache: CacheChain,
    pub(crate) dcache: CacheChain,
    pub(crate) ports: PortManager,
    pub(crate) stats: SimStats,
}

impl CoreState {
    /// Arbitrates next-PC proposals: a writer only displaces a proposal
    /// from an earlier stage.
    pub(crate) fn pc_update_control(&mut self, value: u32, source: NpcSource) {
        if source.rank() > self.npc_from.rank() {
            self.npc = value;
            self.npc_from = source;
            if self.trace {
                eprintln!("[PC ] NPC updated to {value:#x} by {source:?}");
            }
        } else if self.trace {
            eprintln!("[PC ] NPC update by {source:?} aborted");
        }
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<CoreState>,
    /// Notified whenever a stage marks its output latch finished.
    pub(crate) progress: Condvar,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The simulated processor: owns the shared state, the clock runtime
/// and the five stage worker threads.
pub struct Processor {
    shared: Arc<Shared>,
    runtime: Arc<PipelineRuntime>,
    handles: Vec<JoinHandle<()>>,
    cycle_count: u64,
    continue_count: i64,
    breakpoints: [i64; BREAKPOINT_SLOTS],
}

impl Processor {
    pub fn new(config: &Config) -> Self {
        let state = CoreState {
            in_latch: Default::default(),
            out_latch: Default::default(),
            regs: RegisterFile::default(),
            pc: config.general.start_address,
            npc: config.general.start_address,
            npc_from: NpcSource::NotWritten,
            flush: [false; NUM_STAGES],
            block_updates: false,
            trace: config.general.trace_instructions,
            mem: MainMemory::new(config.memory.size_bytes),
            icache: CacheChain::from_config(&config.cache.instruction),
            dcache: CacheChain::from_config(&config.cache.data),
            ports: PortManager::new(),
            stats: SimStats::new(),
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                progress: Condvar::new(),
            }),
            runtime: Arc::new(PipelineRuntime::new()),
            handles: Vec::new(),
            cycle_count: 0,
            continue_count: 0,
            breakpoints: [-1; BREAKPOINT_SLOTS],
        }
    }

    /// Loads a program image into main memory and returns its
    /// start-address marker.
    pub fn load_image(&self, path: &Path) -> Result<u32, ImageError> {
        self.shared.lock().mem.load_image(path)
    }

    /// Writes a word directly into main memory. Used to poke programs
    /// in without an image file.
    pub fn write_word(&self, addr: u32, word: u32) -> Result<(), MemError> {
        self.shared.lock().mem.write(addr, word as i32, 4)
    }

    /// Attaches a device channel to the port table.
    pub fn add_port(&self, device: u32, channel: Box<dyn WordChannel>) -> Result<(), PortError> {
        self.shared.lock().ports.add_port(device, channel)
    }

    /// Connects a device slot to a TCP endpoint.
    pub fn connect_tcp(&self, device: u32, host: &str, port: u16) -> Result<(), PortError> {
        self.shared.lock().ports.connect_tcp(device, host, port)
    }

    /// Spawns the five stage workers. Must be called before
    /// [`cycle`](Self::cycle).
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            return;
        }
        for (i, stage_fn) in STAGE_FNS.iter().enumerate() {
            let shared = Arc::clone(&self.shared);
            let runtime = Arc::clone(&self.runtime);
            let stage_fn = *stage_fn;
            let handle = thread::Builder::new()
                .name(format!("stage{i}"))
                .spawn(move || loop {
                    runtime.wait_for_release(i);
                    if runtime.is_shutdown() {
                        break;
                    }
                    stage_fn(&shared);
                    runtime.post_done();
                })
                .unwrap_or_else(|e| panic!("failed to spawn stage {i} worker: {e}"));
            self.handles.push(handle);
        }
    }

    /// Runs one clock round: releases the stage gates, collects the
    /// five completions, then does latch bookkeeping and the
    /// breakpoint scan while the pipe is quiescent.
    pub fn cycle(&mut self) {
        self.runtime.release_stages();
        self.runtime.collect_done();
        self.cycle_count += 1;
        self.clock_bookkeeping();
        if self.continue_count > 0 {
            self.continue_count -= 1;
            let pc = self.pc() as i64;
            if self.breakpoints.contains(&pc) {
                self.continue_count = 0;
            }
        } else if self.continue_count < 0 {
            eprintln!("[CLK] negative continue count, resetting");
            self.continue_count = 0;
        }
    }

    /// Runs `count` cycles back to back.
    pub fn run_cycles(&mut self, count: u64) {
        for _ in 0..count {
            self.cycle();
        }
    }

    /// Inter-cycle latch maintenance: apply flushes, shift finished
    /// output latches down the pipe, advance the PC on a full shift,
    /// and reset every output latch for the next cycle.
    fn clock_bookkeeping(&mut self) {
        let mut st = self.shared.lock();
        st.stats.cycles += 1;

        for i in 0..NUM_STAGES {
            if st.flush[i] {
                if st.trace {
                    eprintln!("[CLK] flushing stage {i}");
                }
                st.in_latch[i].reset();
                st.in_latch[i].finished = true;
                st.out_latch[i].reset();
                st.out_latch[i].finished = true;
                st.stats.flushes += 1;
            }
        }

        // Shift from the back of the pipe towards the front; the first
        // unfinished output latch turns the shift into a bubble and
        // leaves everything upstream in place for a retry.
        let CoreState {
            in_latch,
            out_latch,
            stats,
            ..
        } = &mut *st;
        let mut full_shift = false;
        if out_latch[4].finished {
            if out_latch[3].finished {
                in_latch[4].load_from(&out_latch[3]);
                if out_latch[2].finished {
                    in_latch[3].load_from(&out_latch[2]);
                    if out_latch[1].finished {
                        in_latch[2].load_from(&out_latch[1]);
                        if out_latch[0].finished {
                            in_latch[1].load_from(&out_latch[0]);
                            in_latch[0].reset();
                            full_shift = true;
                        } else {
                            in_latch[1].reset();
                            stats.bubbles += 1;
                        }
                    } else {
                        in_latch[2].reset();
                        stats.bubbles += 1;
                    }
                } else {
                    in_latch[3].reset();
                    stats.bubbles += 1;
                }
            } else {
                in_latch[4].reset();
                stats.bubbles += 1;
            }
        }
        if full_shift {
            // A stalled pipe must preserve a pending redirect from a
            // completed branch, so the next-PC state only clears on a
            // full shift.
            st.npc_from = NpcSource::NotWritten;
            st.pc = st.npc;
        }

        for i in 0..NUM_STAGES {
            st.out_latch[i].reset();
            st.flush[i] = false;
        }
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn pc(&self) -> u32 {
        self.shared.lock().pc
    }

    /// Repoints execution, typically at the start marker of a freshly
    /// loaded image.
    pub fn set_pc(&self, addr: u32) {
        let mut st = self.shared.lock();
        st.pc = addr;
        st.npc = addr;
        st.npc_from = NpcSource::NotWritten;
    }

    pub fn read_register(&self, index: usize) -> i32 {
        self.shared.lock().regs.read(index)
    }

    /// Reads a word straight from main memory, bypassing the caches.
    pub fn peek_memory(&self, addr: u32) -> Result<i32, MemError> {
        self.shared.lock().mem.read(addr, 4)
    }

    /// Peeks the outermost data cache level without fetch side effects.
    pub fn peek_data_cache(&self, addr: u32) -> Result<i32, MemError> {
        self.shared.lock().dcache.read_nofetch(addr)
    }

    /// Peeks the outermost instruction cache level without fetch side
    /// effects.
    pub fn peek_instr_cache(&self, addr: u32) -> Result<i32, MemError> {
        self.shared.lock().icache.read_nofetch(addr)
    }

    /// Read and write hit counters for the outermost data cache level:
    /// `(reads, read_hits, writes, write_hits)`.
    pub fn data_cache_counters(&self) -> Option<(u64, u64, u64, u64)> {
        let st = self.shared.lock();
        st.dcache
            .outer()
            .map(|c| (c.stats().reads, c.stats().read_hits, c.stats().writes, c.stats().write_hits))
    }

    pub fn print_statistics(&self) {
        let st = self.shared.lock();
        println!("Data path:");
        st.dcache.statistics("  data");
        println!("Instruction path:");
        st.icache.statistics("  instr");
        st.mem.statistics();
        st.stats.print();
    }

    pub fn continue_count(&self) -> i64 {
        self.continue_count
    }

    pub fn set_continue_count(&mut self, count: i64) {
        self.continue_count = count;
    }

    pub fn set_breakpoint(&mut self, slot: usize, addr: i64) -> bool {
        match self.breakpoints.get_mut(slot) {
            Some(b) => {
                *b = addr;
                true
            }
            None => false,
        }
    }

    pub fn breakpoints(&self) -> &[i64; BREAKPOINT_SLOTS] {
        &self.breakpoints
    }

    /// Drains the machine at termination: blocks further architectural
    /// updates, detaches devices, drops the caches and prints the final
    /// statistics.
    pub fn finalize(&mut self) {
        self.print_statistics();
        let mut st = self.shared.lock();
        st.block_updates = true;
        st.ports.teardown();
        st.icache.teardown();
        st.dcache.teardown();
        drop(st);
        self.shutdown();
    }

    /// Stops and joins the stage workers.
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.runtime.request_shutdown();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
