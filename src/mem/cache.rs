//! The chainable cache hierarchy.
//!
//! A cache path is a list of levels in front of main memory. Each level
//! is either a counting passthrough or a set-associative FIFO write-back
//! cache; each level's backing store is the next level, terminating at
//! [`MainMemory`](super::MainMemory). The instruction and data paths are
//! independent chains over the same memory.

use crate::common::MemError;
use crate::config::{CacheKind, CacheLevelConfig};
use crate::mem::Storage;

/// Per-level access counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub reads: u64,
    pub read_hits: u64,
    pub writes: u64,
    pub write_hits: u64,
}

impl CacheStats {
    fn print(&self, label: &str) {
        let rate = |hits: u64, total: u64| {
            if total == 0 {
                0.0
            } else {
                100.0 * hits as f64 / total as f64
            }
        };
        println!(
            "{label}: {} reads ({} hits, {:.2}%), {} writes ({} hits, {:.2}%)",
            self.reads,
            self.read_hits,
            rate(self.read_hits, self.reads),
            self.writes,
            self.write_hits,
            rate(self.write_hits, self.writes),
        );
    }
}

/// A passthrough level that counts accesses and forwards them unchanged.
#[derive(Default)]
pub struct NoCache {
    reads: u64,
    writes: u64,
}

impl NoCache {
    fn read(&mut self, addr: u32, bytes: usize, backing: &mut dyn Storage) -> Result<i32, MemError> {
        self.reads += 1;
        backing.read(addr, bytes)
    }

    fn write(
        &mut self,
        addr: u32,
        value: i32,
        bytes: usize,
        backing: &mut dyn Storage,
    ) -> Result<(), MemError> {
        self.writes += 1;
        backing.write(addr, value, bytes)
    }
}

struct CacheLine {
    valid: bool,
    dirty: bool,
    tag: u32,
    words: Vec<i32>,
}

struct CacheSet {
    lines: Vec<CacheLine>,
    /// FIFO victim pointer, advanced after each serviced miss.
    fifo_next: usize,
}

/// A word-oriented, write-allocate, write-back cache with FIFO
/// replacement per set.
pub struct SetAssociativeCache {
    words_per_block: usize,
    num_sets: usize,
    associativity: usize,
    verbose: bool,
    sets: Vec<CacheSet>,
    stats: CacheStats,
}

impl SetAssociativeCache {
    pub fn new(blocks: usize, words_per_block: usize, associativity: usize, verbose: bool) -> Self {
        let num_sets = blocks / associativity;
        let sets = (0..num_sets)
            .map(|_| CacheSet {
                lines: (0..associativity)
                    .map(|_| CacheLine {
                        valid: false,
                        dirty: false,
                        tag: 0,
                        words: vec![0; words_per_block],
                    })
                    .collect(),
                fifo_next: 0,
            })
            .collect();
        Self {
            words_per_block,
            num_sets,
            associativity,
            verbose,
            sets,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn locate(&self, addr: u32) -> (u32, usize, usize) {
        let word = (addr / 4) as usize;
        let block_tag = (word / self.words_per_block) as u32;
        let offset = word % self.words_per_block;
        let set = block_tag as usize % self.num_sets;
        (block_tag, offset, set)
    }

    fn find_line(&self, set: usize, block_tag: u32) -> Option<usize> {
        self.sets[set]
            .lines
            .iter()
            .position(|l| l.valid && l.tag == block_tag)
    }

    /// Evicts the FIFO victim (writing it back if dirty), fills the line
    /// from the backing store, and returns the line index. The FIFO
    /// pointer advances only once the miss has been fully serviced, and
    /// a failed fill leaves the victim line as it was.
    fn service_miss(
        &mut self,
        set: usize,
        block_tag: u32,
        backing: &mut dyn Storage,
    ) -> Result<usize, MemError> {
        let wpb = self.words_per_block;
        let verbose = self.verbose;
        let victim = self.sets[set].fifo_next;
        let line = &mut self.sets[set].lines[victim];

        if line.valid && line.dirty {
            let base = line.tag as usize * wpb;
            if verbose {
                eprintln!(
                    "[cache] set {set} way {victim}: writing back dirty block {:#x}",
                    line.tag
                );
            }
            for (i, word) in line.words.iter().enumerate() {
                backing.write(((base + i) * 4) as u32, *word, 4)?;
            }
        }

        // Fill into a scratch block first. If any backing read fails
        // the victim line is left untouched, so a retry still sees the
        // original (possibly dirty) words.
        let base = block_tag as usize * wpb;
        let mut filled = vec![0i32; wpb];
        for (i, word) in filled.iter_mut().enumerate() {
            *word = backing.read(((base + i) * 4) as u32, 4)?;
        }
        line.words = filled;
        line.valid = true;
        line.dirty = false;
        line.tag = block_tag;
        if verbose {
            eprintln!("[cache] set {set} way {victim}: filled block {block_tag:#x}");
        }

        self.sets[set].fifo_next = (victim + 1) % self.associativity;
        Ok(victim)
    }

    fn read(&mut self, addr: u32, bytes: usize, backing: &mut dyn Storage) -> Result<i32, MemError> {
        if bytes != 4 {
            return Err(MemError::UnsupportedWidth(bytes));
        }
        let (block_tag, offset, set) = self.locate(addr);
        self.stats.reads += 1;
        if let Some(i) = self.find_line(set, block_tag) {
            self.stats.read_hits += 1;
            return Ok(self.sets[set].lines[i].words[offset]);
        }
        let i = self.service_miss(set, block_tag, backing)?;
        Ok(self.sets[set].lines[i].words[offset])
    }

    fn write(
        &mut self,
        addr: u32,
        value: i32,
        bytes: usize,
        backing: &mut dyn Storage,
    ) -> Result<(), MemError> {
        if bytes != 4 {
            return Err(MemError::UnsupportedWidth(bytes));
        }
        let (block_tag, offset, set) = self.locate(addr);
        self.stats.writes += 1;
        let i = match self.find_line(set, block_tag) {
            Some(i) => {
                self.stats.write_hits += 1;
                i
            }
            None => self.service_miss(set, block_tag, backing)?,
        };
        let line = &mut self.sets[set].lines[i];
        line.words[offset] = value;
        line.dirty = true;
        Ok(())
    }

    /// Hit-or-fail peek: no fill, no write-back, no statistics.
    fn read_nofetch(&self, addr: u32) -> Result<i32, MemError> {
        let (block_tag, offset, set) = self.locate(addr);
        match self.find_line(set, block_tag) {
            Some(i) => Ok(self.sets[set].lines[i].words[offset]),
            None => Err(MemError::NotResident(addr)),
        }
    }
}

/// One level in a cache path.
pub enum CacheLevel {
    Passthrough(NoCache),
    SetAssociative(SetAssociativeCache),
}

impl CacheLevel {
    fn read(&mut self, addr: u32, bytes: usize, backing: &mut dyn Storage) -> Result<i32, MemError> {
        match self {
            CacheLevel::Passthrough(c) => c.read(addr, bytes, backing),
            CacheLevel::SetAssociative(c) => c.read(addr, bytes, backing),
        }
    }

    fn write(
        &mut self,
        addr: u32,
        value: i32,
        bytes: usize,
        backing: &mut dyn Storage,
    ) -> Result<(), MemError> {
        match self {
            CacheLevel::Passthrough(c) => c.write(addr, value, bytes, backing),
            CacheLevel::SetAssociative(c) => c.write(addr, value, bytes, backing),
        }
    }

    fn statistics(&self, path: &str, level: usize) {
        match self {
            CacheLevel::Passthrough(c) => println!(
                "{path} L{level} (passthrough): {} reads, {} writes",
                c.reads, c.writes
            ),
            CacheLevel::SetAssociative(c) => {
                c.stats.print(&format!(
                    "{path} L{level} ({} sets x {} ways x {} words)",
                    c.num_sets, c.associativity, c.words_per_block
                ));
            }
        }
    }
}

/// Recursion helper: the remaining levels plus the terminal store,
/// presented to the level in front as a single backing store.
struct ChainTail<'a> {
    levels: &'a mut [CacheLevel],
    mem: &'a mut dyn Storage,
}

impl Storage for ChainTail<'_> {
    fn read(&mut self, addr: u32, bytes: usize) -> Result<i32, MemError> {
        chain_read(self.levels, addr, bytes, self.mem)
    }

    fn write(&mut self, addr: u32, value: i32, bytes: usize) -> Result<(), MemError> {
        chain_write(self.levels, addr, value, bytes, self.mem)
    }
}

fn chain_read(
    levels: &mut [CacheLevel],
    addr: u32,
    bytes: usize,
    mem: &mut dyn Storage,
) -> Result<i32, MemError> {
    match levels.split_first_mut() {
        None => mem.read(addr, bytes),
        Some((first, rest)) => first.read(addr, bytes, &mut ChainTail { levels: rest, mem }),
    }
}

fn chain_write(
    levels: &mut [CacheLevel],
    addr: u32,
    value: i32,
    bytes: usize,
    mem: &mut dyn Storage,
) -> Result<(), MemError> {
    match levels.split_first_mut() {
        None => mem.write(addr, value, bytes),
        Some((first, rest)) => first.write(addr, value, bytes, &mut ChainTail { levels: rest, mem }),
    }
}

/// An ordered chain of cache levels, outermost first.
pub struct CacheChain {
    levels: Vec<CacheLevel>,
}

impl CacheChain {
    /// A chain with no levels: accesses go straight to the store.
    pub fn direct() -> Self {
        Self { levels: Vec::new() }
    }

    pub fn from_levels(levels: Vec<CacheLevel>) -> Self {
        Self { levels }
    }

    pub fn from_config(cfgs: &[CacheLevelConfig]) -> Self {
        let levels = cfgs
            .iter()
            .map(|c| match c.kind {
                CacheKind::Passthrough => CacheLevel::Passthrough(NoCache::default()),
                CacheKind::SetAssociative => CacheLevel::SetAssociative(SetAssociativeCache::new(
                    c.blocks,
                    c.words_per_block,
                    c.associativity,
                    c.verbose,
                )),
            })
            .collect();
        Self { levels }
    }

    pub fn read(&mut self, addr: u32, bytes: usize, mem: &mut dyn Storage) -> Result<i32, MemError> {
        chain_read(&mut self.levels, addr, bytes, mem)
    }

    pub fn write(
        &mut self,
        addr: u32,
        value: i32,
        bytes: usize,
        mem: &mut dyn Storage,
    ) -> Result<(), MemError> {
        chain_write(&mut self.levels, addr, value, bytes, mem)
    }

    /// Peeks the outermost level without fetch side effects. Fails on a
    /// passthrough or an empty chain.
    pub fn read_nofetch(&self, addr: u32) -> Result<i32, MemError> {
        match self.levels.first() {
            Some(CacheLevel::SetAssociative(c)) => c.read_nofetch(addr),
            _ => Err(MemError::NotResident(addr)),
        }
    }

    /// Prints per-level counters, outermost level first.
    pub fn statistics(&self, path: &str) {
        if self.levels.is_empty() {
            println!("{path}: no cache levels configured");
            return;
        }
        for (i, level) in self.levels.iter().enumerate() {
            level.statistics(path, i + 1);
        }
    }

    /// Outermost set-associative level, if any. Used by tests and the
    /// statistics report.
    pub fn outer(&self) -> Option<&SetAssociativeCache> {
        match self.levels.first() {
            Some(CacheLevel::SetAssociative(c)) => Some(c),
            _ => None,
        }
    }

    /// Drops all cached state.
    pub fn teardown(&mut self) {
        self.levels.clear();
    }
}
