//! A cycle-level simulator of a 5-stage pipelined MIPS-like integer
//! processor.
//!
//! The five pipeline stages run as concurrently executing worker threads
//! coordinated by a clock barrier. Architectural state (register file,
//! program counter, main memory, caches, device ports) lives behind a
//! single shared lock; pipeline latches carry per-instruction state from
//! stage to stage, a forwarding network resolves data hazards, and a PC
//! arbitration scheme resolves control hazards with priority given to
//! later stages.

/// Shared error and data types.
pub mod common;

/// TOML configuration loading and validation.
pub mod config;

/// Debugger console for interactive runs.
pub mod console;

/// The processor core: latches, register file, stages, clock runtime.
pub mod core;

/// Instruction word decoding and opcode constants.
pub mod isa;

/// Main memory, the cache hierarchy and the program image loader.
pub mod mem;

/// Device port manager and word-oriented channels.
pub mod ports;

/// Simulation statistics collection and reporting.
pub mod stats;
