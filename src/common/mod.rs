//! Types shared across the simulator.

pub mod error;

pub use error::{ConfigError, ImageError, MemError, PortError};

/// Process exit code used when memory allocation or size validation fails.
pub const EXIT_ALLOC_FAILURE: i32 = 10;

/// Process exit code used when the simulated program requests termination.
pub const EXIT_TERMINATED: i32 = 99;
