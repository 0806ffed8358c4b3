//! Error types for memory, devices, program images and configuration.

use thiserror::Error;

/// Failures raised by main memory and the cache hierarchy.
///
/// These are never fatal to the simulation: the stage that hit the
/// failure logs it and retries on the next cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemError {
    /// The access falls outside the configured memory size.
    #[error("address {addr:#010x} (+{bytes}) is outside memory")]
    OutOfBounds { addr: u32, bytes: usize },

    /// The address is not aligned to the access width.
    #[error("address {addr:#010x} is not aligned to {bytes} bytes")]
    Misaligned { addr: u32, bytes: usize },

    /// The component only services word accesses.
    #[error("unsupported access width of {0} bytes")]
    UnsupportedWidth(usize),

    /// A no-fetch peek missed in the cache.
    #[error("address {0:#010x} is not resident in the cache")]
    NotResident(u32),
}

/// Failures raised by the device port manager.
#[derive(Debug, Error)]
pub enum PortError {
    /// No channel is attached to the device slot.
    #[error("device {0} has no attached channel")]
    Unconnected(u32),

    /// The device number is outside the port table.
    #[error("device number {0} is out of range")]
    BadDevice(u32),

    /// The device slot already has a channel attached.
    #[error("device {0} already has a channel attached")]
    SlotBusy(u32),

    /// The channel failed mid-transfer.
    #[error("channel i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised while loading a program image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),

    /// The image ended in the middle of an 8-byte record.
    #[error("truncated record at byte offset {0}")]
    TruncatedRecord(usize),

    /// The image contained no records at all.
    #[error("image is empty")]
    Empty,

    /// A record targets an address outside memory.
    #[error("record targets {0:#010x}, outside memory")]
    OutOfBounds(u32),
}

/// Failures raised while reading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configured memory size cannot back an allocation.
    #[error("memory size {0} must be a positive multiple of 4")]
    BadMemorySize(usize),

    #[error("invalid config: {0}")]
    Invalid(String),
}
