//! Simulator configuration.
//!
//! Loaded from a TOML file; every field has a default so a missing file
//! section (or the whole file) still yields a runnable setup.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::ConfigError;
use crate::isa::SYSTEM_START_ADDRESS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ports: PortsConfig,
}

/// General execution settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Per-stage narration on stderr.
    #[serde(default)]
    pub trace_instructions: bool,
    /// Initial program counter.
    #[serde(default = "default_start_address")]
    pub start_address: u32,
}

fn default_start_address() -> u32 {
    SYSTEM_START_ADDRESS
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            trace_instructions: false,
            start_address: default_start_address(),
        }
    }
}

/// Main memory settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_size")]
    pub size_bytes: usize,
}

fn default_memory_size() -> usize {
    4_914_304
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size_bytes: default_memory_size(),
        }
    }
}

/// Cache topology: one chain of levels per path, outermost first. An
/// empty chain sends accesses straight to main memory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub instruction: Vec<CacheLevelConfig>,
    #[serde(default)]
    pub data: Vec<CacheLevelConfig>,
}

/// What a single cache level is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Counts accesses and forwards them unchanged.
    Passthrough,
    /// Set-associative FIFO write-back cache.
    SetAssociative,
}

/// One level of a cache chain.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheLevelConfig {
    #[serde(default = "default_cache_kind")]
    pub kind: CacheKind,
    /// Total number of blocks in the level.
    #[serde(default = "default_blocks")]
    pub blocks: usize,
    #[serde(default = "default_words_per_block")]
    pub words_per_block: usize,
    /// Ways per set; 1 is direct-mapped, `blocks` is fully associative.
    #[serde(default = "default_associativity")]
    pub associativity: usize,
    #[serde(default)]
    pub verbose: bool,
}

fn default_cache_kind() -> CacheKind {
    CacheKind::SetAssociative
}

fn default_blocks() -> usize {
    16
}

fn default_words_per_block() -> usize {
    4
}

fn default_associativity() -> usize {
    1
}

impl Default for CacheLevelConfig {
    fn default() -> Self {
        Self {
            kind: default_cache_kind(),
            blocks: default_blocks(),
            words_per_block: default_words_per_block(),
            associativity: default_associativity(),
            verbose: false,
        }
    }
}

/// Device port endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PortsConfig {
    /// Attach TCP channels at startup. When false the port table starts
    /// empty and device accesses fail with a logged negative status.
    #[serde(default)]
    pub connect: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_input_device")]
    pub input_device: u32,
    #[serde(default = "default_input_port")]
    pub input_port: u16,
    #[serde(default = "default_output_device")]
    pub output_device: u32,
    #[serde(default = "default_output_port")]
    pub output_port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_input_device() -> u32 {
    1
}

fn default_input_port() -> u16 {
    5678
}

fn default_output_device() -> u32 {
    2
}

fn default_output_port() -> u16 {
    5680
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            connect: false,
            host: default_host(),
            input_device: default_input_device(),
            input_port: default_input_port(),
            output_device: default_output_device(),
            output_port: default_output_port(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.size_bytes == 0 || self.memory.size_bytes % 4 != 0 {
            return Err(ConfigError::BadMemorySize(self.memory.size_bytes));
        }
        if self.general.start_address as usize >= self.memory.size_bytes {
            return Err(ConfigError::Invalid(format!(
                "start address {:#x} is outside memory",
                self.general.start_address
            )));
        }
        for (path, levels) in [
            ("instruction", &self.cache.instruction),
            ("data", &self.cache.data),
        ] {
            for (i, level) in levels.iter().enumerate() {
                if level.kind == CacheKind::Passthrough {
                    continue;
                }
                if level.blocks == 0 || level.words_per_block == 0 || level.associativity == 0 {
                    return Err(ConfigError::Invalid(format!(
                        "{path} cache level {} has a zero dimension",
                        i + 1
                    )));
                }
                if level.blocks % level.associativity != 0 {
                    return Err(ConfigError::Invalid(format!(
                        "{path} cache level {}: {} blocks not divisible by {} ways",
                        i + 1,
                        level.blocks,
                        level.associativity
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.start_address, SYSTEM_START_ADDRESS);
    }

    #[test]
    fn parses_cache_chain() {
        let toml = r#"
            [[cache.data]]
            kind = "setassociative"
            blocks = 4
            words_per_block = 1
            associativity = 4

            [[cache.data]]
            kind = "passthrough"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.data.len(), 2);
        assert_eq!(config.cache.data[0].associativity, 4);
        assert_eq!(config.cache.data[1].kind, CacheKind::Passthrough);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_memory_size() {
        let mut config = Config::default();
        config.memory.size_bytes = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadMemorySize(6))
        ));
    }

    #[test]
    fn rejects_bad_geometry() {
        let toml = r#"
            [[cache.data]]
            blocks = 5
            associativity = 2
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
