//! Main memory and the program image loader.
//!
//! Everything that can service a read or write implements [`Storage`];
//! cache levels sit in front of a `Storage` backing store and are
//! themselves presented to the level above as one (see [`cache`]).

pub mod cache;

use std::fs;
use std::path::Path;

use crate::common::{ImageError, MemError};

/// A component that can service sized reads and writes.
///
/// Addresses are byte addresses. Values travel as `i32` regardless of
/// width; narrow reads sign-extend.
pub trait Storage {
    fn read(&mut self, addr: u32, bytes: usize) -> Result<i32, MemError>;
    fn write(&mut self, addr: u32, value: i32, bytes: usize) -> Result<(), MemError>;
}

/// Byte-addressed main memory with bounds and alignment checking.
///
/// Access violations fail without terminating the simulation; the stage
/// that issued the access logs the failure and retries next cycle.
pub struct MainMemory {
    bytes: Vec<u8>,
    reads: u64,
    writes: u64,
}

impl MainMemory {
    pub fn new(size_bytes: usize) -> Self {
        Self {
            bytes: vec![0; size_bytes],
            reads: 0,
            writes: 0,
        }
    }

    fn check(&self, addr: u32, bytes: usize) -> Result<usize, MemError> {
        let a = addr as usize;
        if !matches!(bytes, 1 | 2 | 4) {
            return Err(MemError::UnsupportedWidth(bytes));
        }
        if a.checked_add(bytes).map_or(true, |end| end > self.bytes.len()) {
            return Err(MemError::OutOfBounds { addr, bytes });
        }
        if a % bytes != 0 {
            return Err(MemError::Misaligned { addr, bytes });
        }
        Ok(a)
    }

    /// Loads a program image: a stream of 8-byte little-endian
    /// `{address, word}` records. The first record is a start-address
    /// marker and is not written to memory; its address field is
    /// returned. Remaining records are written verbatim until EOF.
    pub fn load_image(&mut self, path: &Path) -> Result<u32, ImageError> {
        let raw = fs::read(path)?;
        self.load_records(&raw)
    }

    /// Same as [`load_image`](Self::load_image) but from a byte slice.
    pub fn load_records(&mut self, raw: &[u8]) -> Result<u32, ImageError> {
        if raw.is_empty() {
            return Err(ImageError::Empty);
        }
        let mut start = 0u32;
        let mut offset = 0usize;
        let mut first = true;
        while offset < raw.len() {
            let rec = raw
                .get(offset..offset + 8)
                .ok_or(ImageError::TruncatedRecord(offset))?;
            let addr = i32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]) as u32;
            let word = i32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]);
            if first {
                start = addr;
                first = false;
            } else {
                self.write(addr, word, 4)
                    .map_err(|_| ImageError::OutOfBounds(addr))?;
            }
            offset += 8;
        }
        Ok(start)
    }

    pub fn statistics(&self) {
        println!("Main memory: {} reads, {} writes", self.reads, self.writes);
    }
}

impl Storage for MainMemory {
    fn read(&mut self, addr: u32, bytes: usize) -> Result<i32, MemError> {
        let a = self.check(addr, bytes)?;
        self.reads += 1;
        let v = match bytes {
            1 => self.bytes[a] as i8 as i32,
            2 => i16::from_le_bytes([self.bytes[a], self.bytes[a + 1]]) as i32,
            _ => i32::from_le_bytes([
                self.bytes[a],
                self.bytes[a + 1],
                self.bytes[a + 2],
                self.bytes[a + 3],
            ]),
        };
        Ok(v)
    }

    fn write(&mut self, addr: u32, value: i32, bytes: usize) -> Result<(), MemError> {
        let a = self.check(addr, bytes)?;
        self.writes += 1;
        match bytes {
            1 => self.bytes[a] = value as u8,
            2 => self.bytes[a..a + 2].copy_from_slice(&(value as i16).to_le_bytes()),
            _ => self.bytes[a..a + 4].copy_from_slice(&value.to_le_bytes()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_read_after_write() {
        let mut mem = MainMemory::new(64);
        mem.write(8, -12345, 4).unwrap();
        assert_eq!(mem.read(8, 4).unwrap(), -12345);
    }

    #[test]
    fn narrow_reads_sign_extend() {
        let mut mem = MainMemory::new(64);
        mem.write(0, 0xff, 1).unwrap();
        assert_eq!(mem.read(0, 1).unwrap(), -1);
        mem.write(2, 0x8000u16 as i16 as i32, 2).unwrap();
        assert_eq!(mem.read(2, 2).unwrap(), i16::MIN as i32);
    }

    #[test]
    fn out_of_bounds_fails() {
        let mut mem = MainMemory::new(16);
        assert!(matches!(
            mem.read(16, 4),
            Err(MemError::OutOfBounds { .. })
        ));
        assert!(matches!(
            mem.write(u32::MAX, 0, 4),
            Err(MemError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn misaligned_fails() {
        let mut mem = MainMemory::new(16);
        assert!(matches!(mem.read(2, 4), Err(MemError::Misaligned { .. })));
        assert!(matches!(mem.read(1, 2), Err(MemError::Misaligned { .. })));
    }

    #[test]
    fn image_skips_start_marker() {
        let mut mem = MainMemory::new(2048);
        let mut raw = Vec::new();
        raw.extend_from_slice(&1024i32.to_le_bytes());
        raw.extend_from_slice(&0i32.to_le_bytes());
        raw.extend_from_slice(&1024i32.to_le_bytes());
        raw.extend_from_slice(&0x2222i32.to_le_bytes());
        let start = mem.load_records(&raw).unwrap();
        assert_eq!(start, 1024);
        assert_eq!(mem.read(1024, 4).unwrap(), 0x2222);
    }

    #[test]
    fn truncated_image_fails() {
        let mut mem = MainMemory::new(64);
        let raw = [0u8; 12];
        assert!(matches!(
            mem.load_records(&raw),
            Err(ImageError::TruncatedRecord(8))
        ));
    }
}
