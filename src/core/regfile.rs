//! The architectural register file.

use crate::isa::{REG_HI, REG_LO};

/// 32 general registers plus the Hi and Lo multiply/divide registers,
/// addressed as indices 32 and 33.
#[derive(Debug, Clone, Default)]
pub struct RegisterFile {
    regs: [i32; 32],
    hi: i32,
    lo: i32,
}

impl RegisterFile {
    /// Register 0 always reads as zero.
    pub fn read(&self, index: usize) -> i32 {
        match index {
            0 => 0,
            REG_HI => self.hi,
            REG_LO => self.lo,
            i if i < 32 => self.regs[i],
            _ => 0,
        }
    }

    /// Writes a register. Attempts to modify register 0 (or an index
    /// outside the file) are rejected.
    pub fn write(&mut self, index: usize, value: i32) -> bool {
        match index {
            0 => {
                eprintln!("[WB ] instruction attempting to modify $zero, ignoring");
                false
            }
            REG_HI => {
                self.hi = value;
                true
            }
            REG_LO => {
                self.lo = value;
                true
            }
            i if i < 32 => {
                self.regs[i] = value;
                true
            }
            i => {
                eprintln!("[WB ] register index {i} out of range, ignoring");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_register_is_hardwired() {
        let mut rf = RegisterFile::default();
        assert!(!rf.write(0, 99));
        assert_eq!(rf.read(0), 0);
    }

    #[test]
    fn hi_lo_are_addressable() {
        let mut rf = RegisterFile::default();
        assert!(rf.write(REG_HI, 3));
        assert!(rf.write(REG_LO, 4));
        assert_eq!(rf.read(REG_HI), 3);
        assert_eq!(rf.read(REG_LO), 4);
    }

    #[test]
    fn general_registers_round_trip() {
        let mut rf = RegisterFile::default();
        assert!(rf.write(17, -55));
        assert_eq!(rf.read(17), -55);
    }
}
