//! Instruction word decoding and opcode constants.
//!
//! Instructions are 32-bit words in the usual MIPS R/I/J layouts. All
//! field extraction is explicit mask-and-shift through
//! [`InstructionWord`]; the all-zero word is the pipeline bubble.

/// Address the SYSCALL instruction transfers control to.
pub const SYSCALL_HANDLER_ADDRESS: u32 = 0;

/// Address execution starts from after loading a program image.
pub const SYSTEM_START_ADDRESS: u32 = 1024;

/// Register file index of the Hi multiply/divide result register.
pub const REG_HI: usize = 32;

/// Register file index of the Lo multiply/divide result register.
pub const REG_LO: usize = 33;

/// Link register written by JAL and SYSCALL.
pub const REG_RA: usize = 31;

/// Primary opcodes (bits 31:26).
pub mod op {
    pub const ZERO: u32 = 0x00;
    pub const ONE: u32 = 0x01;
    pub const J: u32 = 0x02;
    pub const JAL: u32 = 0x03;
    pub const BEQ: u32 = 0x04;
    pub const BNE: u32 = 0x05;
    pub const BLEZ: u32 = 0x06;
    pub const BGTZ: u32 = 0x07;
    pub const ADDI: u32 = 0x08;
    pub const SLTI: u32 = 0x0a;
    pub const ANDI: u32 = 0x0c;
    pub const ORI: u32 = 0x0d;
    pub const XORI: u32 = 0x0e;
    pub const LUI: u32 = 0x0f;
    pub const LW: u32 = 0x23;
    pub const SW: u32 = 0x2b;
    pub const DOUT: u32 = 0x3e;
    pub const DIN: u32 = 0x3f;
}

/// Function codes under primary opcode 0 (bits 5:0).
pub mod funct {
    pub const SLL: u32 = 0x00;
    pub const SRL: u32 = 0x02;
    pub const SRA: u32 = 0x03;
    pub const SLLV: u32 = 0x04;
    pub const SRLV: u32 = 0x06;
    pub const SRAV: u32 = 0x07;
    pub const JR: u32 = 0x08;
    pub const JALR: u32 = 0x09;
    pub const SYSCALL: u32 = 0x0c;
    pub const MFHI: u32 = 0x10;
    pub const MTHI: u32 = 0x11;
    pub const MFLO: u32 = 0x12;
    pub const MTLO: u32 = 0x13;
    pub const MULT: u32 = 0x18;
    pub const DIV: u32 = 0x1a;
    pub const ADD: u32 = 0x20;
    pub const SUB: u32 = 0x22;
    pub const AND: u32 = 0x24;
    pub const OR: u32 = 0x25;
    pub const XOR: u32 = 0x26;
    pub const NOR: u32 = 0x27;
    pub const SLT: u32 = 0x2a;
    pub const RDOUT: u32 = 0x3e;
    pub const RDIN: u32 = 0x3f;
}

/// Branch selectors under primary opcode 1, demultiplexed through rt.
pub mod regimm {
    pub const BLTZ: u32 = 0x00;
    pub const BGEZ: u32 = 0x01;
}

/// A raw 32-bit instruction word with explicit field accessors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstructionWord(pub u32);

impl InstructionWord {
    /// Primary opcode, bits 31:26.
    pub fn op(self) -> u32 {
        (self.0 >> 26) & 0x3f
    }

    /// Source register rs, bits 25:21.
    pub fn rs(self) -> usize {
        ((self.0 >> 21) & 0x1f) as usize
    }

    /// Source/target register rt, bits 20:16.
    pub fn rt(self) -> usize {
        ((self.0 >> 16) & 0x1f) as usize
    }

    /// Destination register rd, bits 15:11.
    pub fn rd(self) -> usize {
        ((self.0 >> 11) & 0x1f) as usize
    }

    /// Shift amount, bits 10:6.
    pub fn shamt(self) -> u32 {
        (self.0 >> 6) & 0x1f
    }

    /// Function code, bits 5:0.
    pub fn funct(self) -> u32 {
        self.0 & 0x3f
    }

    /// Sign-extended 16-bit immediate.
    pub fn imm(self) -> i32 {
        self.0 as u16 as i16 as i32
    }

    /// 26-bit jump target field.
    pub fn target(self) -> u32 {
        self.0 & 0x03ff_ffff
    }

    /// The all-zero word flows through the pipe as a bubble.
    pub fn is_nop(self) -> bool {
        self.0 == 0
    }
}

/// Encodes an R-format instruction. Used by tests and tooling.
pub fn encode_r(rs: usize, rt: usize, rd: usize, shamt: u32, funct: u32) -> u32 {
    ((rs as u32) << 21) | ((rt as u32) << 16) | ((rd as u32) << 11) | (shamt << 6) | funct
}

/// Encodes an I-format instruction.
pub fn encode_i(op: u32, rs: usize, rt: usize, imm: i32) -> u32 {
    (op << 26) | ((rs as u32) << 21) | ((rt as u32) << 16) | (imm as u32 & 0xffff)
}

/// Encodes a J-format instruction.
pub fn encode_j(op: u32, target: u32) -> u32 {
    (op << 26) | (target & 0x03ff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r_format_fields_round_trip() {
        let w = InstructionWord(encode_r(9, 10, 11, 0, funct::ADD));
        assert_eq!(w.op(), op::ZERO);
        assert_eq!(w.rs(), 9);
        assert_eq!(w.rt(), 10);
        assert_eq!(w.rd(), 11);
        assert_eq!(w.funct(), funct::ADD);
    }

    #[test]
    fn immediate_sign_extends() {
        let w = InstructionWord(encode_i(op::ADDI, 1, 2, -5));
        assert_eq!(w.imm(), -5);
        let w = InstructionWord(encode_i(op::ADDI, 1, 2, 0x7fff));
        assert_eq!(w.imm(), 0x7fff);
    }

    #[test]
    fn jump_target_masks_26_bits() {
        let w = InstructionWord(encode_j(op::J, 0x0345_6789));
        assert_eq!(w.op(), op::J);
        assert_eq!(w.target(), 0x0345_6789);
    }

    #[test]
    fn zero_word_is_nop() {
        assert!(InstructionWord(0).is_nop());
        assert!(!InstructionWord(encode_i(op::ADDI, 0, 1, 1)).is_nop());
    }

    #[test]
    fn shift_amount_field() {
        let w = InstructionWord(encode_r(0, 4, 5, 31, funct::SLL));
        assert_eq!(w.shamt(), 31);
    }
}
