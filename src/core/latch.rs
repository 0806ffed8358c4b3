//! Pipeline latches.
//!
//! Every stage owns an input latch and an output latch. A stage copies
//! its input latch into its output latch at the start of a cycle, works
//! on the output latch, and marks it finished. The clock shifts output
//! latches into the next stage's input latch between cycles.

use crate::isa::InstructionWord;

/// Where an instruction's result becomes available for forwarding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultStage {
    #[default]
    NoResult,
    AtDecode,
    AtExecute,
    AtMemory,
}

/// Which operand slot a register fetch fills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchTarget {
    OperandA,
    OperandB,
    #[default]
    DecodeResult,
}

/// Which latch field Writeback commits to the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    Decode,
    Alu,
    AluHi,
    Load,
}

/// The values carried between two adjacent stages.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    pub pc: u32,
    pub inst: InstructionWord,
    /// Destination register, if any. Indices 32 and 33 address Hi and Lo.
    pub targ_reg: Option<usize>,
    /// Second destination, used by MULT and DIV for the Hi half.
    pub targ_reg2: Option<usize>,
    pub result_stage: ResultStage,
    /// ALU operands.
    pub a: i32,
    pub b: i32,
    /// Set when a deferred operand fetch was postponed to Execute.
    pub fetch_incomplete: bool,
    pub fetch_failed_for: FetchTarget,
    pub imm: i32,
    /// Result produced at decode time (link addresses, Hi/Lo moves).
    pub decode_result: i32,
    pub alu_out: i32,
    pub alu_out_hi: i32,
    /// Word loaded from memory or a device.
    pub load_data: i32,
    pub finished: bool,
}

impl Latch {
    /// Turns the latch into a bubble. Operand and result fields keep
    /// their residual values; only the identifying fields are cleared.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.inst = InstructionWord(0);
        self.targ_reg = None;
        self.targ_reg2 = None;
        self.result_stage = ResultStage::NoResult;
        self.fetch_incomplete = false;
        self.fetch_failed_for = FetchTarget::DecodeResult;
        self.finished = false;
    }

    /// Stage handoff: copies every data field and leaves the
    /// destination unfinished.
    pub fn load_from(&mut self, source: &Latch) {
        *self = source.clone();
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_identity_and_keeps_operands() {
        let mut latch = Latch {
            pc: 1024,
            inst: InstructionWord(0x1234),
            targ_reg: Some(5),
            a: 42,
            finished: true,
            ..Default::default()
        };
        latch.reset();
        assert_eq!(latch.pc, 0);
        assert!(latch.inst.is_nop());
        assert_eq!(latch.targ_reg, None);
        assert_eq!(latch.a, 42);
        assert!(!latch.finished);
    }

    #[test]
    fn load_from_clears_finished() {
        let src = Latch {
            pc: 2048,
            a: 7,
            finished: true,
            ..Default::default()
        };
        let mut dst = Latch::default();
        dst.load_from(&src);
        assert_eq!(dst.pc, 2048);
        assert_eq!(dst.a, 7);
        assert!(!dst.finished);
    }
}
